//! Transaction records.
//!
//! `username` and `category_type` are plain strings rather than foreign
//! keys: the engine keeps them consistent when users are deleted and when
//! categories are renamed or deleted. The relation to [`categories`] exists
//! only at query level, to join the category color.
//!
//!  [`categories`]: super::categories

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use uuid::Uuid;

use crate::{EngineError, ResultEngine, categories};

#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub username: String,
    pub amount: f64,
    pub category_type: String,
    pub date: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        username: String,
        amount: f64,
        category_type: String,
        date: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if !amount.is_finite() {
            return Err(EngineError::InvalidInput(
                "amount must be a finite number".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            username,
            amount,
            category_type,
            date,
        })
    }
}

/// A transaction joined with the color of its category.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionWithColor {
    pub transaction: Transaction,
    pub color: String,
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&model.id)
            .map_err(|_| EngineError::InvalidInput("invalid transaction id".to_string()))?;
        Ok(Self {
            id,
            username: model.username,
            amount: model.amount,
            category_type: model.category_type,
            date: model.date,
        })
    }
}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: sea_orm::ActiveValue::Set(tx.id.to_string()),
            username: sea_orm::ActiveValue::Set(tx.username.clone()),
            category_type: sea_orm::ActiveValue::Set(tx.category_type.clone()),
            amount: sea_orm::ActiveValue::Set(tx.amount),
            date: sea_orm::ActiveValue::Set(tx.date),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub username: String,
    pub category_type: String,
    pub amount: f64,
    pub date: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::categories::Entity",
        from = "Column::CategoryType",
        to = "super::categories::Column::CategoryType"
    )]
    Category,
}

impl Related<categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
