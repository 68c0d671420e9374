//! Category registry.
//!
//! Categories are global tags. The auto-increment `id` records creation
//! order: the lowest id is the oldest category, which receives the
//! transactions of deleted categories.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub category_type: String,
    pub color: String,
}

impl From<Model> for Category {
    fn from(model: Model) -> Self {
        Self {
            category_type: model.category_type,
            color: model.color,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub category_type: String,
    pub color: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
