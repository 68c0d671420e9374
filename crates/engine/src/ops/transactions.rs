use chrono::{DateTime, Utc};
use uuid::Uuid;

use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, prelude::*};

use crate::{
    EngineError, ResultEngine, Transaction, TransactionWithColor, categories, group_members,
    reconcile, transactions, users,
};

use super::{Engine, normalize_required, with_tx};

/// Inclusive date bounds, in UTC.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub up_to: Option<DateTime<Utc>>,
}

/// Inclusive amount bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AmountRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Filters for listing transactions. The default filter matches everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactionFilter {
    pub date: DateRange,
    pub amount: AmountRange,
    /// Restricts the listing to one category type, which must exist.
    pub category: Option<String>,
}

impl TransactionFilter {
    pub fn for_category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }
}

trait ApplyTxFilters: QueryFilter + Sized {
    fn apply_tx_filters(self, filter: &TransactionFilter) -> Self;
}

impl<T> ApplyTxFilters for T
where
    T: QueryFilter + Sized,
{
    fn apply_tx_filters(mut self, filter: &TransactionFilter) -> Self {
        if let Some(from) = filter.date.from {
            self = self.filter(transactions::Column::Date.gte(from));
        }
        if let Some(up_to) = filter.date.up_to {
            self = self.filter(transactions::Column::Date.lte(up_to));
        }
        if let Some(min) = filter.amount.min {
            self = self.filter(transactions::Column::Amount.gte(min));
        }
        if let Some(max) = filter.amount.max {
            self = self.filter(transactions::Column::Amount.lte(max));
        }
        if let Some(category) = &filter.category {
            self = self.filter(transactions::Column::CategoryType.eq(category.as_str()));
        }
        self
    }
}

fn parse_transaction_id(raw: &str) -> ResultEngine<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(
            "transaction id must not be empty".to_string(),
        ));
    }
    // Ids are stored in their hyphenated form: anything else cannot match.
    Uuid::parse_str(trimmed)
        .map(|id| id.to_string())
        .map_err(|_| EngineError::NotFound("transaction".to_string()))
}

impl Engine {
    pub(super) async fn require_username(
        &self,
        db: &DatabaseTransaction,
        username: &str,
    ) -> ResultEngine<users::Model> {
        users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("user".to_string()))
    }

    /// Runs the filtered listing, joined with the category color.
    ///
    /// `usernames` restricts the owners when present. Transactions whose
    /// category no longer exists are skipped.
    async fn query_transactions(
        &self,
        db: &DatabaseTransaction,
        usernames: Option<Vec<String>>,
        filter: &TransactionFilter,
    ) -> ResultEngine<Vec<TransactionWithColor>> {
        if let Some(category) = &filter.category {
            self.require_category(db, category).await?;
        }
        if let (Some(from), Some(up_to)) = (filter.date.from, filter.date.up_to)
            && from > up_to
        {
            return Ok(Vec::new());
        }

        let mut query = transactions::Entity::find()
            .find_also_related(categories::Entity)
            .order_by_asc(transactions::Column::Date)
            .order_by_asc(transactions::Column::Id);
        if let Some(usernames) = usernames {
            query = query.filter(transactions::Column::Username.is_in(usernames));
        }
        query = query.apply_tx_filters(filter);

        let rows: Vec<(transactions::Model, Option<categories::Model>)> = query.all(db).await?;
        let mut out = Vec::with_capacity(rows.len());
        for (tx_model, category) in rows {
            let Some(category) = category else {
                continue;
            };
            out.push(TransactionWithColor {
                transaction: Transaction::try_from(tx_model)?,
                color: category.color,
            });
        }
        Ok(out)
    }

    /// Records a transaction dated now.
    ///
    /// Both the user and the category must exist.
    pub async fn create_transaction(
        &self,
        username: &str,
        amount: f64,
        category_type: &str,
    ) -> ResultEngine<Transaction> {
        let username = normalize_required(username, "username")?;
        let category_type = normalize_required(category_type, "type")?;

        with_tx!(self, |db_tx| {
            self.require_username(&db_tx, &username).await?;
            self.require_category(&db_tx, &category_type).await?;

            let tx = Transaction::new(username.clone(), amount, category_type.clone(), Utc::now())?;
            transactions::ActiveModel::from(&tx).insert(&db_tx).await?;
            Ok(tx)
        })
    }

    /// Lists every transaction of every user.
    pub async fn list_transactions(&self) -> ResultEngine<Vec<TransactionWithColor>> {
        with_tx!(self, |db_tx| {
            self.query_transactions(&db_tx, None, &TransactionFilter::default())
                .await
        })
    }

    /// Lists the transactions of `username` matching `filter`.
    pub async fn list_user_transactions(
        &self,
        username: &str,
        filter: &TransactionFilter,
    ) -> ResultEngine<Vec<TransactionWithColor>> {
        with_tx!(self, |db_tx| {
            let user = self.require_username(&db_tx, username).await?;
            self.query_transactions(&db_tx, Some(vec![user.username]), filter)
                .await
        })
    }

    /// Lists the transactions of every member of `group_name` matching
    /// `filter`.
    pub async fn list_group_transactions(
        &self,
        group_name: &str,
        filter: &TransactionFilter,
    ) -> ResultEngine<Vec<TransactionWithColor>> {
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, group_name).await?;
            let user_ids: Vec<String> = group_members::Entity::find()
                .filter(group_members::Column::GroupName.eq(group_name))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(|m| m.user_id)
                .collect();
            let usernames: Vec<String> = users::Entity::find()
                .filter(users::Column::Id.is_in(user_ids))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(|u| u.username)
                .collect();

            self.query_transactions(&db_tx, Some(usernames), filter)
                .await
        })
    }

    /// Deletes one transaction owned by `username`.
    pub async fn delete_user_transaction(
        &self,
        username: &str,
        transaction_id: &str,
    ) -> ResultEngine<()> {
        let transaction_id = parse_transaction_id(transaction_id)?;

        with_tx!(self, |db_tx| {
            self.require_username(&db_tx, username).await?;
            let model = transactions::Entity::find_by_id(transaction_id.clone())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("transaction".to_string()))?;
            if model.username != username {
                return Err(EngineError::Forbidden(
                    "transaction belongs to another user".to_string(),
                ));
            }

            transactions::Entity::delete_by_id(model.id)
                .exec(&db_tx)
                .await?;
            Ok(())
        })
    }

    /// Deletes every transaction in `ids`. Nothing is deleted unless all of
    /// them exist.
    pub async fn delete_transactions(&self, ids: &[String]) -> ResultEngine<u64> {
        if ids.iter().any(|id| id.trim().is_empty()) {
            return Err(EngineError::InvalidInput(
                "transaction ids must not be empty".to_string(),
            ));
        }
        let parsed = ids
            .iter()
            .map(|id| parse_transaction_id(id))
            .collect::<ResultEngine<Vec<String>>>()?;
        let ids = reconcile::dedup_preserving_order(parsed.iter().map(String::as_str));
        if ids.is_empty() {
            return Ok(0);
        }

        with_tx!(self, |db_tx| {
            let found = transactions::Entity::find()
                .filter(transactions::Column::Id.is_in(ids.clone()))
                .all(&db_tx)
                .await?;
            if found.len() != ids.len() {
                return Err(EngineError::NotFound("transaction".to_string()));
            }

            let deleted = transactions::Entity::delete_many()
                .filter(transactions::Column::Id.is_in(ids.clone()))
                .exec(&db_tx)
                .await?
                .rows_affected;
            Ok(deleted)
        })
    }
}
