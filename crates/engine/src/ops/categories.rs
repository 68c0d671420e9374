use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, prelude::*, sea_query::Expr,
};

use crate::{Category, EngineError, ResultEngine, categories, reconcile, transactions};

use super::{Engine, normalize_required, with_tx};

impl Engine {
    pub(super) async fn find_category(
        &self,
        db: &DatabaseTransaction,
        category_type: &str,
    ) -> ResultEngine<Option<categories::Model>> {
        categories::Entity::find()
            .filter(categories::Column::CategoryType.eq(category_type))
            .one(db)
            .await
            .map_err(Into::into)
    }

    pub(super) async fn require_category(
        &self,
        db: &DatabaseTransaction,
        category_type: &str,
    ) -> ResultEngine<categories::Model> {
        self.find_category(db, category_type)
            .await?
            .ok_or_else(|| EngineError::NotFound("category".to_string()))
    }

    pub async fn create_category(&self, category_type: &str, color: &str) -> ResultEngine<Category> {
        let category_type = normalize_required(category_type, "type")?;
        let color = normalize_required(color, "color")?;

        with_tx!(self, |db_tx| {
            if self.find_category(&db_tx, &category_type).await?.is_some() {
                return Err(EngineError::AlreadyExists("category".to_string()));
            }

            let model = categories::ActiveModel {
                id: ActiveValue::NotSet,
                category_type: ActiveValue::Set(category_type.clone()),
                color: ActiveValue::Set(color.clone()),
            }
            .insert(&db_tx)
            .await?;

            tracing::info!(category = %model.category_type, "category created");
            Ok(Category::from(model))
        })
    }

    /// Lists categories, oldest first.
    pub async fn list_categories(&self) -> ResultEngine<Vec<Category>> {
        Ok(categories::Entity::find()
            .order_by_asc(categories::Column::Id)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Category::from)
            .collect())
    }

    /// Renames and/or recolors `current_type`.
    ///
    /// Returns the number of transactions moved to the new type (0 when the
    /// type is unchanged).
    pub async fn update_category(
        &self,
        current_type: &str,
        new_type: &str,
        color: &str,
    ) -> ResultEngine<u64> {
        let new_type = normalize_required(new_type, "type")?;
        let color = normalize_required(color, "color")?;

        with_tx!(self, |db_tx| {
            let current = self.require_category(&db_tx, current_type).await?;
            let renamed = current.category_type != new_type;
            if renamed && self.find_category(&db_tx, &new_type).await?.is_some() {
                return Err(EngineError::AlreadyExists("category".to_string()));
            }

            let old_type = current.category_type.clone();
            let mut active: categories::ActiveModel = current.into();
            active.category_type = ActiveValue::Set(new_type.clone());
            active.color = ActiveValue::Set(color.clone());
            active.update(&db_tx).await?;

            let moved = if renamed {
                transactions::Entity::update_many()
                    .col_expr(
                        transactions::Column::CategoryType,
                        Expr::value(new_type.clone()),
                    )
                    .filter(transactions::Column::CategoryType.eq(old_type.as_str()))
                    .exec(&db_tx)
                    .await?
                    .rows_affected
            } else {
                0
            };

            tracing::info!(from = %old_type, to = %new_type, moved, "category updated");
            Ok(moved)
        })
    }

    /// Deletes the given categories and moves their transactions to the
    /// oldest surviving category.
    ///
    /// When every stored category is requested, the oldest one survives.
    /// Returns the number of transactions moved.
    pub async fn delete_categories(&self, requested: &[String]) -> ResultEngine<u64> {
        if requested.is_empty() {
            return Err(EngineError::InvalidInput(
                "types must not be empty".to_string(),
            ));
        }
        if requested.iter().any(|t| t.trim().is_empty()) {
            return Err(EngineError::InvalidInput(
                "types must not contain empty strings".to_string(),
            ));
        }
        let requested = reconcile::dedup_preserving_order(requested.iter().map(String::as_str));

        with_tx!(self, |db_tx| {
            let stored = categories::Entity::find()
                .order_by_asc(categories::Column::Id)
                .all(&db_tx)
                .await?;
            if stored.len() <= 1 {
                return Err(EngineError::Forbidden(
                    "cannot delete the only category".to_string(),
                ));
            }
            if let Some(missing) = requested
                .iter()
                .find(|t| !stored.iter().any(|c| &c.category_type == *t))
            {
                return Err(EngineError::NotFound(format!("category {missing}")));
            }

            let to_delete: Vec<String> = if requested.len() == stored.len() {
                stored
                    .iter()
                    .skip(1)
                    .map(|c| c.category_type.clone())
                    .collect()
            } else {
                requested.clone()
            };
            let survivor = stored
                .iter()
                .find(|c| !to_delete.contains(&c.category_type))
                .map(|c| c.category_type.clone())
                .ok_or_else(|| EngineError::Forbidden("no category would remain".to_string()))?;

            let moved = transactions::Entity::update_many()
                .col_expr(
                    transactions::Column::CategoryType,
                    Expr::value(survivor.clone()),
                )
                .filter(transactions::Column::CategoryType.is_in(to_delete.clone()))
                .exec(&db_tx)
                .await?
                .rows_affected;

            categories::Entity::delete_many()
                .filter(categories::Column::CategoryType.is_in(to_delete.clone()))
                .exec(&db_tx)
                .await?;

            tracing::info!(deleted = ?to_delete, into = %survivor, moved, "categories deleted");
            Ok(moved)
        })
    }
}
