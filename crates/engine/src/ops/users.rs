use sea_orm::{ActiveValue, PaginatorTrait, QueryFilter, QueryOrder, prelude::*};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine, Role, User, group_members, groups, transactions, users,
};

use super::{Engine, normalize_required, with_tx};

/// What a user deletion removed besides the user itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserDeletion {
    pub deleted_transactions: u64,
    pub deleted_from_group: bool,
}

impl Engine {
    /// Registers a new user, hashing `password`.
    ///
    /// Fails with [`EngineError::AlreadyExists`] when the username or the
    /// email is taken.
    pub async fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> ResultEngine<User> {
        let username = normalize_required(username, "username")?;
        let email = normalize_required(email, "email")?;
        if password.is_empty() {
            return Err(EngineError::InvalidInput(
                "password must not be empty".to_string(),
            ));
        }
        let password_hash = bcrypt::hash(password, self.password_cost)?;

        with_tx!(self, |db_tx| {
            let username_taken = users::Entity::find()
                .filter(users::Column::Username.eq(username.as_str()))
                .one(&db_tx)
                .await?
                .is_some();
            if username_taken {
                return Err(EngineError::AlreadyExists("username".to_string()));
            }
            let email_taken = users::Entity::find()
                .filter(users::Column::Email.eq(email.as_str()))
                .one(&db_tx)
                .await?
                .is_some();
            if email_taken {
                return Err(EngineError::AlreadyExists("email".to_string()));
            }

            let model = users::ActiveModel {
                id: ActiveValue::Set(Uuid::new_v4().to_string()),
                username: ActiveValue::Set(username.clone()),
                email: ActiveValue::Set(email.clone()),
                password: ActiveValue::Set(password_hash),
                role: ActiveValue::Set(role.as_str().to_string()),
                refresh_token: ActiveValue::Set(None),
            }
            .insert(&db_tx)
            .await?;

            tracing::info!(username = %model.username, role = role.as_str(), "user registered");
            User::try_from(model)
        })
    }

    /// Checks `password` against the stored hash of the user owning `email`.
    pub async fn login(&self, email: &str, password: &str) -> ResultEngine<User> {
        let model = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotFound("user".to_string()))?;

        if !bcrypt::verify(password, &model.password)? {
            return Err(EngineError::WrongCredentials);
        }
        User::try_from(model)
    }

    /// Stores (or clears, with `None`) the refresh token of a user.
    pub async fn set_refresh_token(&self, user_id: &str, token: Option<&str>) -> ResultEngine<()> {
        let model = users::Entity::find_by_id(user_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotFound("user".to_string()))?;

        let mut active: users::ActiveModel = model.into();
        active.refresh_token = ActiveValue::Set(token.map(ToString::to_string));
        active.update(&self.database).await?;
        Ok(())
    }

    /// Finds the user currently holding `token` as refresh token.
    pub async fn user_by_refresh_token(&self, token: &str) -> ResultEngine<User> {
        let model = users::Entity::find()
            .filter(users::Column::RefreshToken.eq(token))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotFound("user".to_string()))?;
        User::try_from(model)
    }

    pub async fn list_users(&self) -> ResultEngine<Vec<User>> {
        users::Entity::find()
            .order_by_asc(users::Column::Username)
            .all(&self.database)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    pub async fn user(&self, username: &str) -> ResultEngine<User> {
        let model = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotFound("user".to_string()))?;
        User::try_from(model)
    }

    /// Deletes a regular user together with their transactions and group
    /// membership. A group left without members is deleted too.
    pub async fn delete_user(&self, email: &str) -> ResultEngine<UserDeletion> {
        with_tx!(self, |db_tx| {
            let user = users::Entity::find()
                .filter(users::Column::Email.eq(email))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("user".to_string()))?;
            if Role::try_from(user.role.as_str())? == Role::Admin {
                return Err(EngineError::Forbidden(
                    "admins cannot be deleted".to_string(),
                ));
            }

            let deleted_transactions = transactions::Entity::delete_many()
                .filter(transactions::Column::Username.eq(user.username.as_str()))
                .exec(&db_tx)
                .await?
                .rows_affected;

            let membership = group_members::Entity::find()
                .filter(group_members::Column::Email.eq(user.email.as_str()))
                .one(&db_tx)
                .await?;
            let deleted_from_group = membership.is_some();
            if let Some(membership) = membership {
                group_members::Entity::delete_by_id(membership.id)
                    .exec(&db_tx)
                    .await?;
                let remaining = group_members::Entity::find()
                    .filter(group_members::Column::GroupName.eq(membership.group_name.as_str()))
                    .count(&db_tx)
                    .await?;
                if remaining == 0 {
                    groups::Entity::delete_by_id(membership.group_name.clone())
                        .exec(&db_tx)
                        .await?;
                    tracing::info!(group = %membership.group_name, "group emptied and deleted");
                }
            }

            users::Entity::delete_by_id(user.id.clone())
                .exec(&db_tx)
                .await?;
            tracing::info!(username = %user.username, deleted_transactions, "user deleted");

            Ok(UserDeletion {
                deleted_transactions,
                deleted_from_group,
            })
        })
    }
}
