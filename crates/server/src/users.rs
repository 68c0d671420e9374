//! User directory endpoints.

use api_types::{
    Envelope, Role,
    user::{UserDelete, UserDeleted, UserView},
};
use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};

use crate::{ServerError, auth::Session, server::ServerState, validation};

fn map_user(user: engine::User) -> UserView {
    UserView {
        username: user.username,
        email: user.email,
        role: match user.role {
            engine::Role::Regular => Role::Regular,
            engine::Role::Admin => Role::Admin,
        },
    }
}

pub async fn list(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Result<Json<Envelope<Vec<UserView>>>, ServerError> {
    session.require_admin()?;
    let users = state
        .engine
        .list_users()
        .await?
        .into_iter()
        .map(map_user)
        .collect();
    Ok(session.reply(users))
}

pub async fn get(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(username): Path<String>,
) -> Result<Json<Envelope<UserView>>, ServerError> {
    session.require_user_or_admin(&username)?;
    let user = state.engine.user(&username).await?;
    Ok(session.reply(map_user(user)))
}

/// Deletes a regular user with their transactions and group membership.
pub async fn delete(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    payload: Result<Json<UserDelete>, JsonRejection>,
) -> Result<Json<Envelope<UserDeleted>>, ServerError> {
    session.require_admin()?;
    let payload = validation::body(payload)?;
    let email = validation::email(payload.email)?;

    let deletion = state.engine.delete_user(&email).await?;
    Ok(session.reply(UserDeleted {
        deleted_transactions: deletion.deleted_transactions,
        deleted_from_group: deletion.deleted_from_group,
    }))
}
