//! Registration, login and logout. These routes do not go through the
//! token guard.

use api_types::{
    Envelope, Message,
    auth::{Login, Register, Tokens},
};
use axum::{Json, extract::State, extract::rejection::JsonRejection};
use axum_extra::extract::cookie::CookieJar;
use engine::Role;

use crate::{
    ServerError,
    auth::{ACCESS_COOKIE, REFRESH_COOKIE, expired_cookie},
    server::ServerState,
    validation,
};

fn public_reply<T>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        data,
        refreshed_token_message: None,
    })
}

async fn register_with_role(
    state: &ServerState,
    payload: Result<Json<Register>, JsonRejection>,
    role: Role,
) -> Result<Json<Envelope<Message>>, ServerError> {
    let payload = validation::body(payload)?;
    let username = validation::required(payload.username, "username")?;
    let email = validation::email(payload.email)?;
    let password = validation::password(payload.password)?;

    state
        .engine
        .register_user(&username, &email, &password, role)
        .await?;
    Ok(public_reply(Message::new("User added successfully")))
}

pub async fn register(
    State(state): State<ServerState>,
    payload: Result<Json<Register>, JsonRejection>,
) -> Result<Json<Envelope<Message>>, ServerError> {
    register_with_role(&state, payload, Role::Regular).await
}

pub async fn register_admin(
    State(state): State<ServerState>,
    payload: Result<Json<Register>, JsonRejection>,
) -> Result<Json<Envelope<Message>>, ServerError> {
    register_with_role(&state, payload, Role::Admin).await
}

/// Checks the credentials, stores the new refresh token and sets both
/// token cookies.
pub async fn login(
    State(state): State<ServerState>,
    jar: CookieJar,
    payload: Result<Json<Login>, JsonRejection>,
) -> Result<(CookieJar, Json<Envelope<Tokens>>), ServerError> {
    let payload = validation::body(payload)?;
    let email = validation::email(payload.email)?;
    let password = validation::password(payload.password)?;

    let user = state.engine.login(&email, &password).await?;
    let (access_token, refresh_token) = state.tokens.issue_pair(&user)?;
    state
        .engine
        .set_refresh_token(&user.id, Some(&refresh_token))
        .await?;
    tracing::info!(username = %user.username, "user logged in");

    let jar = jar
        .add(state.tokens.access_cookie(access_token.clone()))
        .add(state.tokens.refresh_cookie(refresh_token.clone()));
    Ok((
        jar,
        public_reply(Tokens {
            access_token,
            refresh_token,
        }),
    ))
}

/// Forgets the refresh token of the caller and expires both cookies.
pub async fn logout(
    State(state): State<ServerState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Envelope<Message>>), ServerError> {
    let refresh = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| ServerError::Generic("refresh token missing".to_string()))?;

    let user = state.engine.user_by_refresh_token(&refresh).await?;
    state.engine.set_refresh_token(&user.id, None).await?;
    tracing::info!(username = %user.username, "user logged out");

    let jar = jar
        .add(expired_cookie(ACCESS_COOKIE))
        .add(expired_cookie(REFRESH_COOKIE));
    Ok((jar, public_reply(Message::new("User logged out"))))
}
