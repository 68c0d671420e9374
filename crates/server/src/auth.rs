//! Cookie based authentication.
//!
//! Every protected request carries two signed tokens: a short lived
//! `accessToken` and a long lived `refreshToken`. When the access token has
//! expired but the refresh token is still good, a new access token is
//! issued on the fly and returned as a cookie.

use api_types::Envelope;
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, header::SET_COOKIE},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::{ServerError, server::ServerState};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

const UNAUTHORIZED: &str = "Unauthorized";
const LOGIN_AGAIN: &str = "Perform login again";
const REFRESHED: &str = "Access token has been refreshed. Remember to copy the new one in the headers of subsequent calls";

/// Payload of both tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Claims {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    fn for_user(user: &engine::User, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    fn renewed(&self, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            ..self.clone()
        }
    }

    fn is_incomplete(&self) -> bool {
        self.username.is_empty() || self.email.is_empty() || self.role.is_empty()
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.username == other.username && self.email == other.email && self.role == other.role
    }
}

enum TokenError {
    Expired,
    Invalid,
}

fn unauthorized(message: &str) -> ServerError {
    ServerError::Unauthorized(message.to_string())
}

/// Signing material and token lifetimes.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, ServerError> {
        encode(&Header::default(), claims, &self.encoding).map_err(|err| {
            tracing::error!("failed to sign token: {err}");
            unauthorized(UNAUTHORIZED)
        })
    }

    fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => {
                Err(TokenError::Expired)
            }
            Err(_) => Err(TokenError::Invalid),
        }
    }

    /// Returns the `(access, refresh)` pair for a fresh login.
    pub fn issue_pair(&self, user: &engine::User) -> Result<(String, String), ServerError> {
        let access = self.sign(&Claims::for_user(user, self.access_ttl))?;
        let refresh = self.sign(&Claims::for_user(user, self.refresh_ttl))?;
        Ok((access, refresh))
    }

    /// Checks a token pair and resolves the caller.
    pub fn verify(&self, access: &str, refresh: &str) -> Result<Session, ServerError> {
        match self.decode(access) {
            Ok(access_claims) => {
                let refresh_claims = match self.decode(refresh) {
                    Ok(claims) => claims,
                    Err(TokenError::Expired) => return Err(unauthorized(LOGIN_AGAIN)),
                    Err(TokenError::Invalid) => return Err(unauthorized(UNAUTHORIZED)),
                };
                if access_claims.is_incomplete() || refresh_claims.is_incomplete() {
                    return Err(unauthorized("Token is missing information"));
                }
                if !access_claims.same_identity(&refresh_claims) {
                    return Err(unauthorized("Mismatched users"));
                }
                Ok(Session {
                    claims: access_claims,
                    refreshed_access: None,
                })
            }
            Err(TokenError::Expired) => match self.decode(refresh) {
                Ok(refresh_claims) => {
                    let token = self.sign(&refresh_claims.renewed(self.access_ttl))?;
                    Ok(Session {
                        claims: refresh_claims,
                        refreshed_access: Some(token),
                    })
                }
                Err(TokenError::Expired) => Err(unauthorized(LOGIN_AGAIN)),
                Err(TokenError::Invalid) => Err(unauthorized(UNAUTHORIZED)),
            },
            Err(TokenError::Invalid) => Err(unauthorized(UNAUTHORIZED)),
        }
    }

    pub fn access_cookie(&self, token: String) -> Cookie<'static> {
        token_cookie(ACCESS_COOKIE, token, self.access_ttl)
    }

    pub fn refresh_cookie(&self, token: String) -> Cookie<'static> {
        token_cookie(REFRESH_COOKIE, token, self.refresh_ttl)
    }
}

fn token_cookie(name: &'static str, value: String, ttl: Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .path("/api")
        .max_age(time::Duration::seconds(ttl.num_seconds()))
        .build()
}

/// Cookie that makes the browser drop `name`.
pub fn expired_cookie(name: &'static str) -> Cookie<'static> {
    token_cookie(name, String::new(), Duration::zero())
}

/// The authenticated caller of a request.
#[derive(Clone, Debug)]
pub struct Session {
    pub claims: Claims,
    /// New access token when the presented one had expired.
    refreshed_access: Option<String>,
}

impl Session {
    /// Wraps `data` into the success envelope.
    pub fn reply<T: Serialize>(&self, data: T) -> Json<Envelope<T>> {
        Json(Envelope {
            data,
            refreshed_token_message: self
                .refreshed_access
                .as_ref()
                .map(|_| REFRESHED.to_string()),
        })
    }

    pub fn is_admin(&self) -> bool {
        self.claims.role == engine::Role::Admin.as_str()
    }

    pub fn require_user(&self, username: &str) -> Result<(), ServerError> {
        if self.claims.username == username {
            Ok(())
        } else {
            Err(unauthorized("Username mismatch"))
        }
    }

    pub fn require_admin(&self) -> Result<(), ServerError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(unauthorized("Not an admin"))
        }
    }

    pub fn require_group(&self, members: &[String]) -> Result<(), ServerError> {
        if members.iter().any(|email| email == &self.claims.email) {
            Ok(())
        } else {
            Err(unauthorized("Not a member of the group"))
        }
    }

    pub fn require_user_or_admin(&self, username: &str) -> Result<(), ServerError> {
        if self.is_admin() {
            return Ok(());
        }
        self.require_user(username)
    }

    pub fn require_group_or_admin(&self, members: &[String]) -> Result<(), ServerError> {
        if self.is_admin() {
            return Ok(());
        }
        self.require_group(members)
    }
}

/// Middleware guarding every protected route.
///
/// Stores the [`Session`] in the request extensions and, when the access
/// token was refreshed, appends the new `accessToken` cookie to the
/// response.
pub async fn authenticate(
    State(state): State<ServerState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let (Some(access), Some(refresh)) = (jar.get(ACCESS_COOKIE), jar.get(REFRESH_COOKIE)) else {
        tracing::warn!(path = %request.uri().path(), "request without token cookies");
        return Err(unauthorized(UNAUTHORIZED));
    };

    let session = state
        .tokens
        .verify(access.value(), refresh.value())
        .inspect_err(|_| tracing::warn!(path = %request.uri().path(), "token rejected"))?;
    let refreshed = session.refreshed_access.clone();
    request.extensions_mut().insert(session);

    let mut response = next.run(request).await;
    if let Some(token) = refreshed {
        let cookie = state.tokens.access_cookie(token);
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(err) => tracing::error!("failed to encode refreshed cookie: {err}"),
        }
    }
    Ok(response)
}
