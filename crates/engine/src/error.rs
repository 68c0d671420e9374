//! The module contains the error the engine can throw.
//!
//! Every variant but [`Database`] and [`Password`] describes a request the
//! engine refused: an unknown key, a duplicate, invalid input or an action
//! not allowed on the target.
//!
//!  [`Database`]: EngineError::Database
//!  [`Password`]: EngineError::Password
use bcrypt::BcryptError;
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("wrong credentials")]
    WrongCredentials,
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Password(#[from] BcryptError),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::AlreadyExists(a), Self::AlreadyExists(b)) => a == b,
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (Self::WrongCredentials, Self::WrongCredentials) => true,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::Password(a), Self::Password(b)) => a.to_string() == b.to_string(),
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
