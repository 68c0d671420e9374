//! Bookkeeping engine: users, categories, transactions and groups stored
//! through `sea-orm`.
//!
//! Every public operation lives on [`Engine`]; multi-step writes run inside
//! a single database transaction.

pub use categories::Category;
pub use error::EngineError;
pub use groups::Group;
pub use ops::{
    AmountRange, DateRange, Engine, EngineBuilder, GroupAddition, GroupRemoval, TransactionFilter,
    UserDeletion,
};
pub use reconcile::{AdditionPlan, RemovalPlan};
pub use transactions::{Transaction, TransactionWithColor};
pub use users::{Role, User};

mod categories;
mod error;
mod group_members;
mod groups;
mod ops;
pub mod reconcile;
mod transactions;
mod users;

type ResultEngine<T> = Result<T, EngineError>;
