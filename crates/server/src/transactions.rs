//! Transactions API endpoints.
//!
//! User routes only see the caller's own transactions, group routes the
//! transactions of the caller's group, admin routes everything.

use api_types::{
    Envelope, Message,
    transaction::{
        TransactionCreated, TransactionDelete, TransactionNew, TransactionQuery, TransactionView,
        TransactionsDelete,
    },
};
use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use engine::{TransactionFilter, TransactionWithColor};

use crate::{ServerError, auth::Session, server::ServerState, validation};

type Listing = Result<Json<Envelope<Vec<TransactionView>>>, ServerError>;

fn map_transaction(row: TransactionWithColor) -> TransactionView {
    TransactionView {
        id: row.transaction.id.to_string(),
        username: row.transaction.username,
        amount: row.transaction.amount,
        category_type: row.transaction.category_type,
        date: row.transaction.date,
        color: row.color,
    }
}

fn listing(session: &Session, rows: Vec<TransactionWithColor>) -> Json<Envelope<Vec<TransactionView>>> {
    session.reply(rows.into_iter().map(map_transaction).collect())
}

/// Loads the members of `name` and checks the caller is one of them.
async fn require_group_member(
    state: &ServerState,
    session: &Session,
    name: &str,
) -> Result<(), ServerError> {
    let group = state.engine.group(name).await?;
    session.require_group(&group.members)
}

pub async fn create(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(username): Path<String>,
    payload: Result<Json<TransactionNew>, JsonRejection>,
) -> Result<Json<Envelope<TransactionCreated>>, ServerError> {
    session.require_user(&username)?;
    let payload = validation::body(payload)?;
    let body_username = validation::required(payload.username, "username")?;
    let category_type = validation::required(payload.category_type, "type")?;
    let amount = validation::amount(payload.amount)?;
    if body_username != username {
        return Err(ServerError::Generic(
            "username in the body does not match the route".to_string(),
        ));
    }

    let tx = state
        .engine
        .create_transaction(&username, amount, &category_type)
        .await?;
    Ok(session.reply(TransactionCreated {
        id: tx.id.to_string(),
        username: tx.username,
        amount: tx.amount,
        category_type: tx.category_type,
        date: tx.date,
    }))
}

pub async fn list_all(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Listing {
    session.require_admin()?;
    let rows = state.engine.list_transactions().await?;
    Ok(listing(&session, rows))
}

/// The caller's transactions, narrowed by the `date`, `from`, `upTo`,
/// `min` and `max` query parameters.
pub async fn list_for_user(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(username): Path<String>,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> Listing {
    session.require_user(&username)?;
    let query = validation::query(query)?;
    let filter = validation::transaction_filter(&query)?;

    let rows = state
        .engine
        .list_user_transactions(&username, &filter)
        .await?;
    Ok(listing(&session, rows))
}

pub async fn admin_list_for_user(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(username): Path<String>,
) -> Listing {
    session.require_admin()?;
    let rows = state
        .engine
        .list_user_transactions(&username, &TransactionFilter::default())
        .await?;
    Ok(listing(&session, rows))
}

pub async fn list_for_user_category(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path((username, category)): Path<(String, String)>,
) -> Listing {
    session.require_user(&username)?;
    let rows = state
        .engine
        .list_user_transactions(&username, &TransactionFilter::for_category(category))
        .await?;
    Ok(listing(&session, rows))
}

pub async fn admin_list_for_user_category(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path((username, category)): Path<(String, String)>,
) -> Listing {
    session.require_admin()?;
    let rows = state
        .engine
        .list_user_transactions(&username, &TransactionFilter::for_category(category))
        .await?;
    Ok(listing(&session, rows))
}

pub async fn list_for_group(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(name): Path<String>,
) -> Listing {
    require_group_member(&state, &session, &name).await?;
    let rows = state
        .engine
        .list_group_transactions(&name, &TransactionFilter::default())
        .await?;
    Ok(listing(&session, rows))
}

pub async fn admin_list_for_group(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(name): Path<String>,
) -> Listing {
    session.require_admin()?;
    let rows = state
        .engine
        .list_group_transactions(&name, &TransactionFilter::default())
        .await?;
    Ok(listing(&session, rows))
}

pub async fn list_for_group_category(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path((name, category)): Path<(String, String)>,
) -> Listing {
    require_group_member(&state, &session, &name).await?;
    let rows = state
        .engine
        .list_group_transactions(&name, &TransactionFilter::for_category(category))
        .await?;
    Ok(listing(&session, rows))
}

pub async fn admin_list_for_group_category(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path((name, category)): Path<(String, String)>,
) -> Listing {
    session.require_admin()?;
    let rows = state
        .engine
        .list_group_transactions(&name, &TransactionFilter::for_category(category))
        .await?;
    Ok(listing(&session, rows))
}

pub async fn delete_own(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(username): Path<String>,
    payload: Result<Json<TransactionDelete>, JsonRejection>,
) -> Result<Json<Envelope<Message>>, ServerError> {
    session.require_user(&username)?;
    let payload = validation::body(payload)?;
    let id = validation::required(payload.id, "_id")?;

    state.engine.delete_user_transaction(&username, &id).await?;
    Ok(session.reply(Message::new("Transaction deleted")))
}

pub async fn delete_many(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    payload: Result<Json<TransactionsDelete>, JsonRejection>,
) -> Result<Json<Envelope<Message>>, ServerError> {
    session.require_admin()?;
    let payload = validation::body(payload)?;
    let ids = payload
        .ids
        .ok_or_else(|| ServerError::Generic("missing attribute: _ids".to_string()))?;

    let deleted = state.engine.delete_transactions(&ids).await?;
    tracing::info!(deleted, "transactions deleted");
    Ok(session.reply(Message::new("Transactions deleted")))
}
