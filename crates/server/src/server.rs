use axum::{
    Router, middleware,
    routing::{get, patch, post},
};

use std::{net::SocketAddr, sync::Arc};

use crate::{account, auth, auth::TokenKeys, categories, groups, transactions, users};
use engine::Engine;

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub tokens: Arc<TokenKeys>,
}

/// Routes that need the token cookies.
fn protected(state: ServerState) -> Router<ServerState> {
    Router::new()
        .route(
            "/categories",
            get(categories::list)
                .post(categories::create)
                .delete(categories::delete),
        )
        .route("/categories/{category}", patch(categories::update))
        .route(
            "/users/{username}/transactions",
            get(transactions::list_for_user)
                .post(transactions::create)
                .delete(transactions::delete_own),
        )
        .route(
            "/users/{username}/transactions/category/{category}",
            get(transactions::list_for_user_category),
        )
        .route(
            "/groups/{name}/transactions",
            get(transactions::list_for_group),
        )
        .route(
            "/groups/{name}/transactions/category/{category}",
            get(transactions::list_for_group_category),
        )
        .route(
            "/transactions",
            get(transactions::list_all).delete(transactions::delete_many),
        )
        .route(
            "/transactions/users/{username}",
            get(transactions::admin_list_for_user),
        )
        .route(
            "/transactions/users/{username}/category/{category}",
            get(transactions::admin_list_for_user_category),
        )
        .route(
            "/transactions/groups/{name}",
            get(transactions::admin_list_for_group),
        )
        .route(
            "/transactions/groups/{name}/category/{category}",
            get(transactions::admin_list_for_group_category),
        )
        .route("/users", get(users::list).delete(users::delete))
        .route("/users/{username}", get(users::get))
        .route(
            "/groups",
            get(groups::list).post(groups::create).delete(groups::delete),
        )
        .route("/groups/{name}", get(groups::get))
        .route("/groups/{name}/add", patch(groups::add))
        .route("/groups/{name}/insert", patch(groups::insert))
        .route("/groups/{name}/remove", patch(groups::remove))
        .route("/groups/{name}/pull", patch(groups::pull))
        .route_layer(middleware::from_fn_with_state(state, auth::authenticate))
}

pub fn router(state: ServerState) -> Router {
    let api = Router::new()
        .route("/register", post(account::register))
        .route("/admin", post(account::register_admin))
        .route("/login", post(account::login))
        .route("/logout", get(account::logout))
        .merge(protected(state.clone()));

    Router::new().nest("/api", api).with_state(state)
}

pub async fn run_with_listener(
    engine: Engine,
    tokens: TokenKeys,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    let state = ServerState {
        engine: Arc::new(engine),
        tokens: Arc::new(tokens),
    };

    axum::serve(listener, router(state)).await
}

pub fn spawn_with_listener(
    engine: Engine,
    tokens: TokenKeys,
    listener: tokio::net::TcpListener,
) -> Result<SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(engine, tokens, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}
