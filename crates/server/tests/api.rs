use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use sea_orm::Database;
use serde_json::{Value, json};
use tower::ServiceExt;

use engine::Engine;
use migration::MigratorTrait;
use server::{Claims, ServerState, TokenKeys};

const SECRET: &str = "test-secret";

async fn app() -> Router {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db)
        .password_cost(4)
        .build()
        .await
        .unwrap();
    let tokens = TokenKeys::new(SECRET, Duration::hours(1), Duration::days(7));
    server::router(ServerState {
        engine: Arc::new(engine),
        tokens: Arc::new(tokens),
    })
}

struct Reply {
    status: StatusCode,
    body: Value,
    set_cookies: Vec<String>,
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookies: Option<&str>,
    body: Option<Value>,
) -> Reply {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookies) = cookies {
        request = request.header(header::COOKIE, cookies);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let set_cookies = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        body,
        set_cookies,
    }
}

async fn register(app: &Router, route: &str, username: &str) {
    let reply = send(
        app,
        Method::POST,
        route,
        None,
        Some(json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "secret",
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
}

/// Logs in and returns the `Cookie` header to send with later requests.
async fn login(app: &Router, username: &str) -> String {
    let reply = send(
        app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "email": format!("{username}@example.com"), "password": "secret" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.set_cookies.len(), 2);
    assert!(reply.set_cookies.iter().all(|c| c.contains("HttpOnly")));
    format!(
        "accessToken={}; refreshToken={}",
        reply.body["data"]["accessToken"].as_str().unwrap(),
        reply.body["data"]["refreshToken"].as_str().unwrap()
    )
}

fn signed(username: &str, ttl: Duration) -> String {
    let now = Utc::now();
    let claims = Claims {
        id: "ignored".to_string(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        role: "Regular".to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

#[tokio::test]
async fn registration_rejects_duplicates_and_bad_input() {
    let app = app().await;
    register(&app, "/api/register", "alice").await;

    let reply = send(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({ "username": "alice", "email": "other@example.com", "password": "x" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body["error"].is_string());

    let reply = send(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({ "username": "bob", "email": "not-an-email", "password": "x" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(
        &app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({ "username": "bob", "password": "x" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "missing attribute: email");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = app().await;
    register(&app, "/api/register", "alice").await;

    let reply = send(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "email": "alice@example.com", "password": "nope" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "wrong credentials");
}

#[tokio::test]
async fn protected_routes_need_both_cookies() {
    let app = app().await;
    register(&app, "/api/register", "alice").await;
    let cookies = login(&app, "alice").await;

    let reply = send(&app, Method::GET, "/api/categories", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "Unauthorized");

    let only_access = cookies.split(';').next().unwrap().to_string();
    let reply = send(&app, Method::GET, "/api/categories", Some(&only_access), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = send(&app, Method::GET, "/api/categories", Some(&cookies), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "data": [] }));
}

#[tokio::test]
async fn expired_access_token_is_refreshed() {
    let app = app().await;
    register(&app, "/api/register", "alice").await;
    login(&app, "alice").await;

    let cookies = format!(
        "accessToken={}; refreshToken={}",
        signed("alice", Duration::minutes(-1)),
        signed("alice", Duration::days(1))
    );
    let reply = send(&app, Method::GET, "/api/users/alice", Some(&cookies), None).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["data"]["username"], "alice");
    assert!(reply.body["refreshedTokenMessage"].is_string());
    assert!(reply.set_cookies.iter().any(|c| c.starts_with("accessToken=")));

    let cookies = format!(
        "accessToken={}; refreshToken={}",
        signed("alice", Duration::minutes(-1)),
        signed("alice", Duration::minutes(-1))
    );
    let reply = send(&app, Method::GET, "/api/users/alice", Some(&cookies), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "Perform login again");
}

#[tokio::test]
async fn category_management_is_admin_only() {
    let app = app().await;
    register(&app, "/api/register", "alice").await;
    register(&app, "/api/admin", "root").await;
    let user = login(&app, "alice").await;
    let admin = login(&app, "root").await;

    let category = json!({ "type": "food", "color": "red" });
    let reply = send(&app, Method::POST, "/api/categories", Some(&user), Some(category.clone())).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "Not an admin");

    let reply = send(&app, Method::POST, "/api/categories", Some(&admin), Some(category)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"], json!({ "type": "food", "color": "red" }));

    let reply = send(
        &app,
        Method::PATCH,
        "/api/categories/food",
        Some(&admin),
        Some(json!({ "type": "groceries", "color": "green" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["count"], 0);

    let reply = send(
        &app,
        Method::DELETE,
        "/api/categories",
        Some(&admin),
        Some(json!({ "types": ["groceries"] })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(&app, Method::GET, "/api/categories", Some(&user), None).await;
    assert_eq!(
        reply.body["data"],
        json!([{ "type": "groceries", "color": "green" }])
    );
}

#[tokio::test]
async fn transactions_flow_for_a_user() {
    let app = app().await;
    register(&app, "/api/register", "alice").await;
    register(&app, "/api/register", "bob").await;
    register(&app, "/api/admin", "root").await;
    let alice = login(&app, "alice").await;
    let admin = login(&app, "root").await;

    send(
        &app,
        Method::POST,
        "/api/categories",
        Some(&admin),
        Some(json!({ "type": "food", "color": "red" })),
    )
    .await;

    for amount in [json!(5), json!("25.5")] {
        let reply = send(
            &app,
            Method::POST,
            "/api/users/alice/transactions",
            Some(&alice),
            Some(json!({ "username": "alice", "amount": amount, "type": "food" })),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        assert!(reply.body["data"]["_id"].is_string());
    }

    let reply = send(
        &app,
        Method::POST,
        "/api/users/alice/transactions",
        Some(&alice),
        Some(json!({ "username": "bob", "amount": 1, "type": "food" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(&app, Method::GET, "/api/users/bob/transactions", Some(&alice), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "Username mismatch");

    let reply = send(
        &app,
        Method::GET,
        "/api/users/alice/transactions?min=10",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    let rows = reply.body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["amount"], 25.5);
    assert_eq!(rows[0]["color"], "red");

    let reply = send(
        &app,
        Method::GET,
        "/api/users/alice/transactions?date=2023-01-01&from=2022-01-01",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(&app, Method::GET, "/api/transactions", Some(&admin), None).await;
    let ids: Vec<String> = reply.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), 2);

    let reply = send(
        &app,
        Method::DELETE,
        "/api/users/alice/transactions",
        Some(&alice),
        Some(json!({ "_id": ids[0] })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["message"], "Transaction deleted");

    let reply = send(
        &app,
        Method::DELETE,
        "/api/transactions",
        Some(&admin),
        Some(json!({ "_ids": [ids[0], ids[1]] })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(
        &app,
        Method::DELETE,
        "/api/transactions",
        Some(&admin),
        Some(json!({ "_ids": [ids[1]] })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn groups_are_visible_to_members_only() {
    let app = app().await;
    for name in ["alice", "bob", "carol"] {
        register(&app, "/api/register", name).await;
    }
    register(&app, "/api/admin", "root").await;
    let alice = login(&app, "alice").await;
    let carol = login(&app, "carol").await;
    let admin = login(&app, "root").await;

    let reply = send(
        &app,
        Method::POST,
        "/api/groups",
        Some(&alice),
        Some(json!({ "name": "family", "memberEmails": ["bob@example.com", "ghost@example.com"] })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(
        reply.body["data"]["group"]["members"],
        json!([{ "email": "bob@example.com" }, { "email": "alice@example.com" }])
    );
    assert_eq!(
        reply.body["data"]["membersNotFound"],
        json!([{ "email": "ghost@example.com" }])
    );

    let reply = send(&app, Method::GET, "/api/groups/family", Some(&carol), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "Not a member of the group");

    let reply = send(&app, Method::GET, "/api/groups/family", Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = send(
        &app,
        Method::PATCH,
        "/api/groups/family/add",
        Some(&alice),
        Some(json!({ "emails": ["carol@example.com"] })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["group"]["members"].as_array().unwrap().len(), 3);

    let reply = send(
        &app,
        Method::PATCH,
        "/api/groups/family/pull",
        Some(&admin),
        Some(json!({ "emails": ["bob@example.com", "alice@example.com", "carol@example.com"] })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.body["data"]["group"]["members"],
        json!([{ "email": "bob@example.com" }])
    );

    let reply = send(
        &app,
        Method::DELETE,
        "/api/groups",
        Some(&admin),
        Some(json!({ "name": "family" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = send(&app, Method::GET, "/api/groups", Some(&admin), None).await;
    assert_eq!(reply.body["data"], json!([]));
}

#[tokio::test]
async fn insert_is_admin_only_and_remove_is_members_only() {
    let app = app().await;
    for name in ["alice", "bob", "carol", "dave"] {
        register(&app, "/api/register", name).await;
    }
    register(&app, "/api/admin", "root").await;
    let alice = login(&app, "alice").await;
    let dave = login(&app, "dave").await;
    let admin = login(&app, "root").await;

    let reply = send(
        &app,
        Method::POST,
        "/api/groups",
        Some(&alice),
        Some(json!({ "name": "family", "memberEmails": ["bob@example.com"] })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let change = json!({ "emails": ["carol@example.com", "bob@example.com"] });
    let reply = send(
        &app,
        Method::PATCH,
        "/api/groups/family/insert",
        Some(&alice),
        Some(change.clone()),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "Not an admin");

    let reply = send(
        &app,
        Method::PATCH,
        "/api/groups/family/insert",
        Some(&admin),
        Some(change),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(
        reply.body["data"]["group"]["members"],
        json!([
            { "email": "bob@example.com" },
            { "email": "alice@example.com" },
            { "email": "carol@example.com" }
        ])
    );
    assert_eq!(
        reply.body["data"]["alreadyInGroup"],
        json!([{ "email": "bob@example.com" }])
    );

    let change = json!({ "emails": ["bob@example.com"] });
    let reply = send(
        &app,
        Method::PATCH,
        "/api/groups/family/remove",
        Some(&dave),
        Some(change.clone()),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "Not a member of the group");

    let reply = send(
        &app,
        Method::PATCH,
        "/api/groups/family/remove",
        Some(&alice),
        Some(change),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(
        reply.body["data"]["group"]["members"],
        json!([{ "email": "alice@example.com" }, { "email": "carol@example.com" }])
    );
}

#[tokio::test]
async fn inverted_date_range_lists_nothing() {
    let app = app().await;
    register(&app, "/api/register", "alice").await;
    register(&app, "/api/admin", "root").await;
    let alice = login(&app, "alice").await;
    let admin = login(&app, "root").await;

    send(
        &app,
        Method::POST,
        "/api/categories",
        Some(&admin),
        Some(json!({ "type": "food", "color": "red" })),
    )
    .await;
    let reply = send(
        &app,
        Method::POST,
        "/api/users/alice/transactions",
        Some(&alice),
        Some(json!({ "username": "alice", "amount": 3, "type": "food" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let today = Utc::now().date_naive();
    let uri = format!(
        "/api/users/alice/transactions?from={}&upTo={}",
        today,
        today - Duration::days(1)
    );
    let reply = send(&app, Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["data"], json!([]));

    let uri = format!("/api/users/alice/transactions?from={today}&upTo={today}");
    let reply = send(&app, Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(reply.body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn admin_deletes_a_user() {
    let app = app().await;
    register(&app, "/api/register", "alice").await;
    register(&app, "/api/admin", "root").await;
    let admin = login(&app, "root").await;

    let reply = send(
        &app,
        Method::DELETE,
        "/api/users",
        Some(&admin),
        Some(json!({ "email": "root@example.com" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(
        &app,
        Method::DELETE,
        "/api/users",
        Some(&admin),
        Some(json!({ "email": "alice@example.com" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.body["data"],
        json!({ "deletedTransactions": 0, "deletedFromGroup": false })
    );

    let reply = send(&app, Method::GET, "/api/users", Some(&admin), None).await;
    assert_eq!(reply.body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn logout_forgets_the_refresh_token() {
    let app = app().await;
    register(&app, "/api/register", "alice").await;
    let cookies = login(&app, "alice").await;

    let reply = send(&app, Method::GET, "/api/logout", Some(&cookies), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["message"], "User logged out");
    assert_eq!(reply.set_cookies.len(), 2);

    let reply = send(&app, Method::GET, "/api/logout", Some(&cookies), None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(&app, Method::GET, "/api/logout", None, None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = app().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn spawned_server_answers_over_tcp() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db)
        .password_cost(4)
        .build()
        .await
        .unwrap();
    let tokens = TokenKeys::new(SECRET, Duration::hours(1), Duration::days(7));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = server::spawn_with_listener(engine, tokens, listener).unwrap();

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /api/categories HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 401"), "{response}");
    assert!(response.contains("Unauthorized"));
}
