use sea_orm::Database;

use engine::{Engine, EngineError, Role, TransactionFilter};
use migration::MigratorTrait;

async fn engine_with_user() -> Engine {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db)
        .password_cost(4)
        .build()
        .await
        .unwrap();
    engine
        .register_user("alice", "alice@example.com", "pw", Role::Regular)
        .await
        .unwrap();
    engine
}

async fn types_of(engine: &Engine) -> Vec<String> {
    engine
        .list_categories()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.category_type)
        .collect()
}

async fn categories_of_transactions(engine: &Engine) -> Vec<String> {
    engine
        .list_user_transactions("alice", &TransactionFilter::default())
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.transaction.category_type)
        .collect()
}

#[tokio::test]
async fn categories_are_listed_in_creation_order() {
    let engine = engine_with_user().await;
    engine.create_category("rent", "blue").await.unwrap();
    engine.create_category("food", "red").await.unwrap();

    assert_eq!(types_of(&engine).await, vec!["rent", "food"]);
}

#[tokio::test]
async fn duplicate_category_is_rejected() {
    let engine = engine_with_user().await;
    engine.create_category("food", "red").await.unwrap();

    let err = engine.create_category("food", "green").await.unwrap_err();
    assert_eq!(err, EngineError::AlreadyExists("category".to_string()));
}

#[tokio::test]
async fn renaming_moves_transactions() {
    let engine = engine_with_user().await;
    engine.create_category("food", "red").await.unwrap();
    engine.create_transaction("alice", 3.0, "food").await.unwrap();
    engine.create_transaction("alice", 4.0, "food").await.unwrap();

    let moved = engine
        .update_category("food", "groceries", "green")
        .await
        .unwrap();
    assert_eq!(moved, 2);
    assert_eq!(types_of(&engine).await, vec!["groceries"]);
    assert_eq!(
        categories_of_transactions(&engine).await,
        vec!["groceries", "groceries"]
    );
}

#[tokio::test]
async fn recoloring_only_moves_nothing() {
    let engine = engine_with_user().await;
    engine.create_category("food", "red").await.unwrap();
    engine.create_transaction("alice", 3.0, "food").await.unwrap();

    let moved = engine.update_category("food", "food", "green").await.unwrap();
    assert_eq!(moved, 0);
    let categories = engine.list_categories().await.unwrap();
    assert_eq!(categories[0].color, "green");
}

#[tokio::test]
async fn renaming_onto_existing_type_is_rejected() {
    let engine = engine_with_user().await;
    engine.create_category("food", "red").await.unwrap();
    engine.create_category("rent", "blue").await.unwrap();

    let err = engine
        .update_category("food", "rent", "red")
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::AlreadyExists("category".to_string()));

    let err = engine
        .update_category("missing", "other", "red")
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound("category".to_string()));
}

#[tokio::test]
async fn deleting_moves_transactions_to_oldest_survivor() {
    let engine = engine_with_user().await;
    engine.create_category("rent", "blue").await.unwrap();
    engine.create_category("food", "red").await.unwrap();
    engine.create_category("fun", "pink").await.unwrap();
    engine.create_transaction("alice", 1.0, "food").await.unwrap();
    engine.create_transaction("alice", 2.0, "fun").await.unwrap();

    let moved = engine
        .delete_categories(&["food".to_string(), "fun".to_string()])
        .await
        .unwrap();
    assert_eq!(moved, 2);
    assert_eq!(types_of(&engine).await, vec!["rent"]);
    assert_eq!(
        categories_of_transactions(&engine).await,
        vec!["rent", "rent"]
    );
}

#[tokio::test]
async fn deleting_the_oldest_moves_to_the_next_one() {
    let engine = engine_with_user().await;
    engine.create_category("rent", "blue").await.unwrap();
    engine.create_category("food", "red").await.unwrap();
    engine.create_transaction("alice", 1.0, "rent").await.unwrap();

    let moved = engine
        .delete_categories(&["rent".to_string()])
        .await
        .unwrap();
    assert_eq!(moved, 1);
    assert_eq!(categories_of_transactions(&engine).await, vec!["food"]);
}

#[tokio::test]
async fn deleting_every_category_keeps_the_oldest() {
    let engine = engine_with_user().await;
    engine.create_category("rent", "blue").await.unwrap();
    engine.create_category("food", "red").await.unwrap();
    engine.create_transaction("alice", 1.0, "food").await.unwrap();

    let moved = engine
        .delete_categories(&["food".to_string(), "rent".to_string()])
        .await
        .unwrap();
    assert_eq!(moved, 1);
    assert_eq!(types_of(&engine).await, vec!["rent"]);
}

#[tokio::test]
async fn deleting_is_refused_for_single_category_and_unknown_types() {
    let engine = engine_with_user().await;
    engine.create_category("rent", "blue").await.unwrap();

    let err = engine
        .delete_categories(&["rent".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    engine.create_category("food", "red").await.unwrap();
    let err = engine
        .delete_categories(&["food".to_string(), "ghost".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound("category ghost".to_string()));
    assert_eq!(types_of(&engine).await, vec!["rent", "food"]);

    let err = engine.delete_categories(&[]).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    let err = engine
        .delete_categories(&[" ".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}
