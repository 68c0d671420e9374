//! Categories API endpoints.

use api_types::{
    Envelope,
    category::{CategoryChanged, CategoryDelete, CategoryNew, CategoryView},
};
use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};

use crate::{ServerError, auth::Session, server::ServerState, validation};

fn map_category(category: engine::Category) -> CategoryView {
    CategoryView {
        category_type: category.category_type,
        color: category.color,
    }
}

pub async fn create(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    payload: Result<Json<CategoryNew>, JsonRejection>,
) -> Result<Json<Envelope<CategoryView>>, ServerError> {
    session.require_admin()?;
    let payload = validation::body(payload)?;
    let category_type = validation::required(payload.category_type, "type")?;
    let color = validation::required(payload.color, "color")?;

    let category = state.engine.create_category(&category_type, &color).await?;
    Ok(session.reply(map_category(category)))
}

pub async fn update(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(current): Path<String>,
    payload: Result<Json<CategoryNew>, JsonRejection>,
) -> Result<Json<Envelope<CategoryChanged>>, ServerError> {
    session.require_admin()?;
    let payload = validation::body(payload)?;
    let category_type = validation::required(payload.category_type, "type")?;
    let color = validation::required(payload.color, "color")?;

    let count = state
        .engine
        .update_category(&current, &category_type, &color)
        .await?;
    Ok(session.reply(CategoryChanged {
        message: "Category edited successfully".to_string(),
        count,
    }))
}

pub async fn delete(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    payload: Result<Json<CategoryDelete>, JsonRejection>,
) -> Result<Json<Envelope<CategoryChanged>>, ServerError> {
    session.require_admin()?;
    let payload = validation::body(payload)?;
    let types = payload
        .types
        .ok_or_else(|| ServerError::Generic("missing attribute: types".to_string()))?;

    let count = state.engine.delete_categories(&types).await?;
    Ok(session.reply(CategoryChanged {
        message: "Categories deleted".to_string(),
        count,
    }))
}

pub async fn list(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Result<Json<Envelope<Vec<CategoryView>>>, ServerError> {
    let categories = state
        .engine
        .list_categories()
        .await?
        .into_iter()
        .map(map_category)
        .collect();
    Ok(session.reply(categories))
}
