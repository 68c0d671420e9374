//! Group endpoints.
//!
//! Member routes (`add`, `remove`) are for members of the group, their
//! admin counterparts (`insert`, `pull`) for admins. Both share the same
//! reconciliation in the engine.

use api_types::{
    Envelope, Message,
    group::{
        GroupDelete, GroupNew, GroupResponse, GroupView, MemberView, MembersAdded, MembersChange,
        MembersRemoved,
    },
};
use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};
use engine::{Group, GroupAddition, GroupRemoval};

use crate::{ServerError, auth::Session, server::ServerState, validation};

fn members(emails: Vec<String>) -> Vec<MemberView> {
    emails.into_iter().map(|email| MemberView { email }).collect()
}

fn map_group(group: Group) -> GroupView {
    GroupView {
        name: group.name,
        members: members(group.members),
    }
}

fn map_addition(addition: GroupAddition) -> MembersAdded {
    MembersAdded {
        group: map_group(addition.group),
        already_in_group: members(addition.already_in_group),
        members_not_found: members(addition.members_not_found),
    }
}

fn map_removal(removal: GroupRemoval) -> MembersRemoved {
    MembersRemoved {
        group: map_group(removal.group),
        not_in_group: members(removal.not_in_group),
        members_not_found: members(removal.members_not_found),
    }
}

/// Creates a group with the caller as a member.
pub async fn create(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    payload: Result<Json<GroupNew>, JsonRejection>,
) -> Result<Json<Envelope<MembersAdded>>, ServerError> {
    let payload = validation::body(payload)?;
    let name = validation::required(payload.name, "name")?;
    let emails = validation::emails(payload.member_emails, "memberEmails")?;

    let addition = state
        .engine
        .create_group(&name, &session.claims.email, &emails)
        .await?;
    Ok(session.reply(map_addition(addition)))
}

pub async fn list(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Result<Json<Envelope<Vec<GroupView>>>, ServerError> {
    session.require_admin()?;
    let groups = state
        .engine
        .list_groups()
        .await?
        .into_iter()
        .map(map_group)
        .collect();
    Ok(session.reply(groups))
}

pub async fn get(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(name): Path<String>,
) -> Result<Json<Envelope<GroupResponse>>, ServerError> {
    let group = state.engine.group(&name).await?;
    session.require_group_or_admin(&group.members)?;
    Ok(session.reply(GroupResponse {
        group: map_group(group),
    }))
}

async fn add_members(
    state: &ServerState,
    name: &str,
    payload: Result<Json<MembersChange>, JsonRejection>,
) -> Result<MembersAdded, ServerError> {
    let payload = validation::body(payload)?;
    let emails = validation::emails(payload.emails, "emails")?;
    let addition = state.engine.add_members(name, &emails).await?;
    Ok(map_addition(addition))
}

async fn remove_members(
    state: &ServerState,
    name: &str,
    payload: Result<Json<MembersChange>, JsonRejection>,
) -> Result<MembersRemoved, ServerError> {
    let payload = validation::body(payload)?;
    let emails = validation::emails(payload.emails, "emails")?;
    let removal = state.engine.remove_members(name, &emails).await?;
    Ok(map_removal(removal))
}

pub async fn add(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(name): Path<String>,
    payload: Result<Json<MembersChange>, JsonRejection>,
) -> Result<Json<Envelope<MembersAdded>>, ServerError> {
    let group = state.engine.group(&name).await?;
    session.require_group(&group.members)?;
    let added = add_members(&state, &name, payload).await?;
    Ok(session.reply(added))
}

pub async fn insert(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(name): Path<String>,
    payload: Result<Json<MembersChange>, JsonRejection>,
) -> Result<Json<Envelope<MembersAdded>>, ServerError> {
    session.require_admin()?;
    let added = add_members(&state, &name, payload).await?;
    Ok(session.reply(added))
}

pub async fn remove(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(name): Path<String>,
    payload: Result<Json<MembersChange>, JsonRejection>,
) -> Result<Json<Envelope<MembersRemoved>>, ServerError> {
    let group = state.engine.group(&name).await?;
    session.require_group(&group.members)?;
    let removed = remove_members(&state, &name, payload).await?;
    Ok(session.reply(removed))
}

pub async fn pull(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    Path(name): Path<String>,
    payload: Result<Json<MembersChange>, JsonRejection>,
) -> Result<Json<Envelope<MembersRemoved>>, ServerError> {
    session.require_admin()?;
    let removed = remove_members(&state, &name, payload).await?;
    Ok(session.reply(removed))
}

pub async fn delete(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
    payload: Result<Json<GroupDelete>, JsonRejection>,
) -> Result<Json<Envelope<Message>>, ServerError> {
    session.require_admin()?;
    let payload = validation::body(payload)?;
    let name = validation::required(payload.name, "name")?;

    state.engine.delete_group(&name).await?;
    Ok(session.reply(Message::new("Group deleted successfully")))
}
