use std::collections::{HashMap, HashSet};

use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, prelude::*};

use crate::{
    EngineError, Group, ResultEngine, group_members, groups,
    reconcile::{self, plan_additions, plan_removals},
    users,
};

use super::{Engine, normalize_required, with_tx};

/// Result of creating a group or adding members to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupAddition {
    pub group: Group,
    pub already_in_group: Vec<String>,
    pub members_not_found: Vec<String>,
}

/// Result of removing members from a group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupRemoval {
    pub group: Group,
    pub not_in_group: Vec<String>,
    pub members_not_found: Vec<String>,
}

fn group_from_rows(name: String, mut members: Vec<group_members::Model>) -> Group {
    members.sort_by_key(|m| m.id);
    Group {
        name,
        members: members.into_iter().map(|m| m.email).collect(),
    }
}

impl Engine {
    pub(super) async fn require_group(
        &self,
        db: &DatabaseTransaction,
        name: &str,
    ) -> ResultEngine<groups::Model> {
        groups::Entity::find_by_id(name.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("group".to_string()))
    }

    async fn load_group(&self, db: &DatabaseTransaction, name: &str) -> ResultEngine<Group> {
        let group = self.require_group(db, name).await?;
        let members = group_members::Entity::find()
            .filter(group_members::Column::GroupName.eq(group.name.as_str()))
            .order_by_asc(group_members::Column::Id)
            .all(db)
            .await?;
        Ok(group_from_rows(group.name, members))
    }

    /// Registered users owning any of `emails`, keyed by email.
    async fn users_by_email(
        &self,
        db: &DatabaseTransaction,
        emails: &[String],
    ) -> ResultEngine<HashMap<String, users::Model>> {
        Ok(users::Entity::find()
            .filter(users::Column::Email.is_in(emails.to_vec()))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.email.clone(), u))
            .collect())
    }

    /// Emails among `emails` that already belong to some group.
    async fn grouped_emails(
        &self,
        db: &DatabaseTransaction,
        emails: &[String],
    ) -> ResultEngine<HashSet<String>> {
        Ok(group_members::Entity::find()
            .filter(group_members::Column::Email.is_in(emails.to_vec()))
            .all(db)
            .await?
            .into_iter()
            .map(|m| m.email)
            .collect())
    }

    async fn insert_members(
        &self,
        db: &DatabaseTransaction,
        group_name: &str,
        emails: &[String],
        known: &HashMap<String, users::Model>,
    ) -> ResultEngine<()> {
        for email in emails {
            let user = known
                .get(email)
                .ok_or_else(|| EngineError::NotFound("user".to_string()))?;
            group_members::ActiveModel {
                id: ActiveValue::NotSet,
                group_name: ActiveValue::Set(group_name.to_string()),
                email: ActiveValue::Set(email.clone()),
                user_id: ActiveValue::Set(user.id.clone()),
            }
            .insert(db)
            .await?;
        }
        Ok(())
    }

    /// Creates a group on behalf of `creator_email`, who always joins it.
    ///
    /// At least one requested email other than the creator's must be
    /// addable, otherwise nothing is created.
    pub async fn create_group(
        &self,
        name: &str,
        creator_email: &str,
        member_emails: &[String],
    ) -> ResultEngine<GroupAddition> {
        let name = normalize_required(name, "name")?;

        with_tx!(self, |db_tx| {
            if groups::Entity::find_by_id(name.clone())
                .one(&db_tx)
                .await?
                .is_some()
            {
                return Err(EngineError::AlreadyExists("group".to_string()));
            }

            let mut requested =
                reconcile::dedup_preserving_order(member_emails.iter().map(String::as_str));
            if !requested.iter().any(|e| e == creator_email) {
                requested.push(creator_email.to_string());
            }

            let known = self.users_by_email(&db_tx, &requested).await?;
            if !known.contains_key(creator_email) {
                return Err(EngineError::NotFound("user".to_string()));
            }
            let grouped = self.grouped_emails(&db_tx, &requested).await?;
            if grouped.contains(creator_email) {
                return Err(EngineError::Forbidden(
                    "user is already in a group".to_string(),
                ));
            }

            let known_emails: HashSet<String> = known.keys().cloned().collect();
            let plan = plan_additions(requested.iter().map(String::as_str), &known_emails, &grouped);
            if !plan.added.iter().any(|e| e != creator_email) {
                return Err(EngineError::InvalidInput(
                    "all the member emails are either already in a group or do not exist"
                        .to_string(),
                ));
            }

            groups::ActiveModel {
                name: ActiveValue::Set(name.clone()),
            }
            .insert(&db_tx)
            .await?;
            self.insert_members(&db_tx, &name, &plan.added, &known)
                .await?;

            tracing::info!(group = %name, members = plan.added.len(), "group created");
            Ok(GroupAddition {
                group: self.load_group(&db_tx, &name).await?,
                already_in_group: plan.already_in_group,
                members_not_found: plan.members_not_found,
            })
        })
    }

    pub async fn list_groups(&self) -> ResultEngine<Vec<Group>> {
        Ok(groups::Entity::find()
            .order_by_asc(groups::Column::Name)
            .find_with_related(group_members::Entity)
            .all(&self.database)
            .await?
            .into_iter()
            .map(|(group, members)| group_from_rows(group.name, members))
            .collect())
    }

    pub async fn group(&self, name: &str) -> ResultEngine<Group> {
        with_tx!(self, |db_tx| { self.load_group(&db_tx, name).await })
    }

    /// Adds the addable emails to `name`, reporting the others.
    pub async fn add_members(&self, name: &str, emails: &[String]) -> ResultEngine<GroupAddition> {
        with_tx!(self, |db_tx| {
            self.require_group(&db_tx, name).await?;

            let requested = reconcile::dedup_preserving_order(emails.iter().map(String::as_str));
            let known = self.users_by_email(&db_tx, &requested).await?;
            let grouped = self.grouped_emails(&db_tx, &requested).await?;
            let known_emails: HashSet<String> = known.keys().cloned().collect();

            let plan = plan_additions(requested.iter().map(String::as_str), &known_emails, &grouped);
            if plan.added.is_empty() {
                return Err(EngineError::InvalidInput(
                    "all the emails are either already in a group or do not exist".to_string(),
                ));
            }
            self.insert_members(&db_tx, name, &plan.added, &known)
                .await?;

            tracing::info!(group = %name, added = plan.added.len(), "group members added");
            Ok(GroupAddition {
                group: self.load_group(&db_tx, name).await?,
                already_in_group: plan.already_in_group,
                members_not_found: plan.members_not_found,
            })
        })
    }

    /// Removes the members among `emails` from `name`, reporting the
    /// others. The group keeps at least one member.
    pub async fn remove_members(&self, name: &str, emails: &[String]) -> ResultEngine<GroupRemoval> {
        with_tx!(self, |db_tx| {
            let current = self.load_group(&db_tx, name).await?;
            if current.members.len() <= 1 {
                return Err(EngineError::Forbidden(
                    "the group has only one member".to_string(),
                ));
            }

            let requested = reconcile::dedup_preserving_order(emails.iter().map(String::as_str));
            let known_emails: HashSet<String> = self
                .users_by_email(&db_tx, &requested)
                .await?
                .into_keys()
                .collect();

            let plan = plan_removals(
                requested.iter().map(String::as_str),
                &known_emails,
                &current.members,
            );
            if plan.removed.is_empty() {
                return Err(EngineError::InvalidInput(
                    "none of the emails belongs to a member of the group".to_string(),
                ));
            }

            group_members::Entity::delete_many()
                .filter(group_members::Column::GroupName.eq(name))
                .filter(group_members::Column::Email.is_in(plan.removed.clone()))
                .exec(&db_tx)
                .await?;

            tracing::info!(group = %name, removed = plan.removed.len(), "group members removed");
            Ok(GroupRemoval {
                group: self.load_group(&db_tx, name).await?,
                not_in_group: plan.not_in_group,
                members_not_found: plan.members_not_found,
            })
        })
    }

    pub async fn delete_group(&self, name: &str) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let group = self.require_group(&db_tx, name).await?;
            group_members::Entity::delete_many()
                .filter(group_members::Column::GroupName.eq(group.name.as_str()))
                .exec(&db_tx)
                .await?;
            groups::Entity::delete_by_id(group.name.clone())
                .exec(&db_tx)
                .await?;

            tracing::info!(group = %group.name, "group deleted");
            Ok(())
        })
    }
}
