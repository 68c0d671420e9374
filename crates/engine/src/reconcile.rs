//! Group membership reconciliation.
//!
//! Classifies a requested list of emails against the known users and the
//! current memberships. The functions are pure: callers load the sets and
//! apply the resulting plan inside a store transaction.

use std::collections::HashSet;

/// Outcome of classifying emails for an add (or create) request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdditionPlan {
    pub added: Vec<String>,
    pub already_in_group: Vec<String>,
    pub members_not_found: Vec<String>,
}

/// Outcome of classifying emails for a remove request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemovalPlan {
    pub removed: Vec<String>,
    pub not_in_group: Vec<String>,
    pub members_not_found: Vec<String>,
}

/// Drops repeated values, keeping the first occurrence.
pub fn dedup_preserving_order<'a, I>(requested: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    requested
        .into_iter()
        .filter(|value| seen.insert(*value))
        .map(ToString::to_string)
        .collect()
}

/// Splits `requested` into unknown users, users already in any group
/// (`grouped`) and users that can be added.
pub fn plan_additions<'a, I>(
    requested: I,
    known_users: &HashSet<String>,
    grouped: &HashSet<String>,
) -> AdditionPlan
where
    I: IntoIterator<Item = &'a str>,
{
    let mut plan = AdditionPlan::default();
    for email in dedup_preserving_order(requested) {
        if !known_users.contains(&email) {
            plan.members_not_found.push(email);
        } else if grouped.contains(&email) {
            plan.already_in_group.push(email);
        } else {
            plan.added.push(email);
        }
    }
    plan
}

/// Splits `requested` into unknown users, users outside the group and
/// members to remove.
///
/// `members` is the group in join order. A group is never emptied: when
/// every member is requested, the first one stays.
pub fn plan_removals<'a, I>(
    requested: I,
    known_users: &HashSet<String>,
    members: &[String],
) -> RemovalPlan
where
    I: IntoIterator<Item = &'a str>,
{
    let mut plan = RemovalPlan::default();
    for email in dedup_preserving_order(requested) {
        if !known_users.contains(&email) {
            plan.members_not_found.push(email);
        } else if !members.contains(&email) {
            plan.not_in_group.push(email);
        } else {
            plan.removed.push(email);
        }
    }

    if !members.is_empty() && plan.removed.len() == members.len() {
        let first = &members[0];
        plan.removed.retain(|email| email != first);
    }
    plan
}
