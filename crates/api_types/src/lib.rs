use serde::{Deserialize, Serialize};

/// Success body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    /// Present only when the access token was refreshed while serving the
    /// request.
    #[serde(
        rename = "refreshedTokenMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub refreshed_token_message: Option<String>,
}

/// Failure body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[default]
    Regular,
    Admin,
}

pub mod auth {
    use super::*;

    /// Body of `/register` and `/admin`.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct Register {
        pub username: Option<String>,
        pub email: Option<String>,
        pub password: Option<String>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct Login {
        pub email: Option<String>,
        pub password: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Tokens {
        pub access_token: String,
        pub refresh_token: String,
    }
}

pub mod category {
    use super::*;

    /// Body of category create and update.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct CategoryNew {
        #[serde(rename = "type")]
        pub category_type: Option<String>,
        pub color: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CategoryView {
        #[serde(rename = "type")]
        pub category_type: String,
        pub color: String,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct CategoryDelete {
        pub types: Option<Vec<String>>,
    }

    /// Outcome of a rename or a delete: `count` is the number of
    /// transactions moved to another category type.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategoryChanged {
        pub message: String,
        pub count: u64,
    }
}

pub mod transaction {
    use super::*;
    use chrono::{DateTime, Utc};

    /// Amounts are accepted both as JSON numbers and numeric strings.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum AmountInput {
        Number(f64),
        Text(String),
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct TransactionNew {
        pub username: Option<String>,
        pub amount: Option<AmountInput>,
        #[serde(rename = "type")]
        pub category_type: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TransactionCreated {
        #[serde(rename = "_id")]
        pub id: String,
        pub username: String,
        pub amount: f64,
        #[serde(rename = "type")]
        pub category_type: String,
        pub date: DateTime<Utc>,
    }

    /// A transaction joined with the color of its category.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct TransactionView {
        #[serde(rename = "_id")]
        pub id: String,
        pub username: String,
        pub amount: f64,
        #[serde(rename = "type")]
        pub category_type: String,
        pub date: DateTime<Utc>,
        pub color: String,
    }

    /// Query string filters. Dates are `YYYY-MM-DD`; `date` excludes
    /// `from` and `upTo`.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct TransactionQuery {
        pub date: Option<String>,
        pub from: Option<String>,
        #[serde(rename = "upTo")]
        pub up_to: Option<String>,
        pub min: Option<String>,
        pub max: Option<String>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct TransactionDelete {
        #[serde(rename = "_id")]
        pub id: Option<String>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct TransactionsDelete {
        #[serde(rename = "_ids")]
        pub ids: Option<Vec<String>>,
    }
}

pub mod user {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct UserView {
        pub username: String,
        pub email: String,
        pub role: Role,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct UserDelete {
        pub email: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct UserDeleted {
        pub deleted_transactions: u64,
        pub deleted_from_group: bool,
    }
}

pub mod group {
    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GroupNew {
        pub name: Option<String>,
        pub member_emails: Option<Vec<String>>,
    }

    /// Body of the add/insert and remove/pull member endpoints.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct MembersChange {
        pub emails: Option<Vec<String>>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct GroupDelete {
        pub name: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MemberView {
        pub email: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct GroupView {
        pub name: String,
        pub members: Vec<MemberView>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct GroupResponse {
        pub group: GroupView,
    }

    /// Result of a group creation or of adding members.
    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MembersAdded {
        pub group: GroupView,
        pub already_in_group: Vec<MemberView>,
        pub members_not_found: Vec<MemberView>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MembersRemoved {
        pub group: GroupView,
        pub not_in_group: Vec<MemberView>,
        pub members_not_found: Vec<MemberView>,
    }
}
