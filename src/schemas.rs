use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserEmail = String;

pub fn new_id() -> String {
    ObjectId::new().to_hex()
}

pub fn normalize_email(email: &str) -> UserEmail {
    email.trim().to_lowercase()
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub created_by: UserEmail,
    pub members: Vec<UserEmail>,
}

impl Group {
    pub fn has_member(&self, email: &str) -> bool {
        self.members.iter().any(|member| member == email)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(rename = "_id")]
    pub id: String,
    pub group_id: String,
    pub amount: f64,
    pub description: String,
    pub paid_by: UserEmail,
    pub split_between: Vec<UserEmail>,
    pub date: DateTime<Utc>,
    pub settled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub group_id: String,
    pub title: String,
    pub assigned_to: UserEmail,
    pub completed: bool,
    pub due_date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    #[serde(rename = "_id")]
    pub id: String,
    pub group_id: String,
    pub title: String,
    pub due_date: DateTime<Utc>,
    pub created_by: UserEmail,
    pub created_at: DateTime<Utc>,
    pub completed: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: UserEmail,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    pub recipient_email: UserEmail,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    #[serde(flatten)]
    pub kind: NotificationKind,
}

impl Notification {
    pub fn unread(recipient_email: impl Into<UserEmail>, kind: NotificationKind) -> Self {
        Self {
            id: new_id(),
            recipient_email: recipient_email.into(),
            created_at: Utc::now(),
            read: false,
            kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    #[serde(rename_all = "camelCase")]
    TaskAssigned {
        group_id: String,
        group_name: String,
        created_by: UserEmail,
        created_by_username: String,
        title: String,
        due_date: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    GroupExpense {
        group_id: String,
        group_name: String,
        created_by: UserEmail,
        created_by_username: String,
        amount: f64,
        description: String,
    },
    #[serde(rename_all = "camelCase")]
    GroupReminder {
        group_id: String,
        group_name: String,
        created_by: UserEmail,
        created_by_username: String,
        title: String,
        due_date: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    GroupAddition {
        group_id: String,
        group_name: String,
        added_by: UserEmail,
        added_by_username: String,
    },
    #[serde(rename_all = "camelCase")]
    GroupDeletion {
        group_name: String,
        deleted_by: UserEmail,
        deleted_by_username: String,
    },
}
