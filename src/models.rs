use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A stored paste. Rows are never updated; a revision is a new row whose
/// `parent_id` points at the paste it was derived from.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Paste {
    pub id: i64,
    pub code: String,
    pub language: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub user_hash: String,
    pub private: bool,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Attachment {
    pub id: i64,
    pub paste_id: i64,
    pub file_name: String,
    #[serde(skip_serializing)]
    pub stored_name: String,
    pub created_at: DateTime<Utc>,
}

/// Column list shared by every query returning a [`Paste`].
pub const PASTE_COLUMNS: &str =
    "id, code, language, password_hash, user_hash, private, parent_id, created_at";

pub const ATTACHMENT_COLUMNS: &str = "id, paste_id, file_name, stored_name, created_at";
