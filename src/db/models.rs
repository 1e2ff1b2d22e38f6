use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub const USER_COLUMNS: &str = "id, email, username, password_hash, avatar, user_group_id, \
     is_banned, last_login_at, created_at, updated_at";

pub const GROUP_COLUMNS: &str =
    "id, name, color, display_order, is_default, is_moderator, is_admin";

pub const CATEGORY_COLUMNS: &str = "id, name, slug, description, display_order, created_at";

pub const POST_COLUMNS: &str = "p.id, p.category_id, p.author_id, p.title, p.content, p.slug, \
     p.views, p.is_pinned, p.created_at, p.updated_at";

pub const COMMENT_COLUMNS: &str =
    "c.id, c.post_id, c.author_id, c.content, c.created_at, c.updated_at";

pub const REPUTATION_COLUMNS: &str =
    "r.id, r.from_user_id, r.to_user_id, r.kind, r.comment, r.created_at";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub avatar: Option<String>,
    pub user_group_id: i64,
    pub is_banned: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            username: row.get("username")?,
            password_hash: row.get("password_hash")?,
            avatar: row.get("avatar")?,
            user_group_id: row.get("user_group_id")?,
            is_banned: row.get("is_banned")?,
            last_login_at: row.get("last_login_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroup {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub display_order: i64,
    pub is_default: bool,
    pub is_moderator: bool,
    pub is_admin: bool,
}

impl UserGroup {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            color: row.get("color")?,
            display_order: row.get("display_order")?,
            is_default: row.get("is_default")?,
            is_moderator: row.get("is_moderator")?,
            is_admin: row.get("is_admin")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            slug: row.get("slug")?,
            description: row.get("description")?,
            display_order: row.get("display_order")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub category_id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub views: i64,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            category_id: row.get("category_id")?,
            author_id: row.get("author_id")?,
            title: row.get("title")?,
            content: row.get("content")?,
            slug: row.get("slug")?,
            views: row.get("views")?,
            is_pinned: row.get("is_pinned")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            post_id: row.get("post_id")?,
            author_id: row.get("author_id")?,
            content: row.get("content")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReputationKind {
    Positive,
    Neutral,
    Negative,
}

impl ReputationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReputationKind::Positive => "positive",
            ReputationKind::Neutral => "neutral",
            ReputationKind::Negative => "negative",
        }
    }
}

impl fmt::Display for ReputationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReputationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(ReputationKind::Positive),
            "neutral" => Ok(ReputationKind::Neutral),
            "negative" => Ok(ReputationKind::Negative),
            other => Err(format!("unknown reputation kind: {other}")),
        }
    }
}

impl ToSql for ReputationKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ReputationKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reputation {
    pub id: i64,
    pub from_user_id: i64,
    pub to_user_id: i64,
    #[serde(rename = "type")]
    pub kind: ReputationKind,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Reputation {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            from_user_id: row.get("from_user_id")?,
            to_user_id: row.get("to_user_id")?,
            kind: row.get("kind")?,
            comment: row.get("comment")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    pub site_name: String,
    pub allow_registration: bool,
    pub maintenance_mode: bool,
    pub maintenance_message: Option<String>,
}

impl SiteSettings {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            site_name: row.get("site_name")?,
            allow_registration: row.get("allow_registration")?,
            maintenance_mode: row.get("maintenance_mode")?,
            maintenance_message: row.get("maintenance_message")?,
        })
    }
}

/// Public face of a user attached to posts, comments and reputation entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRef {
    pub id: i64,
    pub username: String,
    pub avatar: Option<String>,
    pub user_group_id: i64,
}

impl AuthorRef {
    /// Reads `author_id`, `author_username`, `author_avatar`, `author_group_id` aliases.
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("author_id")?,
            username: row.get("author_username")?,
            avatar: row.get("author_avatar")?,
            user_group_id: row.get("author_group_id")?,
        })
    }
}
