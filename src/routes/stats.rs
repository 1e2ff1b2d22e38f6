use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use serde::Serialize;

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestPost {
    pub title: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub author: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumStats {
    pub threads: i64,
    /// Threads plus comments.
    pub posts: i64,
    pub members: i64,
    pub newest_member: Option<String>,
    pub latest_post: Option<LatestPost>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/stats", get(stats))
}

async fn stats(State(state): State<AppState>) -> AppResult<Json<ForumStats>> {
    let conn = state.db.get()?;

    let (threads, comments, members): (i64, i64, i64) = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM posts), (SELECT COUNT(*) FROM comments), \
                (SELECT COUNT(*) FROM users)",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let newest_member: Option<String> = conn
        .query_row(
            "SELECT username FROM users ORDER BY created_at DESC, id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let latest_post = conn
        .query_row(
            "SELECT p.title, p.slug, p.created_at, u.username FROM posts p \
             JOIN users u ON u.id = p.author_id \
             ORDER BY p.created_at DESC, p.id DESC LIMIT 1",
            [],
            |row| {
                Ok(LatestPost {
                    title: row.get(0)?,
                    slug: row.get(1)?,
                    created_at: row.get(2)?,
                    author: row.get(3)?,
                })
            },
        )
        .optional()?;

    Ok(Json(ForumStats {
        threads,
        posts: threads + comments,
        members,
        newest_member,
        latest_post,
    }))
}
