use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::models::{AuthorRef, Post, POST_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::comments;
use crate::state::AppState;
use crate::validation;

pub const TITLE_MIN: usize = 3;
pub const TITLE_MAX: usize = 150;
pub const CONTENT_MAX: usize = 20_000;

/// Post as it appears in a category listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListItem {
    #[serde(flatten)]
    pub post: Post,
    pub author: AuthorRef,
    pub comment_count: i64,
}

pub const POST_LIST_SELECT: &str = "SELECT p.id, p.category_id, p.author_id, p.title, p.content, \
     p.slug, p.views, p.is_pinned, p.created_at, p.updated_at, \
     u.username AS author_username, u.avatar AS author_avatar, \
     u.user_group_id AS author_group_id, \
     (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count \
     FROM posts p JOIN users u ON u.id = p.author_id";

impl PostListItem {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            post: Post::from_row(row)?,
            author: AuthorRef::from_row(row)?,
            comment_count: row.get("comment_count")?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorStats {
    pub total_posts: i64,
    pub total_threads: i64,
    pub joined_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthor {
    #[serde(flatten)]
    pub author: AuthorRef,
    pub created_at: DateTime<Utc>,
    pub stats: AuthorStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub author: PostAuthor,
    pub category: CategoryRef,
    pub comment_count: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinRequest {
    pub pinned: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/posts/{slug}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/api/posts/{slug}/pin", put(pin_post))
        .route(
            "/api/posts/{slug}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
}

pub fn validate_title(title: &str) -> AppResult<String> {
    let title = validation::required("Title", title)?;
    validation::length("Title", &title, TITLE_MIN, TITLE_MAX)?;
    Ok(title)
}

pub fn validate_content(content: &str) -> AppResult<String> {
    let content = validation::required("Content", content)?;
    validation::length("Content", &content, 1, CONTENT_MAX)?;
    Ok(content)
}

pub fn find_post_by_slug(conn: &Connection, slug: &str) -> AppResult<Post> {
    conn.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.slug = ?1"),
        params![slug],
        Post::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

pub fn load_list_item(conn: &Connection, post_id: i64) -> AppResult<PostListItem> {
    conn.query_row(
        &format!("{POST_LIST_SELECT} WHERE p.id = ?1"),
        params![post_id],
        PostListItem::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

/// Threads and comments authored by a user.
pub fn author_counts(conn: &Connection, user_id: i64) -> rusqlite::Result<(i64, i64)> {
    conn.query_row(
        "SELECT (SELECT COUNT(*) FROM posts WHERE author_id = ?1), \
                (SELECT COUNT(*) FROM comments WHERE author_id = ?1)",
        params![user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

/// GET /api/posts/{slug}: counts a view and returns the thread with its author card.
async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<PostDetail>> {
    let conn = state.db.get()?;

    let updated = conn.execute(
        "UPDATE posts SET views = views + 1 WHERE slug = ?1",
        params![slug],
    )?;
    if updated == 0 {
        return Err(AppError::NotFound);
    }

    let item = conn.query_row(
        &format!(
            "SELECT {POST_COLUMNS}, \
             u.username AS author_username, u.avatar AS author_avatar, \
             u.user_group_id AS author_group_id, u.created_at AS author_created_at, \
             c.name AS category_name, c.slug AS category_slug, \
             (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count \
             FROM posts p \
             JOIN users u ON u.id = p.author_id \
             JOIN categories c ON c.id = p.category_id \
             WHERE p.slug = ?1"
        ),
        params![slug],
        |row| {
            Ok((
                Post::from_row(row)?,
                AuthorRef::from_row(row)?,
                row.get::<_, DateTime<Utc>>("author_created_at")?,
                row.get::<_, String>("category_name")?,
                row.get::<_, String>("category_slug")?,
                row.get::<_, i64>("comment_count")?,
            ))
        },
    )?;
    let (post, author, author_created_at, category_name, category_slug, comment_count) = item;

    let (threads, comments) = author_counts(&conn, post.author_id)?;

    Ok(Json(PostDetail {
        category: CategoryRef {
            id: post.category_id,
            name: category_name,
            slug: category_slug,
        },
        author: PostAuthor {
            author,
            created_at: author_created_at,
            stats: AuthorStats {
                total_posts: threads + comments,
                total_threads: threads,
                joined_date: author_created_at,
            },
        },
        comment_count,
        post,
    }))
}

/// PUT /api/posts/{slug}: the slug stays stable across title edits.
async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(slug): Path<String>,
    Json(req): Json<UpdatePostRequest>,
) -> AppResult<Json<PostListItem>> {
    let title = req.title.as_deref().map(validate_title).transpose()?;
    let content = req.content.as_deref().map(validate_content).transpose()?;

    let conn = state.db.get()?;
    let post = find_post_by_slug(&conn, &slug)?;
    if !user.can_manage(post.author_id) {
        return Err(AppError::not_allowed());
    }

    conn.execute(
        "UPDATE posts SET title = COALESCE(?1, title), content = COALESCE(?2, content), \
         updated_at = datetime('now') WHERE id = ?3",
        params![title, content, post.id],
    )?;

    Ok(Json(load_list_item(&conn, post.id)?))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(slug): Path<String>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    let post = find_post_by_slug(&conn, &slug)?;
    if !user.can_manage(post.author_id) {
        return Err(AppError::not_allowed());
    }

    conn.execute("DELETE FROM posts WHERE id = ?1", params![post.id])?;
    tracing::info!(post_id = post.id, by = user.id, "Deleted post {}", post.slug);
    Ok(StatusCode::NO_CONTENT)
}

async fn pin_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(slug): Path<String>,
    Json(req): Json<PinRequest>,
) -> AppResult<Json<PostListItem>> {
    user.require_moderator()?;

    let conn = state.db.get()?;
    let post = find_post_by_slug(&conn, &slug)?;
    conn.execute(
        "UPDATE posts SET is_pinned = ?1 WHERE id = ?2",
        params![req.pinned, post.id],
    )?;

    Ok(Json(load_list_item(&conn, post.id)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_trimmed_and_bounded() {
        assert_eq!(validate_title("  Hello there ").unwrap(), "Hello there");
        assert!(validate_title("Hi").is_err());
        assert!(validate_title(&"x".repeat(TITLE_MAX + 1)).is_err());
    }

    #[test]
    fn blank_content_is_rejected() {
        assert!(validate_content(" \n ").is_err());
        assert!(validate_content("ok").is_ok());
    }
}
