use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::put;
use axum::{Json, Router};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::models::{AuthorRef, Comment, COMMENT_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::posts::find_post_by_slug;
use crate::routes::{Page, PageQuery};
use crate::state::AppState;
use crate::validation;

const COMMENT_MAX: usize = 10_000;

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_id, c.content, c.created_at, \
     c.updated_at, u.username AS author_username, u.avatar AS author_avatar, \
     u.user_group_id AS author_group_id \
     FROM comments c JOIN users u ON u.id = c.author_id";

#[derive(Debug, Serialize)]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: AuthorRef,
}

impl CommentWithAuthor {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            comment: Comment::from_row(row)?,
            author: AuthorRef::from_row(row)?,
        })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentRequest {
    pub content: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/comments/{id}",
        put(update_comment).delete(delete_comment),
    )
}

fn validate_comment(content: &str) -> AppResult<String> {
    let content = validation::required("Comment", content)?;
    validation::length("Comment", &content, 1, COMMENT_MAX)?;
    Ok(content)
}

fn find_comment(conn: &Connection, id: i64) -> AppResult<Comment> {
    conn.query_row(
        &format!("SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.id = ?1"),
        params![id],
        Comment::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

fn load_comment(conn: &Connection, id: i64) -> AppResult<CommentWithAuthor> {
    conn.query_row(
        &format!("{COMMENT_SELECT} WHERE c.id = ?1"),
        params![id],
        CommentWithAuthor::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

/// GET /api/posts/{slug}/comments: oldest first so threads read top to bottom.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Page<CommentWithAuthor>>> {
    let conn = state.db.get()?;
    let post = find_post_by_slug(&conn, &slug)?;

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
        params![post.id],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT} WHERE c.post_id = ?1 ORDER BY c.created_at, c.id LIMIT ?2 OFFSET ?3"
    ))?;
    let comments = stmt
        .query_map(
            params![post.id, page.limit(), page.offset()],
            CommentWithAuthor::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Page::new(comments, &page, total)))
}

pub async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(slug): Path<String>,
    Json(req): Json<CommentRequest>,
) -> AppResult<(StatusCode, Json<CommentWithAuthor>)> {
    let content = validate_comment(&req.content)?;

    let conn = state.db.get()?;
    let post = find_post_by_slug(&conn, &slug)?;

    conn.execute(
        "INSERT INTO comments (post_id, author_id, content) VALUES (?1, ?2, ?3)",
        params![post.id, user.id, content],
    )?;
    let comment = load_comment(&conn, conn.last_insert_rowid())?;

    Ok((StatusCode::CREATED, Json(comment)))
}

async fn update_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Json<CommentWithAuthor>> {
    let content = validate_comment(&req.content)?;

    let conn = state.db.get()?;
    let comment = find_comment(&conn, id)?;
    if !user.can_manage(comment.author_id) {
        return Err(AppError::not_allowed());
    }

    conn.execute(
        "UPDATE comments SET content = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![content, id],
    )?;

    Ok(Json(load_comment(&conn, id)?))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    let comment = find_comment(&conn, id)?;
    if !user.can_manage(comment.author_id) {
        return Err(AppError::not_allowed());
    }

    conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
    Ok(StatusCode::NO_CONTENT)
}
