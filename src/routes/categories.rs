use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::models::{Category, CATEGORY_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::posts::{
    load_list_item, validate_content, validate_title, PostListItem, POST_LIST_SELECT,
};
use crate::routes::{Page, PageQuery};
use crate::slug;
use crate::state::AppState;
use crate::validation;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub post_count: i64,
}

#[derive(Debug, Serialize)]
pub struct CategoryPosts {
    pub category: Category,
    pub posts: Page<PostListItem>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CategoryRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub display_order: Option<i64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route(
            "/api/categories/{id}",
            put(update_category).delete(delete_category),
        )
        .route(
            "/api/categories/{id}/posts",
            get(category_posts).post(create_post),
        )
}

fn find_category(conn: &Connection, id: i64) -> AppResult<Category> {
    conn.query_row(
        &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
        params![id],
        Category::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

fn normalize_slug(raw: &str) -> AppResult<String> {
    let slug = slug::slugify(raw);
    if slug.is_empty() {
        return Err(AppError::BadRequest(
            "Slug must contain letters or numbers".into(),
        ));
    }
    Ok(slug)
}

async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<CategoryWithCount>>> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {CATEGORY_COLUMNS}, \
         (SELECT COUNT(*) FROM posts p WHERE p.category_id = categories.id) AS post_count \
         FROM categories ORDER BY display_order, id"
    ))?;
    let categories = stmt
        .query_map([], |row| {
            Ok(CategoryWithCount {
                category: Category::from_row(row)?,
                post_count: row.get("post_count")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(categories))
}

/// GET /api/categories/{id}/posts: pinned threads first, then newest.
async fn category_posts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<CategoryPosts>> {
    let conn = state.db.get()?;
    let category = find_category(&conn, id)?;

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM posts WHERE category_id = ?1",
        params![id],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "{POST_LIST_SELECT} WHERE p.category_id = ?1 \
         ORDER BY p.is_pinned DESC, p.created_at DESC, p.id DESC \
         LIMIT ?2 OFFSET ?3"
    ))?;
    let posts = stmt
        .query_map(
            params![id, page.limit(), page.offset()],
            PostListItem::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(CategoryPosts {
        category,
        posts: Page::new(posts, &page, total),
    }))
}

/// POST /api/categories/{id}/posts: opens a new thread authored by the caller.
async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<PostListItem>)> {
    let title = validate_title(&req.title)?;
    let content = validate_content(&req.content)?;

    let conn = state.db.get()?;
    find_category(&conn, id)?;

    let slug = slug::post_slug(&title, Utc::now().timestamp_millis());
    conn.execute(
        "INSERT INTO posts (category_id, author_id, title, content, slug) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user.id, title, content, slug],
    )?;
    let post = load_list_item(&conn, conn.last_insert_rowid())?;

    tracing::info!(post_id = post.post.id, author = user.id, "Created post {}", post.post.slug);
    Ok((StatusCode::CREATED, Json(post)))
}

async fn create_category(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CategoryRequest>,
) -> AppResult<(StatusCode, Json<Category>)> {
    user.require_admin()?;

    let name = validation::required("Name", req.name.as_deref().unwrap_or_default())?;
    validation::length("Name", &name, 2, 100)?;
    let slug = normalize_slug(req.slug.as_deref().unwrap_or(&name))?;

    let conn = state.db.get()?;
    let taken: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM categories WHERE slug = ?1",
        params![slug],
        |row| row.get(0),
    )?;
    if taken {
        return Err(AppError::Conflict("Category slug already in use".into()));
    }

    conn.execute(
        "INSERT INTO categories (name, slug, description, display_order) \
         VALUES (?1, ?2, ?3, COALESCE(?4, (SELECT COALESCE(MAX(display_order), 0) + 1 FROM categories)))",
        params![name, slug, req.description, req.display_order],
    )?;
    let category = find_category(&conn, conn.last_insert_rowid())?;

    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<CategoryRequest>,
) -> AppResult<Json<Category>> {
    user.require_admin()?;

    let name = match req.name {
        Some(ref name) => {
            let name = validation::required("Name", name)?;
            validation::length("Name", &name, 2, 100)?;
            Some(name)
        }
        None => None,
    };
    let slug = req.slug.as_deref().map(normalize_slug).transpose()?;
    // An empty description clears it.
    let description = req.description.as_deref().map(str::trim);

    let conn = state.db.get()?;
    find_category(&conn, id)?;

    conn.execute(
        "UPDATE categories SET name = COALESCE(?1, name), slug = COALESCE(?2, slug), \
         description = CASE WHEN ?3 IS NULL THEN description ELSE NULLIF(?3, '') END, \
         display_order = COALESCE(?4, display_order) \
         WHERE id = ?5",
        params![name, slug, description, req.display_order, id],
    )?;

    Ok(Json(find_category(&conn, id)?))
}

async fn delete_category(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    user.require_admin()?;

    let conn = state.db.get()?;
    find_category(&conn, id)?;

    let post_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM posts WHERE category_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if post_count > 0 {
        return Err(AppError::Conflict(
            "Category still has posts; move or delete them first".into(),
        ));
    }

    conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
    Ok(StatusCode::NO_CONTENT)
}
