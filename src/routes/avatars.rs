use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use rusqlite::params;
use serde::Serialize;

use crate::auth::handlers::load_user;
use crate::avatar;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

/// Room for multipart framing on top of the image itself.
const ENVELOPE_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub id: i64,
    pub username: String,
    pub avatar: Option<String>,
}

pub fn router(max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/api/avatar", post(upload_avatar).delete(delete_avatar))
        .layer(DefaultBodyLimit::max(max_bytes + ENVELOPE_BYTES))
}

/// Reads the `avatar` field, stopping as soon as it exceeds `max_bytes`.
async fn read_avatar_field(multipart: &mut Multipart, max_bytes: usize) -> AppResult<Vec<u8>> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("avatar") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !avatar::is_allowed_type(&content_type) {
            return Err(AppError::BadRequest(
                "Only JPEG, PNG, GIF and WebP images are allowed".into(),
            ));
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            if data.len() + chunk.len() > max_bytes {
                return Err(AppError::BadRequest(format!(
                    "File is too large (max {} MB)",
                    max_bytes / (1024 * 1024)
                )));
            }
            data.extend_from_slice(&chunk);
        }
        if data.is_empty() {
            return Err(AppError::BadRequest("No file uploaded".into()));
        }
        return Ok(data);
    }

    Err(AppError::BadRequest("No file uploaded".into()))
}

/// POST /api/avatar (multipart, field `avatar`)
async fn upload_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Json<AvatarResponse>> {
    let settings = state.config.avatars.clone();
    let data = read_avatar_field(&mut multipart, settings.max_bytes).await?;

    let jpeg = tokio::task::spawn_blocking(move || {
        avatar::process(&data, settings.size, settings.jpeg_quality)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Avatar task failed: {}", e)))??;

    let dir = state.config.avatars_path();
    tokio::fs::create_dir_all(&dir).await?;
    let file_name = avatar::file_name(user.id, chrono::Utc::now().timestamp_millis());
    tokio::fs::write(dir.join(&file_name), &jpeg).await?;

    let url = avatar::url_for(&file_name);
    let conn = state.db.get()?;
    let previous = load_user(&conn, user.id)?.avatar;
    conn.execute(
        "UPDATE users SET avatar = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![url, user.id],
    )?;

    if let Some(old) = previous.filter(|old| *old != url) {
        avatar::remove_stored(&dir, &old);
    }

    tracing::info!(user_id = user.id, file = %file_name, bytes = jpeg.len(), "Avatar updated");
    Ok(Json(AvatarResponse {
        id: user.id,
        username: user.username,
        avatar: Some(url),
    }))
}

/// DELETE /api/avatar
async fn delete_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<AvatarResponse>> {
    let conn = state.db.get()?;
    let current = load_user(&conn, user.id)?
        .avatar
        .ok_or_else(|| AppError::BadRequest("User has no avatar".into()))?;

    conn.execute(
        "UPDATE users SET avatar = NULL, updated_at = datetime('now') WHERE id = ?1",
        params![user.id],
    )?;
    avatar::remove_stored(&state.config.avatars_path(), &current);

    tracing::info!(user_id = user.id, "Avatar removed");
    Ok(Json(AvatarResponse {
        id: user.id,
        username: user.username,
        avatar: None,
    }))
}
