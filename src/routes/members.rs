use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::handlers::load_user;
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::db::models::UserGroup;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::reputation::ReputationSummary;
use crate::routes::groups::{admins_remaining, find_group};
use crate::routes::posts::author_counts;
use crate::routes::reputation::summary_for;
use crate::routes::{Page, PageQuery};
use crate::state::AppState;
use crate::validation;

const MEMBER_SELECT: &str = "SELECT u.id, u.username, u.avatar, u.is_banned, u.last_login_at, \
     u.created_at, g.id AS group_id, g.name AS group_name, g.color AS group_color \
     FROM users u JOIN user_groups g ON g.id = u.user_group_id";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBadge {
    pub id: i64,
    pub name: String,
    pub color: String,
}

/// Public view of a member; never carries email or password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: i64,
    pub username: String,
    pub avatar: Option<String>,
    pub is_banned: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub group: GroupBadge,
}

impl Member {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            avatar: row.get("avatar")?,
            is_banned: row.get("is_banned")?,
            last_login_at: row.get("last_login_at")?,
            created_at: row.get("created_at")?,
            group: GroupBadge {
                id: row.get("group_id")?,
                name: row.get("group_name")?,
                color: row.get("group_color")?,
            },
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStats {
    /// Threads plus comments.
    pub total_posts: i64,
    pub total_threads: i64,
    pub total_comments: i64,
}

#[derive(Debug, Serialize)]
pub struct MemberProfile {
    #[serde(flatten)]
    pub member: Member,
    /// Only shown to the member themself and to administrators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub stats: MemberStats,
    pub reputation: ReputationSummary,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
}

impl MemberQuery {
    fn paging(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SetGroupRequest {
    pub group_id: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BanRequest {
    pub banned: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/members", get(list_members))
        .route("/api/members/me/password", put(change_password))
        .route("/api/members/{member}", get(member_profile))
        .route("/api/members/{member}/group", put(set_group))
        .route("/api/members/{member}/ban", put(set_banned))
}

fn load_member(conn: &rusqlite::Connection, id: i64) -> AppResult<Member> {
    conn.query_row(
        &format!("{MEMBER_SELECT} WHERE u.id = ?1"),
        params![id],
        Member::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

/// Escapes LIKE wildcards so a search for `_` matches a literal underscore.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

async fn list_members(
    State(state): State<AppState>,
    Query(query): Query<MemberQuery>,
) -> AppResult<Json<Page<Member>>> {
    let pattern = like_pattern(query.search.as_deref().unwrap_or("").trim());
    let paging = query.paging();

    let conn = state.db.get()?;
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE username LIKE ?1 ESCAPE '\\'",
        params![pattern],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "{MEMBER_SELECT} WHERE u.username LIKE ?1 ESCAPE '\\' \
         ORDER BY u.created_at DESC, u.id DESC LIMIT ?2 OFFSET ?3"
    ))?;
    let members = stmt
        .query_map(
            params![pattern, paging.limit(), paging.offset()],
            Member::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Page::new(members, &paging, total)))
}

/// GET /api/members/{username}
async fn member_profile(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(username): Path<String>,
) -> AppResult<Json<MemberProfile>> {
    let conn = state.db.get()?;
    let member = conn
        .query_row(
            &format!("{MEMBER_SELECT} WHERE u.username = ?1"),
            params![username],
            Member::from_row,
        )
        .optional()?
        .ok_or(AppError::NotFound)?;

    let (threads, comments) = author_counts(&conn, member.id)?;
    let reputation = summary_for(&conn, member.id)?;
    let email = match viewer {
        Some(ref v) if v.id == member.id || v.is_admin => {
            Some(load_user(&conn, member.id)?.email)
        }
        _ => None,
    };

    Ok(Json(MemberProfile {
        member,
        email,
        stats: MemberStats {
            total_posts: threads + comments,
            total_threads: threads,
            total_comments: comments,
        },
        reputation,
    }))
}

async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    validation::password(&req.new_password)?;

    let conn = state.db.get()?;
    let stored = load_user(&conn, user.id)?;
    if !verify_password_blocking(req.current_password, stored.password_hash).await? {
        return Err(AppError::Unauthorized("Current password is incorrect".into()));
    }

    let hash = hash_password_blocking(req.new_password, state.config.auth.bcrypt_cost).await?;
    conn.execute(
        "UPDATE users SET password_hash = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![hash, user.id],
    )?;

    tracing::info!(user_id = user.id, "Password changed");
    Ok(Json(json!({ "message": "Password updated" })))
}

async fn set_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(member): Path<i64>,
    Json(req): Json<SetGroupRequest>,
) -> AppResult<Json<Member>> {
    user.require_admin()?;

    let conn = state.db.get()?;
    let group: UserGroup = find_group(&conn, req.group_id)?;
    load_member(&conn, member)?;
    if !group.is_admin && admins_remaining(&conn, None, Some(member))? == 0 {
        return Err(AppError::BadRequest(
            "The forum needs at least one administrator".into(),
        ));
    }

    conn.execute(
        "UPDATE users SET user_group_id = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![group.id, member],
    )?;

    tracing::info!(admin_id = user.id, member, group = %group.name, "Member group changed");
    Ok(Json(load_member(&conn, member)?))
}

async fn set_banned(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(member): Path<i64>,
    Json(req): Json<BanRequest>,
) -> AppResult<Json<Member>> {
    user.require_admin()?;
    if member == user.id && req.banned {
        return Err(AppError::BadRequest("You cannot ban yourself".into()));
    }

    let conn = state.db.get()?;
    load_member(&conn, member)?;

    conn.execute(
        "UPDATE users SET is_banned = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![req.banned, member],
    )?;

    tracing::warn!(admin_id = user.id, member, banned = req.banned, "Ban status changed");
    Ok(Json(load_member(&conn, member)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("al"), "%al%");
        assert_eq!(like_pattern("a_b%"), "%a\\_b\\%%");
    }
}
