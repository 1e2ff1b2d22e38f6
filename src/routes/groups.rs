use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::models::{UserGroup, GROUP_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::validation;

/// Seeded administrator group; the pages key the admin button on this id.
pub const ADMIN_GROUP_ID: i64 = 4;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupWithCount {
    #[serde(flatten)]
    pub group: UserGroup,
    pub member_count: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct GroupRequest {
    pub name: Option<String>,
    pub color: Option<String>,
    pub display_order: Option<i64>,
    pub is_moderator: Option<bool>,
    pub is_admin: Option<bool>,
    pub is_default: Option<bool>,
}

impl GroupRequest {
    fn validated_name(&self) -> AppResult<Option<String>> {
        match self.name {
            Some(ref name) => {
                let name = validation::required("Name", name)?;
                validation::length("Name", &name, 2, 50)?;
                Ok(Some(name))
            }
            None => Ok(None),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/groups", get(list_groups).post(create_group))
        .route("/api/groups/{id}", put(update_group).delete(delete_group))
}

pub fn find_group(conn: &Connection, id: i64) -> AppResult<UserGroup> {
    conn.query_row(
        &format!("SELECT {GROUP_COLUMNS} FROM user_groups WHERE id = ?1"),
        params![id],
        UserGroup::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

/// Active administrators left when `group` stops granting admin rights and
/// `user` leaves the admin groups.
pub fn admins_remaining(
    conn: &Connection,
    group: Option<i64>,
    user: Option<i64>,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM users u JOIN user_groups g ON g.id = u.user_group_id \
         WHERE g.is_admin = 1 AND u.is_banned = 0 AND g.id IS NOT ?1 AND u.id IS NOT ?2",
        params![group, user],
        |row| row.get(0),
    )
}

fn last_admin_error() -> AppError {
    AppError::BadRequest("The forum needs at least one administrator".into())
}

fn name_taken(conn: &Connection, name: &str, except: Option<i64>) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM user_groups WHERE name = ?1 AND id IS NOT ?2",
        params![name, except],
        |row| row.get(0),
    )
}

async fn list_groups(State(state): State<AppState>) -> AppResult<Json<Vec<GroupWithCount>>> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {GROUP_COLUMNS}, \
         (SELECT COUNT(*) FROM users u WHERE u.user_group_id = user_groups.id) AS member_count \
         FROM user_groups ORDER BY display_order, id"
    ))?;
    let groups = stmt
        .query_map([], |row| {
            Ok(GroupWithCount {
                group: UserGroup::from_row(row)?,
                member_count: row.get("member_count")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(groups))
}

async fn create_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<GroupRequest>,
) -> AppResult<(StatusCode, Json<UserGroup>)> {
    user.require_admin()?;

    let name = req
        .validated_name()?
        .ok_or_else(|| AppError::BadRequest("Name is required".into()))?;
    let color = req.color.clone().unwrap_or_else(|| "#6b7280".to_string());
    validation::color(&color)?;

    let mut conn = state.db.get()?;
    if name_taken(&conn, &name, None)? {
        return Err(AppError::Conflict("Group name already in use".into()));
    }

    let tx = conn.transaction()?;
    let make_default = req.is_default.unwrap_or(false);
    if make_default {
        tx.execute("UPDATE user_groups SET is_default = 0", [])?;
    }
    tx.execute(
        "INSERT INTO user_groups (name, color, display_order, is_default, is_moderator, is_admin) \
         VALUES (?1, ?2, COALESCE(?3, (SELECT COALESCE(MAX(display_order), 0) + 1 FROM user_groups)), ?4, ?5, ?6)",
        params![
            name,
            color,
            req.display_order,
            make_default,
            req.is_moderator.unwrap_or(false),
            req.is_admin.unwrap_or(false)
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    let group = find_group(&conn, id)?;
    tracing::info!(admin_id = user.id, group = %group.name, "Created user group");
    Ok((StatusCode::CREATED, Json(group)))
}

/// PUT /api/groups/{id}. Setting `isDefault` moves the default flag here; it
/// cannot be cleared directly since exactly one group must stay default.
async fn update_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<GroupRequest>,
) -> AppResult<Json<UserGroup>> {
    user.require_admin()?;

    let name = req.validated_name()?;
    if let Some(ref color) = req.color {
        validation::color(color)?;
    }

    let mut conn = state.db.get()?;
    let existing = find_group(&conn, id)?;

    if req.is_default == Some(false) && existing.is_default {
        return Err(AppError::BadRequest(
            "Make another group the default instead".into(),
        ));
    }
    if req.is_admin == Some(false) && existing.is_admin {
        if id == ADMIN_GROUP_ID {
            return Err(AppError::BadRequest(
                "The administrator group must keep admin rights".into(),
            ));
        }
        if admins_remaining(&conn, Some(id), None)? == 0 {
            return Err(last_admin_error());
        }
    }
    if let Some(ref name) = name {
        if name_taken(&conn, name, Some(id))? {
            return Err(AppError::Conflict("Group name already in use".into()));
        }
    }

    let tx = conn.transaction()?;
    if req.is_default == Some(true) {
        tx.execute("UPDATE user_groups SET is_default = 0 WHERE id <> ?1", params![id])?;
    }
    tx.execute(
        "UPDATE user_groups SET name = COALESCE(?1, name), color = COALESCE(?2, color), \
         display_order = COALESCE(?3, display_order), is_moderator = COALESCE(?4, is_moderator), \
         is_admin = COALESCE(?5, is_admin), is_default = COALESCE(?6, is_default) \
         WHERE id = ?7",
        params![
            name,
            req.color,
            req.display_order,
            req.is_moderator,
            req.is_admin,
            req.is_default,
            id
        ],
    )?;
    tx.commit()?;

    Ok(Json(find_group(&conn, id)?))
}

/// DELETE /api/groups/{id}: members move to the default group.
async fn delete_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    user.require_admin()?;

    let mut conn = state.db.get()?;
    let group = find_group(&conn, id)?;
    if group.is_default {
        return Err(AppError::BadRequest("The default group cannot be deleted".into()));
    }
    if id == ADMIN_GROUP_ID {
        return Err(AppError::BadRequest(
            "The administrator group cannot be deleted".into(),
        ));
    }
    if group.is_admin && admins_remaining(&conn, Some(id), None)? == 0 {
        return Err(last_admin_error());
    }

    let tx = conn.transaction()?;
    let moved = tx.execute(
        "UPDATE users SET user_group_id = (SELECT id FROM user_groups WHERE is_default = 1 LIMIT 1) \
         WHERE user_group_id = ?1",
        params![id],
    )?;
    tx.execute("DELETE FROM user_groups WHERE id = ?1", params![id])?;
    tx.commit()?;

    tracing::info!(admin_id = user.id, group = %group.name, moved, "Deleted user group");
    Ok(StatusCode::NO_CONTENT)
}
