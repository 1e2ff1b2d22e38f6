use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::models::{AuthorRef, Reputation, ReputationKind, REPUTATION_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::reputation::ReputationSummary;
use crate::state::AppState;
use crate::validation;

const COMMENT_MAX: usize = 255;

const ENTRY_SELECT: &str = "SELECT r.id, r.from_user_id, r.to_user_id, r.kind, r.comment, \
     r.created_at, u.id AS author_id, u.username AS author_username, \
     u.avatar AS author_avatar, u.user_group_id AS author_group_id \
     FROM reputations r JOIN users u ON u.id = r.from_user_id";

#[derive(Debug, Serialize)]
pub struct ReputationEntry {
    #[serde(flatten)]
    pub reputation: Reputation,
    /// The member who gave it.
    pub from: AuthorRef,
}

impl ReputationEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            reputation: Reputation::from_row(row)?,
            from: AuthorRef::from_row(row)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct MemberReputation {
    pub summary: ReputationSummary,
    pub entries: Vec<ReputationEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GiveReputationRequest {
    #[serde(rename = "type")]
    pub kind: ReputationKind,
    pub comment: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/members/{member}/reputation",
            get(member_reputation).post(give_reputation),
        )
        .route("/api/reputation/{id}", delete(delete_reputation))
}

fn user_exists(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
}

/// Summary of everything a member has received.
pub fn summary_for(conn: &Connection, user_id: i64) -> rusqlite::Result<ReputationSummary> {
    let mut stmt =
        conn.prepare("SELECT kind, created_at FROM reputations WHERE to_user_id = ?1")?;
    let entries: Vec<(ReputationKind, DateTime<Utc>)> = stmt
        .query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ReputationSummary::compute(entries, Utc::now()))
}

async fn member_reputation(
    State(state): State<AppState>,
    Path(member): Path<i64>,
) -> AppResult<Json<MemberReputation>> {
    let conn = state.db.get()?;
    if !user_exists(&conn, member)? {
        return Err(AppError::NotFound);
    }

    let mut stmt = conn.prepare(&format!(
        "{ENTRY_SELECT} WHERE r.to_user_id = ?1 ORDER BY r.created_at DESC, r.id DESC"
    ))?;
    let entries = stmt
        .query_map(params![member], ReputationEntry::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let summary = ReputationSummary::compute(
        entries
            .iter()
            .map(|e| (e.reputation.kind, e.reputation.created_at)),
        Utc::now(),
    );

    Ok(Json(MemberReputation { summary, entries }))
}

/// POST /api/members/{member}/reputation: one entry per giver and receiver;
/// giving again replaces the earlier entry.
async fn give_reputation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(member): Path<i64>,
    Json(req): Json<GiveReputationRequest>,
) -> AppResult<(StatusCode, Json<ReputationEntry>)> {
    if member == user.id {
        return Err(AppError::BadRequest(
            "You cannot give reputation to yourself".into(),
        ));
    }

    let comment = req
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    if let Some(ref comment) = comment {
        validation::length("Comment", comment, 1, COMMENT_MAX)?;
    }

    let conn = state.db.get()?;
    if !user_exists(&conn, member)? {
        return Err(AppError::NotFound);
    }

    conn.execute(
        "INSERT INTO reputations (from_user_id, to_user_id, kind, comment) \
         VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(from_user_id, to_user_id) DO UPDATE SET \
           kind = excluded.kind, \
           comment = excluded.comment, \
           created_at = datetime('now')",
        params![user.id, member, req.kind, comment],
    )?;

    let entry = conn.query_row(
        &format!("{ENTRY_SELECT} WHERE r.from_user_id = ?1 AND r.to_user_id = ?2"),
        params![user.id, member],
        ReputationEntry::from_row,
    )?;

    tracing::info!(from = user.id, to = member, kind = %req.kind, "Reputation given");
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn delete_reputation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    let reputation = conn
        .query_row(
            &format!("SELECT {REPUTATION_COLUMNS} FROM reputations r WHERE r.id = ?1"),
            params![id],
            Reputation::from_row,
        )
        .optional()?
        .ok_or(AppError::NotFound)?;

    if reputation.from_user_id != user.id && !user.is_admin {
        return Err(AppError::not_allowed());
    }

    conn.execute("DELETE FROM reputations WHERE id = ?1", params![id])?;
    Ok(StatusCode::NO_CONTENT)
}
