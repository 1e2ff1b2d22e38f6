use axum::extract::State;
use axum::routing::{get, put};
use axum::{Json, Router};
use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::db::models::SiteSettings;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::validation;

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub site_name: Option<String>,
    pub allow_registration: Option<bool>,
    pub maintenance_mode: Option<bool>,
    pub maintenance_message: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/settings/public", get(public_settings))
        .route("/api/settings", put(update_settings))
}

pub fn load_settings(conn: &Connection) -> rusqlite::Result<SiteSettings> {
    conn.query_row(
        "SELECT site_name, allow_registration, maintenance_mode, maintenance_message \
         FROM site_settings WHERE id = 1",
        [],
        SiteSettings::from_row,
    )
}

async fn public_settings(State(state): State<AppState>) -> AppResult<Json<SiteSettings>> {
    let conn = state.db.get()?;
    Ok(Json(load_settings(&conn)?))
}

async fn update_settings(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<UpdateSettingsRequest>,
) -> AppResult<Json<SiteSettings>> {
    user.require_admin()?;

    let site_name = match req.site_name {
        Some(ref name) => {
            let name = validation::required("Site name", name)?;
            validation::length("Site name", &name, 1, 100)?;
            Some(name)
        }
        None => None,
    };
    if let Some(ref message) = req.maintenance_message {
        validation::length("Maintenance message", message, 0, 500)?;
    }

    // An empty message clears it.
    let maintenance_message = req.maintenance_message.as_deref().map(str::trim);

    let conn = state.db.get()?;
    conn.execute(
        "UPDATE site_settings SET \
            site_name = COALESCE(?1, site_name), \
            allow_registration = COALESCE(?2, allow_registration), \
            maintenance_mode = COALESCE(?3, maintenance_mode), \
            maintenance_message = CASE WHEN ?4 IS NULL THEN maintenance_message ELSE NULLIF(?4, '') END, \
            updated_at = datetime('now') \
         WHERE id = 1",
        params![
            site_name,
            req.allow_registration,
            req.maintenance_mode,
            maintenance_message
        ],
    )?;

    let settings = load_settings(&conn)?;
    tracing::info!(
        admin_id = user.id,
        maintenance = settings.maintenance_mode,
        "Site settings updated"
    );
    Ok(Json(settings))
}
