use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use rusqlite::{params, OptionalExtension};
use serde::Deserialize;
use serde_json::json;

use crate::auth::cookies::{access_cookie, clear_cookie, get_cookie_value, refresh_cookie};
use crate::auth::jwt::{TokenKind, TokenPair};
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::db::models::{User, USER_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::settings::load_settings;
use crate::state::AppState;
use crate::validation;

// -- Request types --

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl RegisterRequest {
    fn validate(&self) -> AppResult<()> {
        validation::email(&self.email)?;
        validation::username(&self.username)?;
        validation::password(&self.password)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

impl LoginRequest {
    fn validate(&self) -> AppResult<()> {
        validation::length("Username or email", &self.username_or_email, 3, 255)?;
        validation::length("Password", &self.password, 6, 100)
    }
}

// -- Helpers --

fn with_token_cookies(
    state: &AppState,
    status: StatusCode,
    pair: &TokenPair,
    body: serde_json::Value,
) -> Response {
    let auth = &state.config.auth;
    (
        status,
        AppendHeaders([
            (header::SET_COOKIE, access_cookie(auth, &pair.access_token)),
            (header::SET_COOKIE, refresh_cookie(auth, &pair.refresh_token)),
        ]),
        Json(body),
    )
        .into_response()
}

pub fn load_user(conn: &rusqlite::Connection, id: i64) -> AppResult<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        User::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

// -- Handlers --

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Response> {
    let email = req.email.trim().to_lowercase();
    let username = req.username.trim().to_string();
    let req = RegisterRequest {
        email,
        username,
        password: req.password,
    };
    req.validate()?;

    let conn = state.db.get()?;

    if !load_settings(&conn)?.allow_registration {
        return Err(AppError::Forbidden("Registration is currently disabled".into()));
    }

    let email_taken: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
        params![req.email],
        |row| row.get(0),
    )?;
    if email_taken {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let username_taken: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
        params![req.username],
        |row| row.get(0),
    )?;
    if username_taken {
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let password_hash =
        hash_password_blocking(req.password.clone(), state.config.auth.bcrypt_cost).await?;

    conn.execute(
        "INSERT INTO users (email, username, password_hash, user_group_id, last_login_at) \
         VALUES (?1, ?2, ?3, (SELECT id FROM user_groups WHERE is_default = 1 LIMIT 1), datetime('now'))",
        params![req.email, req.username, password_hash],
    )?;
    let user = load_user(&conn, conn.last_insert_rowid())?;

    tracing::info!(user_id = user.id, "Registered user {}", user.username);

    let pair = state
        .keys
        .issue_pair(&state.config.auth, user.id, &user.username)?;

    Ok(with_token_cookies(
        &state,
        StatusCode::CREATED,
        &pair,
        json!({
            "message": "User registered successfully",
            "user": {
                "id": user.id,
                "email": user.email,
                "username": user.username,
                "createdAt": user.created_at,
            },
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let req = LoginRequest {
        username_or_email: req.username_or_email.trim().to_string(),
        password: req.password,
    };
    req.validate()?;

    let conn = state.db.get()?;
    let identifier = req.username_or_email.as_str();

    let user = conn
        .query_row(
            &format!(
                "SELECT {USER_COLUMNS} FROM users WHERE email = lower(?1) OR username = ?1 LIMIT 1"
            ),
            params![identifier],
            User::from_row,
        )
        .optional()?;

    let verified = match user {
        Some(ref user) => {
            verify_password_blocking(req.password.clone(), user.password_hash.clone()).await?
        }
        None => false,
    };
    let user = match user {
        Some(user) if verified => user,
        _ => {
            tracing::info!("Failed login for {}", identifier);
            return Err(AppError::Unauthorized("Invalid credentials".into()));
        }
    };

    conn.execute(
        "UPDATE users SET last_login_at = datetime('now') WHERE id = ?1",
        params![user.id],
    )?;

    let pair = state
        .keys
        .issue_pair(&state.config.auth, user.id, &user.username)?;

    Ok(with_token_cookies(
        &state,
        StatusCode::OK,
        &pair,
        json!({
            "message": "Login successful",
            "user": {
                "id": user.id,
                "email": user.email,
                "username": user.username,
            },
        }),
    ))
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>, _user: CurrentUser) -> Response {
    let auth = &state.config.auth;
    (
        StatusCode::OK,
        AppendHeaders([
            (header::SET_COOKIE, clear_cookie(auth, &auth.access_cookie)),
            (header::SET_COOKIE, clear_cookie(auth, &auth.refresh_cookie)),
        ]),
        Json(json!({ "message": "Logout successful" })),
    )
        .into_response()
}

/// POST /api/auth/refresh: trade a refresh cookie for a fresh token pair.
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let token = get_cookie_value(&headers, &state.config.auth.refresh_cookie)
        .ok_or_else(AppError::unauthenticated)?;
    let claims = state
        .keys
        .verify(token, TokenKind::Refresh)
        .map_err(|_| AppError::unauthenticated())?;

    let user = {
        let conn = state.db.get()?;
        load_user(&conn, claims.sub).map_err(|e| match e {
            AppError::NotFound => AppError::unauthenticated(),
            other => other,
        })?
    };
    if user.is_banned {
        return Err(AppError::Forbidden(
            "Your account has been suspended. Contact the administrators.".into(),
        ));
    }

    let pair = state
        .keys
        .issue_pair(&state.config.auth, user.id, &user.username)?;

    Ok(with_token_cookies(
        &state,
        StatusCode::OK,
        &pair,
        json!({ "message": "Token refreshed" }),
    ))
}

/// GET /api/auth/me
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    let user = load_user(&conn, user.id).map_err(|e| match e {
        AppError::NotFound => AppError::unauthenticated(),
        other => other,
    })?;
    Ok(Json(user))
}

/// GET /api/auth/check
pub async fn check(_user: CurrentUser) -> Json<serde_json::Value> {
    Json(json!({ "authenticated": true }))
}
