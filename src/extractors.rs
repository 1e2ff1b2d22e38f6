use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use rusqlite::{params, OptionalExtension};

use crate::auth::cookies::{bearer_token, get_cookie_value};
use crate::auth::jwt::TokenKind;
use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub user_group_id: i64,
    pub is_moderator: bool,
    pub is_admin: bool,
}

impl CurrentUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Administrator access required".into()))
        }
    }

    pub fn require_moderator(&self) -> Result<(), AppError> {
        if self.is_moderator || self.is_admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Moderator access required".into()))
        }
    }

    /// Owners may always act on their content; moderators may act on anyone's.
    pub fn can_manage(&self, owner_id: i64) -> bool {
        self.id == owner_id || self.is_moderator || self.is_admin
    }
}

/// Extractor that requires a valid access token.
/// Returns 401 when the token is missing or invalid, 403 when the account is banned.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = get_cookie_value(&parts.headers, &state.config.auth.access_cookie)
            .or_else(|| bearer_token(&parts.headers))
            .ok_or_else(AppError::unauthenticated)?;

        let claims = state
            .keys
            .verify(token, TokenKind::Access)
            .map_err(|_| AppError::unauthenticated())?;

        let conn = state.db.get()?;
        let (user, is_banned) = conn
            .query_row(
                "SELECT u.id, u.username, u.user_group_id, u.is_banned, g.is_moderator, g.is_admin \
                 FROM users u JOIN user_groups g ON g.id = u.user_group_id \
                 WHERE u.id = ?1",
                params![claims.sub],
                |row| {
                    Ok((
                        CurrentUser {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            user_group_id: row.get(2)?,
                            is_moderator: row.get(4)?,
                            is_admin: row.get(5)?,
                        },
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(AppError::unauthenticated)?;

        if is_banned {
            return Err(AppError::Forbidden(
                "Your account has been suspended. Contact the administrators.".into(),
            ));
        }

        Ok(user)
    }
}

/// Optional user extractor: `None` instead of 401/403 when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(e @ (AppError::Pool(_) | AppError::Database(_))) => Err(e),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}
