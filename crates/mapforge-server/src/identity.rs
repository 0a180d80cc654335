//! Caller identity forwarded by the upstream auth layer
//!
//! Sessions are handled in front of this service. It forwards the caller as
//! `x-user-id` (integer) and `x-user-role` headers.

use axum::{extract::FromRequestParts, http::HeaderMap, http::request::Parts};

use tracing::debug;

use crate::AppState;
use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// An authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub is_admin: bool,
}

impl Actor {
    /// Read the caller from request headers.
    ///
    /// `Ok(None)` when no user id is present; an unparsable id is rejected.
    pub fn from_headers(headers: &HeaderMap, admin_ids: &[i64]) -> Result<Option<Self>, ApiError> {
        let Some(raw) = headers.get(USER_ID_HEADER) else {
            return Ok(None);
        };
        let user_id = raw
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .ok_or(ApiError::Unauthorized)?;

        let role_is_admin = headers
            .get(USER_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));

        Ok(Some(Self {
            user_id,
            is_admin: role_is_admin || admin_ids.contains(&user_id),
        }))
    }
}

impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Actor::from_headers(&parts.headers, &state.config.admin_user_ids)?
            .ok_or(ApiError::Unauthorized)
    }
}

/// Caller that may be anonymous; a malformed user id counts as anonymous
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaybeActor(pub Option<Actor>);

impl MaybeActor {
    pub fn user_id(&self) -> Option<i64> {
        self.0.map(|actor| actor.user_id)
    }

    pub fn is_admin(&self) -> bool {
        self.0.is_some_and(|actor| actor.is_admin)
    }
}

impl FromRequestParts<AppState> for MaybeActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let actor = Actor::from_headers(&parts.headers, &state.config.admin_user_ids)
            .unwrap_or_else(|_| {
                debug!("Ignoring malformed {} header on public route", USER_ID_HEADER);
                None
            });
        Ok(MaybeActor(actor))
    }
}

/// Caller with admin rights; 401 when anonymous, 403 otherwise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admin(pub Actor);

impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let actor = Actor::from_request_parts(parts, state).await?;
        if !actor.is_admin {
            return Err(ApiError::Forbidden);
        }
        Ok(Admin(actor))
    }
}
