use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashSet;
use thiserror::Error;

use crate::tracks::Faction;

use super::api::error::ErrorResponse;
use super::config::{ApiKey, Permission};
use super::feeds::AppState;

/// Caller identified by its API key: a dashboard, a sensor gateway pushing
/// detections, or an operator console.
#[derive(Debug, Clone)]
pub struct Operator {
    pub name: String,
    pub permissions: HashSet<Permission>,
    /// Feeds the key is scoped to. `None` grants both factions.
    pub factions: Option<HashSet<Faction>>,
}

impl Operator {
    pub fn may(&self, permission: Permission, faction: Faction) -> bool {
        self.permissions.contains(&permission)
            && self
                .factions
                .as_ref()
                .map_or(true, |factions| factions.contains(&faction))
    }
}

impl From<&ApiKey> for Operator {
    fn from(key: &ApiKey) -> Self {
        Self {
            name: key.name.clone(),
            permissions: key.permissions.clone(),
            factions: key.factions.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("Authorization header is not a bearer token")]
    NotBearer,
    #[error("unknown API key")]
    UnknownKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::with_message("unauthorized", &self.to_string());
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

#[derive(Debug, Error)]
#[error("{operator} may not {permission} on the {faction} feed")]
pub struct FeedAccessDenied {
    pub operator: String,
    pub permission: Permission,
    pub faction: Faction,
}

impl IntoResponse for FeedAccessDenied {
    fn into_response(self) -> Response {
        let body = ErrorResponse::with_message("forbidden", &self.to_string());
        (StatusCode::FORBIDDEN, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for Operator {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        state
            .config
            .find_api_key(token)
            .map(Operator::from)
            .ok_or(AuthError::UnknownKey)
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?;
    header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::NotBearer)
}

/// Checks that `operator` holds `permission` on the `faction` feed.
pub fn authorize(
    operator: &Operator,
    permission: Permission,
    faction: Faction,
) -> Result<(), FeedAccessDenied> {
    if operator.may(permission, faction) {
        return Ok(());
    }
    log::debug!(
        "{} denied {} on the {} feed",
        operator.name,
        permission,
        faction
    );
    Err(FeedAccessDenied {
        operator: operator.name.clone(),
        permission,
        faction,
    })
}
