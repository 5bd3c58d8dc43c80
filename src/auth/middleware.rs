use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, header::COOKIE, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::token::{ACCESS_COOKIE, TokenKind};
use crate::server::AppState;
use crate::types::User;

/// Extractor for routes that demand a signed-in user.
pub struct RequireUser(pub User);

/// Extractor for routes that personalize for a signed-in user but also
/// serve anonymous requests. Invalid or absent credentials yield `None`
/// rather than a rejection, so viewer-relative flags resolve to false.
pub struct Viewer(pub Option<User>);

#[derive(Debug)]
pub enum AuthError {
    MissingCredential,
    InvalidCredential,
    CredentialExpired,
    UnknownUser,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingCredential => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidCredential => (StatusCode::UNAUTHORIZED, "Invalid credential"),
            AuthError::CredentialExpired => (StatusCode::UNAUTHORIZED, "Credential expired"),
            AuthError::UnknownUser => (StatusCode::UNAUTHORIZED, "Unknown user"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({
            "success": false,
            "status": status.as_u16(),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

/// Reads a named cookie out of the Cookie header, if present.
pub fn cookie_value(parts: &Parts, name: &str) -> Option<String> {
    let header = parts.headers.get(COOKIE)?.to_str().ok()?;
    for pair in header.split(';') {
        let mut split = pair.trim().splitn(2, '=');
        if split.next() == Some(name) {
            return split.next().map(ToString::to_string);
        }
    }
    None
}

/// The access credential for a request: `Authorization: Bearer` first,
/// then the access cookie.
pub fn bearer_or_cookie_token(parts: &Parts) -> Option<String> {
    if let Some(header) = parts.headers.get(AUTHORIZATION)
        && let Ok(value) = header.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }
    cookie_value(parts, ACCESS_COOKIE)
}

fn lookup_viewer(parts: &Parts, state: &AppState) -> Result<Option<User>, AuthError> {
    let Some(token) = bearer_or_cookie_token(parts) else {
        return Err(AuthError::MissingCredential);
    };
    let claims = state
        .signer
        .verify(&token, TokenKind::Access)
        .map_err(|e| match e {
            crate::error::Error::CredentialExpired => AuthError::CredentialExpired,
            _ => AuthError::InvalidCredential,
        })?;
    state
        .store
        .get_user(&claims.sub)
        .map_err(|_| AuthError::InternalError)
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = lookup_viewer(parts, state)?.ok_or(AuthError::UnknownUser)?;
        Ok(RequireUser(user))
    }
}

impl FromRequestParts<Arc<AppState>> for Viewer {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match lookup_viewer(parts, state) {
            Ok(user) => Ok(Viewer(user)),
            Err(AuthError::InternalError) => Err(AuthError::InternalError),
            Err(_) => Ok(Viewer(None)),
        }
    }
}
