//! Shared-secret authentication for trigger routes.
//!
//! Callers (schedulers, webhooks, operators) send
//! `Authorization: Bearer <TRIGGER_SECRET>`. There are no user accounts.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use herald_common::error::AppError;

use crate::state::AppState;

/// Proof that the request carried the trigger secret.
///
/// Use as an Axum extractor on protected routes:
/// ```ignore
/// async fn handler(_auth: TriggerAuth) -> impl IntoResponse { ... }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TriggerAuth;

/// Constant-time comparison. Both sides are padded to a common length with
/// different fill bytes so a length mismatch never matches.
fn secrets_match(expected: &str, provided: &str) -> bool {
    use subtle::ConstantTimeEq;

    let max_len = expected.len().max(provided.len());
    let mut a = vec![0u8; max_len];
    let mut b = vec![0xFFu8; max_len];
    a[..expected.len()].copy_from_slice(expected.as_bytes());
    b[..provided.len()].copy_from_slice(provided.as_bytes());

    let lengths_equal = expected.len().ct_eq(&provided.len());
    let contents_equal = a.as_slice().ct_eq(b.as_slice());
    (lengths_equal & contents_equal).into()
}

/// Check an `Authorization` header value against the configured secret.
pub fn verify_bearer(header: Option<&str>, secret: Option<&str>) -> Result<TriggerAuth, AppError> {
    let Some(secret) = secret else {
        return Err(AppError::Auth("Trigger secret is not configured".to_string()));
    };

    match header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) if secrets_match(secret, token.trim()) => Ok(TriggerAuth),
        Some(_) => Err(AppError::Auth("Invalid trigger secret".to_string())),
        None => Err(AppError::Auth(
            "Missing Authorization header. Use 'Bearer <TRIGGER_SECRET>'".to_string(),
        )),
    }
}

impl FromRequestParts<AppState> for TriggerAuth {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok());
        let result = verify_bearer(header, state.config.trigger_secret.as_deref());

        async move { result }
    }
}
