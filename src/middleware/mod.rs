use axum::{
    extract::{FromRequest, FromRequestParts},
    http::{header, request::Parts},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::User;

/// Authenticated principal. Resolved once per request by the extractor
/// below and handed explicitly to every service call; nothing downstream
/// reads ambient request state.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub is_staff: bool,
}

impl AuthUser {
    pub fn ensure_staff(&self) -> Result<(), AppError> {
        if self.is_staff {
            Ok(())
        } else {
            Err(AppError::Permission(
                "You do not have permission to perform this action.".to_string(),
            ))
        }
    }

    pub fn ensure_owner_or_staff(&self, owner_id: i64) -> Result<(), AppError> {
        if self.is_staff || self.id == owner_id {
            Ok(())
        } else {
            Err(AppError::Permission(
                "You do not have permission to perform this action.".to_string(),
            ))
        }
    }
}

// Pulls the opaque token out of "Authorization: Bearer <uuid>"
fn bearer_token(header_value: &str) -> Option<Uuid> {
    let token = header_value.strip_prefix("Bearer ")?;
    Uuid::parse_str(token.trim()).ok()
}

// Bearer token extractor
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = bearer_token(auth_header).ok_or(AppError::Unauthorized)?;

        let user = User::find_by_token(token, &state.db)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthUser {
            id: user.id,
            email: user.email,
            is_staff: user.is_staff,
        })
    }
}

/// JSON body extractor for the write endpoints. A body that fails to
/// parse (malformed JSON, missing or mistyped fields) surfaces as
/// `AppError::Validation` with the standard error envelope rather than
/// axum's plain-text rejection.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(id: i64, is_staff: bool) -> AuthUser {
        AuthUser {
            id,
            email: format!("user{id}@example.com"),
            is_staff,
        }
    }

    #[test]
    fn bearer_token_accepts_a_uuid() {
        let token = bearer_token("Bearer 7c9e6679-7425-40de-944b-e07fc1f90ae7");
        assert_eq!(
            token,
            Some(Uuid::parse_str("7c9e6679-7425-40de-944b-e07fc1f90ae7").unwrap())
        );
    }

    #[test]
    fn bearer_token_rejects_other_schemes_and_garbage() {
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("Bearer not-a-uuid"), None);
        assert_eq!(bearer_token(""), None);
    }

    #[test]
    fn staff_check_gates_on_the_flag() {
        assert!(principal(1, true).ensure_staff().is_ok());
        assert!(matches!(
            principal(1, false).ensure_staff(),
            Err(AppError::Permission(_))
        ));
    }

    #[test]
    fn owner_check_passes_owner_and_staff_only() {
        assert!(principal(1, false).ensure_owner_or_staff(1).is_ok());
        assert!(principal(2, true).ensure_owner_or_staff(1).is_ok());
        assert!(matches!(
            principal(2, false).ensure_owner_or_staff(1),
            Err(AppError::Permission(_))
        ));
    }
}
