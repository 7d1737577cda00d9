use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use tenantry_shared::roles::PlatformRole;

use crate::{
    auth::jwt::validate_token,
    config::AppConfig,
    db::Mongo,
    models::user::UserDoc,
    response::{ServerError, ServerResult},
    util::app_state::AppState,
};

#[derive(Debug, Clone)]
pub struct Claims {
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
    pub is_admin: bool,
}

impl FromRequestParts<AppState> for Claims {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            <TypedHeader<Authorization<Bearer>> as FromRequestParts<AppState>>::from_request_parts(
                parts, state,
            )
            .await
                .map_err(|_| ServerError::missing_token("missing bearer token"))?;

        Claims::from_bearer(bearer.token(), &state.db, &state.config).await
    }
}

/// Anonymous when no `Authorization` header is sent; a header that is present
/// but invalid is still rejected.
impl OptionalFromRequestParts<AppState> for Claims {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(None);
        }
        <Claims as FromRequestParts<AppState>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}

impl Claims {
    pub async fn from_bearer(
        token: &str,
        db: &Arc<Mongo>,
        config: &Arc<AppConfig>,
    ) -> ServerResult<Self> {
        let token_claims = validate_token(token, &config.jwt)?;
        let user = UserDoc::get_or_create(db, &token_claims).await?;
        Ok(Self::for_user(&user, config))
    }

    pub fn for_user(user: &UserDoc, config: &AppConfig) -> Self {
        let email = user.email.clone().unwrap_or_default();
        let is_admin = user.role == PlatformRole::Admin || config.is_admin_email(&email);
        Self {
            user_id: user.id.clone(),
            user_name: user.display_name(),
            user_email: email,
            is_admin,
        }
    }

    /// Whether `email` names the caller's own address.
    pub fn owns_email(&self, email: &str) -> bool {
        !self.user_email.is_empty() && self.user_email.eq_ignore_ascii_case(email.trim())
    }
}
