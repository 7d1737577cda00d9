use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tenantry_shared::roles::PlatformRole;

use crate::{
    config::JwtConfig,
    response::{ServerError, ServerResult},
};

/// Claims carried by access tokens of the upstream identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<PlatformRole>,
}

pub fn validate_token(token: &str, config: &JwtConfig) -> ServerResult<TokenClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    if let Some(issuer) = &config.issuer {
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
    }

    let decoded = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| ServerError::invalid_token(&format!("Token verification failed: {}", e)))?;

    Ok(decoded.claims)
}
