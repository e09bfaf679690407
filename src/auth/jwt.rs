//! JWT verification for the connection handshake.

use crate::error::{AppError, AppResult};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by the identity service's token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    /// Local part of the email, used as the default display name.
    pub fn default_display_name(&self) -> String {
        self.email
            .split('@')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(self.sub.as_str())
            .to_string()
    }
}

/// Verifies bearer tokens against the shared secret. Verification only;
/// issuing and refreshing belong to the identity service.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Validate a token and extract its claims. Missing, malformed, expired,
    /// and badly-signed tokens all fail with `AppError::Auth`.
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        if token.is_empty() {
            return Err(AppError::Auth("missing bearer token".to_string()));
        }
        let mut validation = Validation::default();
        validation.validate_exp = true;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AppError::Auth(e.to_string()))?;
        Ok(data.claims)
    }
}
