use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Kind of system a Status API caller authenticates as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumerType {
    IntegrationSystem,
    Application,
    Runtime,
    User,
}

impl std::fmt::Display for ConsumerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumerType::IntegrationSystem => write!(f, "INTEGRATION_SYSTEM"),
            ConsumerType::Application => write!(f, "APPLICATION"),
            ConsumerType::Runtime => write!(f, "RUNTIME"),
            ConsumerType::User => write!(f, "USER"),
        }
    }
}

/// JWT Claims - data stored in the token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,       // Consumer ID (integration system, application, runtime or user)
    pub tenant_id: String, // Tenant the consumer acts for
    pub consumer_type: ConsumerType,
    pub exp: i64, // Expiration timestamp
    pub iat: i64, // Issued at timestamp
    pub iss: String,
}

/// JWT Service - creates and verifies JWT tokens
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    /// Create new JWT service with secret and issuer
    pub fn new(secret: &str, issuer: String) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
        }
    }

    /// Create a token for a consumer
    ///
    /// Token expires after 1 hour
    pub fn create_token(
        &self,
        consumer_id: impl Into<String>,
        tenant_id: impl Into<String>,
        consumer_type: ConsumerType,
    ) -> Result<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(1);

        let claims = Claims {
            sub: consumer_id.into(),
            tenant_id: tenant_id.into(),
            consumer_type,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify and decode a JWT token
    ///
    /// Returns claims if token is valid and not expired
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}
