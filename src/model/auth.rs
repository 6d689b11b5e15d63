use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{
    errors::Error as JwtError, DecodingKey, EncodingKey, Header, TokenData, Validation,
};
use rocket::{
    http::Status,
    outcome::IntoOutcome,
    request::{self, FromRequest},
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::mongodb::Id;
use crate::Config;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// Proof of who is calling, issued by the institution's login service as a
/// signed JWT and carried either in the `auth_token` cookie or as a bearer
/// token.
///
/// The token only proves identity; roles and the active flag are always read
/// fresh from the identity directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthToken {
    id: Id,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no auth token supplied")]
    Missing,
    #[error("invalid auth token: {0}")]
    Invalid(#[from] JwtError),
    #[error("auth token subject is not an identity ID")]
    BadSubject,
    #[error("auth is not configured")]
    Unconfigured,
}

/// Token claims: the identity ID as hex plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(with = "ts_seconds")]
    exp: DateTime<Utc>,
}

impl AuthToken {
    /// The authenticated identity.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Sign a token for the given identity. Used by the login service and by
    /// tests.
    pub fn issue(id: Id, config: &Config) -> Result<String, AuthError> {
        let claims = Claims {
            sub: id.to_string(),
            exp: Utc::now() + config.auth_ttl(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;
        Ok(token)
    }

    /// Verify a token's signature and expiry, and extract its subject.
    pub fn decode(token: &str, config: &Config) -> Result<Self, AuthError> {
        let data: TokenData<Claims> = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )?;
        let id = data
            .claims
            .sub
            .parse()
            .map_err(|_| AuthError::BadSubject)?;
        Ok(Self { id })
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = AuthError;

    /// Get an AuthToken from the cookie, falling back to the `Authorization`
    /// header.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let Some(config) = req.rocket().state::<Config>() else {
            return request::Outcome::Failure((Status::InternalServerError, AuthError::Unconfigured));
        };

        let cookie = req
            .cookies()
            .get(AUTH_TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_string());
        let bearer = req
            .headers()
            .get_one("Authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());

        match cookie.or(bearer) {
            Some(token) => Self::decode(&token, config).into_outcome(Status::Unauthorized),
            None => request::Outcome::Failure((Status::Unauthorized, AuthError::Missing)),
        }
    }
}
