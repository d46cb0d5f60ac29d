/*!
 * # Authentication
 *
 * Bearer JWTs carry the user id and role. [`auth_middleware`] validates a
 * token when one is present and stores the resulting [`AuthUser`] in the
 * request extensions; handlers then ask for [`AuthUser`], [`AdminUser`] or
 * [`OptionalAuthUser`] to state how much identity they need.
 */

pub mod password;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::user::{self, UserRole};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
}

/// Identity of the caller, derived from a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub token_id: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Owners and admins may act on a resource.
    pub fn can_access(&self, owner_id: Uuid) -> bool {
        self.is_admin() || self.user_id == owner_id
    }

    pub fn ensure_can_access(&self, owner_id: Uuid, what: &str) -> Result<(), ServiceError> {
        if self.can_access(owner_id) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "You do not have access to this {}",
                what
            )))
        }
    }

    pub fn ensure_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("Admin access required".into()))
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub token_ttl: ChronoDuration,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_issuer: cfg.jwt_issuer.clone(),
            token_ttl: ChronoDuration::seconds(cfg.jwt_expiration),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn issue_token(&self, user: &user::Model) -> Result<TokenResponse, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.config.token_ttl).timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
        };

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.token_ttl.num_seconds(),
        })
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.validate_nbf = true;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    pub fn authenticate(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthUser {
            user_id,
            name: claims.name,
            email: claims.email,
            role: claims.role,
            token_id: claims.jti,
        })
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingAuth,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Invalid authentication token")]
    InvalidToken,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token creation failed: {0}")]
    TokenCreation(String),
    #[error("Admin access required")]
    InsufficientPermissions,
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InsufficientPermissions => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(msg) => ServiceError::InternalError(msg),
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validates a bearer token if one is sent. Requests without a token pass
/// through anonymous; a bad token is rejected outright.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(request.headers()) {
        match auth.authenticate(token) {
            Ok(user) => {
                tracing::Span::current().record("user_id", tracing::field::display(user.user_id));
                request.extensions_mut().insert(user);
            }
            Err(e) => return e.into_response(),
        }
    }
    next.run(request).await
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Caller with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.is_admin() {
            Ok(AdminUser(user))
        } else {
            Err(AuthError::InsufficientPermissions)
        }
    }
}

/// Caller identity when present; public endpoints use it to widen results for admins.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl OptionalAuthUser {
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(AuthUser::is_admin)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuthUser(parts.extensions.get::<AuthUser>().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{user::AddressBook, UuidList};

    fn service() -> AuthService {
        AuthService::new(AuthConfig {
            jwt_secret: "k".repeat(64),
            jwt_issuer: "stonecraft-api".into(),
            token_ttl: ChronoDuration::hours(1),
        })
    }

    fn user(role: UserRole) -> user::Model {
        let now = Utc::now();
        user::Model {
            id: Uuid::new_v4(),
            name: "Meera".into(),
            email: "meera@example.com".into(),
            mobile: None,
            password_hash: String::new(),
            role,
            addresses: AddressBook::default(),
            wishlist: UuidList::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issued_token_authenticates() {
        let svc = service();
        let admin = user(UserRole::Admin);
        let token = svc.issue_token(&admin).unwrap();
        let auth = svc.authenticate(&token.access_token).unwrap();
        assert_eq!(auth.user_id, admin.id);
        assert!(auth.is_admin());
        assert_eq!(token.expires_in, 3600);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = service().issue_token(&user(UserRole::Customer)).unwrap();
        let other = AuthService::new(AuthConfig {
            jwt_secret: "z".repeat(64),
            jwt_issuer: "stonecraft-api".into(),
            token_ttl: ChronoDuration::hours(1),
        });
        assert!(matches!(
            other.authenticate(&token.access_token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_reported() {
        let svc = AuthService::new(AuthConfig {
            jwt_secret: "k".repeat(64),
            jwt_issuer: "stonecraft-api".into(),
            token_ttl: ChronoDuration::hours(-2),
        });
        let token = svc.issue_token(&user(UserRole::Customer)).unwrap();
        assert!(matches!(
            svc.authenticate(&token.access_token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn ownership_checks() {
        let owner = Uuid::new_v4();
        let customer = AuthUser {
            user_id: owner,
            name: "c".into(),
            email: "c@example.com".into(),
            role: UserRole::Customer,
            token_id: "t".into(),
        };
        assert!(customer.can_access(owner));
        assert!(!customer.can_access(Uuid::new_v4()));
        assert!(customer.ensure_admin().is_err());

        let admin = AuthUser {
            role: UserRole::Admin,
            ..customer
        };
        assert!(admin.can_access(Uuid::new_v4()));
    }
}
