use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rizz_common::{NewUser, User, UserRole};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiry_hours: i64,
    pub issuer: String,
    pub audience: String,
    /// Auth provider subjects promoted to admin on first sight.
    pub admin_subjects: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "default-secret-change-in-production".to_string(),
            token_expiry_hours: 24,
            issuer: "arabian-rizz-auth".to_string(),
            audience: "arabian-rizz-api".to_string(),
            admin_subjects: Vec::new(),
        }
    }
}

/// Claims minted by the hosted auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Auth provider user id
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl Claims {
    pub fn new_user(&self) -> NewUser {
        let username = self
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.email.split('@').next().unwrap_or_default().to_string());

        NewUser {
            external_id: self.sub.clone(),
            email: self.email.clone(),
            username,
            photo_url: self.picture.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

// `EncodingKey`/`DecodingKey` do not implement `Debug`; omit them.
impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(token_data) => {
                debug!("Token verified for subject: {}", token_data.claims.sub);
                Ok(token_data.claims)
            }
            Err(e) => {
                warn!("Token verification failed: {}", e);
                Err(ApiError::Authentication("Invalid token".to_string()))
            }
        }
    }

    /// Signs a token with the shared secret. Used by local tooling and tests.
    pub fn issue_token(&self, subject: &str, email: &str, name: Option<&str>) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.config.token_expiry_hours);

        let claims = Claims {
            sub: subject.to_string(),
            email: email.to_string(),
            name: name.map(str::to_string),
            picture: None,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            error!("Failed to create access token: {}", e);
            ApiError::Internal("Token creation failed".to_string())
        })
    }

    pub fn is_admin_subject(&self, subject: &str) -> bool {
        self.config.admin_subjects.iter().any(|s| s == subject)
    }
}

fn bearer_token(parts: &Parts) -> ApiResult<&str> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::Authentication("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| ApiError::Authentication("Malformed authorization header".to_string()))?;

    match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(ApiError::Authentication(
            "Authorization header must be a bearer token".to_string(),
        )),
    }
}

/// The caller's local account, created on first sight of a valid token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: Claims,
    pub user: User,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = state.auth.verify_token(bearer_token(parts)?)?;
        let storage = &state.core.storage;

        let mut user = match storage.get_user_by_external_id(&claims.sub).await? {
            Some(user) if user.email == claims.email => user,
            _ => storage.upsert_user(&claims.new_user()).await?,
        };

        if user.role != UserRole::Admin && state.auth.is_admin_subject(&claims.sub) {
            storage.set_role(user.id, UserRole::Admin).await?;
            user.role = UserRole::Admin;
            info!("Promoted configured admin {}", claims.sub);
        }

        Ok(AuthenticatedUser { claims, user })
    }
}

/// An authenticated caller with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser { user, .. } =
            AuthenticatedUser::from_request_parts(parts, state).await?;

        if !user.is_admin() {
            warn!("User {} attempted an admin action", user.id);
            return Err(ApiError::Authorization("Admin role required".to_string()));
        }

        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_issue_and_verify_token() {
        let auth = AuthService::new(AuthConfig::default());
        let token = auth.issue_token("user_2abc", "layla@example.com", Some("Layla")).unwrap();

        let claims = auth.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "user_2abc");
        assert_eq!(claims.new_user().username, "Layla");
    }

    #[test]
    fn test_token_from_other_issuer_rejected() {
        let other = AuthService::new(AuthConfig {
            issuer: "someone-else".to_string(),
            ..AuthConfig::default()
        });
        let token = other.issue_token("user_1", "a@example.com", None).unwrap();

        let auth = AuthService::new(AuthConfig::default());
        assert!(matches!(auth.verify_token(&token), Err(ApiError::Authentication(_))));
    }

    #[test]
    fn test_token_with_wrong_secret_rejected() {
        let other = AuthService::new(AuthConfig {
            jwt_secret: "a-completely-different-secret-value".to_string(),
            ..AuthConfig::default()
        });
        let token = other.issue_token("user_1", "a@example.com", None).unwrap();

        let auth = AuthService::new(AuthConfig::default());
        assert!(auth.verify_token(&token).is_err());
    }

    #[test]
    fn test_username_falls_back_to_email() {
        let claims = Claims {
            sub: "s".to_string(),
            email: "omar@example.com".to_string(),
            name: None,
            picture: None,
            iat: 0,
            exp: 0,
            iss: String::new(),
            aud: String::new(),
        };
        assert_eq!(claims.new_user().username, "omar");
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc"))).unwrap(), "abc");
        assert_eq!(bearer_token(&parts_with(Some("bearer  abc "))).unwrap(), "abc");
        assert!(bearer_token(&parts_with(Some("Basic abc"))).is_err());
        assert!(bearer_token(&parts_with(Some("Bearer "))).is_err());
        assert!(bearer_token(&parts_with(None)).is_err());
    }

    #[test]
    fn test_admin_subjects() {
        let auth = AuthService::new(AuthConfig {
            admin_subjects: vec!["user_admin".to_string()],
            ..AuthConfig::default()
        });
        assert!(auth.is_admin_subject("user_admin"));
        assert!(!auth.is_admin_subject("user_other"));
    }
}
