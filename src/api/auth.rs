use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::ApiJson;
use super::validation::{parse_role, validate_email, validate_password, validate_user_name};
use crate::config::AuthConfig;
use crate::db::{
    create_user, find_user_by_email, find_user_by_id, LoginRequest, LoginResponse,
    RegisterUserRequest, User, UserResponse, UserRole,
};
use crate::{AppState, DbPool};

/// Token claims. `sub` carries the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// The caller resolved from a bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub email: String,
    pub role: String,
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Sign a token for `user`
pub fn issue_token(auth: &AuthConfig, user: &User) -> Result<String, ApiError> {
    let iat = Utc::now().timestamp();
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role.clone(),
        iat,
        exp: iat + auth.token_ttl_hours * 3600,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("Failed to sign token: {}", e);
        ApiError::internal("Failed to issue token")
    })
}

/// Verify signature and expiry and resolve the caller
pub fn verify_token(auth: &AuthConfig, token: &str) -> Result<CurrentUser, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            ApiError::unauthorized("Token expired")
        }
        _ => ApiError::unauthorized("Invalid token"),
    })?;

    let id = data
        .claims
        .sub
        .parse::<i64>()
        .map_err(|_| ApiError::unauthorized("Invalid token"))?;

    Ok(CurrentUser {
        id,
        email: data.claims.email,
        role: data.claims.role,
    })
}

/// Extract the bearer token from request headers
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&request.email));
    if request.password.is_empty() {
        errors.add("password", "Password is required");
    }
    errors.finish()?;

    let user = find_user_by_email(&state.db, request.email.trim())
        .await?
        .filter(|user| verify_password(&request.password, &user.password_hash))
        .ok_or_else(|| {
            warn!(email = %request.email, "Failed login attempt");
            ApiError::unauthorized("Invalid credentials")
        })?;

    let token = issue_token(&state.config.auth, &user)?;
    info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

/// Self-registration endpoint
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RegisterUserRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&request.email));
    errors.check("password", validate_password(&request.password));
    errors.check("name", validate_user_name(&request.name));
    let role = parse_role(request.role.as_deref());
    if let Err(message) = &role {
        errors.add("role", message.clone());
    }
    errors.finish()?;
    let role = role.map_err(ApiError::bad_request)?;

    let email = request.email.trim();
    if find_user_by_email(&state.db, email).await?.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }

    let password_hash = hash_password(&request.password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to hash password")
    })?;
    let user = create_user(&state.db, email, &password_hash, request.name.trim(), role).await?;
    let token = issue_token(&state.config.auth, &user)?;

    info!(user_id = user.id, role = %role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            token,
            user: UserResponse::from(user),
        }),
    ))
}

/// Profile of the authenticated caller
pub async fn profile(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = find_user_by_id(&state.db, current.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(user)))
}

/// Auth middleware: rejects requests without a valid bearer token and makes
/// the resolved [`CurrentUser`] available to handlers
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_token(request.headers()) {
        Some(token) => token.to_string(),
        None => return ApiError::unauthorized("Access token required").into_response(),
    };

    match verify_token(&state.config.auth, &token) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Extractor for the authenticated caller
#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Access token required"))?;
        verify_token(&state.config.auth, token)
    }
}

/// Create the configured bootstrap administrator if that email is unused
pub async fn ensure_admin_user(db: &DbPool, auth: &AuthConfig) -> anyhow::Result<()> {
    let (email, password) = match (&auth.admin_email, &auth.admin_password) {
        (Some(email), Some(password)) => (email.trim(), password),
        _ => return Ok(()),
    };

    if find_user_by_email(db, email).await?.is_some() {
        return Ok(());
    }

    let hash = hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;
    let name = auth.admin_name.as_deref().unwrap_or("Administrador");
    let user = create_user(db, email, &hash, name, UserRole::Admin).await?;
    info!(user_id = user.id, email = %email, "Created administrator account");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            ..Default::default()
        }
    }

    fn user() -> User {
        User {
            id: 7,
            email: "recepcao@casa.org".to_string(),
            password_hash: String::new(),
            name: "Maria".to_string(),
            role: "RECEPCAO".to_string(),
            created_at: "2025-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("123456").unwrap();
        assert_ne!(hash, "123456");
        assert!(verify_password("123456", &hash));
        assert!(!verify_password("654321", &hash));
        assert!(!verify_password("123456", "not-a-hash"));
    }

    #[test]
    fn test_token_round_trip() {
        let auth = auth_config();
        let token = issue_token(&auth, &user()).unwrap();
        let current = verify_token(&auth, &token).unwrap();
        assert_eq!(current.id, 7);
        assert_eq!(current.email, "recepcao@casa.org");
        assert_eq!(current.role, "RECEPCAO");
    }

    #[test]
    fn test_token_wrong_secret_rejected() {
        let token = issue_token(&auth_config(), &user()).unwrap();
        let other = AuthConfig {
            jwt_secret: "another-secret".to_string(),
            ..Default::default()
        };
        let err = verify_token(&other, &token).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = auth_config();
        let claims = Claims {
            sub: "7".to_string(),
            email: "recepcao@casa.org".to_string(),
            role: "RECEPCAO".to_string(),
            iat: 1_000_000,
            exp: 1_000_100,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
        )
        .unwrap();
        let err = verify_token(&auth, &token).unwrap_err();
        assert_eq!(err.message(), "Token expired");
    }

    #[test]
    fn test_extract_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_token(&headers).is_none());
        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(extract_token(&headers).is_none());
        headers.insert(AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(extract_token(&headers), Some("abc.def"));
    }

    #[tokio::test]
    async fn test_ensure_admin_user_once() {
        let db = init_in_memory().await.unwrap();
        let mut auth = auth_config();
        ensure_admin_user(&db, &auth).await.unwrap();
        assert_eq!(crate::db::count_users(&db).await.unwrap(), 0);

        auth.admin_email = Some("admin@casa.org".to_string());
        auth.admin_password = Some("trocar123".to_string());
        ensure_admin_user(&db, &auth).await.unwrap();
        ensure_admin_user(&db, &auth).await.unwrap();

        let admin = find_user_by_email(&db, "admin@casa.org").await.unwrap().unwrap();
        assert_eq!(admin.role, "ADMIN");
        assert_eq!(admin.name, "Administrador");
        assert!(verify_password("trocar123", &admin.password_hash));
        assert_eq!(crate::db::count_users(&db).await.unwrap(), 1);
    }
}
