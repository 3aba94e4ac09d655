use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rise_protocol::{generate_document_id, Claims, Credentials, SignInResponse, SignUpResponse};
use std::sync::Arc;
use tokio::task;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, sqlx::FromRow)]
struct Account {
    id: String,
    email: String,
    password_hash: String,
}

/// Caller identity decoded from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> ApiResult<Self> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".into()))?;

        let claims = verify_token(token, &state.config.jwt_secret)?;
        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}

pub fn issue_token(
    user_id: &str,
    email: &str,
    secret: &str,
    ttl: chrono::Duration,
) -> ApiResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| ApiError::Internal("token expiry overflow".into()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_owned(),
        email: email.to_owned(),
        exp: expiration,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ApiError::Internal(format!("JWT encoding failed: {e}")))
}

pub fn verify_token(token: &str, secret: &str) -> ApiResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized("Invalid token".into()))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn is_reasonable_email(email: &str) -> bool {
    if email.len() < 5 || email.len() > 254 {
        return false;
    }
    let mut parts = email.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    parts.next().is_none()
        && !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

async fn hash_password(password: String) -> ApiResult<String> {
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(|_| ApiError::Internal("Password hashing worker failed".into()))?
    .map_err(|_| ApiError::Internal("Password hashing failed".into()))
}

async fn verify_password(password: String, hash: String) -> ApiResult<bool> {
    task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    })
    .await
    .map_err(|_| ApiError::Internal("Password verification worker failed".into()))
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Credentials>,
) -> ApiResult<impl IntoResponse> {
    let email = normalize_email(&payload.email);
    if !is_reasonable_email(&email) {
        return Err(ApiError::BadRequest("Invalid email format".into()));
    }
    if payload.password.len() < 6 || payload.password.len() > 128 {
        return Err(ApiError::BadRequest(
            "Password must be between 6 and 128 characters".into(),
        ));
    }
    tracing::info!("Signup request received for email: {}", email);

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM accounts WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict("User already exists".into()));
    }

    let password_hash = hash_password(payload.password).await?;
    let user_id = generate_document_id();
    let inserted =
        sqlx::query("INSERT INTO accounts (id, email, password_hash) VALUES ($1, $2, $3)")
            .bind(&user_id)
            .bind(&email)
            .bind(&password_hash)
            .execute(&state.db)
            .await;
    if let Err(sqlx::Error::Database(db_err)) = &inserted {
        if db_err.is_unique_violation() {
            return Err(ApiError::Conflict("User already exists".into()));
        }
    }
    inserted?;

    let access_token =
        issue_token(&user_id, &email, &state.config.jwt_secret, state.config.token_ttl)?;
    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            user_id,
            email,
            access_token,
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Credentials>,
) -> ApiResult<Json<SignInResponse>> {
    let email = normalize_email(&payload.email);
    let password_len = payload.password.len();
    if !is_reasonable_email(&email) || password_len == 0 || password_len > 128 {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let account = sqlx::query_as::<_, Account>(
        "SELECT id, email, password_hash FROM accounts WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    if !verify_password(payload.password, account.password_hash.clone()).await? {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let access_token = issue_token(
        &account.id,
        &account.email,
        &state.config.jwt_secret,
        state.config.token_ttl,
    )?;
    tracing::info!("Login succeeded for {}", account.email);
    Ok(Json(SignInResponse {
        user_id: account.id,
        email: account.email,
        access_token,
    }))
}
