use crate::db::Db;
use crate::error::ApiError;
use crate::models::{Role, User, UserResponse};
use crate::settings::Settings;
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// ── Auth request/response types ────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub profile_image: Option<String>,
    /// Matching the configured invite token grants the admin role.
    pub admin_invite_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

/// Profile patch. Absent fields stay as they are; a present empty
/// profile_image clears the stored one.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub profile_image: Option<String>,
}

// ── JWT ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid, // user id
    pub email: String,
    pub exp: usize, // expiry timestamp
    pub iat: usize, // issued at
}

// ── Shared state ───────────────────────────────────────────────

pub struct AppState {
    pub db: Db,
    pub settings: Settings,
}

pub type SharedState = Arc<AppState>;

// ── Helpers ────────────────────────────────────────────────────

pub fn create_token(user: &User, settings: &Settings) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiry = now + Duration::hours(settings.jwt_expiration_hours);

    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        exp: expiry.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )
}

pub fn verify_token(token: &str, settings: &Settings) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

pub fn hash_password(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Admin when the supplied invite token matches the configured one.
/// An empty configured token disables invite-based admin signup.
fn role_for_invite(invite: Option<&str>, settings: &Settings) -> Role {
    match invite {
        Some(token) if !settings.admin_invite_token.is_empty() && token == settings.admin_invite_token => {
            Role::Admin
        }
        _ => Role::User,
    }
}

/// The admin gate. Called at the top of every admin-only handler.
pub fn require_admin(user: &User) -> Result<(), ApiError> {
    match user.role {
        Role::Admin => Ok(()),
        Role::User => Err(ApiError::Forbidden("Access denied. Admins only.")),
    }
}

// ── Handlers ───────────────────────────────────────────────────

pub async fn register(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("Name is required"));
    }
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }
    if state.db.get_user_by_email(&payload.email)?.is_some() {
        return Err(ApiError::validation("Email already in use"));
    }

    let user = User {
        id: Uuid::new_v4(),
        name: payload.name,
        email: payload.email,
        password_hash: hash_password(&payload.password),
        profile_image: payload.profile_image,
        role: role_for_invite(payload.admin_invite_token.as_deref(), &state.settings),
        created_at: Utc::now(),
    };

    state.db.create_user(&user)?;
    tracing::info!(user = %user.email, role = ?user.role, "registered");

    let token = create_token(&user, &state.settings)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(AuthResponse {
        token,
        user: user.to_response(),
    }))
}

pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state
        .db
        .get_user_by_email(&payload.email)?
        .ok_or(ApiError::Unauthorized("Invalid credentials"))?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(ApiError::Unauthorized("Invalid credentials"));
    }

    let token = create_token(&user, &state.settings)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(user = %user.email, "logged in");

    Ok(Json(AuthResponse {
        token,
        user: user.to_response(),
    }))
}

pub async fn profile(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(user.to_response())
}

pub async fn update_profile(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let previous_email = user.email.clone();
    let mut user = user;

    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return Err(ApiError::validation("Name cannot be empty"));
        }
        user.name = name;
    }
    if let Some(email) = payload.email {
        if email.trim().is_empty() {
            return Err(ApiError::validation("Email cannot be empty"));
        }
        if email != previous_email && state.db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::validation("Email already in use"));
        }
        user.email = email;
    }
    if let Some(password) = payload.password {
        if password.is_empty() {
            return Err(ApiError::validation("Password cannot be empty"));
        }
        user.password_hash = hash_password(&password);
    }
    if let Some(image) = payload.profile_image {
        // Explicit empty string clears the image
        user.profile_image = if image.is_empty() { None } else { Some(image) };
    }

    state.db.update_user(&previous_email, &user)?;

    // E-mail may have changed — re-issue the token with fresh claims
    let token = create_token(&user, &state.settings)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(AuthResponse {
        token,
        user: user.to_response(),
    }))
}

// ── Middleware ─────────────────────────────────────────────────

/// Verify the bearer token and attach the resolved User to the request.
pub async fn auth_middleware(
    State(state): State<SharedState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        _ => return Err(ApiError::Unauthorized("Missing or invalid token")),
    };

    let claims = verify_token(token, &state.settings)
        .map_err(|_| ApiError::Unauthorized("Invalid token"))?;

    let user = state
        .db
        .get_user(claims.sub)?
        .ok_or(ApiError::Unauthorized("User not found"))?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

// ── Tests ──────────────────────────────────────────────────────
