use crate::handlers::internal_error;
use crate::middleware::auth::{auth_middleware, cookie_value};
use crate::models::api::ApiResponse;
use crate::models::auth::{Claims, ErrorResponse, LoginRequest, RegisterRequest, User};
use crate::AppState;
use axum::{
    extract::Extension,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Json,
    routing::{get, post, Router},
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub fn auth_routes() -> Router {
    let protected = Router::new()
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/auth/authStatus", get(auth_status))
        .route_layer(axum::middleware::from_fn(auth_middleware));

    Router::new()
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/refresh", post(refresh))
        .merge(protected)
}

pub fn create_token(
    user_id: Uuid,
    ttl: Duration,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + ttl).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

/// Returns the claims when the token is well formed, correctly signed and
/// not expired; None otherwise.
pub fn verify_token(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

fn session_cookie(name: &str, value: &str) -> String {
    format!("{}={}; HttpOnly; Secure; SameSite=Lax; Path=/", name, value)
}

fn expired_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0", name)
}

fn append_cookie(
    headers: &mut HeaderMap,
    cookie: &str,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    let value = HeaderValue::from_str(cookie).map_err(internal_error)?;
    headers.append(header::SET_COOKIE, value);
    Ok(())
}

fn invalid_credentials() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            success: false,
            message: "Invalid credentials".to_string(),
        }),
    )
}

async fn register(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, Json<ErrorResponse>)> {
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                success: false,
                message: "Email and password are required".to_string(),
            }),
        ));
    }

    let password_hash = hash(&payload.password, DEFAULT_COST).map_err(internal_error)?;

    // The conflict target makes duplicate registration a no-op instead of
    // a race against a separate existence check.
    let result = sqlx::query(
        "INSERT INTO users (id, email, password) VALUES ($1, $2, $3) ON CONFLICT (email) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(&payload.email)
    .bind(&password_hash)
    .execute(&state.db_pool)
    .await
    .map_err(internal_error)?;

    if result.rows_affected() == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                success: false,
                message: "Email already registered".to_string(),
            }),
        ));
    }

    tracing::info!("✨ Registered new user: {}", payload.email);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully" })),
    ))
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<ApiResponse>), (StatusCode, Json<ErrorResponse>)> {
    let user = sqlx::query_as::<_, User>("SELECT id, email, password FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_optional(&state.db_pool)
        .await
        .map_err(internal_error)?;

    let user = match user {
        Some(user) => user,
        None => return Err(invalid_credentials()),
    };

    match verify(&payload.password, &user.password) {
        Ok(true) => {}
        Ok(false) => return Err(invalid_credentials()),
        Err(e) => return Err(internal_error(e)),
    }

    let settings = &state.settings;
    let access_token = create_token(
        user.id,
        Duration::days(settings.access_token_expire_days),
        &settings.jwt_secret,
    )
    .map_err(internal_error)?;
    let refresh_token = create_token(
        user.id,
        Duration::days(settings.refresh_token_expire_days),
        &settings.jwt_secret,
    )
    .map_err(internal_error)?;

    let mut headers = HeaderMap::new();
    append_cookie(&mut headers, &session_cookie("access_token", &access_token))?;
    append_cookie(&mut headers, &session_cookie("refresh_token", &refresh_token))?;

    tracing::info!("👤 User logged in: {}", user.email);

    Ok((
        headers,
        Json(ApiResponse::new(
            200,
            "Logged in successfully",
            json!({
                "user_id": user.id,
                "email": user.email,
                "access_token": access_token,
            }),
        )),
    ))
}

async fn refresh(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<(HeaderMap, Json<ApiResponse>), (StatusCode, Json<ErrorResponse>)> {
    let invalid = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                success: false,
                message: "Invalid refresh token".to_string(),
            }),
        )
    };

    let claims = cookie_value(&headers, "refresh_token")
        .and_then(|token| verify_token(&token, &state.settings.jwt_secret))
        .ok_or_else(invalid)?;

    let user_id = claims.sub.parse::<Uuid>().map_err(|_| invalid())?;

    let access_token = create_token(
        user_id,
        Duration::days(state.settings.access_token_expire_days),
        &state.settings.jwt_secret,
    )
    .map_err(internal_error)?;

    let mut out = HeaderMap::new();
    append_cookie(&mut out, &session_cookie("access_token", &access_token))?;

    Ok((
        out,
        Json(ApiResponse::new(200, "Access token refreshed", json!({}))),
    ))
}

async fn logout() -> (HeaderMap, Json<ApiResponse>) {
    let mut headers = HeaderMap::new();
    for name in ["access_token", "refresh_token"] {
        if let Ok(value) = HeaderValue::from_str(&expired_cookie(name)) {
            headers.append(header::SET_COOKIE, value);
        }
    }

    (
        headers,
        Json(ApiResponse::new(200, "Logged out successfully", json!({}))),
    )
}

async fn auth_status(Extension(claims): Extension<Claims>) -> Json<serde_json::Value> {
    Json(json!({
        "authenticated": true,
        "user": claims.sub,
    }))
}
