use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::credentials::{
    expired_cookie, refresh_token_from, session_cookie, AuthenticatedUser, ACCESS_TOKEN_COOKIE,
    REFRESH_TOKEN_COOKIE,
};
use crate::error::{AppError, Result};
use crate::services::{Registration, TokenPair};
use crate::AppState;

/// Success envelope shared by every endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
            message: message.into(),
            success: status.is_success(),
        }
    }
}

fn respond<T: Serialize>(status: StatusCode, data: T, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(ApiResponse::new(status, data, message))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Response with both session cookies set to the new pair.
fn with_session_cookies<T: Serialize>(
    state: &AppState,
    tokens: &TokenPair,
    data: T,
    message: &str,
) -> HttpResponse {
    let keys = state.tokens.keys();
    HttpResponse::Ok()
        .cookie(session_cookie(
            ACCESS_TOKEN_COOKIE,
            tokens.access_token.clone(),
            keys.access_ttl(),
            state.cookie_secure,
        ))
        .cookie(session_cookie(
            REFRESH_TOKEN_COOKIE,
            tokens.refresh_token.clone(),
            keys.refresh_ttl(),
            state.cookie_secure,
        ))
        .json(ApiResponse::new(StatusCode::OK, data, message))
}

fn without_session_cookies(state: &AppState, message: &str) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(expired_cookie(ACCESS_TOKEN_COOKIE, state.cookie_secure))
        .cookie(expired_cookie(REFRESH_TOKEN_COOKIE, state.cookie_secure))
        .json(ApiResponse::new(StatusCode::OK, json!({}), message))
}

pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let profile = state
        .auth
        .register(Registration {
            username: body.username,
            email: body.email,
            full_name: body.full_name,
            password: body.password,
        })
        .await?;

    Ok(respond(
        StatusCode::CREATED,
        profile,
        "User registered successfully",
    ))
}

pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let outcome = state
        .auth
        .login(
            body.username.as_deref(),
            body.email.as_deref(),
            &body.password,
        )
        .await?;

    Ok(with_session_cookies(
        &state,
        &outcome.tokens,
        &outcome,
        "User logged in successfully",
    ))
}

pub async fn refresh_token(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
) -> Result<HttpResponse> {
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let presented = refresh_token_from(&req, body.refresh_token.as_deref())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized request".into()))?;

    let tokens = state.tokens.refresh(&presented).await?;

    Ok(with_session_cookies(
        &state,
        &tokens,
        &tokens,
        "Access token refreshed",
    ))
}

pub async fn logout(state: web::Data<AppState>, user: AuthenticatedUser) -> Result<HttpResponse> {
    state.auth.logout(user.user_id).await?;
    Ok(without_session_cookies(&state, "User logged out"))
}

pub async fn current_user(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let profile = state.auth.current_user(user.user_id).await?;
    Ok(respond(StatusCode::OK, profile, "User fetched successfully"))
}

pub async fn change_password(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse> {
    state
        .auth
        .change_password(user.user_id, &body.old_password, &body.new_password)
        .await?;
    Ok(without_session_cookies(&state, "Password changed successfully"))
}

pub async fn watch_history(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let history = state.engagement.history().history(user.user_id).await?;
    Ok(respond(
        StatusCode::OK,
        history,
        "Watch history fetched successfully",
    ))
}

/// Count a view and record it in the caller's history. Sub-step failures are
/// reported in the body; only an unknown video fails the request.
pub async fn record_view(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let video_id = path.into_inner();
    state.engagement.view_count(video_id).await?;

    let report = state.engagement.on_video_viewed(user.user_id, video_id).await;
    Ok(respond(StatusCode::OK, report, "View recorded"))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn metrics() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(crate::metrics::gather_metrics())
}
