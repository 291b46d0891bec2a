/// Credential transport: cookies, bearer header and request body
///
/// Cookies win when a credential arrives through more than one channel.
use actix_web::{
    cookie::{time, Cookie, SameSite},
    dev::Payload,
    http::header,
    web, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::LocalBoxFuture;
use uuid::Uuid;

use crate::error::AppError;
use crate::security::AccessClaims;
use crate::AppState;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn cookie_token(req: &HttpRequest, name: &str) -> Option<String> {
    req.cookie(name)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// Access token from the `accessToken` cookie, else the bearer header.
pub fn access_token_from(req: &HttpRequest) -> Option<String> {
    cookie_token(req, ACCESS_TOKEN_COOKIE).or_else(|| bearer_token(req))
}

/// Refresh token from the `refreshToken` cookie, else the request body, else
/// the bearer header.
pub fn refresh_token_from(req: &HttpRequest, body_token: Option<&str>) -> Option<String> {
    cookie_token(req, REFRESH_TOKEN_COOKIE)
        .or_else(|| {
            body_token
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
        })
        .or_else(|| bearer_token(req))
}

/// HTTP-only session cookie living as long as the token it carries.
pub fn session_cookie(
    name: &'static str,
    value: String,
    max_age: chrono::Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age.num_seconds()))
        .finish()
}

pub fn expired_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    Cookie::build(name, "")
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .finish()
}

/// Caller identity established from a verified access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub claims: AccessClaims,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = access_token_from(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let state = state
                .ok_or_else(|| AppError::Internal("application state not configured".into()))?;
            let token =
                token.ok_or_else(|| AppError::Unauthorized("Unauthorized request".into()))?;

            let claims = state.tokens.verify_access(&token).await?;
            Ok(AuthenticatedUser {
                user_id: claims.user_id()?,
                claims,
            })
        })
    }
}
