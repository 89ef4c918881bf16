// src/middleware/auth_extractor.rs
use actix_web::error::{ErrorInternalServerError, InternalError};
use actix_web::http::header;
use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest, HttpResponse};
use futures::future::{ready, LocalBoxFuture};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::debug;

use crate::models::user::JwtClaims;
use crate::AppState;

/// Cookie the auth subsystem sets for browser sessions.
pub const SESSION_COOKIE: &str = "access_token";

/// Caller identity established by the external auth subsystem.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub username: String,
}

/// Verifies the session token, then mirrors the caller into the local
/// users table so the id can own posts and follow edges.
impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<AuthenticatedUser, Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
            return Box::pin(ready(Err(ErrorInternalServerError("application state missing"))));
        };

        let user = match authenticate(req, &state.jwt_secret) {
            Ok(user) => user,
            Err(reason) => {
                debug!("Anonymous request to {}: {}", req.path(), reason);
                return Box::pin(ready(Err(login_redirect(req, &state.login_url))));
            }
        };

        Box::pin(async move {
            state.content.sync_user(user.user_id, &user.username).await?;
            Ok::<_, Error>(user)
        })
    }
}

fn token_from_request(req: &HttpRequest) -> Option<String> {
    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        return value
            .to_str()
            .ok()
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());
    }
    req.cookie(SESSION_COOKIE).map(|c| c.value().to_string())
}

fn authenticate(req: &HttpRequest, secret: &str) -> Result<AuthenticatedUser, String> {
    let token = token_from_request(req).ok_or("no session token")?;
    let claims = decode_token(&token, secret)?;
    let user_id = claims
        .sub
        .parse::<i64>()
        .map_err(|e| format!("invalid subject: {}", e))?;
    Ok(AuthenticatedUser {
        user_id,
        username: claims.username,
    })
}

/// Verifies signature and expiry of an HS256 session token.
pub fn decode_token(token: &str, secret: &str) -> Result<JwtClaims, String> {
    decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("invalid token: {}", e))
}

/// 302 to the login page carrying the current path as `next`.
fn login_redirect(req: &HttpRequest, login_url: &str) -> Error {
    let next = match req.query_string() {
        "" => req.path().to_string(),
        query => format!("{}?{}", req.path(), query),
    };
    let location = format!("{}?next={}", login_url, urlencoding::encode(&next));
    let response = HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish();
    InternalError::from_response("login required", response).into()
}
