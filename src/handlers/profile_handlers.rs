// src/handlers/profile_handlers.rs
use actix_web::{get, web, HttpResponse};
use log::debug;

use crate::dtos::post_dtos::{FollowIndexContext, PageQuery};
use crate::dtos::profile_dtos::ProfileContext;
use crate::handlers::{profile_url, redirect, render};
use crate::middleware::auth_extractor::AuthenticatedUser;
use crate::services::content_service::ContentError;
use crate::AppState;

/// GET /profile/{username}/
#[get("/profile/{username}/")]
pub async fn profile(
    app_state: web::Data<AppState>,
    viewer: Option<AuthenticatedUser>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ContentError> {
    let username = path.into_inner();
    let viewer_id = viewer.map(|v| v.user_id);
    let page = app_state
        .content
        .profile_page(&username, viewer_id, query.number())
        .await?;
    Ok(render(
        "Profile retrieved successfully",
        ProfileContext::new(page, viewer_id),
    ))
}

/// GET /follow/
/// Posts by the authors the current user follows.
#[get("/follow/")]
pub async fn follow_index(
    app_state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ContentError> {
    let page_obj = app_state
        .content
        .list_followed_posts(user.user_id, query.number())
        .await?;
    Ok(render(
        "Followed posts retrieved successfully",
        FollowIndexContext {
            follow: true,
            page_obj,
        },
    ))
}

#[get("/profile/{username}/follow/")]
pub async fn profile_follow(
    app_state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ContentError> {
    let author = app_state
        .content
        .follow_by_username(user.user_id, &path)
        .await?;
    debug!("{} follows {}", user.username, author.username);
    Ok(redirect(profile_url(&author.username)))
}

#[get("/profile/{username}/unfollow/")]
pub async fn profile_unfollow(
    app_state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ContentError> {
    let author = app_state
        .content
        .unfollow_by_username(user.user_id, &path)
        .await?;
    debug!("{} unfollowed {}", user.username, author.username);
    Ok(redirect(profile_url(&author.username)))
}
