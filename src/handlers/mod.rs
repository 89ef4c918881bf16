pub mod about_handlers;
pub mod post_handlers;
pub mod profile_handlers;

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use log::debug;
use serde::Serialize;

/// Post forms may carry a base64 image.
const MAX_FORM_BYTES: usize = 8 * 1024 * 1024;

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

/// 200 with a page context.
pub fn render<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse {
        status: "success".to_string(),
        message: message.to_string(),
        data: Some(data),
    })
}

/// 200 re-rendering a form together with its inline errors.
pub fn render_invalid<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse {
        status: "error".to_string(),
        message: message.to_string(),
        data: Some(data),
    })
}

pub fn redirect(location: impl Into<String>) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location.into()))
        .finish()
}

pub fn profile_url(username: &str) -> String {
    format!("/profile/{}/", urlencoding::encode(username))
}

pub fn post_url(post_id: i64) -> String {
    format!("/posts/{}/", post_id)
}

pub async fn not_found(req: HttpRequest) -> HttpResponse {
    debug!("No route for {} {}", req.method(), req.path());
    HttpResponse::NotFound().json(ApiResponse::<()> {
        status: "error".to_string(),
        message: "Page not found".to_string(),
        data: None,
    })
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::FormConfig::default().limit(MAX_FORM_BYTES))
        .service(post_handlers::index)
        .service(post_handlers::group_posts)
        .service(post_handlers::post_detail)
        .service(post_handlers::create_form)
        .service(post_handlers::create_post)
        .service(post_handlers::edit_form)
        .service(post_handlers::edit_post)
        .service(post_handlers::delete_post)
        .service(post_handlers::add_comment)
        .service(post_handlers::serve_post_image)
        .service(profile_handlers::follow_index)
        .service(profile_handlers::profile)
        .service(profile_handlers::profile_follow)
        .service(profile_handlers::profile_unfollow)
        .service(about_handlers::about_author)
        .service(about_handlers::about_tech);
}
