// src/handlers/about_handlers.rs
use actix_web::{get, HttpResponse};

use crate::dtos::profile_dtos::AboutContext;
use crate::handlers::render;

#[get("/about/author/")]
pub async fn about_author() -> HttpResponse {
    render(
        "About the author",
        AboutContext {
            title: "About the author",
            text: "Yatube is a small blogging platform for sharing posts, grouping them by topic and following favourite authors.",
        },
    )
}

#[get("/about/tech/")]
pub async fn about_tech() -> HttpResponse {
    render(
        "Technologies",
        AboutContext {
            title: "Technologies",
            text: "Built with Rust, actix-web and PostgreSQL.",
        },
    )
}
