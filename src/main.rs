// src/main.rs
mod config;
mod dtos;
mod handlers;
mod middleware;
mod models;
mod repositories;
mod services;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{error, info};

use crate::config::{mask_key, AppConfig, StorageBackend};
use crate::repositories::memory_repository::MemoryContentStore;
use crate::repositories::pg_repository::PgContentStore;
use crate::repositories::ContentStore;
use crate::services::content_service::ContentService;
use crate::services::media_service::MediaStorage;

#[derive(Clone)]
pub struct AppState {
    pub content: ContentService,
    pub jwt_secret: String,
    pub login_url: String,
}

async fn build_store(backend: StorageBackend) -> anyhow::Result<Arc<dyn ContentStore>> {
    match backend {
        StorageBackend::Postgres => {
            let store = PgContentStore::new(config::get_pg_pool()?);
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(MemoryContentStore::new()))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("JWT secret: {}", mask_key(&config.jwt_secret));
    info!("Media root: {}", config.media_root.display());

    let store = match build_store(config.storage).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to initialise storage: {:#}", e);
            std::process::exit(1);
        }
    };

    let content = ContentService::new(
        store,
        MediaStorage::new(config.media_root.clone()),
        config.index_cache_ttl,
    );
    match content.seed_groups(&config.seed_groups).await {
        Ok(0) => {}
        Ok(n) => info!("Seeded {} group(s)", n),
        Err(e) => {
            error!("Failed to seed groups: {}", e);
            std::process::exit(1);
        }
    }

    let state = web::Data::new(AppState {
        content,
        jwt_secret: config.jwt_secret.clone(),
        login_url: config.login_url.clone(),
    });

    let bind_address = config.bind_address();
    let allowed_origins = config.allowed_origins.clone();
    info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["authorization", "content-type", "accept", "x-requested-with"])
            .supports_credentials()
            .max_age(3600);

        for origin in &allowed_origins {
            cors = cors.allowed_origin(origin);
        }

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(handlers::configure_routes)
            .default_service(web::to(handlers::not_found))
    })
    .bind(&bind_address)?
    .run()
    .await
}
