pub mod content_service;
pub mod media_service;
pub mod paginator;
