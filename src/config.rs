use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime};
use tokio_postgres::NoTls;

use crate::models::group::NewGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub jwt_secret: String,
    pub login_url: String,
    pub media_root: PathBuf,
    pub index_cache_ttl: Duration,
    pub storage: StorageBackend,
    /// Groups created at startup when their slug is free.
    pub seed_groups: Vec<NewGroup>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a port number")?;

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET not set")?;

        let index_cache_ttl = env::var("INDEX_CACHE_SECONDS")
            .unwrap_or_else(|_| "20".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("INDEX_CACHE_SECONDS must be a number of seconds")?;

        let storage = parse_storage(&env::var("STORAGE_BACKEND").unwrap_or_else(|_| "postgres".into()))?;
        let seed_groups = parse_seed_groups(&env::var("SEED_GROUPS").unwrap_or_default())?;

        Ok(Self {
            port,
            allowed_origins,
            jwt_secret,
            login_url: env::var("LOGIN_URL").unwrap_or_else(|_| "/auth/login/".into()),
            media_root: PathBuf::from(env::var("MEDIA_ROOT").unwrap_or_else(|_| "media".into())),
            index_cache_ttl,
            storage,
            seed_groups,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_storage(value: &str) -> Result<StorageBackend> {
    match value.trim().to_ascii_lowercase().as_str() {
        "postgres" | "pg" => Ok(StorageBackend::Postgres),
        "memory" => Ok(StorageBackend::Memory),
        other => bail!("unknown STORAGE_BACKEND `{}` (expected postgres or memory)", other),
    }
}

/// `slug=Title;other-slug=Other title`
fn parse_seed_groups(value: &str) -> Result<Vec<NewGroup>> {
    value
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let Some((slug, title)) = entry.split_once('=') else {
                bail!("SEED_GROUPS entry `{}` must look like slug=Title", entry);
            };
            Ok(NewGroup {
                title: title.trim().to_string(),
                slug: slug.trim().to_string(),
                description: String::new(),
            })
        })
        .collect()
}

pub fn get_pg_pool() -> Result<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(env::var("PG_HOST").context("PG_HOST not set")?);
    cfg.port = match env::var("PG_PORT") {
        Ok(port) => Some(port.parse::<u16>().context("PG_PORT must be a port number")?),
        Err(_) => None,
    };
    cfg.user = Some(env::var("PG_USER").context("PG_USER not set")?);
    cfg.password = env::var("PG_PASS").ok();
    cfg.dbname = Some(env::var("PG_DB").context("PG_DB not set")?);

    let mut pool_cfg = cfg.pool.take().unwrap_or_default();
    pool_cfg.max_size = 16;
    cfg.pool = Some(pool_cfg);

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .context("failed to create postgres pool")
}

/// Masks a secret for logging, keeping only its edges.
pub fn mask_key(k: &str) -> String {
    let chars: Vec<char> = k.chars().collect();
    if chars.len() <= 8 {
        "[REDACTED]".to_string()
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_names() {
        assert_eq!(parse_storage("postgres").unwrap(), StorageBackend::Postgres);
        assert_eq!(parse_storage(" Memory ").unwrap(), StorageBackend::Memory);
        assert!(parse_storage("sqlite").is_err());
    }

    #[test]
    fn seed_groups_parse_slug_title_pairs() {
        assert!(parse_seed_groups("").unwrap().is_empty());

        let groups = parse_seed_groups("cats=Cats; dogs = Dogs and puppies ;").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].slug, "dogs");
        assert_eq!(groups[1].title, "Dogs and puppies");

        assert!(parse_seed_groups("cats").is_err());
    }

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_key("short"), "[REDACTED]");
        assert_eq!(mask_key("abcdefghijkl"), "abcd***ijkl");
    }
}
