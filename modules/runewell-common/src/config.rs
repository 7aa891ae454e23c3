use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 5;

/// Application configuration loaded from environment variables.
/// Catalog contents live in the TOML files named here, not in env.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database (in-memory store when unset)
    pub database_url: Option<String>,

    // Web server
    pub api_host: String,
    pub api_port: u16,

    // Catalogs
    pub badge_catalog_path: Option<PathBuf>,
    pub rank_catalog_path: Option<PathBuf>,

    // Engine
    pub max_conflict_retries: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: optional_env("DATABASE_URL"),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("API_PORT must be a number")?,
            badge_catalog_path: optional_env("BADGE_CATALOG_PATH").map(PathBuf::from),
            rank_catalog_path: optional_env("RANK_CATALOG_PATH").map(PathBuf::from),
            max_conflict_retries: match optional_env("PROGRESSION_MAX_RETRIES") {
                Some(v) => v
                    .parse()
                    .context("PROGRESSION_MAX_RETRIES must be a number")?,
                None => DEFAULT_MAX_CONFLICT_RETRIES,
            },
        })
    }

    /// Log the loaded config without leaking credentials.
    pub fn log_redacted(&self) {
        fn redact_url(url: &str) -> String {
            match (url.find("://"), url.rfind('@')) {
                (Some(scheme_end), Some(at)) if at > scheme_end => {
                    format!("{}://***{}", &url[..scheme_end], &url[at..])
                }
                _ => url.to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!(
            "  DATABASE_URL: {}",
            self.database_url
                .as_deref()
                .map(redact_url)
                .unwrap_or_else(|| "<not set, in-memory store>".to_string())
        );
        tracing::info!("  API: {}:{}", self.api_host, self.api_port);
        tracing::info!(
            "  BADGE_CATALOG_PATH: {}",
            display_path(&self.badge_catalog_path)
        );
        tracing::info!(
            "  RANK_CATALOG_PATH: {}",
            display_path(&self.rank_catalog_path)
        );
        tracing::info!("  PROGRESSION_MAX_RETRIES: {}", self.max_conflict_retries);
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<built-in>".to_string())
}
