use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,

    // Descargas
    pub download_dir: PathBuf,
    pub fetch_timeout: Duration,

    // Caché
    pub cache_retention: Duration,
    pub clear_cache_on_startup: bool,
    pub cleanup_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,

            // Descargas
            download_dir: std::env::var("DOWNLOAD_DIR")
                .unwrap_or_else(|_| "downloads".to_string())
                .into(),
            fetch_timeout: humantime::parse_duration(
                &std::env::var("FETCH_TIMEOUT").unwrap_or_else(|_| "60s".to_string()),
            )?,

            // Caché
            cache_retention: humantime::parse_duration(
                &std::env::var("CACHE_RETENTION").unwrap_or_else(|_| "24h".to_string()),
            )?,
            clear_cache_on_startup: std::env::var("CLEAR_CACHE_ON_STARTUP")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
            cleanup_interval: humantime::parse_duration(
                // Mismo ritmo que el job original: cada 6 horas
                &std::env::var("CLEANUP_INTERVAL").unwrap_or_else(|_| "6h".to_string()),
            )?,
        };

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.download_dir)?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_retention.is_zero() {
            anyhow::bail!("CACHE_RETENTION debe ser mayor que cero");
        }

        if self.fetch_timeout.is_zero() {
            anyhow::bail!("FETCH_TIMEOUT debe ser mayor que cero");
        }

        if self.cleanup_interval < Duration::from_secs(60) {
            anyhow::bail!(
                "CLEANUP_INTERVAL demasiado corto (mínimo 1m), recibido: {:?}",
                self.cleanup_interval
            );
        }

        Ok(())
    }

    /// Resumen seguro para logs: nunca incluye el token
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Descargas: {} (timeout {})\n  \
            Caché: retención {}, limpieza cada {}, clear_on_startup={}",
            self.download_dir.display(),
            humantime::format_duration(self.fetch_timeout),
            humantime::format_duration(self.cache_retention),
            humantime::format_duration(self.cleanup_interval),
            self.clear_cache_on_startup,
        )
    }
}

/// Valores por defecto, usados como fallback cuando no hay variables de
/// entorno definidas.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin default - debe proveerse)
            discord_token: String::new(),

            // Descargas
            download_dir: "downloads".into(),
            fetch_timeout: Duration::from_secs(60),

            // Caché
            cache_retention: Duration::from_secs(24 * 60 * 60),
            clear_cache_on_startup: false,
            cleanup_interval: Duration::from_secs(6 * 60 * 60),
        }
    }
}
