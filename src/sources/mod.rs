pub mod instagram;
pub mod tiktok;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use instagram::InstagramClient;
pub use tiktok::TikTokClient;
pub use youtube::YouTubeClient;

use crate::downloader::bridge;
use crate::downloader::extractor::{Platform, ShortLinkResolver};

/// Error de un fetcher de plataforma
#[derive(Debug, Error)]
pub enum FetchError {
    /// La publicación existe pero no tiene video
    #[error("la publicación no contiene un video")]
    NoVideo,
    /// Cualquier otro fallo hablando con la plataforma
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

/// Trait común para todas las fuentes de video.
///
/// La forma de la URL ya viene validada por el extractor; aquí solo queda
/// hablar con la plataforma.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Descarga los bytes crudos del video al que apunta la URL.
    ///
    /// Cada invocación abre su propia sesión HTTP y la cierra al salir,
    /// también en los caminos de error.
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Manager para todas las fuentes de video
pub struct SourceManager {
    instagram: Box<dyn VideoSource>,
    tiktok: Box<dyn VideoSource>,
    youtube: Box<dyn VideoSource>,
}

impl SourceManager {
    pub fn new(fetch_timeout: Duration) -> Self {
        Self {
            instagram: Box::new(InstagramClient::new(fetch_timeout)),
            tiktok: Box::new(TikTokClient::new(fetch_timeout)),
            youtube: Box::new(YouTubeClient::new(fetch_timeout)),
        }
    }

    #[cfg(test)]
    pub fn with_sources(
        instagram: Box<dyn VideoSource>,
        tiktok: Box<dyn VideoSource>,
        youtube: Box<dyn VideoSource>,
    ) -> Self {
        Self {
            instagram,
            tiktok,
            youtube,
        }
    }

    /// Fuente responsable de una plataforma
    pub fn for_platform(&self, platform: Platform) -> &dyn VideoSource {
        match platform {
            Platform::Instagram => self.instagram.as_ref(),
            Platform::TikTok => self.tiktok.as_ref(),
            Platform::YouTube => self.youtube.as_ref(),
        }
    }
}

/// Resuelve enlaces cortos siguiendo los redirects con una petición HEAD.
///
/// La petición corre sobre el puente síncrono igual que los fetches: un
/// runtime de un solo uso por llamada y la sesión HTTP con alcance acotado.
pub struct HttpShortLinkResolver {
    timeout: Duration,
}

impl HttpShortLinkResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ShortLinkResolver for HttpShortLinkResolver {
    fn resolve(&self, url: &str) -> Result<String> {
        let timeout = self.timeout;
        let url = url.to_string();

        let resolved = bridge::run_to_completion(async move {
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            let response = client.head(&url).send().await?;
            Ok::<String, anyhow::Error>(response.url().to_string())
        })
        .map_err(|e| anyhow::anyhow!("{e}"))??;

        debug!("🔗 Enlace corto resuelto a: {}", resolved);
        Ok(resolved)
    }
}

/// Construye el cliente HTTP de sesión para un único fetch
pub(crate) fn session_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(
            "Mozilla/5.0 (Linux; Android 11; SM-A515F) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
        )
        .build()?;
    Ok(client)
}
