use anyhow::{anyhow, Context, Result};
use async_process::Command;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{session_client, FetchError, VideoSource};

/// Cliente para descargar videos de YouTube vía yt-dlp
pub struct YouTubeClient {
    timeout: Duration,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    // URL directa del formato elegido con -f
    url: Option<String>,
}

impl YouTubeClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Pide a yt-dlp la metadata del video como JSON estructurado.
    ///
    /// El subproceso corre bajo el mismo tiempo límite que la descarga HTTP;
    /// un yt-dlp colgado no puede bloquear la petición indefinidamente.
    async fn probe(&self, url: &str) -> Result<YtDlpInfo> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new("yt-dlp")
                .args([
                    "--no-playlist",
                    "--dump-json",
                    "--no-warnings",
                    "-f",
                    "mp4/best",
                    url,
                ])
                .output(),
        )
        .await
        .map_err(|_| anyhow!("yt-dlp no respondió dentro del tiempo límite"))?
        .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let info: YtDlpInfo =
            serde_json::from_str(&stdout).context("Error al parsear respuesta de yt-dlp")?;
        Ok(info)
    }
}

#[async_trait]
impl VideoSource for YouTubeClient {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        info!("▶️ Descargando video de YouTube: {}", url);

        let info = self.probe(url).await.map_err(FetchError::Upstream)?;
        debug!(
            "🎬 yt-dlp resolvió {} ({})",
            info.id,
            info.title.as_deref().unwrap_or("sin título")
        );

        // Sin formato descargable no hay video que mandar
        let media_url = info.url.ok_or(FetchError::NoVideo)?;

        let client = session_client(self.timeout).map_err(FetchError::Upstream)?;
        let bytes = client
            .get(&media_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("no se pudo descargar el archivo de video")?
            .bytes()
            .await
            .context("descarga de video interrumpida")?;

        Ok(bytes)
    }
}
