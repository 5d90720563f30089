use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{session_client, FetchError, VideoSource};

const RESOLVER_API: &str = "https://www.tikwm.com/api/";

/// Cliente para descargar videos de TikTok vía el resolvedor público tikwm
pub struct TikTokClient {
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TikwmResponse {
    code: i64,
    msg: Option<String>,
    data: Option<TikwmData>,
}

#[derive(Debug, Deserialize)]
struct TikwmData {
    // URL de reproducción sin marca de agua
    play: Option<String>,
}

impl TikTokClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl VideoSource for TikTokClient {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        info!("🎵 Descargando video de TikTok: {}", url);

        let client = session_client(self.timeout).map_err(FetchError::Upstream)?;

        let response: TikwmResponse = client
            .get(RESOLVER_API)
            .query(&[("url", url)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("el resolvedor de TikTok no respondió")?
            .json()
            .await
            .context("respuesta del resolvedor de TikTok no es JSON")?;

        if response.code != 0 {
            let msg = response.msg.unwrap_or_else(|| "error desconocido".to_string());
            return Err(FetchError::Upstream(anyhow!(
                "el resolvedor de TikTok rechazó la URL: {msg}"
            )));
        }

        let play_url = response
            .data
            .and_then(|data| data.play)
            .ok_or(FetchError::NoVideo)?;
        debug!("🎬 URL directa del video obtenida");

        let bytes = client
            .get(&play_url)
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
