use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::{session_client, FetchError, VideoSource};

/// Cliente para descargar posts y reels de Instagram
pub struct InstagramClient {
    timeout: Duration,
}

impl InstagramClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Navega la respuesta del endpoint de media hasta el nodo del post
    fn media_node(payload: &Value) -> Option<&Value> {
        payload
            .pointer("/graphql/shortcode_media")
            .or_else(|| payload.pointer("/items/0"))
    }

    fn video_url(media: &Value) -> Option<&str> {
        media
            .get("video_url")
            .and_then(Value::as_str)
            .or_else(|| media.pointer("/video_versions/0/url").and_then(Value::as_str))
    }
}

#[async_trait]
impl VideoSource for InstagramClient {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        info!("📸 Descargando video de Instagram: {}", url);

        // Sesión propia de esta invocación; se cierra al salir
        let client = session_client(self.timeout).map_err(FetchError::Upstream)?;

        let base = url.split('?').next().unwrap_or(url).trim_end_matches('/');
        let info_url = format!("{base}/?__a=1&__d=dis");

        let payload: Value = client
            .get(&info_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("Instagram no respondió al pedido de metadata")?
            .json()
            .await
            .context("respuesta de Instagram no es JSON")?;

        let media = Self::media_node(&payload)
            .ok_or_else(|| anyhow!("la respuesta de Instagram no trae el post"))?;

        // Los posts de solo imágenes no llevan video_url
        let is_video = media
            .get("is_video")
            .and_then(Value::as_bool)
            .unwrap_or_else(|| Self::video_url(media).is_some());
        if !is_video {
            return Err(FetchError::NoVideo);
        }

        let video_url = Self::video_url(media).ok_or(FetchError::NoVideo)?;
        debug!("🎬 URL directa del video obtenida");

        let bytes = client
            .get(video_url)
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
