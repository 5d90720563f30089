use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Plataformas de video soportadas por el bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    TikTok,
    YouTube,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
            Platform::YouTube => "youtube",
        }
    }

    /// Detecta la plataforma a partir del texto de un mensaje
    pub fn detect(text: &str) -> Option<Platform> {
        if text.contains("instagram.com") {
            Some(Platform::Instagram)
        } else if text.contains("tiktok.com") || text.contains("vm.tiktok.com") {
            Some(Platform::TikTok)
        } else if text.contains("youtube.com") || text.contains("youtu.be") {
            Some(Platform::YouTube)
        } else {
            None
        }
    }

    pub fn all() -> [Platform; 3] {
        [Platform::Instagram, Platform::TikTok, Platform::YouTube]
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// La URL no tiene ninguna de las formas reconocidas para la plataforma.
/// Es un valor de retorno normal, nunca un panic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("URL de {platform} no reconocida: {url}")]
pub struct ParseError {
    pub platform: Platform,
    pub url: String,
}

/// Resuelve enlaces cortos siguiendo sus redirects (efecto de red).
/// Solo la rama de enlaces cortos de TikTok lo necesita.
#[cfg_attr(test, mockall::automock)]
pub trait ShortLinkResolver: Send + Sync {
    fn resolve(&self, url: &str) -> anyhow::Result<String>;
}

/// Extrae el identificador estable del video a partir de la URL.
///
/// Reglas por plataforma:
/// - Instagram: segmento tras `/p/` o `/reel/`, hasta la siguiente `/`.
/// - TikTok: segmento tras `/video/` sin `?query`; los enlaces cortos
///   `vm.tiktok.com` se resuelven primero; `m.tiktok.com/v/<id>.html`
///   toma el segmento antes del primer `.`.
/// - YouTube: valor de `v=` en URLs `watch`, segmento tras `youtu.be/`
///   o tras `/shorts/`.
pub fn extract(
    platform: Platform,
    url: &str,
    resolver: &dyn ShortLinkResolver,
) -> Result<String, ParseError> {
    let id = match platform {
        Platform::Instagram => extract_instagram(url),
        Platform::TikTok => extract_tiktok(url, resolver),
        Platform::YouTube => extract_youtube(url),
    };

    id.ok_or_else(|| ParseError {
        platform,
        url: url.to_string(),
    })
}

fn extract_instagram(url: &str) -> Option<String> {
    let rest = url
        .split_once("/p/")
        .or_else(|| url.split_once("/reel/"))
        .map(|(_, rest)| rest)?;

    let shortcode = rest.split('/').next()?;
    non_empty(shortcode)
}

fn extract_tiktok(url: &str, resolver: &dyn ShortLinkResolver) -> Option<String> {
    if url.contains("/video/") {
        return tiktok_video_segment(url);
    }

    if url.contains("vm.tiktok.com") {
        // El enlace corto no lleva el id: hay que seguir el redirect
        let final_url = resolver.resolve(url).ok()?;
        return tiktok_video_segment(&final_url);
    }

    if url.contains("m.tiktok.com/v/") {
        // Formato legado: /v/<id>.html
        let rest = url.split_once("/v/").map(|(_, rest)| rest)?;
        return non_empty(rest.split('.').next()?);
    }

    None
}

fn tiktok_video_segment(url: &str) -> Option<String> {
    let rest = url.split_once("/video/").map(|(_, rest)| rest)?;
    let id = rest.split('/').next()?.split('?').next()?;
    non_empty(id)
}

fn extract_youtube(url: &str) -> Option<String> {
    if url.contains("watch") {
        let watch_regex = Regex::new(r"[?&]v=([^&]+)").ok()?;
        let id = watch_regex.captures(url)?.get(1)?.as_str();
        return non_empty(id);
    }

    if let Some((_, rest)) = url.split_once("youtu.be/") {
        return non_empty(rest.split('?').next()?);
    }

    if let Some((_, rest)) = url.split_once("/shorts/") {
        return non_empty(rest.split('?').next()?);
    }

    None
}

fn non_empty(id: &str) -> Option<String> {
    (!id.is_empty()).then(|| id.to_string())
}
