//! # Downloader Module
//!
//! Canalización caché-primero para obtener videos de redes sociales.
//!
//! Una petición recorre siempre el mismo camino: extraer el id estable de
//! la URL, consultar el caché en disco y, solo en caso de miss, invocar al
//! fetcher de la plataforma a través del puente síncrono, escribir el
//! archivo de forma atómica y registrar la entrada nueva. El camino rápido
//! (hit de caché) no toca la red bajo ninguna circunstancia.
//!
//! No hay coalescencia de peticiones: dos misses concurrentes para el mismo
//! id descargan los dos y el último `insert` gana. El registro durable
//! nunca queda roto porque cada mutación del caché es atómica respecto a su
//! propia escritura.

pub mod bridge;
pub mod extractor;

use anyhow::Result;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{CacheStats, VideoCache};
use crate::config::Config;
use crate::sources::{FetchError, HttpShortLinkResolver, SourceManager};
use extractor::{Platform, ShortLinkResolver};

/// Error de la canalización de descarga.
///
/// Siempre se devuelve como valor; es trabajo de la capa de transporte
/// convertirlo en un mensaje para el usuario.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    InvalidUrl(#[from] extractor::ParseError),
    #[error("error obteniendo el video de {platform}: {reason}")]
    UpstreamFetchFailed { platform: Platform, reason: String },
    #[error("la publicación no contiene un video")]
    NoVideoPresent,
    #[error("error de almacenamiento local: {0}")]
    StorageFailure(String),
    #[error("{0}")]
    InternalBridgeFailure(String),
}

/// Resultado de una descarga: la ruta del archivo o el error, nunca ambos
pub type DownloadResult = Result<PathBuf, DownloadError>;

/// Orquestador de descargas con caché en disco.
///
/// Toda la configuración llega por el constructor; no hay estado global.
/// La misma instancia la comparten los handlers del bot y el trabajo
/// periódico de limpieza.
pub struct VideoDownloader {
    cache: VideoCache,
    sources: SourceManager,
    resolver: Box<dyn ShortLinkResolver>,
    retention: Duration,
}

impl VideoDownloader {
    /// Construye el descargador: prepara los directorios, carga el registro
    /// del caché y corre la limpieza inicial (vaciado completo si la
    /// configuración lo pide).
    pub fn new(config: &Config) -> Result<Self> {
        let cache = VideoCache::new(&config.download_dir)?;

        if config.clear_cache_on_startup {
            info!("🧨 CLEAR_CACHE_ON_STARTUP activo, vaciando el caché");
            cache.clear_all();
        }

        let downloader = Self {
            cache,
            sources: SourceManager::new(config.fetch_timeout),
            resolver: Box::new(HttpShortLinkResolver::new(config.fetch_timeout)),
            retention: config.cache_retention,
        };

        downloader.run_eviction();
        info!("📦 {}", downloader.cache_stats());

        Ok(downloader)
    }

    #[cfg(test)]
    fn with_parts(
        cache: VideoCache,
        sources: SourceManager,
        resolver: Box<dyn ShortLinkResolver>,
        retention: Duration,
    ) -> Self {
        Self {
            cache,
            sources,
            resolver,
            retention,
        }
    }

    /// Obtiene el video de `url`, del caché si ya lo tenemos o descargándolo
    /// de la plataforma si no.
    pub fn obtain(&self, platform: Platform, url: &str) -> DownloadResult {
        let video_id = extractor::extract(platform, url, self.resolver.as_ref())?;

        if self.cache.lookup(platform, &video_id).is_some() {
            if let Some(path) = self.cache.validate_and_touch(platform, &video_id) {
                info!("🎯 Video en caché: {}/{}", platform, video_id);
                return Ok(path);
            }
            // El archivo desapareció: seguimos como si fuera un miss
        }

        info!("⬇️ Descargando {}/{}", platform, video_id);
        let source = self.sources.for_platform(platform);

        let outcome = bridge::run_to_completion(source.fetch(url))
            .map_err(|e| DownloadError::InternalBridgeFailure(e.to_string()))?;

        let bytes = outcome.map_err(|e| match e {
            FetchError::NoVideo => DownloadError::NoVideoPresent,
            FetchError::Upstream(err) => DownloadError::UpstreamFetchFailed {
                platform,
                reason: bridge::sanitize_message(&format!("{err:#}")),
            },
        })?;

        let final_path = self.cache.media_path(platform, &video_id);
        self.place_atomically(platform, &bytes, &final_path)?;

        self.cache
            .insert(platform, &video_id, final_path.clone())
            .map_err(|e| DownloadError::StorageFailure(format!("{e:#}")))?;

        info!(
            "✅ Video guardado: {} ({} bytes)",
            final_path.display(),
            bytes.len()
        );
        Ok(final_path)
    }

    /// Punto de entrada para el trabajo periódico de limpieza
    pub fn run_eviction(&self) -> usize {
        self.cache.evict_expired(Utc::now(), self.retention)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Escribe los bytes en un archivo temporal del mismo directorio y lo
    /// renombra a la ruta final: ningún lector puede observar un video a
    /// medio escribir.
    fn place_atomically(
        &self,
        platform: Platform,
        bytes: &[u8],
        final_path: &Path,
    ) -> Result<(), DownloadError> {
        let dir = self.cache.platform_dir(platform);
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| DownloadError::StorageFailure(e.to_string()))?;

        tmp.write_all(bytes)
            .map_err(|e| DownloadError::StorageFailure(e.to_string()))?;

        tmp.persist(final_path).map_err(|e| {
            warn!("Error colocando el video en {}: {:?}", final_path.display(), e);
            DownloadError::StorageFailure(e.to_string())
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::extractor::MockShortLinkResolver;
    use crate::sources::MockVideoSource;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    const RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

    fn downloader(dir: &Path, instagram: MockVideoSource, retention: Duration) -> VideoDownloader {
        VideoDownloader::with_parts(
            VideoCache::new(dir).unwrap(),
            SourceManager::with_sources(
                Box::new(instagram),
                Box::new(MockVideoSource::new()),
                Box::new(MockVideoSource::new()),
            ),
            Box::new(MockShortLinkResolver::new()),
            retention,
        )
    }

    fn instagram_source(times: usize) -> MockVideoSource {
        let mut source = MockVideoSource::new();
        source
            .expect_fetch()
            .times(times)
            .returning(|_| Ok(Bytes::from_static(b"bytes de video")));
        source
    }

    #[test]
    fn test_miss_fetches_writes_and_registers() {
        let dir = tempdir().unwrap();
        let dl = downloader(dir.path(), instagram_source(1), RETENTION);

        let path = dl
            .obtain(Platform::Instagram, "https://www.instagram.com/reel/ABC123/")
            .unwrap();

        assert!(path.ends_with("instagram/ABC123.mp4"));
        assert_eq!(fs::read(&path).unwrap(), b"bytes de video");
        assert_eq!(dl.cache_stats().instagram, 1);
    }

    #[test]
    fn test_second_obtain_is_served_from_cache() {
        let dir = tempdir().unwrap();
        // El mock cuenta las invocaciones: la segunda llamada no debe llegar
        let dl = downloader(dir.path(), instagram_source(1), RETENTION);
        let url = "https://www.instagram.com/reel/ABC123/";

        let first = dl.obtain(Platform::Instagram, url).unwrap();
        let second = dl.obtain(Platform::Instagram, url).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_externally_deleted_file_triggers_refetch() {
        let dir = tempdir().unwrap();
        let dl = downloader(dir.path(), instagram_source(2), RETENTION);
        let url = "https://www.instagram.com/p/Cxyz/";

        let path = dl.obtain(Platform::Instagram, url).unwrap();
        fs::remove_file(&path).unwrap();

        let again = dl.obtain(Platform::Instagram, url).unwrap();
        assert_eq!(path, again);
        assert!(again.exists());
    }

    #[test]
    fn test_invalid_url_never_reaches_the_fetcher() {
        let dir = tempdir().unwrap();
        // Sin expectativas: cualquier fetch haría fallar el test
        let dl = downloader(dir.path(), MockVideoSource::new(), RETENTION);

        let err = dl
            .obtain(Platform::Instagram, "https://www.instagram.com/usuario/")
            .unwrap_err();

        assert!(matches!(err, DownloadError::InvalidUrl(_)));
    }

    #[test]
    fn test_no_video_leaves_cache_untouched() {
        let dir = tempdir().unwrap();
        let mut source = MockVideoSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|_| Err(FetchError::NoVideo));
        let dl = downloader(dir.path(), source, RETENTION);

        let err = dl
            .obtain(Platform::Instagram, "https://www.instagram.com/p/FOTO/")
            .unwrap_err();

        assert!(matches!(err, DownloadError::NoVideoPresent));
        assert_eq!(dl.cache_stats().total(), 0);
    }

    #[test]
    fn test_upstream_failure_leaves_no_partial_state() {
        let dir = tempdir().unwrap();
        let mut source = MockVideoSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|_| Err(FetchError::Upstream(anyhow::anyhow!("HTTP 503"))));
        let dl = downloader(dir.path(), source, RETENTION);

        let err = dl
            .obtain(Platform::Instagram, "https://www.instagram.com/reel/ABC123/")
            .unwrap_err();

        match err {
            DownloadError::UpstreamFetchFailed { platform, reason } => {
                assert_eq!(platform, Platform::Instagram);
                assert_eq!(reason, "HTTP 503");
            }
            other => panic!("error inesperado: {other:?}"),
        }
        assert_eq!(dl.cache_stats().total(), 0);
        assert!(!dir.path().join("instagram").join("ABC123.mp4").exists());
    }

    #[test]
    fn test_upstream_error_with_internal_artifacts_is_sanitized() {
        let dir = tempdir().unwrap();
        let mut source = MockVideoSource::new();
        source
            .expect_fetch()
            .returning(|_| Err(FetchError::Upstream(anyhow::anyhow!("JoinError: task 7"))));
        let dl = downloader(dir.path(), source, RETENTION);

        let err = dl
            .obtain(Platform::Instagram, "https://www.instagram.com/reel/ABC123/")
            .unwrap_err();

        match err {
            DownloadError::UpstreamFetchFailed { reason, .. } => {
                assert!(!reason.contains("JoinError"));
            }
            other => panic!("error inesperado: {other:?}"),
        }
    }

    #[test]
    fn test_eviction_then_refetch() {
        let dir = tempdir().unwrap();
        // Retención cero: cualquier entrada con edad medible expira
        let dl = downloader(dir.path(), instagram_source(2), Duration::ZERO);
        let url = "https://www.instagram.com/reel/ABC123/";

        let path = dl.obtain(Platform::Instagram, url).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(dl.run_eviction(), 1);
        assert!(!path.exists());

        let again = dl.obtain(Platform::Instagram, url).unwrap();
        assert!(again.exists());
    }

    #[test]
    fn test_tiktok_short_link_goes_through_resolver() {
        let dir = tempdir().unwrap();
        let mut tiktok = MockVideoSource::new();
        tiktok
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(Bytes::from_static(b"tiktok")));

        let mut resolver = MockShortLinkResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_| Ok("https://www.tiktok.com/@usuario/video/999".to_string()));

        let dl = VideoDownloader::with_parts(
            VideoCache::new(dir.path()).unwrap(),
            SourceManager::with_sources(
                Box::new(MockVideoSource::new()),
                Box::new(tiktok),
                Box::new(MockVideoSource::new()),
            ),
            Box::new(resolver),
            RETENTION,
        );

        let path = dl
            .obtain(Platform::TikTok, "https://vm.tiktok.com/ZMabc/")
            .unwrap();
        assert!(path.ends_with("tiktok/999.mp4"));
    }
}
