use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::downloader::extractor::Platform;

const METADATA_FILE: &str = "cache_metadata.json";

/// Entrada del registro de caché para un video descargado
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub file_path: PathBuf,
    pub last_accessed: DateTime<Utc>,
}

type CacheMap = HashMap<Platform, HashMap<String, CacheEntry>>;

/// Caché persistente de videos particionado por plataforma.
///
/// El mapa en memoria y el registro durable se mutan siempre dentro de la
/// misma sección crítica, de modo que el trabajo periódico de limpieza y
/// las descargas concurrentes nunca observan un registro a medio escribir.
pub struct VideoCache {
    base_dir: PathBuf,
    metadata_path: PathBuf,
    entries: Mutex<CacheMap>,
}

impl VideoCache {
    /// Crea el caché sobre `base_dir`, creando los directorios por
    /// plataforma y cargando el registro existente si lo hay.
    pub fn new(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir)
            .with_context(|| format!("no se pudo crear {}", base_dir.display()))?;

        for platform in Platform::all() {
            fs::create_dir_all(base_dir.join(platform.as_str()))?;
        }

        let metadata_path = base_dir.join(METADATA_FILE);
        let entries = load_metadata(&metadata_path);

        let cache = Self {
            base_dir: base_dir.to_path_buf(),
            metadata_path,
            entries: Mutex::new(entries),
        };

        info!("📁 Caché de videos inicializado en: {}", base_dir.display());
        Ok(cache)
    }

    /// Devuelve la entrada registrada para `(platform, video_id)`, si existe.
    ///
    /// No valida que el archivo siga en disco; eso es trabajo de
    /// [`validate_and_touch`](Self::validate_and_touch).
    pub fn lookup(&self, platform: Platform, video_id: &str) -> Option<CacheEntry> {
        let entries = self.entries.lock();
        entries.get(&platform)?.get(video_id).cloned()
    }

    /// Valida una entrada contra el disco y refresca su `last_accessed`.
    ///
    /// Si el archivo sigue existiendo devuelve su ruta; si alguien lo borró
    /// por fuera, elimina la entrada obsoleta y devuelve `None` (el llamador
    /// debe tratarlo igual que un miss).
    pub fn validate_and_touch(&self, platform: Platform, video_id: &str) -> Option<PathBuf> {
        let mut entries = self.entries.lock();
        let entry = entries.get(&platform)?.get(video_id)?.clone();

        if entry.file_path.exists() {
            if let Some(entry) = entries
                .get_mut(&platform)
                .and_then(|videos| videos.get_mut(video_id))
            {
                entry.last_accessed = Utc::now();
            }
            self.persist_best_effort(&entries);
            debug!("🎯 Hit de caché para {}/{}", platform, video_id);
            Some(entry.file_path)
        } else {
            warn!(
                "🗑️ Archivo de caché desaparecido, purgando entrada {}/{}",
                platform, video_id
            );
            if let Some(videos) = entries.get_mut(&platform) {
                videos.remove(video_id);
            }
            self.persist_best_effort(&entries);
            None
        }
    }

    /// Registra (o sobreescribe) la entrada de un video recién descargado.
    ///
    /// La escritura del registro durable ocurre antes de devolver; si falla,
    /// la entrada en memoria se revierte y no queda mutación parcial.
    pub fn insert(&self, platform: Platform, video_id: &str, file_path: PathBuf) -> Result<()> {
        let mut entries = self.entries.lock();
        let previous = entries.entry(platform).or_default().insert(
            video_id.to_string(),
            CacheEntry {
                file_path,
                last_accessed: Utc::now(),
            },
        );

        if let Err(e) = self.persist(&entries) {
            let videos = entries.entry(platform).or_default();
            match previous {
                Some(entry) => {
                    videos.insert(video_id.to_string(), entry);
                }
                None => {
                    videos.remove(video_id);
                }
            }
            return Err(e);
        }

        Ok(())
    }

    /// Elimina toda entrada cuyo `last_accessed` quedó fuera de la ventana
    /// de retención, junto con su archivo. Devuelve cuántas se eliminaron.
    ///
    /// Idempotente; corre al arranque y desde el trabajo periódico de
    /// mantenimiento.
    pub fn evict_expired(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let mut entries = self.entries.lock();
        let mut removed = 0;

        for (platform, videos) in entries.iter_mut() {
            let expired: Vec<String> = videos
                .iter()
                .filter(|(_, entry)| is_expired(entry, now, retention))
                .map(|(id, _)| id.clone())
                .collect();

            for video_id in expired {
                if let Some(entry) = videos.remove(&video_id) {
                    remove_file_best_effort(&entry.file_path);
                    debug!("⏳ Entrada expirada eliminada: {}/{}", platform, video_id);
                    removed += 1;
                }
            }
        }

        self.persist_best_effort(&entries);
        if removed > 0 {
            info!("🧹 Limpieza de caché: {} entradas eliminadas", removed);
        }

        removed
    }

    /// Borra todos los archivos y deja el registro vacío.
    ///
    /// Un fallo al borrar un archivo individual se registra y se salta;
    /// nunca aborta la operación completa.
    pub fn clear_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let mut removed = 0;

        for videos in entries.values_mut() {
            for (_, entry) in videos.drain() {
                remove_file_best_effort(&entry.file_path);
                removed += 1;
            }
        }

        self.persist_best_effort(&entries);
        info!("🧨 Caché vaciado por completo: {} videos eliminados", removed);
        removed
    }

    /// Directorio donde se guardan los videos de una plataforma
    pub fn platform_dir(&self, platform: Platform) -> PathBuf {
        self.base_dir.join(platform.as_str())
    }

    /// Ruta determinista del archivo final para `(platform, video_id)`
    pub fn media_path(&self, platform: Platform, video_id: &str) -> PathBuf {
        self.platform_dir(platform).join(format!("{video_id}.mp4"))
    }

    /// Conteo de entradas por plataforma, para logs de arranque
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            instagram: entries.get(&Platform::Instagram).map_or(0, HashMap::len),
            tiktok: entries.get(&Platform::TikTok).map_or(0, HashMap::len),
            youtube: entries.get(&Platform::YouTube).map_or(0, HashMap::len),
        }
    }

    fn persist(&self, entries: &CacheMap) -> Result<()> {
        let content = serde_json::to_string(entries)?;
        fs::write(&self.metadata_path, content)
            .with_context(|| format!("no se pudo escribir {}", self.metadata_path.display()))?;
        Ok(())
    }

    // En las rutas de lectura y limpieza la mutación en memoria vale aunque
    // el registro no se pueda escribir; se reintenta en la próxima mutación.
    fn persist_best_effort(&self, entries: &CacheMap) {
        if let Err(e) = self.persist(entries) {
            warn!("Error guardando metadata del caché: {:?}", e);
        }
    }
}

/// Estadísticas del caché de videos
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub instagram: usize,
    pub tiktok: usize,
    pub youtube: usize,
}

impl CacheStats {
    pub fn total(&self) -> usize {
        self.instagram + self.tiktok + self.youtube
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} videos en caché (instagram: {}, tiktok: {}, youtube: {})",
            self.total(),
            self.instagram,
            self.tiktok,
            self.youtube
        )
    }
}

/// Carga el registro durable; si falta o está corrupto arranca vacío.
/// El caché siempre tiene que poder construirse.
fn load_metadata(path: &Path) -> CacheMap {
    let mut entries: CacheMap = match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Metadata de caché corrupta, arrancando vacío: {:?}", e);
                CacheMap::new()
            }
        },
        Err(_) => CacheMap::new(),
    };

    for platform in Platform::all() {
        entries.entry(platform).or_default();
    }

    entries
}

fn is_expired(entry: &CacheEntry, now: DateTime<Utc>, retention: Duration) -> bool {
    now.signed_duration_since(entry.last_accessed)
        .to_std()
        .map(|age| age > retention)
        .unwrap_or(false)
}

fn remove_file_best_effort(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Error eliminando {}: {:?}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn write_video(cache: &VideoCache, platform: Platform, id: &str) -> PathBuf {
        let path = cache.media_path(platform, id);
        fs::write(&path, b"video falso").unwrap();
        cache.insert(platform, id, path.clone()).unwrap();
        path
    }

    #[test]
    fn test_insert_and_lookup_roundtrip() {
        let dir = tempdir().unwrap();
        let cache = VideoCache::new(dir.path()).unwrap();

        let path = write_video(&cache, Platform::Instagram, "ABC123");

        let entry = cache.lookup(Platform::Instagram, "ABC123").unwrap();
        assert_eq!(entry.file_path, path);
        assert!(cache.lookup(Platform::TikTok, "ABC123").is_none());
    }

    #[test]
    fn test_metadata_survives_reconstruction() {
        let dir = tempdir().unwrap();
        {
            let cache = VideoCache::new(dir.path()).unwrap();
            write_video(&cache, Platform::YouTube, "dQw4w9WgXcQ");
        }

        let reopened = VideoCache::new(dir.path()).unwrap();
        let entry = reopened.lookup(Platform::YouTube, "dQw4w9WgXcQ").unwrap();
        assert!(entry.file_path.ends_with("youtube/dQw4w9WgXcQ.mp4"));
    }

    #[test]
    fn test_corrupt_metadata_starts_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(METADATA_FILE), b"{esto no es json").unwrap();

        let cache = VideoCache::new(dir.path()).unwrap();
        assert_eq!(cache.stats().total(), 0);

        // Sigue siendo plenamente funcional
        write_video(&cache, Platform::TikTok, "999");
        assert!(cache.lookup(Platform::TikTok, "999").is_some());
    }

    #[test]
    fn test_validate_and_touch_refreshes_timestamp() {
        let dir = tempdir().unwrap();
        let cache = VideoCache::new(dir.path()).unwrap();
        write_video(&cache, Platform::Instagram, "ABC123");

        let before = cache.lookup(Platform::Instagram, "ABC123").unwrap();
        let path = cache
            .validate_and_touch(Platform::Instagram, "ABC123")
            .unwrap();
        let after = cache.lookup(Platform::Instagram, "ABC123").unwrap();

        assert_eq!(path, after.file_path);
        assert!(after.last_accessed >= before.last_accessed);
    }

    #[test]
    fn test_validate_and_touch_purges_missing_file() {
        let dir = tempdir().unwrap();
        let cache = VideoCache::new(dir.path()).unwrap();
        let path = write_video(&cache, Platform::Instagram, "ABC123");

        // Alguien borró el archivo por fuera del bot
        fs::remove_file(&path).unwrap();

        assert!(cache
            .validate_and_touch(Platform::Instagram, "ABC123")
            .is_none());
        assert!(cache.lookup(Platform::Instagram, "ABC123").is_none());

        // La purga quedó persistida
        let reopened = VideoCache::new(dir.path()).unwrap();
        assert!(reopened.lookup(Platform::Instagram, "ABC123").is_none());
    }

    #[test]
    fn test_evict_expired_removes_entry_and_file() {
        let dir = tempdir().unwrap();
        let cache = VideoCache::new(dir.path()).unwrap();
        let old_path = write_video(&cache, Platform::Instagram, "viejo");
        let fresh_path = write_video(&cache, Platform::TikTok, "fresco");

        let future = Utc::now() + ChronoDuration::days(2);
        let removed = cache.evict_expired(future, DAY);

        assert_eq!(removed, 2);
        assert!(!old_path.exists());
        assert!(!fresh_path.exists());
    }

    #[test]
    fn test_evict_expired_keeps_entries_within_window() {
        let dir = tempdir().unwrap();
        let cache = VideoCache::new(dir.path()).unwrap();
        let path = write_video(&cache, Platform::YouTube, "reciente");

        let removed = cache.evict_expired(Utc::now(), DAY);

        assert_eq!(removed, 0);
        assert!(path.exists());
        assert!(cache.lookup(Platform::YouTube, "reciente").is_some());
    }

    #[test]
    fn test_evict_expired_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let cache = VideoCache::new(dir.path()).unwrap();
        let path = write_video(&cache, Platform::Instagram, "huerfano");
        fs::remove_file(&path).unwrap();

        let future = Utc::now() + ChronoDuration::days(2);
        assert_eq!(cache.evict_expired(future, DAY), 1);
        assert!(cache.lookup(Platform::Instagram, "huerfano").is_none());
    }

    #[test]
    fn test_clear_all_wipes_everything() {
        let dir = tempdir().unwrap();
        let cache = VideoCache::new(dir.path()).unwrap();
        let a = write_video(&cache, Platform::Instagram, "uno");
        let b = write_video(&cache, Platform::YouTube, "dos");

        assert_eq!(cache.clear_all(), 2);
        assert!(!a.exists());
        assert!(!b.exists());
        assert_eq!(cache.stats().total(), 0);
    }

    #[test]
    fn test_insert_overwrites_previous_entry() {
        let dir = tempdir().unwrap();
        let cache = VideoCache::new(dir.path()).unwrap();
        write_video(&cache, Platform::TikTok, "555");

        let other = dir.path().join("tiktok").join("otro.mp4");
        fs::write(&other, b"segunda descarga").unwrap();
        cache.insert(Platform::TikTok, "555", other.clone()).unwrap();

        let entry = cache.lookup(Platform::TikTok, "555").unwrap();
        assert_eq!(entry.file_path, other);
    }

    #[test]
    fn test_stats_counts_per_platform() {
        let dir = tempdir().unwrap();
        let cache = VideoCache::new(dir.path()).unwrap();
        write_video(&cache, Platform::Instagram, "uno");
        write_video(&cache, Platform::Instagram, "dos");
        write_video(&cache, Platform::YouTube, "tres");

        let stats = cache.stats();
        assert_eq!(stats.instagram, 2);
        assert_eq!(stats.youtube, 1);
        assert_eq!(stats.tiktok, 0);
        assert_eq!(stats.total(), 3);
    }
}
