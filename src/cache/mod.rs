//! # Cache Module
//!
//! On-disk video cache for Open Clip Bot.
//!
//! Every downloaded video is kept under `<download_dir>/<platform>/<id>.mp4`
//! and registered in a single metadata record (`cache_metadata.json`) that
//! maps platform name to video id to `{file_path, last_accessed}`. Repeated
//! requests for the same video are served from disk without touching the
//! upstream platform, which keeps response times low and avoids burning
//! through platform rate limits.
//!
//! ## Guarantees
//!
//! - **One fresh copy per id**: the `(platform, id)` pair is unique within
//!   the store; inserting again overwrites the previous entry.
//! - **Metadata consistency**: every mutation persists the record before
//!   returning, inside the same critical section as the in-memory change.
//! - **Self-healing**: a missing or corrupt metadata record loads as an
//!   empty store. An entry whose backing file disappeared is dropped the
//!   next time it is validated.
//! - **TTL eviction**: entries not accessed within the retention window are
//!   removed together with their backing files.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via environment variables:
//!
//! ```env
//! DOWNLOAD_DIR=downloads          # Base directory for videos + metadata
//! CACHE_RETENTION=24h             # Retention window for unused entries
//! CLEAR_CACHE_ON_STARTUP=false    # Wipe everything at boot
//! ```

pub mod disk_cache;

pub use disk_cache::{CacheEntry, CacheStats, VideoCache};
