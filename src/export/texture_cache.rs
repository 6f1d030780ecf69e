//! Mean color per texture, persisted between exports.
//!
//! The output format cannot embed textures, so each face is tinted with the
//! average color of its texture instead. Computing that average means fetching
//! and decoding the texture, which is slow, so results are kept in a JSON file
//! shared by successive export runs:
//!
//! ```text
//! [ { "id": "8dcd4a48-2d37-4909-9f78-f7a9eb4ef903", "meancolor": [0.5, 0.4, 0.3, 1.0] }, ... ]
//! ```
//!
//! Textures that could not be fetched are remembered as [`TextureColor::Unknown`]
//! for the rest of the run but never written out.

use std::collections::{HashMap, HashSet};
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::assets::AssetClient;
use crate::assets::image::DecodedImage;
use crate::types::{AssetId, Color4};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("could not read texture cache {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("texture cache {path} is not valid JSON: {reason}")]
    Parse { path: String, reason: String },
    #[error("could not write texture cache {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Cached knowledge about one texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureColor {
    Known(Color4),
    /// Fetch or decode failed during this run.
    Unknown,
}

impl TextureColor {
    pub fn known(self) -> Option<Color4> {
        match self {
            TextureColor::Known(c) => Some(c),
            TextureColor::Unknown => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TextureRecord {
    id: AssetId,
    #[serde(rename = "meancolor")]
    mean_color: Color4,
}

#[derive(Debug, Default, Clone)]
pub struct TextureColorCache {
    entries: HashMap<AssetId, TextureColor>,
    /// Textures whose fetch or decode failed this run. Never requested again.
    unavailable: HashSet<AssetId>,
}

impl TextureColorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: AssetId) -> Option<TextureColor> {
        self.entries.get(&id).copied()
    }

    pub fn insert(&mut self, id: AssetId, color: TextureColor) {
        self.entries.insert(id, color);
    }

    /// Mean color of `id`, fetching the texture if it has not been seen yet.
    /// A previous failure is returned as-is without retrying.
    pub fn get_or_fetch(&mut self, id: AssetId, assets: &AssetClient<'_>) -> TextureColor {
        if let Some(color) = self.get(id) {
            return color;
        }
        self.fetch_image(id, assets);
        self.get(id).unwrap_or(TextureColor::Unknown)
    }

    /// Fetch and decode a texture for its pixels, recording its mean color
    /// (or the failure) along the way.
    ///
    /// A texture that already failed this run, or whose color is recorded as
    /// `Unknown`, is not requested again. A color loaded from disk survives a
    /// failed fetch.
    pub fn fetch_image(&mut self, id: AssetId, assets: &AssetClient<'_>) -> Option<DecodedImage> {
        if self.unavailable.contains(&id) || self.get(id) == Some(TextureColor::Unknown) {
            debug!("texture {id} already unavailable this run");
            return None;
        }
        let image = match assets.fetch_image(id) {
            Ok(image) => image,
            Err(_) => {
                self.unavailable.insert(id);
                self.entries.entry(id).or_insert(TextureColor::Unknown);
                return None;
            }
        };
        let color = image
            .mean_color()
            .map_or(TextureColor::Unknown, TextureColor::Known);
        debug!("texture {id}: {color:?}");
        self.entries.insert(id, color);
        Some(image)
    }

    /// Merge records from `path` into the cache. Entries already known in
    /// memory win; records on disk replace in-memory `Unknown` markers.
    /// A missing file is not an error. Returns the number of records read.
    pub fn load(&mut self, path: &Path) -> Result<usize, Report<CacheError>> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(Report::new(CacheError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }));
            }
        };
        let records: Vec<TextureRecord> = serde_json::from_slice(&data).map_err(|e| {
            Report::new(CacheError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })?;

        let count = records.len();
        for record in records {
            let slot = self.entries.entry(record.id).or_insert(TextureColor::Unknown);
            if *slot == TextureColor::Unknown {
                *slot = TextureColor::Known(record.mean_color);
            }
        }
        Ok(count)
    }

    /// Write every known record to `path`, replacing it atomically. Records are
    /// sorted by id. Returns the number of records written.
    pub fn save(&self, path: &Path) -> Result<usize, Report<CacheError>> {
        let write_err = |reason: String| {
            Report::new(CacheError::Write {
                path: path.display().to_string(),
                reason,
            })
        };

        let records: Vec<TextureRecord> = self
            .entries
            .iter()
            .filter_map(|(&id, color)| {
                color.known().map(|mean_color| TextureRecord { id, mean_color })
            })
            .sorted_by_key(|r| r.id)
            .collect();

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir).map_err(|e| write_err(e.to_string()))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, &records).map_err(|e| write_err(e.to_string()))?;
            writer.flush().map_err(|e| write_err(e.to_string()))?;
        }
        tmp.persist(path).map_err(|e| write_err(e.error.to_string()))?;
        Ok(records.len())
    }

    /// Pick up whatever other writers saved since this run loaded the cache,
    /// then save the union. An unreadable file is replaced.
    pub fn reload_and_save(&mut self, path: &Path) -> Result<usize, Report<CacheError>> {
        if let Err(e) = self.load(path) {
            warn!("replacing texture cache: {e}");
        }
        self.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::image::RasterCodec;
    use crate::assets::{AssetFetcher, AssetKind, AssetRequest, MemoryFetcher};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn id(n: u128) -> AssetId {
        AssetId::from_u128(n)
    }

    fn png(rgba: [u8; 4]) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            2,
            2,
            image::Rgba(rgba),
        ));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn fetch_once_and_remember_failures() {
        let mut fetcher = MemoryFetcher::default();
        fetcher.insert(id(1), AssetKind::Texture, png([255, 0, 0, 255]));
        let codec = RasterCodec;
        let assets = AssetClient::new(&fetcher, &codec, Duration::from_millis(20));
        let mut cache = TextureColorCache::new();

        assert_eq!(
            cache.get_or_fetch(id(1), &assets),
            TextureColor::Known(Color4::new(1.0, 0.0, 0.0, 1.0))
        );
        assert_eq!(cache.get_or_fetch(id(2), &assets), TextureColor::Unknown);

        // once recorded, entries are served from memory
        let empty = MemoryFetcher::default();
        let offline = AssetClient::new(&empty, &codec, Duration::from_millis(20));
        assert!(matches!(
            cache.get_or_fetch(id(1), &offline),
            TextureColor::Known(_)
        ));
        cache.insert(id(3), TextureColor::Known(Color4::WHITE));
        assert_eq!(
            cache.get_or_fetch(id(3), &offline),
            TextureColor::Known(Color4::WHITE)
        );
    }

    /// Fails every request, counting them.
    #[derive(Default)]
    struct CountingFetcher {
        requests: AtomicUsize,
    }

    impl AssetFetcher for CountingFetcher {
        fn request(&self, id: AssetId, kind: AssetKind) -> AssetRequest {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let (responder, request) = AssetRequest::channel(id, kind);
            responder.fail("offline");
            request
        }
    }

    #[test]
    fn failed_texture_is_requested_once_per_run() {
        let fetcher = CountingFetcher::default();
        let codec = RasterCodec;
        let assets = AssetClient::new(&fetcher, &codec, Duration::from_millis(20));
        let mut cache = TextureColorCache::new();
        // color known from an earlier run, texture now unreachable
        cache.insert(id(1), TextureColor::Known(Color4::WHITE));

        for _ in 0..3 {
            assert!(cache.fetch_image(id(1), &assets).is_none());
            assert!(cache.fetch_image(id(2), &assets).is_none());
            assert_eq!(cache.get_or_fetch(id(2), &assets), TextureColor::Unknown);
        }
        assert_eq!(fetcher.requests.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get(id(1)), Some(TextureColor::Known(Color4::WHITE)));
    }

    #[test]
    fn round_trip_drops_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knownTextures.txt");

        let mut cache = TextureColorCache::new();
        cache.insert(id(1), TextureColor::Known(Color4::new(0.5, 0.25, 0.0, 1.0)));
        cache.insert(id(2), TextureColor::Known(Color4::new(0.1, 0.2, 0.3, 0.4)));
        cache.insert(id(3), TextureColor::Unknown);
        assert_eq!(cache.save(&path).unwrap(), 2);

        let mut loaded = TextureColorCache::new();
        assert_eq!(loaded.load(&path).unwrap(), 2);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(id(1)), cache.get(id(1)));
        assert_eq!(loaded.get(id(2)), cache.get(id(2)));
        assert_eq!(loaded.get(id(3)), None);
    }

    #[test]
    fn load_keeps_in_memory_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut other = TextureColorCache::new();
        other.insert(id(1), TextureColor::Known(Color4::new(0.0, 0.0, 0.0, 1.0)));
        other.insert(id(2), TextureColor::Known(Color4::new(0.2, 0.2, 0.2, 1.0)));
        other.insert(id(4), TextureColor::Known(Color4::new(0.4, 0.4, 0.4, 1.0)));
        other.save(&path).unwrap();

        let mut cache = TextureColorCache::new();
        cache.insert(id(1), TextureColor::Known(Color4::WHITE));
        cache.insert(id(2), TextureColor::Unknown);
        cache.reload_and_save(&path).unwrap();

        assert_eq!(cache.get(id(1)), Some(TextureColor::Known(Color4::WHITE)));
        assert_eq!(
            cache.get(id(2)),
            Some(TextureColor::Known(Color4::new(0.2, 0.2, 0.2, 1.0)))
        );
        assert!(cache.get(id(4)).is_some());

        let mut reread = TextureColorCache::new();
        assert_eq!(reread.load(&path).unwrap(), 3);
        assert_eq!(reread.get(id(1)), Some(TextureColor::Known(Color4::WHITE)));
    }

    #[test]
    fn serialized_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = TextureColorCache::new();
        cache.insert(id(0xff), TextureColor::Known(Color4::new(1.0, 0.5, 0.25, 1.0)));
        cache.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            r#"[{"id":"00000000-0000-0000-0000-0000000000ff","meancolor":[1.0,0.5,0.25,1.0]}]"#
        );
    }

    #[test]
    fn missing_file_loads_nothing_and_bad_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TextureColorCache::new();
        assert_eq!(cache.load(&dir.path().join("absent.json")).unwrap(), 0);

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(cache.load(&bad).is_err());
    }
}
