//! Serve assets from a directory of files named after their ids.
//!
//! Textures are looked up as `<id>.png` then `<id>.jpg`; mesh payloads as
//! `<id>.mesh.json`. Every request is answered from its own worker thread, the
//! same way a network-backed fetcher would answer.

use std::path::PathBuf;
use std::thread;

use super::{AssetFetcher, AssetKind, AssetRequest};
use crate::types::AssetId;

const TEXTURE_EXTENSIONS: &[&str] = &["png", "jpg"];
const MESH_EXTENSION: &str = "mesh.json";

#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Candidate file paths for an asset, in lookup order.
    pub fn candidates(&self, id: AssetId, kind: AssetKind) -> Vec<PathBuf> {
        let extensions: &[&str] = match kind {
            AssetKind::Texture => TEXTURE_EXTENSIONS,
            AssetKind::Mesh => &[MESH_EXTENSION],
        };
        extensions
            .iter()
            .map(|ext| self.root.join(format!("{id}.{ext}")))
            .collect()
    }
}

impl AssetFetcher for DirectoryFetcher {
    fn request(&self, id: AssetId, kind: AssetKind) -> AssetRequest {
        let (responder, request) = AssetRequest::channel(id, kind);
        let candidates = self.candidates(id, kind);
        thread::spawn(move || {
            for path in &candidates {
                if let Ok(data) = std::fs::read(path) {
                    if !data.is_empty() {
                        responder.complete(data);
                        return;
                    }
                }
            }
            responder.fail("no file for asset");
        });
        request
    }
}
