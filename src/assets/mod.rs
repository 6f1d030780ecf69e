//! Asynchronous asset retrieval with a bounded wait.
//!
//! A fetcher is handed an [`AssetResponder`] for every request and completes
//! it from whatever thread it likes. The exporter blocks on the matching
//! [`AssetRequest`] for at most the configured timeout. Failures are reported
//! through the responder (or by dropping it), so only a fetcher that genuinely
//! never answers costs the full timeout.

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::types::AssetId;

pub mod dir;
pub mod image;

use self::image::{DecodedImage, ImageCodec};

/// How long a single fetch may block the export.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Texture,
    Mesh,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("timed out after {timeout:?} waiting for {kind:?} {id}")]
    TimedOut {
        id: AssetId,
        kind: AssetKind,
        timeout: Duration,
    },
    #[error("fetch of {kind:?} {id} failed: {reason}")]
    Failed {
        id: AssetId,
        kind: AssetKind,
        reason: String,
    },
    #[error("fetcher dropped request for {kind:?} {id} without answering")]
    Abandoned { id: AssetId, kind: AssetKind },
    #[error("could not decode texture {id}: {reason}")]
    Decode { id: AssetId, reason: String },
}

type Reply = Result<Vec<u8>, String>;

/// Completion side of a fetch. Consumed by answering.
#[derive(Debug)]
pub struct AssetResponder {
    tx: SyncSender<Reply>,
}

impl AssetResponder {
    pub fn complete(self, data: Vec<u8>) {
        // The requester may have given up already.
        let _ = self.tx.send(Ok(data));
    }

    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(reason.into()));
    }
}

/// Waiting side of a fetch.
#[derive(Debug)]
pub struct AssetRequest {
    id: AssetId,
    kind: AssetKind,
    rx: Receiver<Reply>,
}

impl AssetRequest {
    /// A connected request/responder pair.
    pub fn channel(id: AssetId, kind: AssetKind) -> (AssetResponder, AssetRequest) {
        let (tx, rx) = sync_channel(1);
        (AssetResponder { tx }, AssetRequest { id, kind, rx })
    }

    /// Block until the fetcher answers or `timeout` elapses.
    pub fn wait(self, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let Self { id, kind, rx } = self;
        match rx.recv_timeout(timeout) {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(reason)) => Err(FetchError::Failed { id, kind, reason }),
            Err(RecvTimeoutError::Timeout) => Err(FetchError::TimedOut { id, kind, timeout }),
            Err(RecvTimeoutError::Disconnected) => Err(FetchError::Abandoned { id, kind }),
        }
    }
}

/// Source of raw asset bytes, typically backed by the network session.
pub trait AssetFetcher {
    /// Start fetching `id`. Must not block; the answer arrives through the
    /// returned request.
    fn request(&self, id: AssetId, kind: AssetKind) -> AssetRequest;
}

/// Fetcher serving assets from memory. Answers immediately; unknown ids fail.
#[derive(Debug, Default, Clone)]
pub struct MemoryFetcher {
    assets: HashMap<(AssetKind, AssetId), Vec<u8>>,
}

impl MemoryFetcher {
    pub fn insert(&mut self, id: AssetId, kind: AssetKind, data: Vec<u8>) {
        self.assets.insert((kind, id), data);
    }
}

impl AssetFetcher for MemoryFetcher {
    fn request(&self, id: AssetId, kind: AssetKind) -> AssetRequest {
        let (responder, request) = AssetRequest::channel(id, kind);
        match self.assets.get(&(kind, id)) {
            Some(data) => responder.complete(data.clone()),
            None => responder.fail("asset not found"),
        }
        request
    }
}

/// Fetcher plus codec plus timeout: everything needed to turn an id into a
/// decoded texture or a mesh payload.
#[derive(Clone, Copy)]
pub struct AssetClient<'a> {
    fetcher: &'a dyn AssetFetcher,
    codec: &'a dyn ImageCodec,
    timeout: Duration,
}

impl<'a> AssetClient<'a> {
    pub fn new(
        fetcher: &'a dyn AssetFetcher,
        codec: &'a dyn ImageCodec,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            codec,
            timeout,
        }
    }

    /// Fetch raw bytes, waiting at most the configured timeout.
    pub fn fetch(&self, id: AssetId, kind: AssetKind) -> Result<Vec<u8>, FetchError> {
        debug!("requesting {kind:?} {id}");
        let result = self.fetcher.request(id, kind).wait(self.timeout);
        if let Err(e) = &result {
            warn!("{e}");
        }
        result
    }

    /// Fetch and decode a texture.
    pub fn fetch_image(&self, id: AssetId) -> Result<DecodedImage, FetchError> {
        let data = self.fetch(id, AssetKind::Texture)?;
        self.codec.decode(&data).map_err(|e| {
            warn!("could not decode texture {id}: {e}");
            FetchError::Decode {
                id,
                reason: e.to_string(),
            }
        })
    }
}
