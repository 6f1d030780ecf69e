//! Two-level primitive hierarchy and the collection pass that builds it.
//!
//! Linksets are at most two levels deep: a root prim and the children parented
//! directly to it. [`PrimForest::insert`] rejects anything else, so once a
//! primitive is in the forest it is known to be exportable.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::assets::AssetClient;
use crate::export::texture_cache::TextureColorCache;
use crate::scene::{LocalId, Primitive, Scene};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ForestError {
    #[error("primitive {0} is already in the forest")]
    Duplicate(LocalId),
    #[error("parent {parent} of primitive {child} is not a known root")]
    MissingParent { child: LocalId, parent: LocalId },
    #[error("parent {parent} of primitive {child} is itself a child")]
    TooDeep { child: LocalId, parent: LocalId },
}

/// Index of a node in the forest's arena.
pub type NodeIndex = usize;

#[derive(Debug, Clone)]
pub struct ForestNode {
    pub prim: Primitive,
    pub parent: Option<NodeIndex>,
}

/// Arena of primitives with parent links, depth capped at two.
#[derive(Debug, Default)]
pub struct PrimForest {
    nodes: Vec<ForestNode>,
    by_id: HashMap<LocalId, NodeIndex>,
}

impl PrimForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a primitive. Roots are always accepted; a child is accepted only if
    /// its parent is already present and is itself a root.
    pub fn insert(&mut self, prim: Primitive) -> Result<NodeIndex, ForestError> {
        if self.by_id.contains_key(&prim.local_id) {
            return Err(ForestError::Duplicate(prim.local_id));
        }

        let parent = if prim.is_root() {
            None
        } else {
            let child = prim.local_id;
            let parent = prim.parent_id;
            let parent_idx = *self
                .by_id
                .get(&parent)
                .ok_or(ForestError::MissingParent { child, parent })?;
            if self.nodes[parent_idx].parent.is_some() {
                return Err(ForestError::TooDeep { child, parent });
            }
            Some(parent_idx)
        };

        let idx = self.nodes.len();
        self.by_id.insert(prim.local_id, idx);
        self.nodes.push(ForestNode { prim, parent });
        Ok(idx)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: LocalId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn get(&self, id: LocalId) -> Option<&ForestNode> {
        self.by_id.get(&id).map(|&idx| &self.nodes[idx])
    }

    pub fn parent_of(&self, id: LocalId) -> Option<&Primitive> {
        let node = self.get(id)?;
        node.parent.map(|idx| &self.nodes[idx].prim)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Primitive> {
        self.nodes
            .iter()
            .filter(|n| n.parent.is_none())
            .map(|n| &n.prim)
    }

    /// Root primitives keyed by id, as consumed by
    /// [`world_transform`](crate::scene::transform::world_transform).
    pub fn root_map(&self) -> HashMap<LocalId, Primitive> {
        self.roots().map(|p| (p.local_id, p.clone())).collect()
    }
}

/// Result of [`collect`]: the root table and the exportable primitives in
/// scene order.
#[derive(Debug, Default)]
pub struct Collected {
    pub roots: HashMap<LocalId, Primitive>,
    pub exportable: Vec<Primitive>,
}

/// Build a forest from an unordered primitive list.
///
/// Roots go in first so that children can find their parent regardless of
/// list order. Rejected primitives are logged and dropped.
pub fn build_forest(prims: &[Primitive]) -> PrimForest {
    let mut forest = PrimForest::new();
    let (roots, children): (Vec<_>, Vec<_>) = prims.iter().partition(|p| p.is_root());
    for prim in roots.into_iter().chain(children) {
        if let Err(e) = forest.insert(prim.clone()) {
            debug!("skipping primitive: {e}");
        }
    }
    forest
}

/// Snapshot the scene, classify its primitives, and warm the texture cache
/// with every texture any primitive references.
pub fn collect(
    scene: &Scene,
    cache: &mut TextureColorCache,
    assets: &AssetClient<'_>,
) -> Collected {
    let snapshot = scene.snapshot();

    for prim in &snapshot {
        if let Some(textures) = &prim.textures {
            for id in textures.texture_ids() {
                cache.get_or_fetch(id, assets);
            }
        }
    }

    let forest = build_forest(&snapshot);
    let exportable = snapshot
        .into_iter()
        .filter(|p| {
            forest
                .get(p.local_id)
                .is_some_and(|node| node.prim.parent_id == p.parent_id)
        })
        .collect();

    Collected {
        roots: forest.root_map(),
        exportable,
    }
}
