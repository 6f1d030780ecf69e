/// Asset fetching: requests, responders, and image decoding
pub mod assets;
/// Error definitions
pub mod error;
/// POV-Ray scene export and the persistent texture color cache
pub mod export;
/// Primitive mesh generation
pub mod mesh;
/// Region scene state: primitives, link hierarchy, and world transforms
pub mod scene;
/// Terrain heightfields, ground mesh, and texture splatting
pub mod terrain;
/// Shared value types (asset ids, colors, math re-exports)
pub mod types;

pub use export::{ExportOptions, ExportSummary, SceneExporter};
