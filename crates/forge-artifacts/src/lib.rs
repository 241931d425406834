//! The Artifact Store: typed, append-only, tenant-scoped storage of subagent
//! outputs, addressable by stable `@agent/name` reference keys.
//!
//! Artifacts are never mutated. A write under an existing `reference_key`
//! is stored as a new, higher-versioned record; reads always return the
//! highest version. Storage is pluggable via [`ArtifactBackend`]; an
//! in-memory and a file-backed NDJSON implementation are provided.

mod backend;
mod refs;
mod store;
mod types;

pub use backend::{ArtifactBackend, FileArtifactBackend, InMemoryArtifactBackend};
pub use refs::parse_refs;
pub use store::ArtifactStore;
pub use types::{
    Artifact, ArtifactMetadata, ArtifactRef, ArtifactType, ResolvedContext, Statistics,
};
