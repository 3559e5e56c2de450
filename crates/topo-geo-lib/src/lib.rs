//! Topo Geo Library - Topology Decoding and Coherent GeoJSON Cache
//!
//! This library reconstructs GeoJSON features from a compact topology document, where
//! polygon boundaries are stored once as delta-encoded arcs and referenced by signed
//! index from every geometry that shares them. The decoded collection is served through
//! a cache that stays coherent with the source file on disk across concurrent readers.
//!
//! # Architecture
//!
//! - **[`Topology`]**: Parsed and validated source document (arcs, transform, objects)
//! - **[`ArcTable`]**: Arc decoding and ring assembly with shared-vertex elision
//! - **[`Geometry`]**: GeoJSON-shaped geometry produced by [`convert_geometry`]
//! - **[`FeatureCollection`]**: Features built by [`build_feature_collection`]
//! - **[`StaticTopologyCache`]**: Load / stale-check / convert lifecycle with single-flight rebuilds
//! - **[`GeoIndex`]**: Distinct-value and filter views memoized per cache generation
//!
//! # Data Flow
//!
//! ```text
//! disk ──► Topology ──► FeatureCollection ──► (filter / distinct views) ──► caller
//!              ▲                ▲
//!              └── StaticTopologyCache (one build per generation)
//! ```

mod arc;
mod cache;
mod feature;
mod geometry;
mod index;
mod properties;
mod topology;

// Public API exports
pub use arc::{ArcRef, ArcTable, Position, decode_arc};
pub use cache::{CacheConfig, CacheStats, FeatureSnapshot, StaticTopologyCache};
pub use feature::{
    BuildReport, CollectionInfo, Feature, FeatureCollection, SkippedGeometry,
    build_feature_collection, build_with_report,
};
pub use geometry::{Geometry, convert_geometry};
pub use index::{GeoIndex, SearchData, SearchField};
pub use properties::{Properties, PropertyValue};
pub use topology::{
    ArcDeltas, COLLECTION_KEY, GeometryCollection, TopoGeometry, Topology, Transform,
};

/// Error types for topology loading and decoding
#[derive(Debug, thiserror::Error)]
pub enum TopoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Topology parsing error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid topology: {0}")]
    Schema(String),

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error("Topology source unchanged since it was rejected: {0}")]
    Rejected(String),

    #[error("Unknown search field: {0}")]
    UnknownField(String),
}

pub type Result<T> = std::result::Result<T, TopoError>;
