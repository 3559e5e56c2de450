//! Topology document parsing and validation
//!
//! This module provides the [`Topology`] struct for the raw source document. Geometry
//! payloads are kept as raw JSON and only interpreted by the geometry converter, so a
//! single malformed geometry cannot fail the whole document.

use crate::properties::{Properties, null_as_default};
use crate::{Result, TopoError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the geometry collection object that holds all geometries
pub const COLLECTION_KEY: &str = "collection";

/// One arc: a sequence of delta vectors, each normally `[dx, dy]`
pub type ArcDeltas = Vec<Vec<f64>>;

/// Linear transform from accumulated deltas to real-world coordinates
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Transform {
    #[serde(default, deserialize_with = "null_as_default")]
    pub scale: Vec<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub translate: Vec<f64>,
}

impl Transform {
    pub fn new(scale: [f64; 2], translate: [f64; 2]) -> Self {
        Self {
            scale: scale.to_vec(),
            translate: translate.to_vec(),
        }
    }

    /// `(scale, translate)` when both carry at least two components
    #[inline]
    pub fn components(&self) -> Option<([f64; 2], [f64; 2])> {
        match (self.scale.as_slice(), self.translate.as_slice()) {
            ([sx, sy, ..], [tx, ty, ..]) => Some(([*sx, *sy], [*tx, *ty])),
            _ => None,
        }
    }
}

/// A single geometry entry inside the collection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopoGeometry {
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Signed arc references, nesting depends on `kind`
    #[serde(default)]
    pub arcs: Option<serde_json::Value>,
    /// Direct coordinates for Point and MultiPoint
    #[serde(default)]
    pub coordinates: Option<serde_json::Value>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    /// Passed through as given; `null` and absent both read as `None`
    #[serde(default)]
    pub properties: Option<Properties>,
}

/// A named object of the topology, expected to be a GeometryCollection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeometryCollection {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub geometries: Vec<TopoGeometry>,
}

/// The parsed source document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Topology {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub arcs: Vec<ArcDeltas>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub objects: BTreeMap<String, GeometryCollection>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Topology {
    /// Parse and validate a topology from raw JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let topology: Topology = serde_json::from_slice(bytes)?;
        topology.validate()?;
        Ok(topology)
    }

    /// Read, parse and validate a topology file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_slice(&bytes)
    }

    /// A topology is only usable with at least one arc and one object
    pub fn validate(&self) -> Result<()> {
        if self.arcs.is_empty() {
            return Err(TopoError::Schema("topology has no arcs".to_string()));
        }
        if self.objects.is_empty() {
            return Err(TopoError::Schema("topology has no objects".to_string()));
        }
        Ok(())
    }

    /// The geometry collection every feature is built from
    pub fn collection(&self) -> Result<&GeometryCollection> {
        self.objects.get(COLLECTION_KEY).ok_or_else(|| {
            TopoError::Schema(format!("object '{COLLECTION_KEY}' does not exist"))
        })
    }

    #[inline]
    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "type": "Topology",
        "transform": {"scale": [0.5, 2.0], "translate": [10.0, 20.0]},
        "arcs": [[[0, 0], [1, 1]]],
        "objects": {"collection": {"type": "GeometryCollection", "geometries": [
            {"type": "LineString", "arcs": [0], "properties": {"D": "San Salvador"}}
        ]}}
    }"#;

    #[test]
    fn test_parse_minimal() {
        let topology = Topology::from_slice(MINIMAL.as_bytes()).unwrap();
        assert_eq!(topology.kind, "Topology");
        assert_eq!(topology.arc_count(), 1);

        let collection = topology.collection().unwrap();
        assert_eq!(collection.geometries.len(), 1);
        assert_eq!(collection.geometries[0].kind, "LineString");
        assert_eq!(
            collection.geometries[0].properties.as_ref().unwrap()["D"].as_str(),
            Some("San Salvador")
        );
    }

    #[test]
    fn test_empty_arcs_is_schema_error() {
        let json = r#"{"type": "Topology", "arcs": [], "objects": {"collection": {}}}"#;
        let result = Topology::from_slice(json.as_bytes());
        assert!(matches!(result, Err(TopoError::Schema(_))));
    }

    #[test]
    fn test_missing_objects_is_schema_error() {
        let json = r#"{"type": "Topology", "arcs": [[[0, 0]]]}"#;
        let result = Topology::from_slice(json.as_bytes());
        assert!(matches!(result, Err(TopoError::Schema(_))));

        let json = r#"{"type": "Topology", "arcs": [[[0, 0]]], "objects": null}"#;
        let result = Topology::from_slice(json.as_bytes());
        assert!(matches!(result, Err(TopoError::Schema(_))));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let result = Topology::from_slice(b"{\"arcs\": [");
        assert!(matches!(result, Err(TopoError::Parse(_))));
    }

    #[test]
    fn test_missing_collection_key() {
        let json = r#"{"arcs": [[[0, 0]]], "objects": {"other": {"geometries": []}}}"#;
        let topology = Topology::from_slice(json.as_bytes()).unwrap();
        assert!(matches!(topology.collection(), Err(TopoError::Schema(_))));
    }

    #[test]
    fn test_transform_components() {
        let transform = Transform::new([1.0, 2.0], [3.0, 4.0]);
        assert_eq!(transform.components(), Some(([1.0, 2.0], [3.0, 4.0])));

        let short = Transform {
            scale: vec![1.0],
            translate: vec![3.0, 4.0],
        };
        assert_eq!(short.components(), None);
        assert_eq!(Transform::default().components(), None);
    }

    #[test]
    fn test_null_properties_pass_through() {
        let json = r#"{"arcs": [[[0, 0]]], "objects": {"collection": {"geometries": [
            {"type": "Point", "coordinates": [1, 2], "properties": null}
        ]}}}"#;
        let topology = Topology::from_slice(json.as_bytes()).unwrap();
        assert!(topology.collection().unwrap().geometries[0].properties.is_none());
    }
}
