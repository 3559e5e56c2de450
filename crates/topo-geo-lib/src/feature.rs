//! FeatureCollection building from a validated topology
//!
//! Every geometry of the `"collection"` object becomes one feature. Geometries that
//! fail to convert are logged and left out; the rest of the build carries on.

use crate::arc::ArcTable;
use crate::geometry::{Geometry, convert_geometry};
use crate::properties::{Properties, PropertyValue};
use crate::topology::Topology;
use crate::Result;
use geo::Rect;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A GeoJSON feature: decoded geometry plus the untouched property bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: Option<Properties>,
}

impl Feature {
    #[inline]
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.as_ref()?.get(key)
    }

    /// The property under `key` when it is a string
    #[inline]
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.property(key)?.as_str()
    }
}

/// A GeoJSON feature collection, in source geometry order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

/// Summary information about a feature collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionInfo {
    /// Number of features
    pub feature_count: usize,
    /// Total number of positions across all geometries
    pub total_positions: usize,
    /// Combined bounding box (None if no feature has positions)
    pub bounding_box: Option<Rect<f64>>,
}

/// A geometry that was left out of the collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedGeometry {
    /// Position of the geometry in the source collection
    pub index: usize,
    pub geometry_type: String,
    pub reason: String,
}

/// Outcome of one build
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    /// Number of geometries in the source collection
    pub geometries: usize,
    pub skipped: Vec<SkippedGeometry>,
}

impl BuildReport {
    #[inline]
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Feature count, position count and combined bounding box
    pub fn info(&self) -> CollectionInfo {
        let mut info = CollectionInfo {
            feature_count: self.features.len(),
            ..Default::default()
        };

        for feature in &self.features {
            info.total_positions += feature.geometry.position_count();
            let Some(rect) = feature.geometry.bounding_rect() else {
                continue;
            };
            info.bounding_box = Some(match info.bounding_box {
                Some(bbox) => Rect::new(
                    geo::Coord {
                        x: bbox.min().x.min(rect.min().x),
                        y: bbox.min().y.min(rect.min().y),
                    },
                    geo::Coord {
                        x: bbox.max().x.max(rect.max().x),
                        y: bbox.max().y.max(rect.max().y),
                    },
                ),
                None => rect,
            });
        }

        info
    }
}

/// Build the feature collection of a topology
pub fn build_feature_collection(topology: &Topology) -> Result<FeatureCollection> {
    build_with_report(topology).map(|(collection, _)| collection)
}

/// Build the feature collection together with a report of skipped geometries
///
/// Fails only when the `"collection"` object is missing. Geometries are converted in
/// parallel; the output keeps the source order.
pub fn build_with_report(topology: &Topology) -> Result<(FeatureCollection, BuildReport)> {
    #[cfg(feature = "profiling")]
    profiling::scope!("feature::build_with_report");

    let collection = topology.collection()?;
    let arcs = ArcTable::from_topology(topology);

    let results: Vec<std::result::Result<Feature, SkippedGeometry>> = collection
        .geometries
        .par_iter()
        .enumerate()
        .map(|(index, geometry)| match convert_geometry(geometry, &arcs) {
            Ok(decoded) => Ok(Feature {
                id: geometry.id.clone(),
                geometry: decoded,
                properties: geometry.properties.clone(),
            }),
            Err(err) => {
                tracing::warn!(
                    "Skipping geometry {} of type '{}': {}",
                    index,
                    geometry.kind,
                    err
                );
                Err(SkippedGeometry {
                    index,
                    geometry_type: geometry.kind.clone(),
                    reason: err.to_string(),
                })
            }
        })
        .collect();

    let mut features = Vec::with_capacity(results.len());
    let mut report = BuildReport {
        geometries: collection.geometries.len(),
        skipped: Vec::new(),
    };
    for result in results {
        match result {
            Ok(feature) => features.push(feature),
            Err(skipped) => report.skipped.push(skipped),
        }
    }

    Ok((FeatureCollection::new(features), report))
}
