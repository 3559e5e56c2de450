//! Attribute views over a FeatureCollection
//!
//! Distinct-value listings and filters over the feature property bags, plus the
//! [`GeoIndex`] service that memoizes them per cache generation.

use crate::cache::StaticTopologyCache;
use crate::feature::FeatureCollection;
use crate::{Result, TopoError};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl FeatureCollection {
    /// Distinct non-empty string values of `field`, duplicate free
    ///
    /// Values are returned sorted, but callers should treat the list as unordered.
    pub fn distinct_values(&self, field: &str) -> Vec<String> {
        let values: BTreeSet<&str> = self
            .features
            .iter()
            .filter_map(|feature| feature.property_str(field))
            .filter(|value| !value.is_empty())
            .collect();
        values.into_iter().map(str::to_string).collect()
    }

    /// Features whose `field` is a string exactly equal to `value`
    pub fn filter(&self, field: &str, value: &str) -> FeatureCollection {
        self.filter_by(field, |candidate| candidate == value)
    }

    /// Features whose `field` is a string containing `needle`, ignoring case
    pub fn filter_contains(&self, field: &str, needle: &str) -> FeatureCollection {
        let needle = needle.to_lowercase();
        self.filter_by(field, |candidate| candidate.to_lowercase().contains(&needle))
    }

    fn filter_by(&self, field: &str, matches: impl Fn(&str) -> bool) -> FeatureCollection {
        FeatureCollection::new(
            self.features
                .iter()
                .filter(|feature| feature.property_str(field).is_some_and(&matches))
                .cloned()
                .collect(),
        )
    }
}

/// The property keys recognized by the search views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchField {
    /// `D`
    Department,
    /// `M`
    Municipality,
    /// `NAM`
    Locality,
}

impl SearchField {
    pub const ALL: [SearchField; 3] = [Self::Department, Self::Municipality, Self::Locality];

    /// Property key inside the feature property bag
    pub fn key(&self) -> &'static str {
        match self {
            Self::Department => "D",
            Self::Municipality => "M",
            Self::Locality => "NAM",
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SearchField {
    type Err = TopoError;

    /// Accepts the property key in any case, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|field| field.key() == key)
            .ok_or_else(|| TopoError::UnknownField(s.to_string()))
    }
}

/// Distinct values of the recognized fields
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchData {
    pub department: Vec<String>,
    pub municipality: Vec<String>,
    pub locality: Vec<String>,
}

impl SearchData {
    pub fn from_collection(collection: &FeatureCollection) -> Self {
        Self {
            department: collection.distinct_values(SearchField::Department.key()),
            municipality: collection.distinct_values(SearchField::Municipality.key()),
            locality: collection.distinct_values(SearchField::Locality.key()),
        }
    }
}

/// Upper bound on memoized filter results; the memo is cleared once it is full
const MAX_MEMOIZED_FILTERS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FilterKey {
    generation: u64,
    field: SearchField,
    value: String,
}

/// Search views over a shared [`StaticTopologyCache`]
///
/// Results are memoized for the cache generation they were computed from and dropped
/// once a newer generation shows up.
#[derive(Debug)]
pub struct GeoIndex {
    cache: Arc<StaticTopologyCache>,
    search_data: Mutex<Option<(u64, Arc<SearchData>)>>,
    filters: DashMap<FilterKey, Arc<FeatureCollection>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeoIndex {
    pub fn new(cache: Arc<StaticTopologyCache>) -> Self {
        Self {
            cache,
            search_data: Mutex::new(None),
            filters: DashMap::new(),
        }
    }

    #[inline]
    pub fn cache(&self) -> &Arc<StaticTopologyCache> {
        &self.cache
    }

    /// Distinct values of every recognized field
    pub fn search_data(&self) -> Result<Arc<SearchData>> {
        let snapshot = self.cache.get_snapshot()?;

        let mut memo = match self.search_data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Search data memo poisoned; recovering");
                poisoned.into_inner()
            }
        };
        if let Some((generation, data)) = memo.as_ref() {
            if *generation == snapshot.generation {
                return Ok(data.clone());
            }
        }

        let data = Arc::new(SearchData::from_collection(&snapshot.features));
        // A caller still holding an older snapshot must not replace a newer memo
        if memo
            .as_ref()
            .is_none_or(|(generation, _)| *generation < snapshot.generation)
        {
            *memo = Some((snapshot.generation, data.clone()));
        }
        Ok(data)
    }

    /// Distinct values of an arbitrary property key
    pub fn distinct_values(&self, field: &str) -> Result<Vec<String>> {
        Ok(self.cache.get_feature_collection()?.distinct_values(field))
    }

    /// Features whose recognized `field` exactly equals `value`
    pub fn filter(&self, field: SearchField, value: &str) -> Result<Arc<FeatureCollection>> {
        let snapshot = self.cache.get_snapshot()?;
        let key = FilterKey {
            generation: snapshot.generation,
            field,
            value: value.to_string(),
        };
        if let Some(hit) = self.filters.get(&key) {
            return Ok(hit.clone());
        }

        self.filters
            .retain(|cached, _| cached.generation >= snapshot.generation);
        let result = Arc::new(snapshot.features.filter(field.key(), value));
        tracing::debug!(
            "Filtered {}={:?}: {} features (generation {})",
            field,
            value,
            result.len(),
            snapshot.generation
        );
        let superseded = self
            .filters
            .iter()
            .any(|entry| entry.key().generation > snapshot.generation);
        if !superseded {
            if self.filters.len() >= MAX_MEMOIZED_FILTERS {
                self.filters.clear();
            }
            self.filters.insert(key, result.clone());
        }
        Ok(result)
    }

    /// Case-insensitive substring search, not memoized
    pub fn filter_contains(&self, field: SearchField, needle: &str) -> Result<FeatureCollection> {
        Ok(self
            .cache
            .get_feature_collection()?
            .filter_contains(field.key(), needle))
    }

    /// Number of memoized filter results
    pub fn memoized_filters(&self) -> usize {
        self.filters.len()
    }
}
