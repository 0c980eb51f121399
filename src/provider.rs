//! Property-type lookup
//!
//! Statement validation asks which data kind a property carries. The answer
//! comes from an external knowledge base, so lookups go through the
//! [`PropertyTypeProvider`] trait. Batches of lookups are bracketed by a
//! [`BulkQuery`] guard, which ends the bulk scope on every exit path.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

/// Data kind of a property or annotated value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PropertyType {
    GlobeCoordinate,
    Quantity,
    Time,
    String,
    MonolingualText,
    ExternalId,
    WikibaseItem,
    WikibaseProperty,
    Url,
}

impl PropertyType {
    pub fn name(&self) -> &'static str {
        match self {
            PropertyType::GlobeCoordinate => "globecoordinate",
            PropertyType::Quantity => "quantity",
            PropertyType::Time => "time",
            PropertyType::String => "string",
            PropertyType::MonolingualText => "monolingualtext",
            PropertyType::ExternalId => "externalid",
            PropertyType::WikibaseItem => "wikibaseitem",
            PropertyType::WikibaseProperty => "wikibaseproperty",
            PropertyType::Url => "url",
        }
    }

    /// Whether values of this kind are entity ids looked up with `item[...]`
    pub fn is_entity(&self) -> bool {
        matches!(self, PropertyType::WikibaseItem | PropertyType::WikibaseProperty)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown data type '{0}'")]
pub struct UnknownPropertyType(pub String);

impl FromStr for PropertyType {
    type Err = UnknownPropertyType;

    /// Case-insensitive; `wikibase-item` and `globe_coordinate` spellings are accepted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        Ok(match folded.as_str() {
            "globecoordinate" => PropertyType::GlobeCoordinate,
            "quantity" => PropertyType::Quantity,
            "time" => PropertyType::Time,
            "string" => PropertyType::String,
            "monolingualtext" => PropertyType::MonolingualText,
            "externalid" => PropertyType::ExternalId,
            "wikibaseitem" => PropertyType::WikibaseItem,
            "wikibaseproperty" => PropertyType::WikibaseProperty,
            "url" => PropertyType::Url,
            _ => return Err(UnknownPropertyType(s.to_string())),
        })
    }
}

impl TryFrom<String> for PropertyType {
    type Error = UnknownPropertyType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PropertyType> for String {
    fn from(value: PropertyType) -> Self {
        value.name().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("property '{property}' not found")]
    PropertyNotFound { property: String },
}

impl ProviderError {
    pub fn not_found(property: impl Into<String>) -> Self {
        Self::PropertyNotFound {
            property: property.into(),
        }
    }
}

/// Source of property data types
pub trait PropertyTypeProvider: Send + Sync {
    fn get_property_type(&self, property: &str) -> Result<PropertyType, ProviderError>;

    /// Enter bulk mode; calls nest
    fn begin_bulk(&self) {}

    /// Leave bulk mode, flushing any batched work
    fn end_bulk(&self) {}

    /// Record a locally defined property
    fn save_entry(&self, property: &str, data_type: PropertyType) -> Result<(), ProviderError>;
}

/// Scoped bulk mode; ends the scope when dropped
pub struct BulkQuery<'a> {
    provider: &'a dyn PropertyTypeProvider,
}

impl<'a> BulkQuery<'a> {
    pub fn new(provider: &'a dyn PropertyTypeProvider) -> Self {
        provider.begin_bulk();
        Self { provider }
    }
}

impl Drop for BulkQuery<'_> {
    fn drop(&mut self) {
        self.provider.end_bulk();
    }
}

/// In-memory table of property types
#[derive(Debug, Default)]
pub struct DictionaryProvider {
    entries: DashMap<String, PropertyType>,
}

impl DictionaryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, property: impl Into<String>, data_type: PropertyType) -> Self {
        self.entries.insert(property.into(), data_type);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PropertyTypeProvider for DictionaryProvider {
    fn get_property_type(&self, property: &str) -> Result<PropertyType, ProviderError> {
        self.entries
            .get(property)
            .map(|entry| *entry.value())
            .ok_or_else(|| ProviderError::not_found(property))
    }

    fn save_entry(&self, property: &str, data_type: PropertyType) -> Result<(), ProviderError> {
        self.entries.insert(property.to_string(), data_type);
        Ok(())
    }
}

/// Memoizes another provider for the lifetime of a session
///
/// Found types are kept until the cache is dropped. Misses are only
/// remembered while a bulk scope is open, so a property saved later is still
/// seen outside bulk mode.
pub struct CachingProvider<P> {
    inner: P,
    found: DashMap<String, PropertyType>,
    missing: DashMap<String, ProviderError>,
    bulk_depth: AtomicUsize,
}

impl<P: PropertyTypeProvider> CachingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            found: DashMap::new(),
            missing: DashMap::new(),
            bulk_depth: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn in_bulk(&self) -> bool {
        self.bulk_depth.load(Ordering::SeqCst) > 0
    }

    pub fn cached(&self) -> usize {
        self.found.len()
    }
}

impl<P: PropertyTypeProvider> PropertyTypeProvider for CachingProvider<P> {
    fn get_property_type(&self, property: &str) -> Result<PropertyType, ProviderError> {
        if let Some(hit) = self.found.get(property) {
            return Ok(*hit.value());
        }
        if let Some(miss) = self.missing.get(property) {
            return Err(miss.value().clone());
        }
        trace!(property, "property type cache miss");
        match self.inner.get_property_type(property) {
            Ok(data_type) => {
                self.found.insert(property.to_string(), data_type);
                Ok(data_type)
            }
            Err(e) => {
                if self.in_bulk() {
                    self.missing.insert(property.to_string(), e.clone());
                }
                Err(e)
            }
        }
    }

    fn begin_bulk(&self) {
        if self.bulk_depth.fetch_add(1, Ordering::SeqCst) == 0 {
            debug!("property type bulk query started");
            self.inner.begin_bulk();
        }
    }

    fn end_bulk(&self) {
        let previous = self
            .bulk_depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1))
            .unwrap_or(0);
        if previous == 1 {
            self.missing.clear();
            self.inner.end_bulk();
            debug!(cached = self.found.len(), "property type bulk query ended");
        }
    }

    fn save_entry(&self, property: &str, data_type: PropertyType) -> Result<(), ProviderError> {
        self.inner.save_entry(property, data_type)?;
        self.missing.remove(property);
        self.found.insert(property.to_string(), data_type);
        Ok(())
    }
}
