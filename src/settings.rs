//! Settings loaded from a TOML file
//!
//! ```toml
//! [generation]
//! calendar_policy = "replace"
//! n_bound = 200
//!
//! [properties]
//! P1082 = "quantity"
//!
//! [items]
//! Peru = "Q419"
//!
//! [items.countries]
//! Georgia = "Q230"
//!
//! [instances]
//! Q419 = ["Q6256"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::expr::ItemTable;
use crate::provider::{PropertyType, PropertyTypeProvider, ProviderError};
use crate::template::CalendarPolicy;

/// Errors that can occur when loading settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse settings TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Loaded settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub generation: GenerationConfig,
    /// Locally defined property types
    pub properties: IndexMap<String, PropertyType>,
    pub items: ItemTable,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TomlSettings {
    #[serde(default)]
    generation: TomlGeneration,
    #[serde(default)]
    properties: IndexMap<String, PropertyType>,
    #[serde(default)]
    items: BTreeMap<String, TomlItem>,
    #[serde(default)]
    instances: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TomlGeneration {
    calendar_policy: Option<CalendarPolicy>,
    n_bound: Option<usize>,
    misalignment_factor: Option<f64>,
    misalignment_offset: Option<f64>,
    padding_cost: Option<f64>,
}

/// `Peru = "Q419"` in the default context, or a table of one context
#[derive(Deserialize)]
#[serde(untagged)]
enum TomlItem {
    Item(String),
    Context(BTreeMap<String, String>),
}

impl Settings {
    /// Load settings from TOML file
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load settings from TOML string
    pub fn from_str(content: &str) -> Result<Self, SettingsError> {
        let parsed: TomlSettings = toml::from_str(content)?;

        let g = parsed.generation;
        let defaults = GenerationConfig::default();
        let generation = GenerationConfig {
            calendar_policy: g.calendar_policy.unwrap_or(defaults.calendar_policy),
            n_bound: g.n_bound.or(defaults.n_bound),
            misalignment_factor: g.misalignment_factor.unwrap_or(defaults.misalignment_factor),
            misalignment_offset: g.misalignment_offset.unwrap_or(defaults.misalignment_offset),
            padding_cost: g.padding_cost.unwrap_or(defaults.padding_cost),
        };

        let mut items = ItemTable::new();
        for (key, entry) in parsed.items {
            match entry {
                TomlItem::Item(item) => items.insert_value("", key, item),
                TomlItem::Context(values) => {
                    for (value, item) in values {
                        items.insert_value(key.as_str(), value, item);
                    }
                }
            }
        }
        for (item, classes) in parsed.instances {
            for class in classes {
                items.add_instance(item.as_str(), class);
            }
        }

        Ok(Settings {
            generation,
            properties: parsed.properties,
            items,
        })
    }

    /// Register the locally defined properties with `provider`
    pub fn register_properties(&self, provider: &dyn PropertyTypeProvider) -> Result<(), ProviderError> {
        for (property, data_type) in &self.properties {
            debug!(property, data_type = %data_type, "registering local property");
            provider.save_entry(property, *data_type)?;
        }
        Ok(())
    }
}
