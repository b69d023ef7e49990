// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Wattline.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Configuration registry.
//!
//! Every leaf of a configuration record has exactly one synchronization path:
//! its serde field names joined by `/`. Records can be exported as
//! `(path, value)` pairs and rebuilt from any subset of them, falling back to
//! defaults for whatever is missing.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::{ConfigError, ConfigResult};

/// Path separator inside a synchronization path
pub const PATH_SEPARATOR: char = '/';

/// Synchronization-path access for any defaulted serde record
pub trait ConfigRegistry: Serialize + DeserializeOwned + Default {
    /// All leaves as (path, value) pairs, in path order
    fn export_paths(&self) -> ConfigResult<Vec<(String, Value)>> {
        let tree = to_tree(self)?;
        let mut out = Vec::new();
        flatten("", &tree, &mut out);
        Ok(out)
    }

    /// Same as `export_paths`, with every path placed under `prefix`
    fn export_paths_with_prefix(&self, prefix: &str) -> ConfigResult<Vec<(String, Value)>> {
        let prefix = prefix.trim_end_matches(PATH_SEPARATOR);
        Ok(self
            .export_paths()?
            .into_iter()
            .map(|(path, value)| (format!("{prefix}{PATH_SEPARATOR}{path}"), value))
            .collect())
    }

    /// Rebuild from defaults overlaid with the given pairs.
    ///
    /// Unknown paths are skipped. A value that does not fit its field is
    /// rejected with a warning and the default for that path is kept.
    fn from_paths<I, P>(pairs: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (P, Value)>,
        P: AsRef<str>,
    {
        let mut tree = to_tree(&Self::default())?;

        for (path, value) in pairs {
            let path = path.as_ref();
            let mut candidate = tree.clone();
            if !insert(&mut candidate, path, value) {
                debug!("Ignoring unknown config path '{}'", path);
                continue;
            }
            match serde_json::from_value::<Self>(candidate.clone()) {
                Ok(_) => tree = candidate,
                Err(e) => {
                    warn!("Rejected value for config path '{}', keeping default: {}", path, e);
                }
            }
        }

        from_tree(tree, "<record>")
    }

    /// Copy of this record with one path replaced. Errors on unknown paths or
    /// values of the wrong type.
    fn with_path(&self, path: &str, value: Value) -> ConfigResult<Self> {
        let mut tree = to_tree(self)?;
        if !insert(&mut tree, path, value) {
            return Err(ConfigError::InvalidValue {
                path: path.to_owned(),
                reason: "unknown path".to_owned(),
            });
        }
        from_tree(tree, path)
    }
}

impl<T> ConfigRegistry for T where T: Serialize + DeserializeOwned + Default {}

fn to_tree<T: Serialize>(record: &T) -> ConfigResult<Value> {
    serde_json::to_value(record).map_err(|e| ConfigError::Invalid {
        what: "config record".to_owned(),
        reason: e.to_string(),
    })
}

fn from_tree<T: DeserializeOwned>(tree: Value, path: &str) -> ConfigResult<T> {
    serde_json::from_value(tree).map_err(|e| ConfigError::InvalidValue {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}{PATH_SEPARATOR}{key}")
                };
                flatten(&path, child, out);
            }
        }
        _ => out.push((prefix.to_owned(), value.clone())),
    }
}

/// Place `value` at `path`. Only existing keys are accepted, except below a
/// null leaf (an unset optional section), which is expanded into an object.
fn insert(tree: &mut Value, path: &str, value: Value) -> bool {
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let mut node = tree;
    let mut expanded = false;
    for segment in parents {
        if node.is_null() {
            *node = Value::Object(Map::new());
            expanded = true;
        }
        let Value::Object(map) = node else {
            return false;
        };
        if !map.contains_key(*segment) {
            if !expanded {
                return false;
            }
            map.insert((*segment).to_owned(), Value::Null);
        }
        let Some(next) = map.get_mut(*segment) else {
            return false;
        };
        node = next;
    }

    if node.is_null() {
        *node = Value::Object(Map::new());
        expanded = true;
    }
    let Value::Object(map) = node else {
        return false;
    };
    if !expanded && !map.contains_key(*last) {
        return false;
    }
    map.insert((*last).to_owned(), value);
    true
}
