use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use toml::Value;

use crate::error::{Error, Result};

pub mod settings;

pub use settings::{GlobalConfig, OptimizeFlags, Settings};

#[derive(Debug, Clone)]
pub struct ConfigDoc {
    pub path: PathBuf,
    pub value: Value,
}

impl ConfigDoc {
    pub fn parse(path: &Path, raw: &str) -> Result<Self> {
        let value: Value = toml::from_str(raw)
            .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            value,
        })
    }

    pub fn value_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if path.is_empty() {
            return Some(&self.value);
        }
        path.split('.')
            .try_fold(&self.value, |cur, seg| cur.as_table()?.get(seg))
    }

    pub fn deserialize_path<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(v) = self.value_path(path) else {
            return Ok(None);
        };
        let parsed = v.clone().try_into().map_err(|e| {
            Error::msg(format!(
                "failed to deserialize '{}' in {}: {e}",
                if path.is_empty() { "<root>" } else { path },
                self.path.display()
            ))
        })?;
        Ok(Some(parsed))
    }

    // Missing sections fall back to their defaults.
    pub fn section<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        Ok(self.deserialize_path(key)?.unwrap_or_default())
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        self.value.clone().try_into().map_err(|e| {
            Error::msg(format!("failed to deserialize {}: {e}", self.path.display()))
        })
    }
}

// Tables merge key by key; any other value in `overlay` replaces the base value.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_tbl), Value::Table(over_tbl)) => {
            for (k, v) in over_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn take_imports(path: &Path, tbl: &mut toml::value::Table) -> Result<Vec<String>> {
    let Some(raw) = tbl.remove("imports") else {
        return Ok(Vec::new());
    };
    let Value::Array(items) = raw else {
        return Err(Error::msg(format!(
            "imports in {} must be an array of strings",
            path.display()
        )));
    };
    let mut out = Vec::new();
    for item in items {
        let Some(s) = item.as_str() else {
            return Err(Error::msg(format!(
                "invalid imports entry in {} (expected string)",
                path.display()
            )));
        };
        if !s.trim().is_empty() {
            out.push(s.trim().to_string());
        }
    }
    Ok(out)
}

fn load_layer(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::msg(format!(
            "config import cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read config {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;

    let mut out = Value::Table(Default::default());
    if let Some(tbl) = value.as_table_mut() {
        if let Some(parent) = tbl.remove("extends") {
            let Some(parent) = parent.as_str() else {
                return Err(Error::msg(format!(
                    "extends in {} must be a string",
                    path.display()
                )));
            };
            out = load_layer(&resolve_ref_path(path, parent), stack)?;
        }
        for imp in take_imports(path, tbl)? {
            let loaded = load_layer(&resolve_ref_path(path, &imp), stack)?;
            merge(&mut out, loaded);
        }
    }
    merge(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load(path: &Path) -> Result<ConfigDoc> {
    let mut stack = HashSet::<PathBuf>::new();
    let value = load_layer(path, &mut stack)?;
    Ok(ConfigDoc {
        path: path.to_path_buf(),
        value,
    })
}

// Load `base` and deep-merge `overlay` on top when it exists.
pub fn load_overlaid(base: &Path, overlay: Option<&Path>) -> Result<ConfigDoc> {
    let mut doc = load(base)?;
    if let Some(over) = overlay.filter(|p| p.is_file()) {
        let over_doc = load(over)?;
        merge(&mut doc.value, over_doc.value);
    }
    Ok(doc)
}
