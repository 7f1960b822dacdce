//! Hotel knowledge base
//!
//! One file per category under the data directory (`restaurant.json`,
//! `activities.yaml`, ...). Contents are kept verbatim as JSON values so the
//! prompt builder and the HTTP API can pass them through unchanged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::ConfigError;

pub const RESTAURANT: &str = "restaurant";
pub const ACTIVITIES: &str = "activities";
pub const EVENTS: &str = "events";
pub const SERVICES: &str = "services";

/// Loaded categories keyed by file stem
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    categories: BTreeMap<String, Value>,
    sources: BTreeMap<String, PathBuf>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json`, `*.yaml` and `*.yml` file in `dir`
    ///
    /// A file that cannot be read or parsed is logged and skipped; its
    /// category is simply absent. A missing directory yields an empty base.
    pub fn load_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut kb = Self::new();

        if !dir.exists() {
            tracing::warn!(
                path = %dir.display(),
                "Knowledge directory does not exist"
            );
            return kb;
        }

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(
                    path = %dir.display(),
                    error = %e,
                    "Failed to read knowledge directory"
                );
                return kb;
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                path.is_file() && matches!(extension, "json" | "yaml" | "yml")
            })
            .collect();
        paths.sort();

        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };

            match Self::load_file(&path) {
                Ok(value) => {
                    tracing::info!(
                        file = %path.display(),
                        category = %stem,
                        "Loaded knowledge file"
                    );
                    kb.categories.insert(stem.clone(), value);
                    kb.sources.insert(stem, path);
                }
                Err(e) => {
                    tracing::error!(
                        file = %path.display(),
                        error = %e,
                        "Failed to load knowledge file"
                    );
                }
            }
        }

        tracing::info!(
            directory = %dir.display(),
            categories = kb.categories.len(),
            "Knowledge base loading complete"
        );

        kb
    }

    /// Parse a single category file
    pub fn load_file(path: &Path) -> Result<Value, ConfigError> {
        let content = std::fs::read_to_string(path)?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match extension {
            "json" => serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e))),
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| ConfigError::ParseError(format!("YAML parse error: {}", e))),
            _ => Err(ConfigError::ParseError(format!(
                "Unsupported file type: {}",
                extension
            ))),
        }
    }

    /// Insert or replace a category
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.categories.insert(name.into(), value);
    }

    pub fn restaurant(&self) -> Option<&Value> {
        self.category(RESTAURANT)
    }

    pub fn activities(&self) -> Option<&Value> {
        self.category(ACTIVITIES)
    }

    pub fn events(&self) -> Option<&Value> {
        self.category(EVENTS)
    }

    pub fn services(&self) -> Option<&Value> {
        self.category(SERVICES)
    }

    pub fn category(&self, name: &str) -> Option<&Value> {
        self.categories.get(name)
    }

    /// Names of the loaded categories, sorted
    pub fn categories(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    /// All categories as one JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.categories
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    fn source(&self, name: &str) -> Option<&PathBuf> {
        self.sources.get(name)
    }
}

/// Shared, reloadable knowledge base
#[derive(Clone)]
pub struct KnowledgeBaseManager {
    data_dir: PathBuf,
    inner: Arc<RwLock<KnowledgeBase>>,
}

impl KnowledgeBaseManager {
    /// Load the data directory and wrap it for sharing
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let kb = KnowledgeBase::load_dir(&data_dir);
        Self {
            data_dir,
            inner: Arc::new(RwLock::new(kb)),
        }
    }

    /// Wrap an already-built knowledge base
    pub fn from_knowledge_base(data_dir: impl Into<PathBuf>, kb: KnowledgeBase) -> Self {
        Self {
            data_dir: data_dir.into(),
            inner: Arc::new(RwLock::new(kb)),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Re-read the data directory, returning the loaded category names
    pub fn reload(&self) -> Vec<String> {
        let kb = KnowledgeBase::load_dir(&self.data_dir);
        let names = kb.categories();
        *self.inner.write() = kb;
        tracing::info!(categories = ?names, "Knowledge base reloaded");
        names
    }

    /// Point-in-time copy of the knowledge base
    pub fn snapshot(&self) -> KnowledgeBase {
        self.inner.read().clone()
    }

    pub fn category(&self, name: &str) -> Option<Value> {
        self.inner.read().category(name).cloned()
    }

    /// Replace the restaurant opening hours and persist the file
    ///
    /// The file is written to a temporary sibling and renamed over the
    /// original while the write lock is held.
    pub fn update_restaurant_hours(&self, hours: Value) -> Result<Value, ConfigError> {
        let mut kb = self.inner.write();

        let mut restaurant = kb
            .restaurant()
            .cloned()
            .ok_or_else(|| ConfigError::CategoryNotFound(RESTAURANT.to_string()))?;

        let Value::Object(fields) = &mut restaurant else {
            return Err(ConfigError::InvalidValue {
                field: RESTAURANT.to_string(),
                message: "restaurant data is not an object".to_string(),
            });
        };
        fields.insert("hours".to_string(), hours);

        let path = kb
            .source(RESTAURANT)
            .cloned()
            .unwrap_or_else(|| self.data_dir.join("restaurant.json"));
        write_atomic(&path, &restaurant)?;

        kb.insert(RESTAURANT, restaurant.clone());
        tracing::info!(file = %path.display(), "Restaurant hours updated");

        Ok(restaurant)
    }
}

fn write_atomic(path: &Path, value: &Value) -> Result<(), ConfigError> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let content = match extension {
        "yaml" | "yml" => {
            serde_yaml::to_string(value).map_err(|e| ConfigError::ParseError(e.to_string()))?
        }
        _ => serde_json::to_string_pretty(value)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?,
    };

    let tmp = path.with_extension(format!("{}.tmp", extension));
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_load_dir_mixed_formats() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "restaurant.json",
            r#"{"name": "La Terrazza", "hours": {"dinner": "19:30-22:30"}}"#,
        );
        write(dir.path(), "activities.yaml", "- name: Kayak\n  price: 25\n");
        write(dir.path(), "notes.txt", "ignored");

        let kb = KnowledgeBase::load_dir(dir.path());
        assert_eq!(kb.categories(), vec!["activities", "restaurant"]);
        assert_eq!(kb.restaurant().unwrap()["name"], "La Terrazza");
        assert_eq!(kb.activities().unwrap()[0]["name"], "Kayak");
        assert!(kb.events().is_none());
    }

    #[test]
    fn test_broken_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "events.json", "{ not json");
        write(dir.path(), "services.json", r#"{"spa": true}"#);

        let kb = KnowledgeBase::load_dir(dir.path());
        assert!(kb.events().is_none());
        assert_eq!(kb.services().unwrap()["spa"], true);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let kb = KnowledgeBase::load_dir("/definitely/not/here");
        assert!(kb.is_empty());
    }

    #[test]
    fn test_update_restaurant_hours() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "restaurant.json",
            r#"{"name": "La Terrazza", "hours": {"dinner": "19:30-22:30"}}"#,
        );

        let manager = KnowledgeBaseManager::new(dir.path());
        let updated = manager
            .update_restaurant_hours(json!({"dinner": "20:00-23:00"}))
            .unwrap();
        assert_eq!(updated["hours"]["dinner"], "20:00-23:00");
        assert_eq!(updated["name"], "La Terrazza");

        // Persisted and visible after reload
        manager.reload();
        assert_eq!(
            manager.category("restaurant").unwrap()["hours"]["dinner"],
            "20:00-23:00"
        );
        assert!(!dir.path().join("restaurant.json.tmp").exists());
    }

    #[test]
    fn test_update_hours_without_restaurant() {
        let dir = TempDir::new().unwrap();
        let manager = KnowledgeBaseManager::new(dir.path());
        assert!(matches!(
            manager.update_restaurant_hours(json!({})),
            Err(ConfigError::CategoryNotFound(_))
        ));
    }

    #[test]
    fn test_reload_picks_up_new_files() {
        let dir = TempDir::new().unwrap();
        let manager = KnowledgeBaseManager::new(dir.path());
        assert!(manager.snapshot().is_empty());

        write(dir.path(), "events.json", r#"[{"name": "Jazz night"}]"#);
        assert_eq!(manager.reload(), vec!["events"]);
        assert_eq!(manager.snapshot().events().unwrap()[0]["name"], "Jazz night");
    }
}
