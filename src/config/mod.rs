use config::{Config, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub mod validator;

use crate::cli::Cli;
use crate::fields::{CollectionSchema, InMemoryFieldRegistry};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub history: HistorySettings,
    #[serde(default)]
    pub generation: GenerationSettings,
    /// Prompt templates keyed by the schema path of the field they serve
    #[serde(default)]
    pub prompts: Vec<PromptConfig>,
    /// Collection field trees, usually loaded from `config/collections`
    #[serde(default)]
    pub collections: Vec<CollectionSchema>,
}

/// Where history snapshots are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackendKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistorySettings {
    /// Maximum entries kept per field
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Debounce window for durable writes
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub backend: HistoryBackendKind,
    /// Directory for the file backend
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            debounce_ms: default_debounce_ms(),
            backend: HistoryBackendKind::default(),
            path: default_history_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationSettings {
    /// Capacity of stream and event channels
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
    /// Node kinds used for rich text fields that do not list their own
    #[serde(default = "default_kinds")]
    pub default_kinds: Vec<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            stream_buffer: default_stream_buffer(),
            default_kinds: default_kinds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PromptConfig {
    /// Schema path including the collection, e.g. `posts.articleBody.content`
    pub field: String,
    pub template: String,
    pub description: Option<String>,
}

fn default_capacity() -> usize {
    crate::history::DEFAULT_CAPACITY
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_history_path() -> PathBuf {
    PathBuf::from(".scribe/history")
}

fn default_stream_buffer() -> usize {
    64
}

fn default_kinds() -> Vec<String> {
    ["heading", "list", "quote", "link"]
        .iter()
        .map(|k| k.to_string())
        .collect()
}

impl Settings {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::from_root(".")
    }

    /// Create settings from CLI arguments (config file, then CLI overrides)
    pub fn new_with_cli(cli: &Cli) -> Result<Self, anyhow::Error> {
        let root = cli
            .config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut settings = Self::load(File::from(cli.config.clone()).required(false))?;
        settings.apply_cli_overrides(cli);
        settings.load_external_configs(root)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_root(root: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let root = root.as_ref();
        let mut settings = Self::load(File::from(root.join("scribe")).required(false))?;
        settings.load_external_configs(root)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(source: File<config::FileSourceFile, config::FileFormat>) -> Result<Self, anyhow::Error> {
        let s = Config::builder()
            .add_source(source)
            .set_default("history.capacity", default_capacity() as i64)?
            .set_default("history.debounce_ms", default_debounce_ms() as i64)?
            .set_default("history.backend", "memory")?
            .set_default("generation.stream_buffer", default_stream_buffer() as i64)?
            .build()?;

        Ok(s.try_deserialize()?)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        validator::ConfigValidator::validate(self).map_err(|errors| {
            let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!("Configuration validation failed:\n{}", error_messages.join("\n"))
        })
    }

    /// Apply CLI argument overrides to settings
    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(dir) = &cli.history_dir {
            self.history.backend = HistoryBackendKind::File;
            self.history.path = dir.clone();
        }
        if let Some(capacity) = cli.history_capacity {
            self.history.capacity = capacity;
        }
    }

    fn load_external_configs(&mut self, root: &Path) -> Result<(), anyhow::Error> {
        self.collections
            .extend(load_dir::<CollectionSchema>(&root.join("config/collections"))?);
        self.prompts
            .extend(load_dir::<PromptConfig>(&root.join("config/prompts"))?);
        Ok(())
    }

    /// Prompt templates keyed by schema path
    pub fn prompt_templates(&self) -> HashMap<String, String> {
        self.prompts
            .iter()
            .map(|p| (p.field.clone(), p.template.clone()))
            .collect()
    }

    /// Field registry over every configured collection
    pub fn field_registry(&self) -> InMemoryFieldRegistry {
        InMemoryFieldRegistry::new(self.collections.iter().cloned())
    }
}

/// Read every `*.json`, `*.yaml`, `*.yml` and `*.toml` file in `dir`.
/// A missing directory yields nothing.
pub fn load_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, anyhow::Error> {
    let pattern = format!("{}/*", dir.display());
    let mut items = Vec::new();

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in glob::glob(&pattern)? {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => tracing::warn!("Failed to read glob entry: {}", e),
        }
    }
    paths.sort();

    for path in paths {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !matches!(ext, "json" | "yaml" | "yml" | "toml") {
            continue;
        }

        let content = std::fs::read_to_string(&path)?;
        let item: T = match ext {
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        tracing::debug!(file = %path.display(), "Loaded config file");
        items.push(item);
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_files() {
        let dir = tempdir().unwrap();
        let settings = Settings::from_root(dir.path()).unwrap();

        assert_eq!(settings.history.capacity, 50);
        assert_eq!(settings.history.debounce_ms, 500);
        assert_eq!(settings.history.backend, HistoryBackendKind::Memory);
        assert_eq!(settings.generation.stream_buffer, 64);
        assert!(settings.collections.is_empty());
    }

    #[test]
    fn test_load_file_and_external_configs() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("scribe.toml"),
            "[history]\ncapacity = 10\nbackend = \"file\"\npath = \"hist\"\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("config/collections")).unwrap();
        fs::write(
            dir.path().join("config/collections/posts.yaml"),
            "slug: posts\nfields:\n  - kind: leaf\n    name: title\n    fieldType: text\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("config/prompts")).unwrap();
        fs::write(
            dir.path().join("config/prompts/title.json"),
            r#"{"field":"posts.title","template":"Write a title"}"#,
        )
        .unwrap();

        let settings = Settings::from_root(dir.path()).unwrap();
        assert_eq!(settings.history.capacity, 10);
        assert_eq!(settings.history.backend, HistoryBackendKind::File);
        assert_eq!(settings.history.path, PathBuf::from("hist"));
        assert_eq!(settings.collections.len(), 1);
        assert_eq!(
            settings.prompt_templates().get("posts.title").map(String::as_str),
            Some("Write a title")
        );
    }

    #[test]
    fn test_invalid_prompt_reference_is_rejected() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config/prompts")).unwrap();
        fs::write(
            dir.path().join("config/prompts/missing.json"),
            r#"{"field":"posts.summary","template":"Summarize"}"#,
        )
        .unwrap();

        let err = Settings::from_root(dir.path()).unwrap_err();
        assert!(err.to_string().contains("posts.summary"));
    }

    #[test]
    fn test_cli_overrides() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("scribe.toml");
        fs::write(&config, "[history]\ncapacity = 10\n").unwrap();
        let history_dir = dir.path().join("history");

        let cli = Cli::parse_from([
            "scribe",
            "--config",
            config.to_str().unwrap(),
            "--history-dir",
            history_dir.to_str().unwrap(),
            "--history-capacity",
            "5",
            "field-schema",
        ]);
        let settings = Settings::new_with_cli(&cli).unwrap();

        assert_eq!(settings.history.capacity, 5);
        assert_eq!(settings.history.backend, HistoryBackendKind::File);
        assert_eq!(settings.history.path, history_dir);
    }
}
