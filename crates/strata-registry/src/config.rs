//! Sources file loading and validation.
//!
//! The sources file is a YAML document with a single `sources` sequence.
//! Each source is validated on its own: one bad entry is recorded as a
//! [`SourceRejection`] and skipped while the rest still load. Only a document
//! that cannot be read as a mapping at all fails the whole load.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::ConfigError;

/// Environment variable that overrides the config directory.
pub const CONFIG_DIR_ENV: &str = "STRATA_CONFIG_DIR";

/// File name of the sources file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "sources.yaml";

/// Written on first run when no sources file exists.
pub const DEFAULT_CONFIG: &str = "\
# strata filesystem sources
#
# Each entry under `sources` becomes one named filesystem. `name` must be
# unique and is the key clients address the filesystem by. `path` is the
# backend root; it may carry its protocol (`memory://scratch`,
# `s3://bucket/prefix`) or you can set `protocol` explicitly. A bare path
# such as `~/data` uses the local disk.
#
# Positional driver arguments go in `args`, named ones in `kwargs`:
#
#   - name: archive
#     path: /srv/archive
#     kwargs:
#       read_only: true
#
# Uncomment to get started:
#
# sources:
#   - name: scratch
#     path: memory://
#   - name: testing
#     path: memory://testing
";

/// One configured filesystem source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSpec {
    /// Unique key for the source.
    pub name: String,
    /// Backend root, optionally `scheme://`-qualified.
    pub path: String,
    /// Explicit protocol; inferred from `path` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Positional driver arguments.
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<Value>,
    /// Named driver arguments.
    #[serde(default, deserialize_with = "null_as_default")]
    pub kwargs: Map<String, Value>,
}

/// `args:` with no value is the same as leaving it out.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl SourceSpec {
    /// Create a source with no driver arguments.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            protocol: None,
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    /// Set the protocol explicitly.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Add a named driver argument.
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    fn check(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("`name` must not be empty".into());
        }
        if self.path.trim().is_empty() {
            return Err("`path` must not be empty".into());
        }
        if matches!(&self.protocol, Some(p) if p.trim().is_empty()) {
            return Err("`protocol` must not be empty when given".into());
        }
        Ok(())
    }
}

/// A source entry that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRejection {
    /// Position in the `sources` sequence.
    pub index: usize,
    /// The entry's name, if it had a readable one.
    pub name: Option<String>,
    pub reason: String,
}

/// A validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    sources: Vec<SourceSpec>,
    rejected: Vec<SourceRejection>,
    hash: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_sources(Vec::new())
    }
}

impl Config {
    /// Build a config from in-memory sources.
    ///
    /// Applies the same checks as [`Config::parse`]: invalid entries and
    /// repeated names land in [`Config::rejected`].
    pub fn from_sources(sources: Vec<SourceSpec>) -> Self {
        Self::accept(
            sources
                .into_iter()
                .map(|spec| (Some(spec.name.clone()), Ok(spec))),
        )
    }

    /// Parse and validate a sources document.
    ///
    /// `origin` is only used for error messages.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let malformed = |reason: String| ConfigError::Malformed {
            path: origin.to_path_buf(),
            reason,
        };

        let blank = text.lines().all(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#')
        });
        if blank {
            return Ok(Self::default());
        }

        let document: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| malformed(e.to_string()))?;

        let items = match document {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(map) => {
                for key in map.keys() {
                    if key.as_str() != Some("sources") {
                        warn!(key = ?key, path = %origin.display(), "ignoring unknown top-level config key");
                    }
                }
                match map.get("sources") {
                    None | Some(serde_yaml::Value::Null) => Vec::new(),
                    Some(serde_yaml::Value::Sequence(items)) => items.clone(),
                    Some(_) => return Err(malformed("`sources` must be a sequence".into())),
                }
            }
            _ => return Err(malformed("top level must be a mapping".into())),
        };

        let items = items.into_iter().map(|item| {
            let name = item
                .get("name")
                .and_then(serde_yaml::Value::as_str)
                .map(str::to_owned);
            let spec = serde_yaml::from_value::<SourceSpec>(item).map_err(|e| e.to_string());
            (name, spec)
        });
        Ok(Self::accept(items))
    }

    /// Validate each source on its own and keep the first of every name.
    fn accept<I>(items: I) -> Self
    where
        I: IntoIterator<Item = (Option<String>, Result<SourceSpec, String>)>,
    {
        let mut sources = Vec::new();
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();

        for (index, (name, spec)) in items.into_iter().enumerate() {
            let outcome = spec
                .and_then(|spec| spec.check().map(|()| spec))
                .and_then(|spec| {
                    if seen.insert(spec.name.clone()) {
                        Ok(spec)
                    } else {
                        Err(format!("duplicate source name `{}`", spec.name))
                    }
                });

            match outcome {
                Ok(spec) => sources.push(spec),
                Err(reason) => {
                    warn!(index, name = ?name, %reason, "skipping invalid source");
                    rejected.push(SourceRejection {
                        index,
                        name,
                        reason,
                    });
                }
            }
        }

        let hash = hash_sources(&sources);
        Self {
            sources,
            rejected,
            hash,
        }
    }

    /// Sources that passed validation, in file order.
    pub fn sources(&self) -> &[SourceSpec] {
        &self.sources
    }

    /// Sources that failed validation.
    pub fn rejected(&self) -> &[SourceRejection] {
        &self.rejected
    }

    /// Content hash of the accepted sources.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Hex blake3 over the length-prefixed fields of every source.
///
/// Driver arguments go in as compact JSON; object keys are sorted, so
/// reordering kwargs does not change the hash.
fn hash_sources(sources: &[SourceSpec]) -> String {
    let mut hasher = blake3::Hasher::new();
    for spec in sources {
        let args = Value::Array(spec.args.clone()).to_string();
        let kwargs = Value::Object(spec.kwargs.clone()).to_string();
        let protocol = spec.protocol.as_deref().unwrap_or_default();
        let fields: [&str; 5] = [&spec.name, &spec.path, protocol, &args, &kwargs];
        for field in fields {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// Reads the sources file from a fixed location.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// Loader for an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loader for the per-user default location.
    pub fn from_default_location() -> Result<Self, ConfigError> {
        Ok(Self::new(Self::default_path()?))
    }

    /// `$STRATA_CONFIG_DIR/sources.yaml`, else `<config dir>/strata/sources.yaml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        default_path_with(std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the sources file.
    ///
    /// A missing file is replaced with [`DEFAULT_CONFIG`] and loads as an
    /// empty config.
    pub async fn load(&self) -> Result<Config, ConfigError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                let config = Config::parse(&text, &self.path)?;
                debug!(
                    path = %self.path.display(),
                    sources = config.sources().len(),
                    rejected = config.rejected().len(),
                    "loaded config"
                );
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.write_default().await?;
                Ok(Config::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Write the commented placeholder config, creating parent directories.
    pub async fn write_default(&self) -> Result<(), ConfigError> {
        let not_found = |source| ConfigError::NotFound {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(not_found)?;
        }
        tokio::fs::write(&self.path, DEFAULT_CONFIG)
            .await
            .map_err(not_found)?;
        info!(path = %self.path.display(), "wrote default config");
        Ok(())
    }
}

fn default_path_with(override_dir: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    let dir = match override_dir {
        Some(dir) => dir,
        None => dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("strata"),
    };
    Ok(dir.join(CONFIG_FILE_NAME))
}
