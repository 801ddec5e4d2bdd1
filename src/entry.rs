//! Persisted configuration entry: credentials, options and the entity registry.
//!
//! Stored as JSON next to the binary's working directory. Older layouts are
//! upgraded in place by [`ConfigEntry::migrate`].

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_SCAN_TIMEOUT_SECS};
use crate::entities::Entity;

pub const ENTRY_VERSION: u32 = 3;
pub const ENTRY_MINOR_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_update: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub entity_id: String,
    pub unique_id: String,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub version: u32,
    #[serde(default)]
    pub minor_version: u32,
    #[serde(default)]
    pub data: EntryData,
    #[serde(default)]
    pub entities: Vec<RegistryEntry>,
}

#[derive(Debug)]
pub enum EntryError {
    Io { path: PathBuf, source: io::Error },
    Json { path: PathBuf, at: String, source: serde_json::Error },
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            EntryError::Json { path, at, source } => write!(f, "{} (at {}): {}", path.display(), at, source),
        }
    }
}

impl std::error::Error for EntryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EntryError::Io { source, .. } => Some(source),
            EntryError::Json { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum MigrationError {
    /// Entry was written by a newer release.
    Downgrade { version: u32 },
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationError::Downgrade { version } => write!(
                f,
                "config entry version {} is newer than supported version {}",
                version, ENTRY_VERSION
            ),
        }
    }
}

impl std::error::Error for MigrationError {}

/// New unique id for ids written with the old space separator.
pub fn update_unique_id(unique_id: &str) -> Option<String> {
    unique_id.contains(' ').then(|| unique_id.replace(' ', "_"))
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

impl ConfigEntry {
    pub fn new(data: EntryData) -> Self {
        ConfigEntry {
            version: ENTRY_VERSION,
            minor_version: ENTRY_MINOR_VERSION,
            data,
            entities: Vec::new(),
        }
    }

    /// Read the entry; `Ok(None)` when nothing has been stored yet.
    pub fn load(path: &Path) -> Result<Option<Self>, EntryError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(EntryError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let de = &mut serde_json::Deserializer::from_str(&raw);
        serde_path_to_error::deserialize(de)
            .map(Some)
            .map_err(|e| EntryError::Json {
                path: path.to_path_buf(),
                at: e.path().to_string(),
                source: e.into_inner(),
            })
    }

    pub fn save(&self, path: &Path) -> Result<(), EntryError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| EntryError::Json {
            path: path.to_path_buf(),
            at: String::from("."),
            source,
        })?;
        // Write-then-rename so a crash never leaves a truncated entry behind.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, path))
            .map_err(|source| EntryError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Upgrade an entry stored by an older release. Returns whether anything changed.
    pub fn migrate(&mut self) -> Result<bool, MigrationError> {
        if self.version > ENTRY_VERSION {
            return Err(MigrationError::Downgrade { version: self.version });
        }
        if self.version == ENTRY_VERSION && self.minor_version >= ENTRY_MINOR_VERSION {
            return Ok(false);
        }

        debug!("Migrating configuration from version {}.{}", self.version, self.minor_version);
        if self.version < ENTRY_VERSION {
            let data = &mut self.data;
            data.pin.get_or_insert_with(String::new);
            data.force_update.get_or_insert(true);
            data.scan_interval.get_or_insert(DEFAULT_SCAN_INTERVAL_SECS);
            data.timeout.get_or_insert(DEFAULT_SCAN_TIMEOUT_SECS);

            for entity in &mut self.entities {
                if let Some(new_id) = update_unique_id(&entity.unique_id) {
                    debug!("Migrating unique id '{}' to '{}'", entity.unique_id, new_id);
                    entity.unique_id = new_id;
                }
            }
        }

        self.version = ENTRY_VERSION;
        self.minor_version = ENTRY_MINOR_VERSION;
        info!("Migrated configuration to version {}.{}", self.version, self.minor_version);
        Ok(true)
    }

    /// `base`, or `base_2`, `base_3`, ... when it is already registered.
    fn free_entity_id(&self, base: &str) -> String {
        let taken = |id: &str| self.entities.iter().any(|e| e.entity_id == id);
        if !taken(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|id| !taken(id))
            .unwrap_or_else(|| base.to_string())
    }

    /// Add registry records for entities not seen before. Returns how many were added.
    pub fn register_entities<'a>(&mut self, entities: impl IntoIterator<Item = &'a dyn Entity>) -> usize {
        let mut added = 0;
        for entity in entities {
            if self.entities.iter().any(|e| e.unique_id == entity.unique_id()) {
                continue;
            }
            let platform = entity.platform().as_str();
            let entity_id = self.free_entity_id(&format!("{}.{}", platform, slugify(entity.name())));
            self.entities.push(RegistryEntry {
                entity_id,
                unique_id: entity.unique_id().to_string(),
                platform: platform.to_string(),
            });
            added += 1;
        }
        added
    }
}
