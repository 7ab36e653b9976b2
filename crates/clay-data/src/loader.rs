//! Content-pack loading: reads data files, assembles a [`ContentPack`] and
//! builds a validated [`Catalog`].
//!
//! A pack is either a single file holding every table, or a directory with
//! one file per table (`resources.ron`, `buildings.json`, `rules.toml`, ...).
//! Format is detected from the extension.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use clay_core::catalog::{Catalog, CatalogError, ContentPack, RulesDefinition};
use clay_core::config::{ConfigError, EngineConfig};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: &'static str, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// The pack parsed but failed catalog validation.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The engine configuration parsed but is out of range.
    #[error("invalid engine config in {file}: {source}")]
    Config {
        file: PathBuf,
        #[source]
        source: ConfigError,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name.
///
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// more than one format exists for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }
    Ok(found)
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a file and deserialize it according to its format.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. TOML has no top-level arrays, so the
/// list is read from the array under `toml_key`; RON and JSON hold the list
/// directly.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    match detect_format(path)? {
        Format::Ron | Format::Json => deserialize_file(path),
        Format::Toml => {
            let content = std::fs::read_to_string(path)?;
            let mut table: toml::Table =
                toml::from_str(&content).map_err(|e| parse_error(path, e))?;
            let array = table
                .remove(toml_key)
                .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?;
            array
                .try_into()
                .map_err(|e: toml::de::Error| parse_error(path, e))
        }
    }
}

// ===========================================================================
// Pack assembly
// ===========================================================================

/// Tables a pack directory must contain.
pub const REQUIRED_TABLES: [&str; 2] = ["resources", "eras"];

fn table<T: DeserializeOwned>(dir: &Path, name: &'static str) -> Result<Vec<T>, DataLoadError> {
    match find_data_file(dir, name)? {
        Some(path) => {
            let rows: Vec<T> = deserialize_list(&path, name)?;
            tracing::debug!(table = name, rows = rows.len(), "data.table_loaded");
            Ok(rows)
        }
        None if REQUIRED_TABLES.contains(&name) => Err(DataLoadError::MissingRequired {
            file: name,
            dir: dir.to_path_buf(),
        }),
        None => Ok(Vec::new()),
    }
}

/// Assemble a pack from one file per table. Only `resources` and `eras`
/// are required; `rules` is a single table and defaults when absent.
pub fn load_pack_dir(dir: &Path) -> Result<ContentPack, DataLoadError> {
    let rules: RulesDefinition = match find_data_file(dir, "rules")? {
        Some(path) => deserialize_file(&path)?,
        None => RulesDefinition::default(),
    };
    Ok(ContentPack {
        resources: table(dir, "resources")?,
        buildings: table(dir, "buildings")?,
        projects: table(dir, "projects")?,
        eras: table(dir, "eras")?,
        factions: table(dir, "factions")?,
        contracts: table(dir, "contracts")?,
        events: table(dir, "events")?,
        policies: table(dir, "policies")?,
        event_chains: table(dir, "event_chains")?,
        metahumans: table(dir, "metahumans")?,
        people: table(dir, "people")?,
        legacy_upgrades: table(dir, "legacy_upgrades")?,
        domains: table(dir, "domains")?,
        dispatches: table(dir, "dispatches")?,
        megaproject_families: table(dir, "megaproject_families")?,
        achievements: table(dir, "achievements")?,
        rules,
    })
}

/// Load a whole pack from one file.
pub fn load_pack_file(path: &Path) -> Result<ContentPack, DataLoadError> {
    deserialize_file(path)
}

/// Load a pack from a file or a directory and build the catalog.
pub fn load_catalog(path: &Path) -> Result<Catalog, DataLoadError> {
    let pack = if path.is_dir() {
        load_pack_dir(path)?
    } else {
        load_pack_file(path)?
    };
    let catalog = Catalog::from_pack(pack)?;
    tracing::info!(
        path = %path.display(),
        resources = catalog.resources().len(),
        buildings = catalog.buildings().len(),
        projects = catalog.projects().len(),
        "data.catalog_loaded"
    );
    Ok(catalog)
}

/// Parse a catalog from an in-memory JSON pack.
pub fn catalog_from_json(json: &str) -> Result<Catalog, DataLoadError> {
    let pack: ContentPack =
        serde_json::from_str(json).map_err(|e| parse_error(Path::new("<memory>"), e))?;
    Ok(Catalog::from_pack(pack)?)
}

/// Load and validate engine tuning from a TOML, RON or JSON file.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig, DataLoadError> {
    let config: EngineConfig = deserialize_file(path)?;
    config.validate().map_err(|source| DataLoadError::Config {
        file: path.to_path_buf(),
        source,
    })?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
