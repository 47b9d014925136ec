//! Shape catalogs and settings files.
//!
//! A catalog is a JSON document listing shape definitions:
//!
//! ```json
//! {
//!   "shapes": {
//!     "Item":   { "record": { "params": ["T"], "fields": { "value": "T" } } },
//!     "Color":  { "enum": ["RED", "GREEN"] },
//!     "Bag":    { "sequence": { "param": "E", "unique": false } },
//!     "Lookup": { "mapping": { "params": ["K", "V"] } }
//!   }
//! }
//! ```
//!
//! Deserialization errors carry the JSON path of the offending node.
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{CatalogError, ShapeError};
use crate::settings::Settings;
use crate::shape::{RecordSpec, ShapeDef, ShapeRegistry};

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, String> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| {
        let path = err.path().to_string();
        format!("at JSON path {path} → {}", err.into_inner())
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogFile {
    #[serde(default)]
    pub shapes: IndexMap<String, ShapeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ShapeEntry {
    Record {
        #[serde(default)]
        params: Vec<String>,
        #[serde(default)]
        extends: Option<String>,
        #[serde(default)]
        fields: IndexMap<String, String>,
    },
    Enum(Vec<String>),
    Sequence {
        param: String,
        #[serde(default)]
        unique: bool,
    },
    /// Key parameter first, value parameter second.
    Mapping { params: [String; 2] },
}

impl CatalogFile {
    pub fn parse(src: &str, path: &Path) -> Result<Self, CatalogError> {
        from_str_with_path(src).map_err(|message| CatalogError::Json { path: path.to_path_buf(), message })
    }

    /// Add every entry to `registry`, in file order.
    pub fn register_into(self, registry: &mut ShapeRegistry) -> Result<(), ShapeError> {
        for (name, entry) in self.shapes {
            match entry {
                ShapeEntry::Record { params, extends, fields } => {
                    let mut spec = RecordSpec::new(name);
                    for param in params {
                        spec = spec.param(param);
                    }
                    if let Some(supertype) = extends {
                        spec = spec.extends(supertype);
                    }
                    for (field, ty) in fields {
                        spec = spec.field(field, ty);
                    }
                    registry.define_record(spec)?;
                }
                ShapeEntry::Enum(variants) => {
                    registry.define_enum(name, variants)?;
                }
                ShapeEntry::Sequence { param, unique } => {
                    registry.define(name, ShapeDef::Sequence { param, unique })?;
                }
                ShapeEntry::Mapping { params: [key_param, value_param] } => {
                    registry.define(name, ShapeDef::Mapping { key_param, value_param })?;
                }
            }
        }
        Ok(())
    }
}

fn read(path: &Path) -> Result<String, CatalogError> {
    std::fs::read_to_string(path).map_err(|source| CatalogError::Io { path: path.to_path_buf(), source })
}

/// Load every catalog named by `patterns` (literal paths or glob patterns)
/// into `registry`, then validate it. Returns the files read.
pub fn load_catalogs<I>(patterns: I, registry: &mut ShapeRegistry) -> Result<Vec<PathBuf>, CatalogError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let paths = resolve_file_path_patterns(patterns)?;
    for path in &paths {
        let catalog = CatalogFile::parse(&read(path)?, path)?;
        catalog.register_into(registry)?;
    }
    registry.validate()?;
    Ok(paths)
}

pub fn load_settings(path: &Path) -> Result<Settings, CatalogError> {
    let settings: Settings =
        from_str_with_path(&read(path)?).map_err(|message| CatalogError::Json { path: path.to_path_buf(), message })?;
    settings.validate()?;
    Ok(settings)
}

pub fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>, CatalogError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();
    for raw in patterns {
        let pattern = raw.as_ref();
        if has_glob_chars(pattern) {
            let before = out.len();
            for entry in glob::glob(pattern)? {
                out.push(entry?);
            }
            if out.len() == before {
                return Err(CatalogError::NoMatches(pattern.to_string()));
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }
    Ok(out)
}
