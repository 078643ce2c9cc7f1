//! Grid options and their YAML representation.
//!
//! Every field has a default, so a config file only needs the keys it wants
//! to change:
//!
//! ```yaml
//! delimiter: tab
//! missing_as_zero: true
//! staging:
//!   backend: memory
//! ```

use std::{fs::File, io::BufReader, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    codec::{DEFAULT_DELIMITER, DEFAULT_QUOTE, RowCodec},
    io_utils::{parse_delimiter, parse_quote, printable_delimiter},
};

pub const DEFAULT_SORT_CHUNK_ROWS: usize = 100_000;
pub const DEFAULT_PRINT_LIMIT: usize = 20;
pub const DEFAULT_STAGE_PREFIX: &str = "datagrid_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingBackend {
    #[default]
    TempFile,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingOptions {
    pub backend: StagingBackend,
    /// Directory for staged files; the platform temp directory when unset.
    pub dir: Option<PathBuf>,
    pub prefix: String,
    /// Remove files under `prefix` left behind by other processes.
    pub sweep_stale: bool,
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            backend: StagingBackend::TempFile,
            dir: None,
            prefix: DEFAULT_STAGE_PREFIX.to_string(),
            sweep_stale: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    #[serde(serialize_with = "ser_delimiter", deserialize_with = "de_delimiter")]
    pub delimiter: u8,
    #[serde(serialize_with = "ser_delimiter", deserialize_with = "de_quote")]
    pub quote: u8,
    pub missing_as_zero: bool,
    pub log_data_errors: bool,
    /// Input encoding label understood by `encoding_rs`; UTF-8 when unset.
    pub encoding: Option<String>,
    pub sort_chunk_rows: usize,
    pub print_limit: usize,
    pub staging: StagingOptions,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            quote: DEFAULT_QUOTE,
            missing_as_zero: false,
            log_data_errors: true,
            encoding: None,
            sort_chunk_rows: DEFAULT_SORT_CHUNK_ROWS,
            print_limit: DEFAULT_PRINT_LIMIT,
            staging: StagingOptions::default(),
        }
    }
}

impl GridOptions {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let options = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))?;
        Ok(options)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Parsing grid options")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing grid options")
    }

    pub fn codec(&self) -> RowCodec {
        RowCodec::new(self.delimiter, self.quote)
    }

    pub fn with_missing_as_zero(mut self, enabled: bool) -> Self {
        self.missing_as_zero = enabled;
        self
    }

    pub fn with_backend(mut self, backend: StagingBackend) -> Self {
        self.staging.backend = backend;
        self
    }
}

fn ser_delimiter<S: Serializer>(value: &u8, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&printable_delimiter(*value))
}

fn de_delimiter<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_delimiter(&raw).map_err(serde::de::Error::custom)
}

fn de_quote<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_quote(&raw).map_err(serde::de::Error::custom)
}
