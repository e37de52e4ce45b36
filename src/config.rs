use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{DataSelector, DataType, Site, Values, parse_instant};
use crate::error::SdcError;
use crate::sdc::DEFAULT_SDC_HOME;

pub const DEFAULT_CONFIG_FILE: &str = "mms-sdc.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_root: Option<String>,
    #[serde(default)]
    pub sdc_home: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub selections: Vec<SelectionEntry>,
}

/// A selector field given either as `"mms1"` / `"mms1,mms2"` or as `["mms1", "mms2"]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ValueEntry {
    Shorthand(String),
    List(Vec<String>),
}

impl ValueEntry {
    fn resolve(self) -> Result<Values, SdcError> {
        match self {
            ValueEntry::Shorthand(value) => value.parse(),
            ValueEntry::List(values) if values.iter().all(|value| value.trim().is_empty()) => {
                Err(SdcError::InvalidSelector("empty value list".to_string()))
            }
            ValueEntry::List(values) => Ok(Values::new(
                values
                    .iter()
                    .map(|value| value.trim())
                    .filter(|value| !value.is_empty()),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SelectionEntry {
    #[serde(default, alias = "sc")]
    pub spacecraft: Option<ValueEntry>,
    #[serde(default, alias = "instr")]
    pub instrument: Option<ValueEntry>,
    #[serde(default)]
    pub mode: Option<ValueEntry>,
    #[serde(default)]
    pub level: Option<ValueEntry>,
    #[serde(default, alias = "optdesc")]
    pub descriptor: Option<ValueEntry>,
    #[serde(default)]
    pub version: Option<ValueEntry>,
    #[serde(default)]
    pub anc_product: Option<ValueEntry>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub offline: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_root: Option<Utf8PathBuf>,
    pub sdc_home: String,
    pub workers: usize,
    pub selectors: Vec<DataSelector>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SdcError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(SdcError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SdcError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SdcError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SdcError> {
        let offline = config.offline;
        let selectors = config
            .selections
            .into_iter()
            .map(|entry| build_selector(entry, offline))
            .collect::<Result<Vec<_>, SdcError>>()?;

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            data_root: config.data_root.map(Utf8PathBuf::from),
            sdc_home: config
                .sdc_home
                .unwrap_or_else(|| DEFAULT_SDC_HOME.to_string()),
            workers: config.workers.unwrap_or(0),
            selectors,
        })
    }
}

/// Applies an entry to a fresh selector. The file list is applied after the
/// attribute fields it clears, and an explicit site after both since they
/// re-derive it.
pub fn build_selector(entry: SelectionEntry, offline: bool) -> Result<DataSelector, SdcError> {
    let mut selector = DataSelector::new();
    selector.set_spacecraft(entry.spacecraft.map(ValueEntry::resolve).transpose()?);
    selector.set_instrument(entry.instrument.map(ValueEntry::resolve).transpose()?);
    selector.set_mode(entry.mode.map(ValueEntry::resolve).transpose()?);
    selector.set_level(entry.level.map(ValueEntry::resolve).transpose()?);
    selector.set_descriptor(entry.descriptor.map(ValueEntry::resolve).transpose()?);
    selector.set_version(entry.version.map(ValueEntry::resolve).transpose()?);
    if let Some(data_type) = entry.data_type {
        selector.set_data_type(data_type.parse::<DataType>()?);
    }
    selector.set_ancillary_product(entry.anc_product.map(ValueEntry::resolve).transpose()?);
    selector.set_start_date(entry.start_date.as_deref().map(parse_instant).transpose()?);
    selector.set_end_date(entry.end_date.as_deref().map(parse_instant).transpose()?);
    selector.set_offline(entry.offline.unwrap_or(offline));
    selector.set_files(entry.files);
    if let Some(site) = entry.site {
        selector.set_site(site.parse::<Site>()?);
    }
    Ok(selector)
}
