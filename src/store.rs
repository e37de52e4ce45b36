use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, NaiveDate};
use directories::BaseDirs;
use glob::{MatchOptions, Pattern};
use tempfile::{Builder, NamedTempFile};

use crate::domain::{DataSelector, DataType, Values, mission_start};
use crate::error::SdcError;
use crate::names::{self, ANCILLARY_DIR, BURST_MODE};

/// The local MMS archive: a directory tree laid out like the SDC's.
#[derive(Debug, Clone)]
pub struct Archive {
    root: Utf8PathBuf,
}

impl Archive {
    /// Archive at `$HOME/data/mms`.
    pub fn new() -> Result<Self, SdcError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join("data").join("mms")).ok()
            })
            .ok_or_else(|| SdcError::Filesystem("unable to resolve data directory".to_string()))?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), SdcError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| SdcError::Filesystem(err.to_string()))
    }

    pub fn local_path(&self, name: &str, data_type: DataType) -> Result<Utf8PathBuf, SdcError> {
        names::local_path(name, data_type, &self.root)
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    /// Glob patterns of the files a selector can match on the given days.
    ///
    /// Science patterns look like `.../YYYY/MM[/DD]/sc_instr_mode_level[_desc]_YYYYMMDD*_v*.cdf`;
    /// ancillary data is not organised by day, so one `ancillary/sc/product/sc_product_*`
    /// pattern is produced per spacecraft and product.
    pub fn expected_patterns(
        &self,
        selector: &DataSelector,
        days: &[NaiveDate],
    ) -> Result<Vec<Utf8PathBuf>, SdcError> {
        let spacecraft = required(selector.spacecraft(), "spacecraft")?;

        if selector.data_type() == DataType::Ancillary {
            let products = required(selector.ancillary_product(), "ancillary product")?;
            let mut patterns = Vec::new();
            for sc in spacecraft.iter() {
                for product in products.iter() {
                    patterns.push(
                        self.root
                            .join(ANCILLARY_DIR)
                            .join(sc.to_lowercase())
                            .join(product.to_lowercase())
                            .join(format!("{sc}_{product}_*")),
                    );
                }
            }
            return Ok(patterns);
        }

        let instruments = required(selector.instrument(), "instrument")?;
        let modes = required(selector.mode(), "mode")?;
        let levels = required(selector.level(), "level")?;
        let descriptors = match selector.descriptor() {
            Some(values) => values.iter().map(Some).collect::<Vec<_>>(),
            None => vec![None],
        };

        let mut patterns = Vec::new();
        for sc in spacecraft.iter() {
            for instr in instruments.iter() {
                for mode in modes.iter() {
                    for level in levels.iter() {
                        for descriptor in &descriptors {
                            let mut dir = self.root.join(sc).join(instr).join(mode).join(level);
                            let mut prefix = format!("{sc}_{instr}_{mode}_{level}");
                            if let Some(descriptor) = descriptor {
                                dir.push(descriptor);
                                prefix.push('_');
                                prefix.push_str(descriptor);
                            }
                            for day in days {
                                let mut day_dir = dir.join(day.format("%Y").to_string());
                                day_dir.push(day.format("%m").to_string());
                                if mode == BURST_MODE {
                                    day_dir.push(day.format("%d").to_string());
                                }
                                patterns.push(day_dir.join(format!(
                                    "{prefix}_{}*_v*.cdf",
                                    day.format("%Y%m%d")
                                )));
                            }
                        }
                    }
                }
            }
        }
        Ok(patterns)
    }

    /// Files in the archive matching a selector, walked day by day from the
    /// start date (mission start if unset) to the end date (today if unset).
    /// Days without a directory are skipped.
    pub fn local_files(&self, selector: &DataSelector) -> Result<Vec<Utf8PathBuf>, SdcError> {
        if let Some(files) = selector.files() {
            let mut found = Vec::new();
            for file in files {
                let path = self.local_path(file, selector.data_type())?;
                if self.exists(&path) {
                    found.push(path);
                }
            }
            return Ok(found);
        }

        let first = selector.start_date().unwrap_or_else(mission_start).date();
        let last = selector
            .end_date()
            .unwrap_or_else(|| Local::now().naive_local())
            .date();
        let days = first
            .iter_days()
            .take_while(|day| *day <= last)
            .collect::<Vec<_>>();

        let mut found = Vec::new();
        for pattern in self.expected_patterns(selector, &days)? {
            let (Some(dir), Some(file_pattern)) = (pattern.parent(), pattern.file_name()) else {
                continue;
            };
            found.extend(list_matching(dir, file_pattern)?);
        }
        Ok(found)
    }

    /// Temporary file next to `path` that a download streams into. It is
    /// deleted when dropped unless [`Archive::persist`] moves it into place.
    pub fn partial_file(path: &Utf8Path) -> Result<NamedTempFile, SdcError> {
        let parent = path
            .parent()
            .ok_or_else(|| SdcError::Filesystem(format!("invalid destination path {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| SdcError::Filesystem(err.to_string()))?;
        let prefix = format!(".{}.", path.file_name().unwrap_or("download"));
        Builder::new()
            .prefix(&prefix)
            .suffix(".part")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| SdcError::Filesystem(err.to_string()))
    }

    pub fn persist(partial: NamedTempFile, path: &Utf8Path) -> Result<(), SdcError> {
        partial
            .persist(path.as_std_path())
            .map_err(|err| SdcError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn required<'a>(values: Option<&'a Values>, field: &str) -> Result<&'a Values, SdcError> {
    values.filter(|values| !values.is_empty()).ok_or_else(|| {
        SdcError::InvalidSelector(format!("local search needs a {field}"))
    })
}

fn list_matching(dir: &Utf8Path, file_pattern: &str) -> Result<Vec<Utf8PathBuf>, SdcError> {
    let pattern = Pattern::new(file_pattern)
        .map_err(|err| SdcError::InvalidSelector(format!("{file_pattern}: {err}")))?;
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let entries = match fs::read_dir(dir.as_std_path()) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(SdcError::Filesystem(format!("read {dir}: {err}"))),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| SdcError::Filesystem(err.to_string()))?;
        let is_file = entry
            .file_type()
            .map(|kind| kind.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if pattern.matches_with(name, options) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}
