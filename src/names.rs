//! Mapping between SDC file names and the local archive layout.
//!
//! Science and housekeeping files are named
//! `sc_instr_mode_level[_descriptor]_tstart_vX.Y.Z.cdf` and stored under
//! `sc/instr/mode/level[/descriptor]/YYYY/MM[/DD]/`, where the day level only
//! exists for burst data. Ancillary files are named
//! `sc_product_startYYYYDDD_endYYYYDDD.Vnn` and stored under
//! `ancillary/<sc>/<product>/` with lower-cased directories.

use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::domain::DataType;
use crate::error::SdcError;

pub const BURST_MODE: &str = "brst";
pub const ANCILLARY_DIR: &str = "ancillary";

const EXTENSION_LEN: usize = 4;

/// Last component of a `/`-separated remote identifier or a local path.
pub fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Local path for a remote file name (or identifier), chosen by data type.
pub fn local_path(name: &str, data_type: DataType, root: &Utf8Path) -> Result<Utf8PathBuf, SdcError> {
    match data_type {
        DataType::Ancillary => Ok(name.parse::<AncillaryFileName>()?.local_path(root)),
        DataType::Science | DataType::Housekeeping => {
            Ok(name.parse::<ScienceFileName>()?.local_path(root))
        }
    }
}

/// Parsed time-series file name. `descriptor` is empty when the name has none.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ScienceFileName {
    pub spacecraft: String,
    pub instrument: String,
    pub mode: String,
    pub level: String,
    pub descriptor: String,
    pub time_tag: String,
    pub version: String,
    pub extension: String,
}

impl ScienceFileName {
    pub fn is_burst(&self) -> bool {
        self.mode == BURST_MODE
    }

    /// `sc/instr/mode/level[/descriptor]/YYYY/MM[/DD]`
    pub fn relative_dir(&self) -> Utf8PathBuf {
        let mut dir = Utf8PathBuf::from(&self.spacecraft);
        dir.push(&self.instrument);
        dir.push(&self.mode);
        dir.push(&self.level);
        if !self.descriptor.is_empty() {
            dir.push(&self.descriptor);
        }
        dir.push(&self.time_tag[0..4]);
        dir.push(&self.time_tag[4..6]);
        if self.is_burst() {
            dir.push(&self.time_tag[6..8]);
        }
        dir
    }

    pub fn local_path(&self, root: &Utf8Path) -> Utf8PathBuf {
        root.join(self.relative_dir()).join(self.to_string())
    }

    pub fn start_time(&self) -> Result<NaiveDateTime, SdcError> {
        parse_time_tag(&self.time_tag)
    }
}

impl fmt::Display for ScienceFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_",
            self.spacecraft, self.instrument, self.mode, self.level
        )?;
        if !self.descriptor.is_empty() {
            write!(f, "{}_", self.descriptor)?;
        }
        write!(f, "{}_{}{}", self.time_tag, self.version, self.extension)
    }
}

impl FromStr for ScienceFileName {
    type Err = SdcError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = || SdcError::Parse(value.to_string());

        let mut parts = basename(value).split('_').collect::<Vec<_>>();
        match parts.len() {
            6 => parts.insert(4, ""),
            7 => {}
            _ => return Err(malformed()),
        }
        if parts[..4].iter().any(|part| part.is_empty()) {
            return Err(malformed());
        }

        let time_tag = parts[5];
        if time_tag.len() < 8 || !time_tag.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(malformed());
        }

        let last = parts[6];
        let split = last
            .len()
            .checked_sub(EXTENSION_LEN)
            .filter(|&at| at > 0 && last.is_char_boundary(at))
            .ok_or_else(malformed)?;
        let (version, extension) = last.split_at(split);
        if !extension.starts_with('.') {
            return Err(malformed());
        }

        Ok(Self {
            spacecraft: parts[0].to_string(),
            instrument: parts[1].to_string(),
            mode: parts[2].to_string(),
            level: parts[3].to_string(),
            descriptor: parts[4].to_string(),
            time_tag: time_tag.to_string(),
            version: version.to_string(),
            extension: extension.to_string(),
        })
    }
}

/// Parsed ancillary file name. The product takes the instrument slot.
///
/// Names normally carry the version as the extension
/// (`MMS1_DEFATT_2015305_2015306.V00`); an optional revision token before the
/// extension (`mms1_defatt_2020001_2020010_v01.V00`) is kept in `revision`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AncillaryFileName {
    pub spacecraft: String,
    pub product: String,
    pub start_day: String,
    pub end_day: String,
    pub revision: Option<String>,
    pub version: String,
}

impl AncillaryFileName {
    /// `ancillary/<sc>/<product>`, lower-cased.
    pub fn relative_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(ANCILLARY_DIR)
            .join(self.spacecraft.to_lowercase())
            .join(self.product.to_lowercase())
    }

    pub fn local_path(&self, root: &Utf8Path) -> Utf8PathBuf {
        root.join(self.relative_dir()).join(self.to_string())
    }

    pub fn start_time(&self) -> Result<NaiveDateTime, SdcError> {
        NaiveDate::parse_from_str(&self.start_day, "%Y%j")
            .map(|date| date.and_time(NaiveTime::MIN))
            .map_err(|_| SdcError::Parse(self.to_string()))
    }
}

impl fmt::Display for AncillaryFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.spacecraft, self.product, self.start_day, self.end_day
        )?;
        if let Some(revision) = &self.revision {
            write!(f, "_{revision}")?;
        }
        write!(f, ".{}", self.version)
    }
}

impl FromStr for AncillaryFileName {
    type Err = SdcError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = || SdcError::Parse(value.to_string());

        let parts = basename(value).split('_').collect::<Vec<_>>();
        if !(4..=5).contains(&parts.len()) {
            return Err(malformed());
        }
        let (token, version) = parts[parts.len() - 1]
            .split_once('.')
            .ok_or_else(malformed)?;
        let (end_day, revision) = if parts.len() == 4 {
            (token, None)
        } else {
            (parts[3], Some(token.to_string()))
        };

        let is_day = |day: &str| day.len() == 7 && day.chars().all(|ch| ch.is_ascii_digit());
        if parts[0].is_empty()
            || parts[1].is_empty()
            || version.is_empty()
            || !is_day(parts[2])
            || !is_day(end_day)
        {
            return Err(malformed());
        }

        Ok(Self {
            spacecraft: parts[0].to_string(),
            product: parts[1].to_string(),
            start_day: parts[2].to_string(),
            end_day: end_day.to_string(),
            revision,
            version: version.to_string(),
        })
    }
}

/// Parses a science time tag, `YYYYMMDD` or `YYYYMMDDhhmmss`.
pub fn parse_time_tag(tag: &str) -> Result<NaiveDateTime, SdcError> {
    let parsed = match tag.len() {
        8 => NaiveDate::parse_from_str(tag, "%Y%m%d").map(|date| date.and_time(NaiveTime::MIN)),
        14 => NaiveDateTime::parse_from_str(tag, "%Y%m%d%H%M%S"),
        _ => return Err(SdcError::Parse(format!("time tag {tag:?}"))),
    };
    parsed.map_err(|_| SdcError::Parse(format!("time tag {tag:?}")))
}
