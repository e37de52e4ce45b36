use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::SdcError;

/// Timestamp layout used for selector dates and their ISO rendering.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// First day of MMS science operations. Used when a selector has no start date.
pub fn mission_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2015, 9, 1)
        .unwrap_or_default()
        .and_time(NaiveTime::MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Ancillary,
    #[serde(rename = "hk", alias = "housekeeping")]
    Housekeeping,
    Science,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Ancillary => "ancillary",
            DataType::Housekeeping => "hk",
            DataType::Science => "science",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = SdcError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ancillary" => Ok(DataType::Ancillary),
            "hk" | "housekeeping" => Ok(DataType::Housekeeping),
            "science" => Ok(DataType::Science),
            _ => Err(SdcError::InvalidSelector(format!("data type {value:?}"))),
        }
    }
}

/// SDC site. Everything below level 2 lives behind the team log-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Site {
    Public,
    Restricted,
}

impl Site {
    /// Path segment the SDC uses for this site.
    pub fn as_str(&self) -> &'static str {
        match self {
            Site::Public => "public",
            Site::Restricted => "sitl",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Site {
    type Err = SdcError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" | "public_site" => Ok(Site::Public),
            "private" | "restricted" | "team" | "team_site" | "sitl" => Ok(Site::Restricted),
            _ => Err(SdcError::InvalidSelector(format!("site {value:?}"))),
        }
    }
}

/// One or more values of a selector field. Multiple values are OR-matched by the SDC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Values(Vec<String>);

impl Values {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(items.into_iter().map(Into::into).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl fmt::Display for Values {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl From<&str> for Values {
    fn from(value: &str) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<String> for Values {
    fn from(value: String) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<String>> for Values {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl From<Vec<&str>> for Values {
    fn from(value: Vec<&str>) -> Self {
        Self::new(value)
    }
}

/// Parses a comma-separated list, e.g. `mms1,mms2`.
impl FromStr for Values {
    type Err = SdcError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let items = value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        if items.is_empty() {
            return Err(SdcError::InvalidSelector(format!("empty value {value:?}")));
        }
        Ok(Self(items))
    }
}

/// Parses `YYYY-MM-DDThh:mm:ss` (anything past the seconds is ignored) or `YYYY-MM-DD`.
pub fn parse_instant(value: &str) -> Result<NaiveDateTime, SdcError> {
    let trimmed = value.trim();
    if let Some(head) = trimmed.get(..19) {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(head, DATETIME_FORMAT) {
            return Ok(parsed);
        }
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|_| SdcError::InvalidSelector(format!("date {value:?}")))
}

/// Describes which files to look for, either by attributes or by an explicit file list.
///
/// Fields are private so that the derivations between them always hold:
/// setting `level` re-derives `site`, setting an ancillary product switches
/// `data_type` to ancillary, and a non-empty `files` list clears every
/// attribute field.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSelector {
    spacecraft: Option<Values>,
    instrument: Option<Values>,
    mode: Option<Values>,
    level: Option<Values>,
    descriptor: Option<Values>,
    ancillary_product: Option<Values>,
    data_type: DataType,
    site: Site,
    start_date: Option<NaiveDateTime>,
    end_date: Option<NaiveDateTime>,
    files: Option<Vec<String>>,
    version: Option<Values>,
    offline: bool,
}

impl Default for DataSelector {
    fn default() -> Self {
        Self {
            spacecraft: None,
            instrument: None,
            mode: None,
            level: None,
            descriptor: None,
            ancillary_product: None,
            data_type: DataType::Science,
            site: Site::Public,
            start_date: None,
            end_date: None,
            files: None,
            version: None,
            offline: false,
        }
    }
}

impl DataSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spacecraft(&self) -> Option<&Values> {
        self.spacecraft.as_ref()
    }

    pub fn instrument(&self) -> Option<&Values> {
        self.instrument.as_ref()
    }

    pub fn mode(&self) -> Option<&Values> {
        self.mode.as_ref()
    }

    pub fn level(&self) -> Option<&Values> {
        self.level.as_ref()
    }

    pub fn descriptor(&self) -> Option<&Values> {
        self.descriptor.as_ref()
    }

    pub fn ancillary_product(&self) -> Option<&Values> {
        self.ancillary_product.as_ref()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn site(&self) -> Site {
        self.site
    }

    pub fn start_date(&self) -> Option<NaiveDateTime> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDateTime> {
        self.end_date
    }

    pub fn start_date_iso(&self) -> Option<String> {
        self.start_date
            .map(|value| value.format(DATETIME_FORMAT).to_string())
    }

    pub fn end_date_iso(&self) -> Option<String> {
        self.end_date
            .map(|value| value.format(DATETIME_FORMAT).to_string())
    }

    pub fn files(&self) -> Option<&[String]> {
        self.files.as_deref()
    }

    pub fn version(&self) -> Option<&Values> {
        self.version.as_ref()
    }

    pub fn offline(&self) -> bool {
        self.offline
    }

    pub fn set_spacecraft(&mut self, value: Option<Values>) {
        self.spacecraft = value;
    }

    pub fn set_instrument(&mut self, value: Option<Values>) {
        self.instrument = value;
    }

    pub fn set_mode(&mut self, value: Option<Values>) {
        self.mode = value;
    }

    /// Sets the data level and derives the site: no level, `l2` and `l3`
    /// are public, anything else needs the team site.
    pub fn set_level(&mut self, value: Option<Values>) {
        let public = value
            .as_ref()
            .map(|levels| levels.iter().all(|level| matches!(level, "l2" | "l3")))
            .unwrap_or(true);
        self.site = if public { Site::Public } else { Site::Restricted };
        self.level = value;
    }

    pub fn set_descriptor(&mut self, value: Option<Values>) {
        self.descriptor = value;
    }

    pub fn set_ancillary_product(&mut self, value: Option<Values>) {
        if value.is_some() {
            self.data_type = DataType::Ancillary;
        }
        self.ancillary_product = value;
    }

    pub fn set_data_type(&mut self, value: DataType) {
        self.data_type = value;
    }

    pub fn set_site(&mut self, value: Site) {
        self.site = value;
    }

    pub fn set_start_date(&mut self, value: Option<NaiveDateTime>) {
        self.start_date = value;
    }

    pub fn set_end_date(&mut self, value: Option<NaiveDateTime>) {
        self.end_date = value;
    }

    /// Selects explicit remote files. A non-empty list clears the attribute
    /// fields, which in turn resets the site to public.
    pub fn set_files(&mut self, value: Option<Vec<String>>) {
        let value = value.filter(|files| !files.is_empty());
        if value.is_some() {
            self.spacecraft = None;
            self.instrument = None;
            self.mode = None;
            self.set_level(None);
            self.descriptor = None;
            self.version = None;
        }
        self.files = value;
    }

    pub fn set_version(&mut self, value: Option<Values>) {
        self.version = value;
    }

    pub fn set_offline(&mut self, value: bool) {
        self.offline = value;
    }

    pub fn snapshot(&self) -> SelectorSnapshot {
        SelectorSnapshot {
            spacecraft: self.spacecraft.clone(),
            instrument: self.instrument.clone(),
            mode: self.mode.clone(),
            level: self.level.clone(),
            descriptor: self.descriptor.clone(),
            version: self.version.clone(),
            files: self.files.clone(),
            site: self.site,
        }
    }

    /// Puts back captured field values verbatim, without re-running derivations.
    pub fn restore(&mut self, snapshot: SelectorSnapshot) {
        self.spacecraft = snapshot.spacecraft;
        self.instrument = snapshot.instrument;
        self.mode = snapshot.mode;
        self.level = snapshot.level;
        self.descriptor = snapshot.descriptor;
        self.version = snapshot.version;
        self.files = snapshot.files;
        self.site = snapshot.site;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorSnapshot {
    pub spacecraft: Option<Values>,
    pub instrument: Option<Values>,
    pub mode: Option<Values>,
    pub level: Option<Values>,
    pub descriptor: Option<Values>,
    pub version: Option<Values>,
    pub files: Option<Vec<String>>,
    pub site: Site,
}

/// Mutable access to a selector that restores its snapshot when dropped,
/// whether the scope exits normally, through `?`, or by unwinding.
pub struct SelectorGuard<'a> {
    selector: &'a mut DataSelector,
    snapshot: SelectorSnapshot,
}

impl<'a> SelectorGuard<'a> {
    pub fn new(selector: &'a mut DataSelector) -> Self {
        let snapshot = selector.snapshot();
        Self { selector, snapshot }
    }

    pub fn snapshot(&self) -> &SelectorSnapshot {
        &self.snapshot
    }
}

impl Deref for SelectorGuard<'_> {
    type Target = DataSelector;

    fn deref(&self) -> &Self::Target {
        self.selector
    }
}

impl DerefMut for SelectorGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.selector
    }
}

impl Drop for SelectorGuard<'_> {
    fn drop(&mut self) {
        self.selector.restore(self.snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn level_derives_site() {
        let mut selector = DataSelector::new();
        selector.set_level(Some("l1b".into()));
        assert_eq!(selector.site(), Site::Restricted);
        selector.set_level(Some("l2".into()));
        assert_eq!(selector.site(), Site::Public);
        selector.set_level(Some(Values::from(vec!["l2", "l1a"])));
        assert_eq!(selector.site(), Site::Restricted);
        selector.set_level(None);
        assert_eq!(selector.site(), Site::Public);
    }

    #[test]
    fn site_can_be_overridden_after_level() {
        let mut selector = DataSelector::new();
        selector.set_level(Some("l2".into()));
        selector.set_site(Site::Restricted);
        assert_eq!(selector.site(), Site::Restricted);
    }

    #[test]
    fn parse_site_aliases() {
        assert_eq!("team_site".parse::<Site>().unwrap(), Site::Restricted);
        assert_eq!("private".parse::<Site>().unwrap(), Site::Restricted);
        assert_eq!("public_site".parse::<Site>().unwrap(), Site::Public);
        assert_matches!("nasa".parse::<Site>(), Err(SdcError::InvalidSelector(_)));
    }

    #[test]
    fn parse_instant_formats() {
        let full = parse_instant("2020-01-05T12:30:00.123Z").unwrap();
        assert_eq!(full.format(DATETIME_FORMAT).to_string(), "2020-01-05T12:30:00");
        let day = parse_instant("2020-01-05").unwrap();
        assert_eq!(day.format(DATETIME_FORMAT).to_string(), "2020-01-05T00:00:00");
        assert_matches!(parse_instant("05/01/2020"), Err(SdcError::InvalidSelector(_)));
    }
}
