use chrono::{Duration, NaiveTime};
use serde::Serialize;

use crate::domain::{DATE_FORMAT, DataSelector, Values};

/// SDC query parameters in emission order. Sent as the form body of listing
/// requests and rendered into URLs for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Query(Vec<(&'static str, String)>);

impl Query {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(key, value)| (*key, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push_values(&mut self, key: &'static str, values: Option<&Values>) {
        if let Some(values) = values {
            self.0.push((key, values.joined()));
        }
    }
}

/// Builds the SDC query for a selector.
///
/// The SDC takes whole days and treats `[start_date, end_date)` as exclusive
/// at the end. When the window starts and ends on the same day, or ends part
/// way through a day, `end_date` is moved to the following day so that day is
/// still listed.
pub fn build_query(selector: &DataSelector) -> Query {
    let mut query = Query::default();
    query.push_values("sc_id", selector.spacecraft());
    query.push_values("instrument_id", selector.instrument());
    query.push_values("data_rate_mode", selector.mode());
    query.push_values("data_level", selector.level());
    query.push_values("descriptor", selector.descriptor());
    query.push_values("version", selector.version());
    if let Some(files) = selector.files() {
        query.0.push(("files", files.join(",")));
    }
    if let Some(start) = selector.start_date() {
        query
            .0
            .push(("start_date", start.format(DATE_FORMAT).to_string()));
    }
    if let Some(end) = selector.end_date() {
        let same_day = selector
            .start_date()
            .map(|start| start.date() == end.date())
            .unwrap_or(false);
        let emitted = if same_day || end.time() != NaiveTime::MIN {
            end + Duration::days(1)
        } else {
            end
        };
        query
            .0
            .push(("end_date", emitted.format(DATE_FORMAT).to_string()));
    }
    query.push_values("product", selector.ancillary_product());
    query
}
