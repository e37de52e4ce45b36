//! Time-window filtering of file names by the start time embedded in them.
//!
//! A file only carries its start time, so the file that starts just before the
//! window is assumed to run into it and is kept as well.

use std::collections::HashMap;

use chrono::{Local, NaiveDateTime};

use crate::domain::{DataType, mission_start};
use crate::error::SdcError;
use crate::names::{AncillaryFileName, ScienceFileName, basename};

/// Keeps the names whose files may hold data between `start` and `end`.
///
/// Names are grouped by data product; within a group every file starting in
/// `[start, end]` is kept, plus the last file starting before `start`. If no
/// file starts inside the window, the latest one is kept when it starts on the
/// same day as `start`. Input order is preserved.
///
/// Only the basename of each name is parsed, with the naming scheme of
/// `data_type`. A missing `start` means the beginning of the mission, a
/// missing `end` means now.
pub fn filter_time<T>(
    names: &[T],
    data_type: DataType,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Result<Vec<T>, SdcError>
where
    T: AsRef<str> + Clone,
{
    let start = start.unwrap_or_else(mission_start);
    let end = end.unwrap_or_else(|| Local::now().naive_local());

    let mut groups: HashMap<String, Vec<(NaiveDateTime, usize)>> = HashMap::new();
    for (index, name) in names.iter().enumerate() {
        let (product, file_start) = product_and_start(basename(name.as_ref()), data_type)?;
        groups.entry(product).or_default().push((file_start, index));
    }

    let mut keep = vec![false; names.len()];
    for mut files in groups.into_values() {
        files.sort();
        files.retain(|(file_start, _)| *file_start <= end);
        let Some(&(last_start, last_index)) = files.last() else {
            continue;
        };

        match files.iter().position(|(file_start, _)| *file_start >= start) {
            Some(first) => {
                if first > 0 && files[first].0 != start {
                    keep[files[first - 1].1] = true;
                }
                for (_, index) in &files[first..] {
                    keep[*index] = true;
                }
            }
            None if last_start.date() == start.date() => keep[last_index] = true,
            None => {}
        }
    }

    Ok(names
        .iter()
        .zip(keep)
        .filter_map(|(name, kept)| kept.then(|| name.clone()))
        .collect())
}

fn product_and_start(
    name: &str,
    data_type: DataType,
) -> Result<(String, NaiveDateTime), SdcError> {
    if data_type == DataType::Ancillary {
        let parsed: AncillaryFileName = name.parse()?;
        let start = parsed.start_time()?;
        return Ok((format!("{}_{}", parsed.spacecraft, parsed.product), start));
    }
    let parsed: ScienceFileName = name.parse()?;
    let start = parsed.start_time()?;
    Ok((
        format!(
            "{}_{}_{}_{}_{}",
            parsed.spacecraft, parsed.instrument, parsed.mode, parsed.level, parsed.descriptor
        ),
        start,
    ))
}
