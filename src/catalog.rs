use tracing::debug;

use crate::domain::DataSelector;
use crate::error::SdcError;
use crate::query::build_query;
use crate::sdc::{FileInfo, SdcClient};
use crate::timefilter::filter_time;

/// Remote identifiers matching the selector, trimmed to its time window.
pub fn list_remote_names<C>(client: &C, selector: &DataSelector) -> Result<Vec<String>, SdcError>
where
    C: SdcClient + ?Sized,
{
    let query = build_query(selector);
    let names = client.file_names(selector.site(), selector.data_type(), &query)?;
    debug!(count = names.len(), "SDC listing received");
    if names.is_empty() {
        return Ok(names);
    }
    filter_time(
        &names,
        selector.data_type(),
        selector.start_date(),
        selector.end_date(),
    )
}

/// Per-file metadata for a selector that names its files explicitly.
pub fn list_file_metadata<C>(client: &C, selector: &DataSelector) -> Result<Vec<FileInfo>, SdcError>
where
    C: SdcClient + ?Sized,
{
    if selector.files().is_none() {
        return Err(SdcError::InvalidSelector(
            "file info needs an explicit file list".to_string(),
        ));
    }
    client.file_info(selector.site(), selector.data_type(), &build_query(selector))
}
