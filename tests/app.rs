use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use mms_sdc::app::{App, ProgressEvent, ProgressSink, SearchResult};
use mms_sdc::domain::{DataSelector, DataType, Site, parse_instant};
use mms_sdc::error::SdcError;
use mms_sdc::query::Query;
use mms_sdc::sdc::{FileInfo, SdcClient};
use mms_sdc::store::Archive;

const CONTENT: &[u8] = b"CDF file body";

#[derive(Default)]
struct Calls {
    file_names: usize,
    file_info: Vec<(Site, Option<String>)>,
    downloads: Vec<String>,
}

#[derive(Default)]
struct MockSdc {
    names: Vec<String>,
    failing: Option<String>,
    wrong_size: bool,
    calls: Mutex<Calls>,
}

impl MockSdc {
    fn with_names(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|name| name.to_string()).collect(),
            ..Self::default()
        }
    }

    fn total_calls(&self) -> usize {
        let calls = self.calls.lock().unwrap();
        calls.file_names + calls.file_info.len() + calls.downloads.len()
    }
}

impl SdcClient for MockSdc {
    fn file_names(
        &self,
        _site: Site,
        _data_type: DataType,
        _query: &Query,
    ) -> Result<Vec<String>, SdcError> {
        self.calls.lock().unwrap().file_names += 1;
        Ok(self.names.clone())
    }

    fn file_info(
        &self,
        site: Site,
        _data_type: DataType,
        query: &Query,
    ) -> Result<Vec<FileInfo>, SdcError> {
        let files = query.get("files").map(str::to_string);
        self.calls
            .lock()
            .unwrap()
            .file_info
            .push((site, files.clone()));
        let size = if self.wrong_size {
            CONTENT.len() as u64 + 1
        } else {
            CONTENT.len() as u64
        };
        Ok(files
            .unwrap_or_default()
            .split(',')
            .map(|name| FileInfo {
                size: Some(size),
                ..FileInfo::new(name)
            })
            .collect())
    }

    fn download(
        &self,
        _site: Site,
        _data_type: DataType,
        file_name: &str,
        writer: &mut dyn Write,
    ) -> Result<u64, SdcError> {
        self.calls
            .lock()
            .unwrap()
            .downloads
            .push(file_name.to_string());
        if self.failing.as_deref() == Some(file_name) {
            // Part of the body reaches the disk before the write error.
            writer.write_all(&CONTENT[..4]).unwrap();
            writer.flush().unwrap();
            return Err(SdcError::DownloadFailure {
                file: file_name.to_string(),
                message: "write failed: No space left on device".to_string(),
            });
        }
        writer.write_all(CONTENT).unwrap();
        Ok(CONTENT.len() as u64)
    }
}

struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

const DAY16: &str = "mms1_fgm_srvy_l2_20151016_v4.18.0.cdf";
const DAY17: &str = "mms1_fgm_srvy_l2_20151017_v4.18.0.cdf";
const DAY18: &str = "mms1_fgm_srvy_l2_20151018_v4.18.0.cdf";

fn archive_in(dir: &Path) -> (Archive, Utf8PathBuf) {
    let root = Utf8PathBuf::from_path_buf(dir.to_path_buf()).unwrap();
    (Archive::new_with_root(root.clone()), root)
}

fn fgm_path(root: &Utf8Path, name: &str) -> Utf8PathBuf {
    root.join("mms1/fgm/srvy/l2/2015/10").join(name)
}

fn store_local(root: &Utf8Path, name: &str) -> Utf8PathBuf {
    let path = fgm_path(root, name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, CONTENT).unwrap();
    path
}

fn fgm_selector() -> DataSelector {
    let mut selector = DataSelector::new();
    selector.set_spacecraft(Some("mms1".into()));
    selector.set_instrument(Some("fgm".into()));
    selector.set_mode(Some("srvy".into()));
    selector.set_level(Some("l2".into()));
    selector.set_start_date(Some(parse_instant("2015-10-16").unwrap()));
    selector.set_end_date(Some(parse_instant("2015-10-18").unwrap()));
    selector
}

fn partial_files(dir: &Path) -> Vec<String> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        if path.is_dir() {
            found.extend(partial_files(&path));
        } else if path.to_string_lossy().ends_with(".part") {
            found.push(path.to_string_lossy().to_string());
        }
    }
    found
}

#[test]
fn search_partitions_local_and_missing() {
    let temp = tempfile::tempdir().unwrap();
    let (archive, root) = archive_in(temp.path());
    let local = store_local(&root, DAY16);
    let remote_id = format!("mms1/fgm/srvy/l2/2015/10/{DAY17}");
    let client = MockSdc::with_names(&[DAY16, remote_id.as_str()]);
    let app = App::new(archive, client);

    let result = app.search(&fgm_selector(), &NullSink).unwrap();
    assert_eq!(result.local, vec![local]);
    assert_eq!(result.remote, vec![remote_id]);
}

#[test]
fn search_is_repeatable() {
    let temp = tempfile::tempdir().unwrap();
    let (archive, root) = archive_in(temp.path());
    store_local(&root, DAY16);
    let app = App::new(archive, MockSdc::with_names(&[DAY16, DAY17]));
    let selector = fgm_selector();

    let first = app.search(&selector, &NullSink).unwrap();
    let second = app.search(&selector, &NullSink).unwrap();
    assert_eq!(first, second);
    assert_eq!(selector, fgm_selector());
}

#[test]
fn offline_search_never_contacts_sdc() {
    let temp = tempfile::tempdir().unwrap();
    let (archive, root) = archive_in(temp.path());
    let local = store_local(&root, DAY16);
    let app = App::new(archive, MockSdc::with_names(&[DAY16, DAY17]));
    let mut selector = fgm_selector();
    selector.set_offline(true);

    let result = app.search(&selector, &NullSink).unwrap();
    assert_eq!(result.local, vec![local.clone()]);
    assert!(result.remote.is_empty());

    let files = app.download(&mut selector, &NullSink).unwrap();
    assert_eq!(files, vec![local]);
    assert_eq!(app.client().total_calls(), 0);
}

#[test]
fn download_fetches_missing_and_restores_selector() {
    let temp = tempfile::tempdir().unwrap();
    let (archive, root) = archive_in(temp.path());
    let local = store_local(&root, DAY16);
    let app = App::new(archive, MockSdc::with_names(&[DAY16, DAY17, DAY18])).with_workers(2);
    let mut selector = fgm_selector();
    let before = selector.clone();

    let files = app.download(&mut selector, &NullSink).unwrap();
    assert_eq!(
        files,
        vec![local, fgm_path(&root, DAY17), fgm_path(&root, DAY18)]
    );
    assert_eq!(fs::read(fgm_path(&root, DAY17)).unwrap(), CONTENT);
    assert_eq!(selector, before);

    let calls = app.client().calls.lock().unwrap();
    assert_eq!(
        calls.file_info,
        vec![(Site::Public, Some(format!("{DAY17},{DAY18}")))]
    );
    let mut downloads = calls.downloads.clone();
    downloads.sort();
    assert_eq!(downloads, vec![DAY17.to_string(), DAY18.to_string()]);
    assert!(partial_files(temp.path()).is_empty());
}

#[test]
fn download_with_nothing_missing_skips_metadata() {
    let temp = tempfile::tempdir().unwrap();
    let (archive, root) = archive_in(temp.path());
    let local = store_local(&root, DAY16);
    let app = App::new(archive, MockSdc::with_names(&[DAY16]));

    let files = app.download(&mut fgm_selector(), &NullSink).unwrap();
    assert_eq!(files, vec![local]);
    assert!(app.client().calls.lock().unwrap().file_info.is_empty());
}

#[test]
fn restricted_site_is_kept_for_file_info() {
    let temp = tempfile::tempdir().unwrap();
    let (archive, _root) = archive_in(temp.path());
    let name = "mms1_fgm_srvy_l1b_20151016_v4.18.0.cdf";
    let app = App::new(archive, MockSdc::with_names(&[name]));
    let mut selector = fgm_selector();
    selector.set_level(Some("l1b".into()));
    assert_eq!(selector.site(), Site::Restricted);

    app.download(&mut selector, &NullSink).unwrap();
    let calls = app.client().calls.lock().unwrap();
    assert_eq!(calls.file_info[0].0, Site::Restricted);
    assert_eq!(selector.site(), Site::Restricted);
    assert_eq!(selector.files(), None);
}

#[test]
fn failed_download_leaves_no_partial_file() {
    let temp = tempfile::tempdir().unwrap();
    let (archive, root) = archive_in(temp.path());
    let client = MockSdc {
        failing: Some(DAY17.to_string()),
        ..MockSdc::with_names(&[DAY16, DAY17, DAY18])
    };
    let app = App::new(archive, client).with_workers(3);
    let mut selector = fgm_selector();
    let before = selector.clone();

    let result = app.download(&mut selector, &NullSink);
    assert_matches!(result, Err(SdcError::DownloadFailure { file, .. }) if file == DAY17);
    assert!(!fgm_path(&root, DAY17).exists());
    assert!(partial_files(temp.path()).is_empty());
    for sibling in [DAY16, DAY18] {
        let path = fgm_path(&root, sibling);
        if path.exists() {
            assert_eq!(fs::read(&path).unwrap(), CONTENT);
        }
    }
    assert_eq!(selector, before);
    assert_eq!(selector.snapshot(), before.snapshot());
}

#[test]
fn local_files_apply_time_window() {
    let temp = tempfile::tempdir().unwrap();
    let (archive, root) = archive_in(temp.path());
    let burst_dir = root.join("mms1/fpi/brst/l2/des-moms/2015/10/16");
    fs::create_dir_all(&burst_dir).unwrap();
    for tag in ["20151016130524", "20151016131000", "20151016133000"] {
        fs::write(
            burst_dir.join(format!("mms1_fpi_brst_l2_des-moms_{tag}_v3.3.0.cdf")),
            CONTENT,
        )
        .unwrap();
    }
    let app = App::new(archive, MockSdc::default());

    let mut selector = DataSelector::new();
    selector.set_spacecraft(Some("mms1".into()));
    selector.set_instrument(Some("fpi".into()));
    selector.set_mode(Some("brst".into()));
    selector.set_level(Some("l2".into()));
    selector.set_descriptor(Some("des-moms".into()));
    selector.set_start_date(Some(parse_instant("2015-10-16T13:08:00").unwrap()));
    selector.set_end_date(Some(parse_instant("2015-10-16T13:20:00").unwrap()));

    assert_eq!(app.archive().local_files(&selector).unwrap().len(), 3);
    let files = app.local_files(&selector, &NullSink).unwrap();
    assert_eq!(
        files,
        vec![
            burst_dir.join("mms1_fpi_brst_l2_des-moms_20151016130524_v3.3.0.cdf"),
            burst_dir.join("mms1_fpi_brst_l2_des-moms_20151016131000_v3.3.0.cdf"),
        ]
    );
    assert!(!selector.offline());
    assert_eq!(app.client().total_calls(), 0);
}

#[test]
fn archive_root_name_does_not_affect_parsing() {
    let temp = tempfile::tempdir().unwrap();
    let (archive, root) = archive_in(&temp.path().join("Ancillary").join("mms"));
    let local = store_local(&root, DAY16);
    let app = App::new(archive, MockSdc::with_names(&[DAY16, DAY17]));
    let mut selector = fgm_selector();

    let online = app.search(&selector, &NullSink).unwrap();
    assert_eq!(online.local, vec![local.clone()]);
    assert_eq!(online.remote, vec![DAY17.to_string()]);

    selector.set_offline(true);
    let offline = app.search(&selector, &NullSink).unwrap();
    assert_eq!(offline.local, vec![local]);
}

#[test]
fn size_mismatch_is_a_download_failure() {
    let temp = tempfile::tempdir().unwrap();
    let (archive, root) = archive_in(temp.path());
    let client = MockSdc {
        wrong_size: true,
        ..MockSdc::with_names(&[DAY17])
    };
    let app = App::new(archive, client);

    let result = app.download(&mut fgm_selector(), &NullSink);
    assert_matches!(result, Err(SdcError::DownloadFailure { .. }));
    assert!(!fgm_path(&root, DAY17).exists());
    assert!(partial_files(temp.path()).is_empty());
}

#[test]
fn search_result_serializes_paths_as_strings() {
    let result = SearchResult {
        local: vec![Utf8PathBuf::from("/data/mms1/fgm/srvy/l2/2015/10").join(DAY16)],
        remote: vec![DAY17.to_string()],
    };
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(
        json["local"][0],
        format!("/data/mms1/fgm/srvy/l2/2015/10/{DAY16}")
    );
    assert_eq!(json["remote"][0], DAY17);
}
