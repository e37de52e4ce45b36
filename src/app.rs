use std::io::{BufWriter, Write};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use rayon::prelude::*;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::catalog::{list_file_metadata, list_remote_names};
use crate::domain::{DataSelector, DataType, SelectorGuard, Site};
use crate::error::SdcError;
use crate::names::basename;
use crate::sdc::{CHUNK_SIZE, FileInfo, SdcClient};
use crate::store::Archive;
use crate::timefilter::filter_time;

/// Files already in the archive and remote identifiers still missing from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub local: Vec<Utf8PathBuf>,
    pub remote: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileList {
    pub files: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress events to `tracing`.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

#[derive(Clone)]
pub struct App<C: SdcClient> {
    archive: Archive,
    client: C,
    workers: usize,
}

impl<C: SdcClient> App<C> {
    pub fn new(archive: Archive, client: C) -> Self {
        Self {
            archive,
            client,
            workers: 0,
        }
    }

    /// Number of parallel downloads; 0 uses the available parallelism.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Splits the files a selector matches into those present in the archive
    /// and those only on the SDC. The SDC listing decides which files (and
    /// versions) exist; offline, only the archive is searched.
    pub fn search(
        &self,
        selector: &DataSelector,
        sink: &dyn ProgressSink,
    ) -> Result<SearchResult, SdcError> {
        let (local, remote) = if selector.offline() {
            sink.event(ProgressEvent {
                message: "phase=Resolve; scanning local archive".to_string(),
                elapsed: None,
            });
            (self.archive.local_files(selector)?, Vec::new())
        } else {
            sink.event(ProgressEvent {
                message: "phase=Resolve; listing SDC files".to_string(),
                elapsed: None,
            });
            let mut local = Vec::new();
            let mut remote = Vec::new();
            for id in list_remote_names(&self.client, selector)? {
                let path = self
                    .archive
                    .local_path(basename(&id), selector.data_type())?;
                if self.archive.exists(&path) {
                    local.push(path);
                } else {
                    remote.push(id);
                }
            }
            (local, remote)
        };

        // The SDC listing is already filtered, but offline results are not and
        // both go through the same window.
        let local = if local.is_empty() {
            local
        } else {
            filter_time(
                &local,
                selector.data_type(),
                selector.start_date(),
                selector.end_date(),
            )?
        };
        let remote = if remote.is_empty() {
            remote
        } else {
            filter_time(
                &remote,
                selector.data_type(),
                selector.start_date(),
                selector.end_date(),
            )?
        };

        info!(
            local = local.len(),
            missing = remote.len(),
            "reconciled archive"
        );
        Ok(SearchResult { local, remote })
    }

    /// Matching files already in the archive, trimmed to the selector's time
    /// window exactly as an offline [`App::search`] would.
    pub fn local_files(
        &self,
        selector: &DataSelector,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Utf8PathBuf>, SdcError> {
        let mut offline = selector.clone();
        offline.set_offline(true);
        Ok(self.search(&offline, sink)?.local)
    }

    /// Downloads whatever the archive is missing and returns every matching
    /// local file: those already present followed by the new ones.
    ///
    /// The selector is used to request metadata for the missing files and is
    /// put back exactly as it was before returning, including on error.
    pub fn download(
        &self,
        selector: &mut DataSelector,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Utf8PathBuf>, SdcError> {
        let SearchResult { mut local, remote } = self.search(selector, sink)?;
        if selector.offline() || remote.is_empty() {
            return Ok(local);
        }

        let downloaded = {
            let mut guard = SelectorGuard::new(selector);
            let site = guard.snapshot().site;
            guard.set_files(Some(
                remote.iter().map(|id| basename(id).to_string()).collect(),
            ));
            // Clearing the attributes resets the site, but the file_info and
            // download endpoints must be asked on the original one.
            guard.set_site(site);

            sink.event(ProgressEvent {
                message: format!("phase=Prepare; {} files to download", remote.len()),
                elapsed: None,
            });
            let infos = list_file_metadata(&self.client, &guard)?;
            self.download_all(&infos, guard.site(), guard.data_type(), sink)?
        };

        local.extend(downloaded);
        Ok(local)
    }

    fn download_all(
        &self,
        infos: &[FileInfo],
        site: Site,
        data_type: DataType,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Utf8PathBuf>, SdcError> {
        if infos.is_empty() {
            return Ok(Vec::new());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_count().min(infos.len()))
            .build()
            .map_err(|err| SdcError::WorkerPool(err.to_string()))?;

        pool.install(|| {
            infos
                .par_iter()
                .map(|info| self.download_file(info, site, data_type, sink))
                .collect::<Result<Vec<_>, _>>()
        })
    }

    fn download_file(
        &self,
        info: &FileInfo,
        site: Site,
        data_type: DataType,
        sink: &dyn ProgressSink,
    ) -> Result<Utf8PathBuf, SdcError> {
        let path = self.archive.local_path(&info.file_name, data_type)?;
        let start = Instant::now();
        let partial = Archive::partial_file(&path)?;

        match self.stream_into(&partial, info, site, data_type) {
            Ok(bytes) => {
                Archive::persist(partial, &path)?;
                info!(file = %info.file_name, bytes, "downloaded");
                sink.event(ProgressEvent {
                    message: format!("phase=Store; {}", info.file_name),
                    elapsed: Some(start.elapsed()),
                });
                Ok(path)
            }
            Err(err) => {
                // Dropping the partial file deletes whatever was written.
                drop(partial);
                warn!(file = %info.file_name, error = %err, "download failed");
                Err(err)
            }
        }
    }

    fn stream_into(
        &self,
        partial: &NamedTempFile,
        info: &FileInfo,
        site: Site,
        data_type: DataType,
    ) -> Result<u64, SdcError> {
        let failure = |message: String| SdcError::DownloadFailure {
            file: info.file_name.clone(),
            message,
        };
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, partial.as_file());
        let bytes = self
            .client
            .download(site, data_type, &info.file_name, &mut writer)?;
        writer
            .flush()
            .map_err(|err| failure(format!("write failed: {err}")))?;
        if let Some(expected) = info.size {
            if expected != bytes {
                return Err(failure(format!(
                    "expected {expected} bytes, received {bytes}"
                )));
            }
        }
        Ok(bytes)
    }

    fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1)
    }
}
