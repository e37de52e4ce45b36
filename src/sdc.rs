use std::io::{Read, Write};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{CredentialProvider, Credentials, EnvCredentials};
use crate::domain::{DataType, Site};
use crate::error::SdcError;
use crate::query::Query;

pub const DEFAULT_SDC_HOME: &str = "https://lasp.colorado.edu/mms/sdc";

/// Bytes read from the response per write to disk.
pub const CHUNK_SIZE: usize = 128 * 1024;

const MAX_LOGIN_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Download,
    FileNames,
    FileInfo,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Download => "download",
            Operation::FileNames => "file_names",
            Operation::FileInfo => "file_info",
        }
    }
}

/// One entry of a `file_info` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_name: String,
    #[serde(default, alias = "file_size")]
    pub size: Option<u64>,
    #[serde(default, alias = "md5")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub timetag: Option<String>,
    #[serde(default)]
    pub modified_date: Option<String>,
}

impl FileInfo {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            size: None,
            checksum: None,
            timetag: None,
            modified_date: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileInfoResponse {
    #[serde(default)]
    files: Vec<FileInfo>,
}

/// The SDC files API.
pub trait SdcClient: Send + Sync {
    /// Remote identifiers of the files matching `query`, in SDC order.
    fn file_names(
        &self,
        site: Site,
        data_type: DataType,
        query: &Query,
    ) -> Result<Vec<String>, SdcError>;

    fn file_info(
        &self,
        site: Site,
        data_type: DataType,
        query: &Query,
    ) -> Result<Vec<FileInfo>, SdcError>;

    /// Streams one file into `writer` and returns the number of bytes written.
    fn download(
        &self,
        site: Site,
        data_type: DataType,
        file_name: &str,
        writer: &mut dyn Write,
    ) -> Result<u64, SdcError>;
}

#[derive(Clone)]
pub struct SdcHttpClient {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
    session: Arc<RwLock<Option<Credentials>>>,
}

impl SdcHttpClient {
    pub fn new() -> Result<Self, SdcError> {
        Self::with_base_url(DEFAULT_SDC_HOME, EnvCredentials)
    }

    pub fn with_base_url(
        base_url: &str,
        credentials: impl CredentialProvider + 'static,
    ) -> Result<Self, SdcError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("mms-sdc/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SdcError::Transport(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| SdcError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: Arc::new(credentials),
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// `{host}/{site}/files/api/v1/{operation}/{data_type}`
    pub fn endpoint(&self, operation: Operation, site: Site, data_type: DataType) -> String {
        format!(
            "{}/{}/files/api/v1/{}/{}",
            self.base_url,
            site.as_str(),
            operation.as_str(),
            data_type.as_str()
        )
    }

    /// Endpoint with the query rendered as URL parameters.
    pub fn url(
        &self,
        operation: Operation,
        site: Site,
        data_type: DataType,
        query: &Query,
    ) -> Result<String, SdcError> {
        reqwest::Url::parse_with_params(&self.endpoint(operation, site, data_type), query.iter())
            .map(String::from)
            .map_err(|err| SdcError::Transport(err.to_string()))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let session = self
            .session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match session.as_ref() {
            Some(credentials) => {
                request.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => request,
        }
    }

    fn handle_status(response: Response) -> Result<Response, SdcError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "SDC request failed".to_string());
        Err(SdcError::Status { status, message })
    }

    /// Sends a request, logging in and resending it when the SDC asks for
    /// authentication.
    fn send<F>(&self, make_req: F) -> Result<Response, SdcError>
    where
        F: Fn() -> RequestBuilder,
    {
        let response = self.send_with_retries(|| self.authorize(make_req()))?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::handle_status(response);
        }

        for attempt in 1..=MAX_LOGIN_ATTEMPTS {
            let Some(credentials) = self.credentials.credentials(attempt)? else {
                return Err(SdcError::AuthenticationFailure {
                    attempts: attempt - 1,
                });
            };
            *self
                .session
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(credentials);

            let response = self.send_with_retries(|| self.authorize(make_req()))?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Self::handle_status(response);
            }
            warn!(
                remaining = MAX_LOGIN_ATTEMPTS - attempt,
                "incorrect SDC username or password"
            );
        }
        Err(SdcError::AuthenticationFailure {
            attempts: MAX_LOGIN_ATTEMPTS,
        })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, SdcError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(SdcError::Transport(err.to_string()));
                }
            }
        }
    }
}

impl SdcClient for SdcHttpClient {
    fn file_names(
        &self,
        site: Site,
        data_type: DataType,
        query: &Query,
    ) -> Result<Vec<String>, SdcError> {
        let url = self.endpoint(Operation::FileNames, site, data_type);
        let rendered = self.url(Operation::FileNames, site, data_type, query)?;
        debug!(url = %rendered, "listing SDC files");
        let response = self.send(|| self.client.post(&url).form(query))?;
        let body = response
            .text()
            .map_err(|err| SdcError::Transport(err.to_string()))?;
        Ok(parse_file_names(&body))
    }

    fn file_info(
        &self,
        site: Site,
        data_type: DataType,
        query: &Query,
    ) -> Result<Vec<FileInfo>, SdcError> {
        let url = self.endpoint(Operation::FileInfo, site, data_type);
        let rendered = self.url(Operation::FileInfo, site, data_type, query)?;
        debug!(url = %rendered, "requesting SDC file info");
        let response = self.send(|| self.client.post(&url).form(query))?;
        let parsed: FileInfoResponse = response
            .json()
            .map_err(|err| SdcError::Transport(err.to_string()))?;
        Ok(parsed.files)
    }

    fn download(
        &self,
        site: Site,
        data_type: DataType,
        file_name: &str,
        writer: &mut dyn Write,
    ) -> Result<u64, SdcError> {
        let url = self.endpoint(Operation::Download, site, data_type);
        let form = [("file", file_name)];
        let mut response = self.send(|| self.client.post(&url).form(&form))?;

        let failure = |message: String| SdcError::DownloadFailure {
            file: file_name.to_string(),
            message,
        };
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let read = response
                .read(&mut buffer)
                .map_err(|err| failure(format!("interrupted stream: {err}")))?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..read])
                .map_err(|err| failure(format!("write failed: {err}")))?;
            written += read as u64;
        }
        Ok(written)
    }
}

/// Splits a `file_names` response body. An empty body means no files.
pub fn parse_file_names(body: &str) -> Vec<String> {
    body.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
