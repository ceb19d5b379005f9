use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use crate::effects::RegistryClient;
use crate::fetch::FetchError;

pub const USER_AGENT: &str = concat!("depdiff/", env!("CARGO_PKG_VERSION"));

/// A fully written archive and its content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub path: PathBuf,
    pub sha256: String,
    pub size: u64,
}

/// Registry archives fetched over blocking HTTP.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: Client,
}

impl HttpRegistry {
    /// # Errors
    /// Returns [`FetchError::Client`] when the TLS backend cannot initialise.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

impl RegistryClient for HttpRegistry {
    fn download(&self, url: &Url, dest: &Path) -> Result<Download, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };
        debug!(%url, dest = %dest.display(), "downloading archive");
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|source| FetchError::io("creating", parent, source))?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|source| FetchError::io("staging download in", parent, source))?;
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;
        let mut buffer = vec![0_u8; 64 * 1024];
        loop {
            let read = response.read(&mut buffer).map_err(|source| FetchError::Stream {
                url: url.to_string(),
                source,
            })?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            tmp.write_all(&buffer[..read])
                .map_err(|source| FetchError::io("writing", tmp.path(), source))?;
            written += read as u64;
        }
        tmp.persist(dest)
            .map_err(|err| FetchError::io("persisting", dest, err.error))?;

        Ok(Download {
            path: dest.to_path_buf(),
            sha256: hex::encode(hasher.finalize()),
            size: written,
        })
    }
}
