//! Image archive source resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Where an image archive can be obtained when the runtime does not
/// already have the image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ImageSource {
    /// Plain HTTP: http://mirror.example.com/node/image.tar.gz
    Http { url: String, host: String, port: u16, path: String },
    /// HTTPS URLs are recognised so they can be rejected with a clear message.
    Https { url: String },
    /// Local archive: file:///srv/image.tar.gz or ./image.tar.gz
    File { path: PathBuf },
}

impl ImageSource {
    pub fn parse(uri: &str) -> CoreResult<Self> {
        if let Some(rest) = uri.strip_prefix("http://") {
            let (authority, path) = match rest.find('/') {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, "/"),
            };
            if authority.is_empty() {
                return Err(CoreError::InvalidUri(uri.to_string()));
            }
            let (host, port) = match authority.rsplit_once(':') {
                Some((h, p)) => {
                    let port = p
                        .parse::<u16>()
                        .map_err(|_| CoreError::InvalidUri(uri.to_string()))?;
                    (h, port)
                }
                None => (authority, 80),
            };
            Ok(ImageSource::Http {
                url: uri.to_string(),
                host: host.to_string(),
                port,
                path: path.to_string(),
            })
        } else if uri.starts_with("https://") {
            Ok(ImageSource::Https { url: uri.to_string() })
        } else if let Some(path) = uri.strip_prefix("file://") {
            Ok(ImageSource::File { path: PathBuf::from(path) })
        } else if uri.contains("://") {
            Err(CoreError::UnsupportedScheme(uri.to_string()))
        } else if uri.is_empty() {
            Err(CoreError::InvalidUri(uri.to_string()))
        } else {
            Ok(ImageSource::File { path: PathBuf::from(uri) })
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            ImageSource::Http { .. } => "http",
            ImageSource::Https { .. } => "https",
            ImageSource::File { .. } => "file",
        }
    }

    /// Local path the archive lives at (or will be downloaded to), relative
    /// to `download_dir` for remote sources.
    pub fn local_path(&self, download_dir: &Path) -> PathBuf {
        match self {
            ImageSource::File { path } => path.clone(),
            ImageSource::Http { path, .. } => download_dir.join(file_name(path)),
            ImageSource::Https { url } => download_dir.join(file_name(url)),
        }
    }
}

fn file_name(path: &str) -> &str {
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => "image.tar",
    }
}
