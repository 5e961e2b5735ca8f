//! Image preparation: make sure the runtime has the node image.
//!
//! When the runtime lacks the image, its archive is taken from a local
//! path or downloaded over plain HTTP, checked against an optional
//! SHA-256 digest, and loaded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use http_body_util::BodyExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use berth_backend::{BackendError, RuntimeBackend};
use berth_core::ImageSource;

use crate::error::{DeployError, DeployResult};

/// What [`ImagePreparer::ensure`] had to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePreparation {
    AlreadyPresent,
    Loaded { archive: PathBuf, downloaded: bool },
}

pub struct ImagePreparer {
    backend: Arc<dyn RuntimeBackend>,
    download_dir: PathBuf,
}

impl ImagePreparer {
    pub fn new(backend: Arc<dyn RuntimeBackend>) -> Self {
        Self {
            backend,
            download_dir: PathBuf::from("."),
        }
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Ensure `reference` is available, loading it from `source` if needed.
    pub async fn ensure(
        &self,
        reference: &str,
        source: Option<&str>,
        sha256: Option<&str>,
    ) -> DeployResult<ImagePreparation> {
        if self
            .backend
            .image_available(reference)
            .await
            .map_err(|e| backend_failure(reference, e))?
        {
            debug!(image = %reference, "image already available");
            return Ok(ImagePreparation::AlreadyPresent);
        }

        let Some(source) = source else {
            return Err(DeployError::Image(format!(
                "{reference} is not available and no image source is configured"
            )));
        };
        let source = ImageSource::parse(source).map_err(|e| DeployError::Image(e.to_string()))?;
        let archive = source.local_path(&self.download_dir);
        debug!(
            image = %reference,
            scheme = source.scheme(),
            archive = %archive.display(),
            "resolved image source"
        );

        let mut downloaded = false;
        match &source {
            ImageSource::Https { url } => {
                return Err(DeployError::Image(format!(
                    "https sources are not supported ({url}); download the archive and use a local path"
                )));
            }
            ImageSource::File { path } => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(DeployError::Image(format!(
                        "image archive not found: {}",
                        path.display()
                    )));
                }
            }
            ImageSource::Http {
                url,
                host,
                port,
                path,
            } => {
                if tokio::fs::try_exists(&archive).await.unwrap_or(false) {
                    info!(archive = %archive.display(), "using previously downloaded archive");
                } else {
                    info!(%url, "downloading image archive");
                    download(host, *port, path, &archive).await?;
                    downloaded = true;
                }
            }
        }

        if let Some(expected) = sha256 {
            verify_digest(&archive, expected).await?;
        }

        info!(image = %reference, archive = %archive.display(), "loading image");
        self.backend
            .load_image(&archive)
            .await
            .map_err(|e| backend_failure(reference, e))?;

        Ok(ImagePreparation::Loaded {
            archive,
            downloaded,
        })
    }
}

fn backend_failure(reference: &str, err: BackendError) -> DeployError {
    match err {
        BackendError::Unavailable(msg) => DeployError::BackendUnavailable(msg),
        err => DeployError::Image(format!("{reference}: {err}")),
    }
}

/// GET `path` from `host:port` into `dest`. The body is written to a
/// `.part` file and renamed once complete.
async fn download(host: &str, port: u16, path: &str, dest: &Path) -> DeployResult<()> {
    let address = format!("{host}:{port}");
    let fail = |msg: String| DeployError::Image(format!("download from {address}{path}: {msg}"));

    let stream = tokio::net::TcpStream::connect(&address)
        .await
        .map_err(|e| fail(e.to_string()))?;
    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| fail(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "download connection closed");
        }
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(path)
        .header("host", &address)
        .header("user-agent", concat!("berth/", env!("CARGO_PKG_VERSION")))
        .body(http_body_util::Empty::<bytes::Bytes>::new())
        .map_err(|e| fail(e.to_string()))?;

    let mut resp = sender
        .send_request(req)
        .await
        .map_err(|e| fail(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(fail(format!("server responded {}", resp.status())));
    }

    let partial = dest.with_extension("part");
    let mut file = File::create(&partial)
        .await
        .map_err(|e| fail(format!("{}: {e}", partial.display())))?;
    let mut written: u64 = 0;
    while let Some(frame) = resp.body_mut().frame().await {
        let frame = frame.map_err(|e| fail(e.to_string()))?;
        if let Ok(chunk) = frame.into_data() {
            file.write_all(&chunk)
                .await
                .map_err(|e| fail(e.to_string()))?;
            written += chunk.len() as u64;
        }
    }
    file.flush().await.map_err(|e| fail(e.to_string()))?;
    drop(file);

    tokio::fs::rename(&partial, dest)
        .await
        .map_err(|e| fail(format!("{}: {e}", dest.display())))?;
    info!(bytes = written, archive = %dest.display(), "download complete");
    Ok(())
}

async fn verify_digest(archive: &Path, expected: &str) -> DeployResult<()> {
    let actual = sha256_file(archive)
        .await
        .map_err(|e| DeployError::Image(format!("{}: {e}", archive.display())))?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(DeployError::Image(format!(
            "digest mismatch for {}: expected {expected}, got {actual}",
            archive.display()
        )));
    }
    debug!(archive = %archive.display(), "digest verified");
    Ok(())
}

async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
