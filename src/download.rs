//! Streamed HTTP downloads of PDS files (labels, index tables, EDR products).
//!
//! The transfer is done with `reqwest` in chunks and written with tokio's async
//! file I/O. A blocking wrapper, [`url_retrieve`], spins a current-thread runtime so
//! the sequential index code does not need to be async. Connecting and every read of the
//! body are bounded by [`HTTP_TIMEOUT`], so a stalled transfer fails instead of hanging.
use camino::Utf8Path;
use reqwest::StatusCode;
use tokio::{fs::File, io::AsyncWriteExt};
use tokio_stream::StreamExt;
use tracing::info;

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::constants::HTTP_TIMEOUT;
use crate::planetary_errors::PlanetaryError;
use crate::pool::outside_runtime;

/// HTTP basic authentication parameters for protected archives.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            user: user.into(),
            password: password.into(),
        }
    }
}

#[cfg(feature = "progress")]
fn download_bar(total: u64, path: &Utf8Path) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("{msg} {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
            .expect("indicatif template"),
    );
    pb.set_message(path.file_name().unwrap_or_default().to_string());
    pb
}

/// Download a file from a URL
/// Uses reqwest to download the file in chunks
/// and saves it to the specified path using tokio's async file I/O
/// and stream processing.
///
/// Arguments
/// ---------
/// * `url`: the URL of the file to download
/// * `outfile`: the path to save the downloaded file
/// * `auth`: optional basic authentication
///
/// Return
/// ------
/// * The number of bytes written
/// * [`PlanetaryError::HttpStatus`] if the server does not answer with 200
///
/// A failed transfer leaves the partially written file in place.
pub async fn url_retrieve_async(
    url: &str,
    outfile: &Utf8Path,
    auth: Option<&Credentials>,
) -> Result<u64, PlanetaryError> {
    let client = reqwest::Client::builder()
        .connect_timeout(HTTP_TIMEOUT)
        .read_timeout(HTTP_TIMEOUT)
        .build()?;

    let mut request = client.get(url);
    if let Some(credentials) = auth {
        request = request.basic_auth(&credentials.user, Some(&credentials.password));
    }

    info!("Downloading {}...", url);
    let response = request.send().await?;
    if response.status() != StatusCode::OK {
        return Err(PlanetaryError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    #[cfg(feature = "progress")]
    let pb = download_bar(response.content_length().unwrap_or(0), outfile);

    let mut file = File::create(outfile).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        #[cfg(feature = "progress")]
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;

    #[cfg(feature = "progress")]
    pb.finish_and_clear();

    info!("Downloaded {} to {}", url, outfile);
    Ok(written)
}

/// Blocking version of [`url_retrieve_async`].
///
/// The transfer runs on its own current-thread runtime. From async code (or a
/// `spawn_blocking` worker) that runtime lives on a dedicated thread, see
/// [`outside_runtime`].
pub fn url_retrieve(
    url: &str,
    outfile: &Utf8Path,
    auth: Option<&Credentials>,
) -> Result<u64, PlanetaryError> {
    outside_runtime(|| {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        rt.block_on(url_retrieve_async(url, outfile, auth))
    })
}
