//! Vendor static asset downloads for the `vendor-pull` command

use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::FilesConfig;

/// Per-request timeout for asset downloads
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

const RULE: &str = "============================================================";

#[derive(Debug, Clone, Copy)]
pub struct VendorAsset {
    pub filename: &'static str,
    pub url: &'static str,
}

/// Vendor files fetched into `files.vendor_dir`
pub const VENDOR_STATICFILES: &[VendorAsset] = &[
    VendorAsset {
        filename: "saas-theme.min.css",
        url: "https://raw.githubusercontent.com/codingforentrepreneurs/SaaS-Foundations/main/src/staticfiles/theme/saas-theme.min.css",
    },
    VendorAsset {
        filename: "flowbite.min.css",
        url: "https://cdnjs.cloudflare.com/ajax/libs/flowbite/2.3.0/flowbite.min.css",
    },
    VendorAsset {
        filename: "flowbite.min.js",
        url: "https://cdnjs.cloudflare.com/ajax/libs/flowbite/2.3.0/flowbite.min.js",
    },
    VendorAsset {
        filename: "flowbite.min.js.map",
        url: "https://cdnjs.cloudflare.com/ajax/libs/flowbite/2.3.0/flowbite.min.js.map",
    },
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("files.vendor_dir is not configured. Set it in config.toml or VISITS__FILES__VENDOR_DIR")]
    MissingVendorDir,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Client whose `timeout` bounds each whole request, body included
pub fn http_client(timeout: Duration) -> Result<Client, FetchError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Stream `url` into `out_path`.
///
/// The body is written to a `.part` file first so a failed transfer never
/// leaves a file that a later run would skip.
pub async fn download_to_local(
    client: &Client,
    url: &str,
    out_path: &Path,
    parent_mkdir: bool,
) -> Result<(), FetchError> {
    if parent_mkdir {
        if let Some(parent) = out_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let response = client.get(url).send().await?.error_for_status()?;

    let mut part_name = out_path.as_os_str().to_owned();
    part_name.push(".part");
    let part_path = PathBuf::from(part_name);

    let result = async {
        let mut file = tokio::fs::File::create(&part_path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        tokio::fs::rename(&part_path, out_path).await?;
        Ok::<(), FetchError>(())
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&part_path).await;
    }
    result
}

/// Result of a vendor pull run
#[derive(Debug, Default)]
pub struct PullReport {
    pub total: usize,
    /// URLs downloaded or already present
    pub completed: Vec<String>,
    /// Filenames left untouched because they already existed
    pub skipped: Vec<String>,
    /// `(filename, url)` pairs that failed
    pub failed: Vec<(String, String)>,
}

impl PullReport {
    pub fn outcome(&self) -> PullOutcome {
        if self.failed.is_empty() {
            PullOutcome::Complete
        } else if !self.completed.is_empty() {
            PullOutcome::Partial
        } else {
            PullOutcome::Failed
        }
    }

    /// Closing summary printed by the command
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push('\n');
        out.push_str(RULE);
        out.push('\n');

        match self.outcome() {
            PullOutcome::Complete => {
                out.push_str(&format!("✓ Successfully downloaded all {} vendor files!\n", self.total));
            }
            PullOutcome::Partial => {
                out.push_str(&format!(
                    "⚠ Partial success: {}/{} files downloaded\n",
                    self.completed.len(),
                    self.total
                ));
                out.push_str("\nFailed downloads:\n");
                for (filename, url) in &self.failed {
                    out.push_str(&format!("  ✗ {filename}\n    URL: {url}\n"));
                }
            }
            PullOutcome::Failed => {
                out.push_str(&format!(
                    "✗ Failed to download any files ({} failures)\n",
                    self.failed.len()
                ));
            }
        }

        out.push_str(RULE);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    Complete,
    Partial,
    Failed,
}

/// Download every asset into `dir`, one at a time.
///
/// Existing files are kept unless `force` is set. A failing asset is recorded
/// and the remaining ones are still attempted.
pub async fn pull_assets(client: &Client, assets: &[VendorAsset], dir: &Path, force: bool) -> PullReport {
    let mut report = PullReport {
        total: assets.len(),
        ..PullReport::default()
    };

    for asset in assets {
        let out_path = dir.join(asset.filename);

        if !force && tokio::fs::try_exists(&out_path).await.unwrap_or(false) {
            println!("⏭️  Skipping {} (already exists)", asset.filename);
            report.completed.push(asset.url.to_string());
            report.skipped.push(asset.filename.to_string());
            continue;
        }

        match download_to_local(client, asset.url, &out_path, true).await {
            Ok(()) => {
                println!("⬇️  Downloading {}... ✓", asset.filename);
                info!("Downloaded {} from {}", asset.filename, asset.url);
                report.completed.push(asset.url.to_string());
            }
            Err(e) => {
                println!("⬇️  Downloading {}... ✗", asset.filename);
                warn!("Failed to download {}: {}", asset.url, e);
                report.failed.push((asset.filename.to_string(), asset.url.to_string()));
            }
        }
    }

    report
}

/// Entry point of the `vendor-pull` command
pub async fn vendor_pull(files: &FilesConfig, force: bool) -> Result<PullReport, FetchError> {
    let vendor_dir = files.vendor_dir.as_ref().ok_or(FetchError::MissingVendorDir)?;

    println!("Downloading vendor static files...");
    println!("Target directory: {}\n", vendor_dir.display());

    let client = http_client(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))?;
    let report = pull_assets(&client, VENDOR_STATICFILES, vendor_dir, force).await;
    println!("{}", report.summary());

    Ok(report)
}
