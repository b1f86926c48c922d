// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose model auto-download.
//!
//! When the requested model file is missing and its name is a known release
//! asset, it is fetched from the Ultralytics GitHub releases with a console
//! progress bar.

#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{PostureError, Result};

/// Default YOLO pose model name.
pub const DEFAULT_POSE_MODEL: &str = "yolo11n-pose.onnx";

/// URL for downloading the default YOLO pose model.
const DEFAULT_POSE_MODEL_URL: &str =
    "https://github.com/ultralytics/assets/releases/download/v8.3.0/yolo11n-pose.onnx";

/// Connection timeout in seconds.
const CONNECT_TIMEOUT: u64 = 30;

/// Body read timeout in seconds.
const READ_TIMEOUT: u64 = 300;

const BAR_WIDTH: usize = 12;
const MIN_UPDATE_INTERVAL: f64 = 0.1;

/// Format bytes as human-readable string (e.g., "10.4MB").
fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes >= GB {
        format!("{:.1}GB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes / KB)
    } else {
        format!("{bytes:.0}B")
    }
}

/// Format elapsed seconds as `s`, `m:ss.s` or `h:mm:ss.s`.
fn format_time(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else if seconds < 3600.0 {
        let mins = (seconds / 60.0) as u32;
        format!("{mins}:{:04.1}", seconds % 60.0)
    } else {
        let hours = (seconds / 3600.0) as u32;
        let mins = ((seconds % 3600.0) / 60.0) as u32;
        format!("{hours}:{mins:02}:{:04.1}", seconds % 60.0)
    }
}

/// Render a progress bar of `width` cells.
fn generate_bar(progress: f64, width: usize) -> String {
    let filled = (progress * width as f64) as usize;
    let partial = progress * width as f64 - filled as f64;

    let mut bar = "━".repeat(filled);
    if filled < width {
        if partial > 0.5 {
            bar.push('╸');
            bar.push_str(&"─".repeat(width - filled - 1));
        } else {
            bar.push_str(&"─".repeat(width - filled));
        }
    }
    bar
}

/// Single-line console progress for one download.
struct Progress {
    desc: String,
    total: Option<u64>,
    downloaded: u64,
    start: Instant,
    last_update: Instant,
}

impl Progress {
    fn new(desc: String, total: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            desc,
            total: total.filter(|&t| t > 0),
            downloaded: 0,
            start: now,
            last_update: now,
        }
    }

    fn advance(&mut self, bytes: usize) {
        self.downloaded += bytes as u64;
        let now = Instant::now();
        if now.duration_since(self.last_update).as_secs_f64() >= MIN_UPDATE_INTERVAL {
            self.last_update = now;
            eprint!("\r\x1b[K{}", self.line());
            std::io::stderr().flush().ok();
        }
    }

    fn finish(&self) {
        eprintln!("\r\x1b[K{}", self.line());
    }

    fn line(&self) -> String {
        let elapsed = self.start.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { self.downloaded as f64 / elapsed } else { 0.0 };

        match self.total {
            Some(total) => {
                let progress = (self.downloaded as f64 / total as f64).min(1.0);
                format!(
                    "{}: {}% {} {}/{} {}/s {}",
                    self.desc,
                    (progress * 100.0) as u8,
                    generate_bar(progress, BAR_WIDTH),
                    format_bytes(self.downloaded as f64),
                    format_bytes(total as f64),
                    format_bytes(rate),
                    format_time(elapsed)
                )
            }
            None => format!(
                "{}: {} {}/s {}",
                self.desc,
                format_bytes(self.downloaded as f64),
                format_bytes(rate),
                format_time(elapsed)
            ),
        }
    }
}

/// Stream `url` into `dest` through a `.part` file renamed on success.
fn download_file(url: &str, dest: &Path) -> Result<()> {
    let config = ureq::Agent::config_builder()
        .timeout_connect(Some(Duration::from_secs(CONNECT_TIMEOUT)))
        .timeout_recv_body(Some(Duration::from_secs(READ_TIMEOUT)))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let response = agent.get(url).call().map_err(|e| {
        PostureError::ModelLoadError(match &e {
            ureq::Error::Timeout(_) => format!("Connection timed out while downloading {url}"),
            ureq::Error::Io(io_err) => format!("Network error downloading {url}: {io_err}"),
            _ => format!("Failed to download {url}: {e}"),
        })
    })?;

    let total = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok());

    let part_path = dest.with_extension("part");
    let _ = fs::remove_file(&part_path);

    let mut progress = Progress::new(format!("Downloading {url} to '{}'", dest.display()), total);
    let mut reader = response.into_body().into_reader();

    let streamed = (|| -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(&part_path)?);
        let mut buffer = [0u8; 65536];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n])?;
            progress.advance(n);
        }
        writer.flush()
    })();

    if let Err(e) = streamed {
        let _ = fs::remove_file(&part_path);
        return Err(PostureError::ModelLoadError(format!("Failed to download {url}: {e}")));
    }
    progress.finish();

    fs::rename(&part_path, dest).map_err(|e| {
        let _ = fs::remove_file(&part_path);
        PostureError::ModelLoadError(format!("Failed to move downloaded file to {}: {e}", dest.display()))
    })
}

/// Download URL for a known pose model file name.
fn release_url(filename: &str) -> Option<&'static str> {
    (filename == DEFAULT_POSE_MODEL).then_some(DEFAULT_POSE_MODEL_URL)
}

/// Download a pose model if its file name is a known release asset.
///
/// # Errors
///
/// Returns a `ModelLoadError` for unknown names or failed downloads.
pub fn try_download_model<P: AsRef<Path>>(model_path: P) -> Result<PathBuf> {
    let path = model_path.as_ref();
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

    let url = release_url(filename).ok_or_else(|| {
        PostureError::ModelLoadError(format!(
            "Model file not found: {}. Auto-download is only supported for {DEFAULT_POSE_MODEL}",
            path.display()
        ))
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    download_file(url, path)?;
    Ok(path.to_path_buf())
}

/// Return `model_path` if it exists, downloading it first when possible.
///
/// # Errors
///
/// Returns a `ModelLoadError` if the file is missing and cannot be downloaded.
pub fn ensure_model<P: AsRef<Path>>(model_path: P) -> Result<PathBuf> {
    let path = model_path.as_ref();
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    tracing::info!(model = %path.display(), "model not found locally, downloading");
    try_download_model(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_returns_error() {
        let err = try_download_model("unknown_model.onnx").unwrap_err().to_string();
        assert!(err.contains("Auto-download is only supported"));
    }

    #[test]
    fn test_existing_model_is_not_downloaded() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(ensure_model(file.path()).unwrap(), file.path());
    }

    #[test]
    fn test_release_url() {
        assert!(release_url(DEFAULT_POSE_MODEL).is_some());
        assert!(release_url("yolo11n.onnx").is_none());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500.0), "500B");
        assert_eq!(format_bytes(1024.0), "1.0KB");
        assert_eq!(format_bytes(1_048_576.0), "1.0MB");
        assert_eq!(format_bytes(1_073_741_824.0), "1.0GB");
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(5.5), "5.5s");
        assert_eq!(format_time(65.0), "1:05.0");
        assert_eq!(format_time(3725.0), "1:02:05.0");
    }

    #[test]
    fn test_generate_bar() {
        assert_eq!(generate_bar(0.0, 10), "──────────");
        assert_eq!(generate_bar(1.0, 10), "━━━━━━━━━━");
        assert_eq!(generate_bar(0.5, 10), "━━━━━─────");
    }

    #[test]
    fn test_progress_line_with_total() {
        let mut progress = Progress::new("Downloading x".to_string(), Some(2048));
        progress.downloaded = 1024;
        let line = progress.line();
        assert!(line.starts_with("Downloading x: 50%"));
        assert!(line.contains("1.0KB/2.0KB"));
    }
}
