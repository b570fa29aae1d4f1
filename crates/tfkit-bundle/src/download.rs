//! HTTP downloads with optional basic auth and progress reporting.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::CONTENT_LENGTH;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tfkit_core::Error;
use tracing::{debug, info};

/// Basic-auth credentials for a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

/// Streaming file downloader
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    show_progress: bool,
}

impl Downloader {
    /// Create a downloader with progress bars disabled
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("tfkit/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("Failed to create HTTP client")?,
            show_progress: false,
        })
    }

    /// Enable or disable progress bars
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Download `url` into `dest`, returning the number of bytes written
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        credentials: Option<&Credentials>,
    ) -> Result<u64> {
        info!("Downloading {} to {}", url, dest.display());

        let mut request = self.client.get(url);
        if let Some(credentials) = credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_ref());
        }

        let response = request.send().await.map_err(|e| Error::Download {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(Error::Download {
                url: url.to_string(),
                message: format!("server responded with status {}", response.status()),
            }
            .into());
        }

        let total_size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        let progress = match (self.show_progress, total_size) {
            (true, Some(total)) => {
                let pb = ProgressBar::new(total);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")?
                        .progress_chars("#>-"),
                );
                pb.set_message(file_label(url));
                Some(pb)
            }
            _ => None,
        };

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::from_io(parent, e))?;
        }
        let mut file = File::create(dest).map_err(|e| Error::from_io(dest, e))?;

        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Download {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            file.write_all(&chunk)
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            downloaded += chunk.len() as u64;
            if let Some(pb) = &progress {
                pb.set_position(downloaded);
            }
        }
        file.flush()?;

        if let Some(pb) = progress {
            pb.finish_with_message("Downloaded");
        }
        debug!("Downloaded {} bytes from {}", downloaded, url);
        Ok(downloaded)
    }
}

fn file_label(url: &str) -> String {
    remote_file_name(url).unwrap_or_else(|| url.to_string())
}

/// Last non-empty path segment of a URL
pub fn remote_file_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}
