//! Image downloads for `!url`.
//!
//! The body is streamed with a hard size cap and saved into the images
//! directory as `url_<unix_ms>.<ext>`, so the build that follows is an
//! ordinary image build of a local file.

use std::time::Duration;

use chrono::Utc;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use tracing::info;

use blockwright_core::config::FetchConfig;
use blockwright_plan::PlanLibrary;
use blockwright_types::PlanSource;

use crate::error::BotError;

/// Extensions the plan compiler can decode.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Downloads images into a [`PlanLibrary`].
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
    max_bytes: u64,
    library: PlanLibrary,
}

impl ImageFetcher {
    /// Fetcher with the configured timeout and size cap.
    pub fn new(config: &FetchConfig, library: PlanLibrary) -> Result<Self, BotError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BotError::Fetch {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
            library,
        })
    }

    /// Download `url` and return the image source to build.
    pub async fn fetch(&self, url: &str) -> Result<PlanSource, BotError> {
        let parsed = Url::parse(url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| BotError::InvalidUrl {
                url: url.to_owned(),
            })?;

        let mut response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| BotError::Fetch {
                message: format!("{e}"),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(BotError::Fetch {
                message: format!("server answered {status}"),
            });
        }
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes)
        {
            return Err(BotError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let extension = extension_for(&parsed, content_type.as_deref());

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| BotError::Fetch {
            message: format!("{e}"),
        })? {
            body.extend_from_slice(&chunk);
            if u64::try_from(body.len()).unwrap_or(u64::MAX) > self.max_bytes {
                return Err(BotError::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        let file = download_file_name(Utc::now().timestamp_millis(), extension);
        let path = self.library.save_image(&file, &body).await?;
        info!(
            url = url,
            path = %path.display(),
            bytes = body.len(),
            "Image downloaded"
        );
        Ok(PlanSource::Image {
            file,
            url: Some(url.to_owned()),
        })
    }
}

/// `url_<unix_ms>.<ext>`.
pub fn download_file_name(unix_ms: i64, extension: &str) -> String {
    format!("url_{unix_ms}.{extension}")
}

/// Extension from the URL path, then the content type, then `png`.
pub fn extension_for(url: &Url, content_type: Option<&str>) -> &'static str {
    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .and_then(|(_, ext)| known_extension(ext));
    let from_type = || {
        content_type
            .and_then(|ct| ct.split(';').next())
            .and_then(|mime| mime.trim().strip_prefix("image/"))
            .and_then(known_extension)
    };
    from_path.or_else(from_type).unwrap_or("png")
}

fn known_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .copied()
        .find(|known| *known == ext.as_str())
        .map(|known| if known == "jpeg" { "jpg" } else { known })
}
