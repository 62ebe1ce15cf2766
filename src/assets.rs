//! Avatar and voice asset resolution.
//!
//! Locates the avatar image/config pair (local directory scan or signed-URL
//! download) and expands voice identifiers into absolute voice-file paths.

use log::{debug, info};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::utils::common::{check_file_exists_and_valid, resolve_path};

/// Supported avatar image extensions
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Voice pack file extension used by Kokoro
const VOICE_EXTENSION: &str = "pt";

/// Fallback extension when neither the URL nor the response reveal one
const DEFAULT_AVATAR_EXTENSION: &str = "png";

const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/webp", "webp"),
];

/// Avatar config/image pair selected from a local directory
#[derive(Debug, Clone)]
pub struct AvatarAssets {
    pub config_path: PathBuf,
    pub image_path: PathBuf,
}

/// Resolves avatar and voice assets for a single job
pub struct AssetResolver<'a> {
    config: &'a AppConfig,
    client: Client,
}

impl<'a> AssetResolver<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        AssetResolver {
            config,
            client: Client::new(),
        }
    }

    /// Select the avatar JSON config and image file from a directory.
    ///
    /// Entries are scanned in sorted order; the first `*.json` file becomes
    /// the config document and the first file with a supported image
    /// extension becomes the image.
    pub fn select_avatar_assets(&self, avatar_dir: &Path) -> Result<AvatarAssets> {
        if !avatar_dir.is_dir() {
            return Err(AppError::input(format!(
                "avatar directory not found: {}",
                avatar_dir.display()
            )));
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(avatar_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                continue;
            }
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        let mut config_path = None;
        let mut image_path = None;
        for name in &names {
            let lower = name.to_lowercase();
            let path = avatar_dir.join(name);
            if config_path.is_none() && lower.ends_with(".json") {
                config_path = Some(path);
            } else if image_path.is_none()
                && IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(&format!(".{}", ext)))
            {
                image_path = Some(path);
            }
        }

        match (config_path, image_path) {
            (Some(config_path), Some(image_path)) => {
                debug!(
                    "Selected avatar assets: config {}, image {}",
                    config_path.display(),
                    image_path.display()
                );
                Ok(AvatarAssets {
                    config_path,
                    image_path,
                })
            }
            _ => Err(AppError::input(format!(
                "avatar directory must contain one json and one image file: {}",
                avatar_dir.display()
            ))),
        }
    }

    /// Download the avatar image from a signed URL into the work directory.
    ///
    /// The file extension is taken from the URL path when it names a
    /// supported image type, then from the `Content-Type` header, then falls
    /// back to png.
    pub async fn download_avatar(&self, url: &str, work_dir: &Path) -> Result<PathBuf> {
        info!("Downloading avatar from {}", url);

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(self.config.download_timeout_secs))
            .send()
            .await
            .map_err(|e| AppError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let extension = extension_from_url(url)
            .or_else(|| extension_from_content_type(response.headers().get(CONTENT_TYPE)))
            .unwrap_or_else(|| DEFAULT_AVATAR_EXTENSION.to_string());

        let bytes = response.bytes().await.map_err(|e| AppError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let target = work_dir.join(format!("avatar.{}", extension));
        tokio::fs::write(&target, &bytes).await?;

        if !check_file_exists_and_valid(&target).await {
            return Err(AppError::Network {
                url: url.to_string(),
                reason: "downloaded avatar file is empty".to_string(),
            });
        }

        info!("Saved avatar image to {}", target.display());
        Ok(target)
    }

    /// Resolve a voice identifier to an absolute voice-file path.
    ///
    /// `None` resolves to the configured default voice. An identifier
    /// containing a path separator or ending in `.pt` is treated as a path
    /// (absolute or relative to the generator repo); a bare name expands to
    /// `<kokoro_dir>/voices/<name>.pt`. Existence is not checked here: the
    /// generator fails explicitly when a voice file cannot be loaded.
    pub fn resolve_voice(&self, voice: Option<&str>) -> PathBuf {
        let repo_dir = &self.config.repo_dir;
        match voice {
            None => resolve_path(repo_dir, &self.config.tts_voice),
            Some(value)
                if value.contains('/')
                    || value.contains('\\')
                    || value.ends_with(&format!(".{}", VOICE_EXTENSION)) =>
            {
                resolve_path(repo_dir, Path::new(value))
            }
            Some(name) => {
                let voice_file = self
                    .config
                    .kokoro_dir
                    .join("voices")
                    .join(format!("{}.{}", name, VOICE_EXTENSION));
                resolve_path(repo_dir, &voice_file)
            }
        }
    }
}

fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let extension = Path::new(parsed.path())
        .extension()?
        .to_string_lossy()
        .to_lowercase();
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Some(extension)
    } else {
        None
    }
}

fn extension_from_content_type(value: Option<&reqwest::header::HeaderValue>) -> Option<String> {
    let content_type = value?.to_str().ok()?;
    let mime = content_type.split(';').next()?.trim().to_lowercase();
    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(candidate, _)| *candidate == mime)
        .map(|(_, ext)| ext.to_string())
}
