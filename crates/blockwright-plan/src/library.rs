//! Plan source files on disk.
//!
//! Images and blueprints live in two flat directories. File names from chat
//! commands are untrusted, so every lookup is restricted to a bare file name
//! inside its directory.

use std::path::{Path, PathBuf};

use blockwright_types::PlanSource;

use crate::error::PlanError;

/// Extensions listed and accepted as raster images.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Extensions listed and accepted as blueprints.
pub const BLUEPRINT_EXTENSIONS: [&str; 2] = ["schem", "schematic"];

/// Directories holding plan sources.
#[derive(Debug, Clone)]
pub struct PlanLibrary {
    images_dir: PathBuf,
    blueprints_dir: PathBuf,
}

fn has_extension(name: &str, allowed: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}

/// Reject anything that is not a plain file name.
fn checked_name(file: &str) -> Result<&str, PlanError> {
    let is_plain = !file.is_empty()
        && !file.starts_with('.')
        && !file.contains(['/', '\\'])
        && Path::new(file).file_name().and_then(|n| n.to_str()) == Some(file);
    if is_plain {
        Ok(file)
    } else {
        Err(PlanError::InvalidFileName {
            file: file.to_owned(),
        })
    }
}

impl PlanLibrary {
    /// Library over the given directories.
    pub fn new(images_dir: impl Into<PathBuf>, blueprints_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
            blueprints_dir: blueprints_dir.into(),
        }
    }

    /// Directory of raster images.
    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Directory of blueprints.
    pub fn blueprints_dir(&self) -> &Path {
        &self.blueprints_dir
    }

    /// Create both directories if they are missing.
    pub async fn ensure_dirs(&self) -> Result<(), PlanError> {
        for dir in [&self.images_dir, &self.blueprints_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| PlanError::Io {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Absolute path of a source, after validating its file name and
    /// extension.
    pub fn resolve(&self, source: &PlanSource) -> Result<PathBuf, PlanError> {
        let file = checked_name(source.file())?;
        let (dir, allowed): (&Path, &[&str]) = if source.is_image() {
            (&self.images_dir, &IMAGE_EXTENSIONS)
        } else {
            (&self.blueprints_dir, &BLUEPRINT_EXTENSIONS)
        };
        if !has_extension(file, allowed) {
            return Err(PlanError::InvalidFileName {
                file: file.to_owned(),
            });
        }
        Ok(dir.join(file))
    }

    /// Read the raw bytes of a source.
    pub async fn read(&self, source: &PlanSource) -> Result<Vec<u8>, PlanError> {
        let path = self.resolve(source)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PlanError::NotFound {
                file: source.file().to_owned(),
            }),
            Err(source) => Err(PlanError::Io { path, source }),
        }
    }

    /// Store downloaded image bytes under `file` in the images directory.
    pub async fn save_image(&self, file: &str, bytes: &[u8]) -> Result<PathBuf, PlanError> {
        let file = checked_name(file)?;
        let path = self.images_dir.join(file);
        tokio::fs::create_dir_all(&self.images_dir)
            .await
            .map_err(|source| PlanError::Io {
                path: self.images_dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| PlanError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved image");
        Ok(path)
    }

    /// Every available source, images first, each group sorted by name.
    ///
    /// Missing directories list as empty.
    pub async fn list(&self) -> Result<Vec<PlanSource>, PlanError> {
        let mut images = list_dir(&self.images_dir, &IMAGE_EXTENSIONS).await?;
        let mut blueprints = list_dir(&self.blueprints_dir, &BLUEPRINT_EXTENSIONS).await?;
        images.sort();
        blueprints.sort();
        Ok(images
            .into_iter()
            .map(|file| PlanSource::Image { file, url: None })
            .chain(
                blueprints
                    .into_iter()
                    .map(|file| PlanSource::Blueprint { file }),
            )
            .collect())
    }
}

async fn list_dir(dir: &Path, allowed: &[&str]) -> Result<Vec<String>, PlanError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PlanError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };
    let mut names = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(source) => {
                return Err(PlanError::Io {
                    path: dir.to_path_buf(),
                    source,
                });
            }
        };
        let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_file && !name.starts_with('.') && has_extension(&name, allowed) {
            names.push(name);
        }
    }
    Ok(names)
}
