//! Photo files attached to polygon forms.
//!
//! Captured images are written to an app-private directory and only their
//! filenames travel with the form and into the `fotos` column.

use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use log::{error, info, warn};
use thiserror::Error;

use crate::form::{PhotoLimitReached, PolygonForm, MAX_PHOTOS};

/// Subdirectory of the data directory holding photos.
pub const PHOTO_DIR: &str = "poligonos";

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("photo capture failed: {0}")]
    CaptureFailed(String),
    #[error("photo data is not valid base64: {0}")]
    InvalidImageData(#[from] base64::DecodeError),
    #[error("photo file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    PhotoLimitReached(#[from] PhotoLimitReached),
    #[error("invalid photo name {0:?}")]
    InvalidName(String),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PhotoError + '_ {
    move |source| PhotoError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Device camera. Returns the captured JPEG as base64 text.
pub trait Camera {
    fn capture_photo(&mut self) -> Result<String, PhotoError>;
}

/// Directory of captured photos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoLibrary {
    dir: PathBuf,
}

impl PhotoLibrary {
    /// Library under `<data_dir>/poligonos`.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self::with_subdir(data_dir, PHOTO_DIR)
    }

    pub fn with_subdir<P: AsRef<Path>>(data_dir: P, subdir: &str) -> Self {
        Self {
            dir: data_dir.as_ref().join(subdir),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of a photo. Names must be plain filenames.
    pub fn path_of(&self, name: &str) -> Result<PathBuf, PhotoError> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(PhotoError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    /// Decodes a base64 image and stores it, returning the new filename.
    pub fn save_base64(&self, data: &str) -> Result<String, PhotoError> {
        let bytes = BASE64.decode(data.trim())?;
        self.save_bytes(&bytes)
    }

    /// Stores raw JPEG bytes as `photo_<unix millis>.jpeg`.
    pub fn save_bytes(&self, bytes: &[u8]) -> Result<String, PhotoError> {
        self.save_from(bytes)
    }

    /// Copies a JPEG stream into a new `photo_<unix millis>.jpeg` file.
    ///
    /// The directory is created when missing. When the name for the current
    /// millisecond is taken the timestamp is advanced until a free one is
    /// found. A failed copy leaves no file behind.
    pub fn save_from<R: Read>(&self, mut reader: R) -> Result<String, PhotoError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let mut stamp = Utc::now().timestamp_millis();
        loop {
            let name = format!("photo_{}.jpeg", stamp);
            let path = self.dir.join(&name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    if let Err(e) = io::copy(&mut reader, &mut file) {
                        drop(file);
                        if let Err(cleanup) = fs::remove_file(&path) {
                            warn!("could not remove partial photo {}: {}", name, cleanup);
                        }
                        return Err(io_error(&path)(e));
                    }
                    return Ok(name);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => stamp += 1,
                Err(e) => return Err(io_error(&path)(e)),
            }
        }
    }

    pub fn load_bytes(&self, name: &str) -> Result<Vec<u8>, PhotoError> {
        let path = self.path_of(name)?;
        fs::read(&path).map_err(io_error(&path))
    }

    pub fn load_base64(&self, name: &str) -> Result<String, PhotoError> {
        Ok(BASE64.encode(self.load_bytes(name)?))
    }

    /// Inline `data:` URL used for previews.
    pub fn data_url(&self, name: &str) -> Result<String, PhotoError> {
        Ok(format!("data:image/jpeg;base64,{}", self.load_base64(name)?))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn remove(&self, name: &str) -> Result<(), PhotoError> {
        let path = self.path_of(name)?;
        fs::remove_file(&path).map_err(io_error(&path))
    }
}

/// Captures a photo, stores it and attaches its filename to `form`.
///
/// Refuses without touching the camera once the form holds the maximum
/// number of photos. Any failure leaves previously attached photos as they
/// were.
pub fn take_photo<C: Camera + ?Sized>(
    camera: &mut C,
    library: &PhotoLibrary,
    form: &mut PolygonForm,
) -> Result<String, PhotoError> {
    if form.photos_full() {
        warn!("photo limit of {} reached", MAX_PHOTOS);
        return Err(PhotoLimitReached { max: MAX_PHOTOS }.into());
    }
    let name = camera
        .capture_photo()
        .and_then(|image| library.save_base64(&image))
        .map_err(|e| {
            error!("error taking photo: {}", e);
            e
        })?;
    form.add_photo(name.clone())?;
    info!("photo saved: {}", name);
    Ok(name)
}
