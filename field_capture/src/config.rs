//! Application settings loaded from an optional JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::geometry::GeometryEncoding;
use crate::photos::{PhotoLibrary, PHOTO_DIR};

/// Settings shared by every front end. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Display name of the application.
    pub app_name: String,
    /// App-private directory holding the database and the photo directory.
    pub data_dir: PathBuf,
    /// Database name; the file is `<data_dir>/<database_name>.sqlite3`.
    pub database_name: String,
    /// Photo subdirectory of `data_dir`.
    pub photo_dir: String,
    /// Encoding of stored polygon coordinates.
    pub geometry_encoding: GeometryEncoding,
    /// Request high accuracy positions from the GPS.
    pub high_accuracy: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "GeoDevidaMovil".to_string(),
            data_dir: PathBuf::from("."),
            database_name: "my_db".to_string(),
            photo_dir: PHOTO_DIR.to_string(),
            geometry_encoding: GeometryEncoding::Wkt,
            high_accuracy: true,
        }
    }
}

impl AppConfig {
    /// Loads settings from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let data = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> std::io::Result<Self> {
        match path {
            Some(p) => Self::from_json(p),
            None => Ok(Self::default()),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite3", self.database_name))
    }

    pub fn photo_library(&self) -> PhotoLibrary {
        PhotoLibrary::with_subdir(&self.data_dir, &self.photo_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.database_path(), PathBuf::from("./my_db.sqlite3"));
        assert_eq!(config.photo_library().dir(), Path::new("./poligonos"));
        assert_eq!(config.geometry_encoding, GeometryEncoding::Wkt);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "data_dir": "/data/app", "geometry_encoding": "geojson" }}"#
        )
        .unwrap();
        let config = AppConfig::from_json(file.path()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data/app"));
        assert_eq!(config.geometry_encoding, GeometryEncoding::GeoJson);
        assert_eq!(config.database_name, "my_db");
        assert!(config.high_accuracy);
    }

    #[test]
    fn malformed_file_is_invalid_data() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = AppConfig::from_json(file.path()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(AppConfig::load(None).is_ok());
    }
}
