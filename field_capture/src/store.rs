//! Local SQLite store holding one row per confirmed polygon.

use std::path::Path;

use log::{debug, info};
use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;

use crate::form::PolygonForm;
use crate::geometry::{GeometryError, PolygonShape};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS poligonos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dni TEXT NOT NULL,
    apellido_paterno TEXT NOT NULL,
    apellido_materno TEXT NOT NULL,
    nombres TEXT NOT NULL,
    fecha_de_nacimiento TEXT NOT NULL,
    organizacion TEXT NOT NULL,
    participante TEXT NOT NULL,
    cultivo TEXT NOT NULL,
    coordenadas TEXT,
    fotos TEXT
)";

/// Failures of the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable at {location}: {source}")]
    StorageUnavailable {
        location: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("storage write failed: {0}")]
    StorageWriteFailed(#[source] rusqlite::Error),
    #[error("storage read failed: {0}")]
    StorageReadFailed(#[source] rusqlite::Error),
    #[error("photo list of polygon {id} is unreadable: {source}")]
    CorruptPhotoList {
        id: i64,
        #[source]
        source: serde_json::Error,
    },
    #[error("photo list could not be encoded: {0}")]
    PhotoListEncoding(#[source] serde_json::Error),
}

/// A row read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPolygon {
    pub id: i64,
    #[serde(flatten)]
    pub form: PolygonForm,
    #[serde(rename = "coordenadas")]
    pub coordinates: Option<String>,
}

impl StoredPolygon {
    /// Parses the stored coordinates back into a polygon.
    pub fn geometry(&self) -> Result<PolygonShape, GeometryError> {
        match &self.coordinates {
            Some(text) => PolygonShape::decode(text),
            None => Err(GeometryError::MissingGeometry),
        }
    }
}

/// Serializes a photo filename list for the `fotos` column.
pub fn encode_photo_list(photos: &[String]) -> Result<String, serde_json::Error> {
    serde_json::to_string(photos)
}

/// Parses the `fotos` column. Blank text is an empty list.
pub fn decode_photo_list(text: &str) -> Result<Vec<String>, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text)
}

/// Handle to the polygon database. Holding one means the schema exists.
pub struct PolygonStore {
    conn: Connection,
    location: String,
}

impl PolygonStore {
    /// Opens (creating if absent) the database file and ensures the table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let location = path.as_ref().display().to_string();
        let conn = Connection::open(path.as_ref()).map_err(|source| {
            StoreError::StorageUnavailable {
                location: location.clone(),
                source,
            }
        })?;
        let store = Self { conn, location };
        store.initialize()?;
        info!("polygon store ready at {}", store.location);
        Ok(store)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let location = ":memory:".to_string();
        let conn = Connection::open_in_memory().map_err(|source| {
            StoreError::StorageUnavailable {
                location: location.clone(),
                source,
            }
        })?;
        let store = Self { conn, location };
        store.initialize()?;
        Ok(store)
    }

    /// Ensures the polygon table exists. Safe to call any number of times.
    pub fn initialize(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(SCHEMA)
            .map_err(|source| StoreError::StorageUnavailable {
                location: self.location.clone(),
                source,
            })?;
        debug!("schema ensured at {}", self.location);
        Ok(())
    }

    /// Path of the database file, or `:memory:`.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Appends one polygon and returns the id assigned by the database.
    ///
    /// The form is expected to have been validated already.
    pub fn insert(&self, form: &PolygonForm, coordinates: &str) -> Result<i64, StoreError> {
        let photos = encode_photo_list(&form.photos).map_err(StoreError::PhotoListEncoding)?;
        self.conn
            .execute(
                "INSERT INTO poligonos
                    (dni, apellido_paterno, apellido_materno, nombres, fecha_de_nacimiento,
                     organizacion, participante, cultivo, coordenadas, fotos)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    form.dni,
                    form.paternal_surname,
                    form.maternal_surname,
                    form.given_names,
                    form.birth_date,
                    form.organization,
                    form.participant,
                    form.crop,
                    coordinates,
                    photos
                ],
            )
            .map_err(StoreError::StorageWriteFailed)?;
        let id = self.conn.last_insert_rowid();
        info!("polygon {} saved with {} photos", id, form.photos.len());
        Ok(id)
    }

    /// Reads every stored polygon, ordered by id.
    pub fn list_all(&self) -> Result<Vec<StoredPolygon>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, dni, apellido_paterno, apellido_materno, nombres,
                        fecha_de_nacimiento, organizacion, participante, cultivo,
                        coordenadas, fotos
                 FROM poligonos ORDER BY id",
            )
            .map_err(StoreError::StorageReadFailed)?;
        let rows = stmt
            .query_map([], |row| {
                let form = PolygonForm {
                    dni: row.get(1)?,
                    paternal_surname: row.get(2)?,
                    maternal_surname: row.get(3)?,
                    given_names: row.get(4)?,
                    birth_date: row.get(5)?,
                    organization: row.get(6)?,
                    participant: row.get(7)?,
                    crop: row.get(8)?,
                    photos: Vec::new(),
                };
                let id: i64 = row.get(0)?;
                let coordinates: Option<String> = row.get(9)?;
                let photos: Option<String> = row.get(10)?;
                Ok((id, form, coordinates, photos))
            })
            .map_err(StoreError::StorageReadFailed)?;
        let mut records = Vec::new();
        for row in rows {
            let (id, mut form, coordinates, photos) = row.map_err(StoreError::StorageReadFailed)?;
            if let Some(text) = photos {
                form.photos = decode_photo_list(&text)
                    .map_err(|source| StoreError::CorruptPhotoList { id, source })?;
            }
            records.push(StoredPolygon {
                id,
                form,
                coordinates,
            });
        }
        Ok(records)
    }

    /// Number of stored polygons.
    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM poligonos", [], |row| row.get(0))
            .map_err(StoreError::StorageReadFailed)?;
        Ok(n as usize)
    }

    /// Deletes every stored polygon and returns how many were removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM poligonos", [])
            .map_err(StoreError::StorageWriteFailed)?;
        info!("cleared {} polygons", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    fn sample() -> PolygonForm {
        PolygonForm {
            dni: "12345678".into(),
            paternal_surname: "PEREZ".into(),
            maternal_surname: "LOPEZ".into(),
            given_names: "JUAN".into(),
            birth_date: "1990-01-01".into(),
            organization: "ONG1".into(),
            participant: "SI".into(),
            crop: "CAFE".into(),
            photos: vec!["photo_1.jpeg".into()],
        }
    }

    #[test]
    fn insert_and_list() {
        let file = NamedTempFile::new().unwrap();
        let store = PolygonStore::open(file.path()).unwrap();
        let id = store.insert(&sample(), "POLYGON((...))").unwrap();
        assert_eq!(id, 1);
        let records = store.list_all().unwrap();
        assert_eq!(
            records,
            vec![StoredPolygon {
                id: 1,
                form: sample(),
                coordinates: Some("POLYGON((...))".into()),
            }]
        );
    }

    #[test]
    fn reopening_keeps_rows() {
        let file = NamedTempFile::new().unwrap();
        {
            let store = PolygonStore::open(file.path()).unwrap();
            store.insert(&sample(), "POLYGON((0 0, 1 0, 1 1, 0 0))").unwrap();
            store.initialize().unwrap();
            store.initialize().unwrap();
            assert_eq!(store.count().unwrap(), 1);
        }
        let store = PolygonStore::open(file.path()).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.list_all().unwrap()[0].form, sample());
    }

    #[test]
    fn clear_then_ids_keep_growing() {
        let store = PolygonStore::open_in_memory().unwrap();
        store.insert(&sample(), "a").unwrap();
        let second = store.insert(&sample(), "b").unwrap();
        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.list_all().unwrap().is_empty());
        let third = store.insert(&sample(), "c").unwrap();
        assert!(third > second);
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("db.sqlite3");
        match PolygonStore::open(&path) {
            Err(StoreError::StorageUnavailable { location, .. }) => {
                assert!(location.ends_with("db.sqlite3"))
            }
            other => panic!("unexpected result: {:?}", other.map(|s| s.location().to_string())),
        }
    }

    #[test]
    fn null_and_corrupt_photo_lists() {
        let file = NamedTempFile::new().unwrap();
        let store = PolygonStore::open(file.path()).unwrap();
        let raw = Connection::open(file.path()).unwrap();
        raw.execute(
            "INSERT INTO poligonos (dni, apellido_paterno, apellido_materno, nombres,
                fecha_de_nacimiento, organizacion, participante, cultivo)
             VALUES ('12345678', 'A', 'B', 'C', '1990-01-01', 'O', 'P', 'Q')",
            [],
        )
        .unwrap();
        let records = store.list_all().unwrap();
        assert!(records[0].form.photos.is_empty());
        assert_eq!(records[0].coordinates, None);
        assert_eq!(records[0].geometry(), Err(GeometryError::MissingGeometry));

        raw.execute("UPDATE poligonos SET fotos = 'not json'", []).unwrap();
        assert!(matches!(
            store.list_all(),
            Err(StoreError::CorruptPhotoList { id: 1, .. })
        ));
    }

    #[test]
    fn photo_list_encoding() {
        let photos = vec!["photo_1.jpeg".to_string(), "photo \"2\".jpeg".to_string()];
        let text = encode_photo_list(&photos).unwrap();
        assert_eq!(decode_photo_list(&text).unwrap(), photos);
        assert_eq!(encode_photo_list(&[]).unwrap(), "[]");
        assert!(decode_photo_list("  ").unwrap().is_empty());
    }
}
