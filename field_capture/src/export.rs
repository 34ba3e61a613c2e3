//! GeoJSON export of stored polygons.

use std::fs;
use std::io;
use std::path::Path;

use geojson::{feature::Id, Feature, FeatureCollection, JsonObject};
use log::warn;
use serde_json::Value;

use crate::store::StoredPolygon;

/// Builds one feature per record. Form fields become properties under their
/// column names; records whose coordinates do not parse get a null geometry.
pub fn records_to_feature_collection(
    records: &[StoredPolygon],
) -> serde_json::Result<FeatureCollection> {
    let mut features = Vec::with_capacity(records.len());
    for record in records {
        let mut properties = match serde_json::to_value(&record.form)? {
            Value::Object(map) => map,
            _ => JsonObject::new(),
        };
        properties.insert("id".to_string(), Value::from(record.id));
        let geometry = match record.geometry() {
            Ok(shape) => Some(shape.to_geojson()),
            Err(e) => {
                warn!("polygon {} exported without geometry: {}", record.id, e);
                None
            }
        };
        features.push(Feature {
            bbox: None,
            geometry,
            id: Some(Id::Number(record.id.into())),
            properties: Some(properties),
            foreign_members: None,
        });
    }
    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Writes the records to `path` as a pretty-printed FeatureCollection.
pub fn write_geojson<P: AsRef<Path>>(path: P, records: &[StoredPolygon]) -> io::Result<()> {
    let collection = records_to_feature_collection(records).map_err(io::Error::other)?;
    let json = serde_json::to_string_pretty(&collection).map_err(io::Error::other)?;
    fs::write(path, json)
}
