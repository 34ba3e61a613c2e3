//! Core library for the field capture application.
//!
//! A field worker draws polygons over a base map, fills in an identity and
//! crop form for each one and attaches photos. Confirmed submissions are kept
//! in a local SQLite database; photos live as JPEG files next to it.

pub mod annotation;
pub mod config;
pub mod export;
pub mod form;
pub mod geometry;
pub mod location;
pub mod logging;
pub mod map;
pub mod photos;
pub mod store;

pub use annotation::{
    AnnotationError, AnnotationSession, AnnotationState, ConfirmedPolygon, DrawnItems,
    ModalDismissal, ModalRole, ShapeId, ShapeLayer,
};
pub use config::AppConfig;
pub use form::{FieldProblem, FormField, PhotoLimitReached, PolygonForm, ValidationFailed, MAX_PHOTOS};
pub use geometry::{DrawnShape, GeometryEncoding, GeometryError, Point, PolygonShape};
pub use photos::{take_photo, Camera, PhotoError, PhotoLibrary};
pub use store::{PolygonStore, StoreError, StoredPolygon};
