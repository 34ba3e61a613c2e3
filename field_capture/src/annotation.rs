//! Draw, annotate, then confirm or cancel.
//!
//! Finishing a shape opens an empty form for it. Confirming validates the
//! form and stores the polygon; cancelling removes the shape again and leaves
//! the store untouched.

use std::collections::BTreeMap;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::form::{PolygonForm, ValidationFailed};
use crate::geometry::{DrawnShape, GeometryEncoding, GeometryError, PolygonShape};
use crate::store::{PolygonStore, StoreError};

/// Identifier of a shape on the drawn-items layer.
pub type ShapeId = u64;

/// Layer the drawing tool adds finished shapes to.
pub trait ShapeLayer {
    fn add_shape(&mut self, shape: PolygonShape) -> ShapeId;
    fn remove_shape(&mut self, id: ShapeId) -> Option<PolygonShape>;
}

/// In-process collection of drawn shapes.
#[derive(Debug, Default)]
pub struct DrawnItems {
    shapes: BTreeMap<ShapeId, PolygonShape>,
    next_id: ShapeId,
}

impl DrawnItems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ShapeId) -> Option<&PolygonShape> {
        self.shapes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Iterator over shapes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (ShapeId, &PolygonShape)> {
        self.shapes.iter().map(|(id, shape)| (*id, shape))
    }
}

impl ShapeLayer for DrawnItems {
    fn add_shape(&mut self, shape: PolygonShape) -> ShapeId {
        let id = self.next_id;
        self.next_id += 1;
        self.shapes.insert(id, shape);
        id
    }

    fn remove_shape(&mut self, id: ShapeId) -> Option<PolygonShape> {
        self.shapes.remove(&id)
    }
}

/// How the annotation modal was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModalRole {
    Confirm,
    Cancel,
}

impl ModalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModalRole::Confirm => "confirm",
            ModalRole::Cancel => "cancel",
        }
    }
}

/// Result handed back when the modal closes.
#[derive(Debug, Clone, PartialEq)]
pub struct ModalDismissal<T> {
    pub data: Option<T>,
    pub role: ModalRole,
}

/// A polygon that made it into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedPolygon {
    pub id: i64,
    pub shape_id: ShapeId,
    pub form: PolygonForm,
    pub coordinates: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationState {
    Drawing,
    Annotating {
        shape_id: ShapeId,
        geometry: PolygonShape,
        form: PolygonForm,
    },
}

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("no polygon is being annotated")]
    NotAnnotating,
    #[error("polygon {0} is still being annotated")]
    AnnotationInProgress(ShapeId),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Validation(#[from] ValidationFailed),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Drives one drawing/annotation cycle at a time over a shape layer.
pub struct AnnotationSession<L: ShapeLayer = DrawnItems> {
    layer: L,
    state: AnnotationState,
    encoding: GeometryEncoding,
}

impl<L: ShapeLayer> AnnotationSession<L> {
    pub fn new(layer: L) -> Self {
        Self {
            layer,
            state: AnnotationState::Drawing,
            encoding: GeometryEncoding::default(),
        }
    }

    /// Sets how geometries are written to the `coordenadas` column.
    pub fn with_encoding(mut self, encoding: GeometryEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn layer(&self) -> &L {
        &self.layer
    }

    pub fn layer_mut(&mut self) -> &mut L {
        &mut self.layer
    }

    pub fn into_layer(self) -> L {
        self.layer
    }

    pub fn state(&self) -> &AnnotationState {
        &self.state
    }

    pub fn is_annotating(&self) -> bool {
        matches!(self.state, AnnotationState::Annotating { .. })
    }

    pub fn form(&self) -> Option<&PolygonForm> {
        match &self.state {
            AnnotationState::Annotating { form, .. } => Some(form),
            AnnotationState::Drawing => None,
        }
    }

    pub fn form_mut(&mut self) -> Option<&mut PolygonForm> {
        match &mut self.state {
            AnnotationState::Annotating { form, .. } => Some(form),
            AnnotationState::Drawing => None,
        }
    }

    /// Handles a finished shape: adds it to the layer and opens an empty
    /// form for it.
    pub fn shape_created(&mut self, shape: DrawnShape) -> Result<ShapeId, AnnotationError> {
        if let AnnotationState::Annotating { shape_id, .. } = &self.state {
            return Err(AnnotationError::AnnotationInProgress(*shape_id));
        }
        let geometry = shape.into_polygon()?;
        let shape_id = self.layer.add_shape(geometry.clone());
        debug!(
            "shape {} drawn with {} vertices",
            shape_id,
            geometry.vertices().len()
        );
        self.state = AnnotationState::Annotating {
            shape_id,
            geometry,
            form: PolygonForm::new(),
        };
        Ok(shape_id)
    }

    /// Validates the form and stores the polygon.
    ///
    /// On validation or storage failure the session stays in the annotating
    /// state with the form untouched so the user can fix it and retry.
    pub fn confirm(
        &mut self,
        store: &PolygonStore,
    ) -> Result<ModalDismissal<ConfirmedPolygon>, AnnotationError> {
        let AnnotationState::Annotating {
            shape_id,
            geometry,
            form,
        } = &self.state
        else {
            return Err(AnnotationError::NotAnnotating);
        };
        if let Err(e) = form.validate() {
            warn!("form is invalid: {}", e);
            return Err(e.into());
        }
        let coordinates = geometry.encode(self.encoding);
        let id = store.insert(form, &coordinates).map_err(|e| {
            error!("error saving polygon: {}", e);
            e
        })?;
        let confirmed = ConfirmedPolygon {
            id,
            shape_id: *shape_id,
            form: form.clone(),
            coordinates,
        };
        info!("shape {} confirmed as polygon {}", confirmed.shape_id, id);
        self.state = AnnotationState::Drawing;
        Ok(ModalDismissal {
            data: Some(confirmed),
            role: ModalRole::Confirm,
        })
    }

    /// Drops the form and removes the shape it was opened for.
    pub fn cancel(&mut self) -> Result<ModalDismissal<ConfirmedPolygon>, AnnotationError> {
        match std::mem::replace(&mut self.state, AnnotationState::Drawing) {
            AnnotationState::Annotating { shape_id, .. } => {
                self.layer.remove_shape(shape_id);
                debug!("shape {} discarded", shape_id);
                Ok(ModalDismissal {
                    data: None,
                    role: ModalRole::Cancel,
                })
            }
            AnnotationState::Drawing => Err(AnnotationError::NotAnnotating),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn triangle() -> DrawnShape {
        DrawnShape::Polygon(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
        ])
    }

    #[test]
    fn drawn_items_ids_are_not_reused() {
        let mut items = DrawnItems::new();
        let shape = triangle().into_polygon().unwrap();
        let a = items.add_shape(shape.clone());
        assert!(items.remove_shape(a).is_some());
        let b = items.add_shape(shape);
        assert_ne!(a, b);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn second_shape_while_annotating_is_refused() {
        let mut session = AnnotationSession::new(DrawnItems::new());
        let id = session.shape_created(triangle()).unwrap();
        assert!(matches!(
            session.shape_created(triangle()),
            Err(AnnotationError::AnnotationInProgress(x)) if x == id
        ));
        assert_eq!(session.layer().len(), 1);
    }

    #[test]
    fn invalid_shape_stays_in_drawing() {
        let mut session = AnnotationSession::new(DrawnItems::new());
        let err = session
            .shape_created(DrawnShape::Polygon(vec![Point::new(0.0, 0.0)]))
            .unwrap_err();
        assert!(matches!(err, AnnotationError::Geometry(_)));
        assert_eq!(session.state(), &AnnotationState::Drawing);
        assert!(session.layer().is_empty());
    }

    #[test]
    fn new_form_starts_empty() {
        let mut session = AnnotationSession::new(DrawnItems::new());
        assert!(session.form().is_none());
        session.shape_created(triangle()).unwrap();
        assert_eq!(session.form(), Some(&PolygonForm::new()));
    }

    #[test]
    fn cancel_without_shape() {
        let mut session = AnnotationSession::new(DrawnItems::new());
        assert!(matches!(
            session.cancel(),
            Err(AnnotationError::NotAnnotating)
        ));
        assert_eq!(ModalRole::Cancel.as_str(), "cancel");
    }
}
