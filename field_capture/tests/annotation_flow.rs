use assert_fs::prelude::*;
use field_capture::{
    take_photo, AnnotationError, AnnotationSession, Camera, DrawnItems, DrawnShape, FormField,
    GeometryEncoding, ModalRole, PhotoError, PhotoLibrary, Point, PolygonShape, PolygonStore,
};
use predicates::prelude::*;

fn rectangle() -> DrawnShape {
    DrawnShape::Rectangle {
        south_west: Point::new(-75.1, -9.2),
        north_east: Point::new(-75.0, -9.1),
    }
}

fn fill(session: &mut AnnotationSession, dni: &str) {
    let form = session.form_mut().unwrap();
    form.set_field(FormField::Dni, dni);
    form.set_field(FormField::PaternalSurname, "perez");
    form.set_field(FormField::MaternalSurname, "lopez");
    form.set_field(FormField::GivenNames, "juan");
    form.set_field(FormField::BirthDate, "1990-01-01");
    form.set_field(FormField::Organization, "ong1");
    form.set_field(FormField::Participant, "si");
    form.set_field(FormField::Crop, "cafe");
}

struct StaticCamera;

impl Camera for StaticCamera {
    fn capture_photo(&mut self) -> Result<String, PhotoError> {
        Ok("/9j/4AAQSkZJRg==".to_string())
    }
}

#[test]
fn confirm_stores_the_drawn_geometry() {
    let store = PolygonStore::open_in_memory().unwrap();
    let mut session = AnnotationSession::new(DrawnItems::new());
    let shape_id = session.shape_created(rectangle()).unwrap();
    fill(&mut session, "12345678");

    let dismissal = session.confirm(&store).unwrap();
    assert_eq!(dismissal.role, ModalRole::Confirm);
    let saved = dismissal.data.unwrap();
    assert_eq!(saved.id, 1);
    assert_eq!(saved.shape_id, shape_id);
    assert!(!session.is_annotating());
    assert!(session.layer().get(shape_id).is_some());

    let rows = store.list_all().unwrap();
    assert_eq!(rows[0].form.paternal_surname, "PEREZ");
    let stored = PolygonShape::from_wkt(rows[0].coordinates.as_deref().unwrap()).unwrap();
    assert_eq!(&stored, session.layer().get(shape_id).unwrap());
}

#[test]
fn cancel_discards_the_shape() {
    let store = PolygonStore::open_in_memory().unwrap();
    let mut session = AnnotationSession::new(DrawnItems::new());
    let shape_id = session.shape_created(rectangle()).unwrap();
    fill(&mut session, "12345678");

    let dismissal = session.cancel().unwrap();
    assert_eq!(dismissal.role, ModalRole::Cancel);
    assert!(dismissal.data.is_none());
    assert!(session.layer().get(shape_id).is_none());
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn invalid_dni_never_reaches_the_store() {
    let store = PolygonStore::open_in_memory().unwrap();
    let mut session = AnnotationSession::new(DrawnItems::new());
    session.shape_created(rectangle()).unwrap();
    fill(&mut session, "1234567");

    match session.confirm(&store) {
        Err(AnnotationError::Validation(e)) => assert!(e.has(FormField::Dni)),
        other => panic!("unexpected {:?}", other),
    }
    assert!(session.is_annotating());
    assert_eq!(store.count().unwrap(), 0);

    session.form_mut().unwrap().set_field(FormField::Dni, "12345678");
    assert!(session.confirm(&store).is_ok());
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn storage_failure_keeps_the_form() {
    let dir = assert_fs::TempDir::new().unwrap();
    let db = dir.child("my_db.sqlite3");
    let store = PolygonStore::open(db.path()).unwrap();
    rusqlite::Connection::open(db.path())
        .unwrap()
        .execute_batch("DROP TABLE poligonos")
        .unwrap();

    let mut session = AnnotationSession::new(DrawnItems::new());
    session.shape_created(rectangle()).unwrap();
    fill(&mut session, "12345678");
    assert!(matches!(
        session.confirm(&store),
        Err(AnnotationError::Storage(_))
    ));
    assert!(session.is_annotating());
    assert_eq!(session.form().unwrap().dni, "12345678");

    store.initialize().unwrap();
    assert_eq!(session.confirm(&store).unwrap().data.unwrap().id, 1);
    dir.close().unwrap();
}

#[test]
fn geojson_encoding_is_stored() {
    let store = PolygonStore::open_in_memory().unwrap();
    let mut session =
        AnnotationSession::new(DrawnItems::new()).with_encoding(GeometryEncoding::GeoJson);
    session.shape_created(rectangle()).unwrap();
    fill(&mut session, "12345678");
    session.confirm(&store).unwrap();

    let rows = store.list_all().unwrap();
    let text = rows[0].coordinates.as_deref().unwrap();
    assert!(text.starts_with('{'));
    assert_eq!(rows[0].geometry().unwrap().vertices().len(), 4);
}

#[test]
fn photos_are_saved_and_listed() {
    let dir = assert_fs::TempDir::new().unwrap();
    let store = PolygonStore::open(dir.child("my_db.sqlite3").path()).unwrap();
    let library = PhotoLibrary::new(dir.path());
    let mut camera = StaticCamera;

    let mut session = AnnotationSession::new(DrawnItems::new());
    session.shape_created(rectangle()).unwrap();
    fill(&mut session, "12345678");
    let first = take_photo(&mut camera, &library, session.form_mut().unwrap()).unwrap();
    let second = take_photo(&mut camera, &library, session.form_mut().unwrap()).unwrap();
    assert_ne!(first, second);
    session.confirm(&store).unwrap();

    dir.child("poligonos")
        .child(&first)
        .assert(predicate::path::is_file());
    let rows = store.list_all().unwrap();
    assert_eq!(rows[0].form.photos, vec![first.clone(), second]);
    assert!(library
        .data_url(&first)
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));
    dir.close().unwrap();
}
