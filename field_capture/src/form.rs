//! Identity and crop form attached to each drawn polygon.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of photos attached to one polygon.
pub const MAX_PHOTOS: usize = 5;

static DNI_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{8}$").unwrap());

/// Returns `true` when `dni` is exactly eight ASCII digits.
pub fn is_valid_dni(dni: &str) -> bool {
    DNI_PATTERN.is_match(dni)
}

/// Form fields, named after their storage columns when displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormField {
    Dni,
    PaternalSurname,
    MaternalSurname,
    GivenNames,
    BirthDate,
    Organization,
    Participant,
    Crop,
    Photos,
}

impl FormField {
    /// Text fields in the order the form presents them.
    pub const TEXT_FIELDS: [FormField; 8] = [
        FormField::Dni,
        FormField::PaternalSurname,
        FormField::MaternalSurname,
        FormField::GivenNames,
        FormField::BirthDate,
        FormField::Organization,
        FormField::Participant,
        FormField::Crop,
    ];

    /// Name of the column backing this field.
    pub fn column(&self) -> &'static str {
        match self {
            FormField::Dni => "dni",
            FormField::PaternalSurname => "apellido_paterno",
            FormField::MaternalSurname => "apellido_materno",
            FormField::GivenNames => "nombres",
            FormField::BirthDate => "fecha_de_nacimiento",
            FormField::Organization => "organizacion",
            FormField::Participant => "participante",
            FormField::Crop => "cultivo",
            FormField::Photos => "fotos",
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Reason a single field failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    Required,
    PatternMismatch,
    InvalidDate,
    TooManyPhotos { count: usize },
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldProblem::Required => f.write_str("is required"),
            FieldProblem::PatternMismatch => f.write_str("must be exactly 8 digits"),
            FieldProblem::InvalidDate => f.write_str("must be a YYYY-MM-DD date"),
            FieldProblem::TooManyPhotos { count } => {
                write!(f, "has {} photos, at most {} allowed", count, MAX_PHOTOS)
            }
        }
    }
}

/// Every problem found while validating a form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("form validation failed: {}", describe(.problems))]
pub struct ValidationFailed {
    pub problems: Vec<(FormField, FieldProblem)>,
}

impl ValidationFailed {
    /// Returns `true` if `field` has at least one problem.
    pub fn has(&self, field: FormField) -> bool {
        self.problems.iter().any(|(f, _)| *f == field)
    }
}

fn describe(problems: &[(FormField, FieldProblem)]) -> String {
    problems
        .iter()
        .map(|(field, problem)| format!("{} {}", field, problem))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Raised when a photo is added to a form that already holds the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("photo limit of {max} reached")]
pub struct PhotoLimitReached {
    pub max: usize,
}

/// Values collected by the annotation form for one polygon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolygonForm {
    pub dni: String,
    #[serde(rename = "apellido_paterno")]
    pub paternal_surname: String,
    #[serde(rename = "apellido_materno")]
    pub maternal_surname: String,
    #[serde(rename = "nombres")]
    pub given_names: String,
    #[serde(rename = "fecha_de_nacimiento")]
    pub birth_date: String,
    #[serde(rename = "organizacion")]
    pub organization: String,
    #[serde(rename = "participante")]
    pub participant: String,
    #[serde(rename = "cultivo")]
    pub crop: String,
    /// Photo filenames inside the photo library, in capture order.
    #[serde(rename = "fotos", default)]
    pub photos: Vec<String>,
}

impl PolygonForm {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value of a text field.
    ///
    /// `FormField::Photos` is not a text field and yields an empty string.
    pub fn field(&self, field: FormField) -> &str {
        match field {
            FormField::Dni => &self.dni,
            FormField::PaternalSurname => &self.paternal_surname,
            FormField::MaternalSurname => &self.maternal_surname,
            FormField::GivenNames => &self.given_names,
            FormField::BirthDate => &self.birth_date,
            FormField::Organization => &self.organization,
            FormField::Participant => &self.participant,
            FormField::Crop => &self.crop,
            FormField::Photos => "",
        }
    }

    /// Sets a text field the way the input widgets do while typing: the DNI
    /// keeps digits only, the birth date is trimmed, everything else is
    /// upper-cased.
    pub fn set_field(&mut self, field: FormField, raw: &str) {
        let value = match field {
            FormField::Dni => raw.chars().filter(|c| c.is_ascii_digit()).collect(),
            FormField::BirthDate => raw.trim().to_string(),
            FormField::Photos => return,
            _ => raw.to_uppercase(),
        };
        let slot = match field {
            FormField::Dni => &mut self.dni,
            FormField::PaternalSurname => &mut self.paternal_surname,
            FormField::MaternalSurname => &mut self.maternal_surname,
            FormField::GivenNames => &mut self.given_names,
            FormField::BirthDate => &mut self.birth_date,
            FormField::Organization => &mut self.organization,
            FormField::Participant => &mut self.participant,
            FormField::Crop => &mut self.crop,
            FormField::Photos => return,
        };
        *slot = value;
    }

    /// Sets a text field from a complete submitted value. The DNI is only
    /// trimmed, so validation sees exactly what was submitted; other fields
    /// are normalized as in [`PolygonForm::set_field`].
    pub fn enter_field(&mut self, field: FormField, value: &str) {
        match field {
            FormField::Dni => self.dni = value.trim().to_string(),
            _ => self.set_field(field, value),
        }
    }

    /// Appends a photo filename.
    pub fn add_photo(&mut self, name: impl Into<String>) -> Result<(), PhotoLimitReached> {
        if self.photos.len() >= MAX_PHOTOS {
            return Err(PhotoLimitReached { max: MAX_PHOTOS });
        }
        self.photos.push(name.into());
        Ok(())
    }

    /// Removes the photo at `index`, returning its filename.
    pub fn remove_photo(&mut self, index: usize) -> Option<String> {
        if index < self.photos.len() {
            Some(self.photos.remove(index))
        } else {
            None
        }
    }

    /// Returns `true` when no more photos can be attached.
    pub fn photos_full(&self) -> bool {
        self.photos.len() >= MAX_PHOTOS
    }

    /// Checks required fields, the DNI pattern, the birth date and the
    /// photo count. All problems are reported together.
    pub fn validate(&self) -> Result<(), ValidationFailed> {
        let mut problems = Vec::new();
        for field in FormField::TEXT_FIELDS {
            if self.field(field).trim().is_empty() {
                problems.push((field, FieldProblem::Required));
            }
        }
        if !self.dni.is_empty() && !is_valid_dni(&self.dni) {
            problems.push((FormField::Dni, FieldProblem::PatternMismatch));
        }
        if !self.birth_date.trim().is_empty() && parse_birth_date(&self.birth_date).is_none() {
            problems.push((FormField::BirthDate, FieldProblem::InvalidDate));
        }
        if self.photos.len() > MAX_PHOTOS {
            problems.push((
                FormField::Photos,
                FieldProblem::TooManyPhotos {
                    count: self.photos.len(),
                },
            ));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ValidationFailed { problems })
        }
    }
}

/// Parses a birth date as entered by a date picker: either a plain
/// `YYYY-MM-DD` date or an ISO-8601 timestamp whose date part is used.
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> PolygonForm {
        let mut form = PolygonForm::new();
        form.set_field(FormField::Dni, "12345678");
        form.set_field(FormField::PaternalSurname, "perez");
        form.set_field(FormField::MaternalSurname, "lopez");
        form.set_field(FormField::GivenNames, "juan");
        form.set_field(FormField::BirthDate, "1990-01-01");
        form.set_field(FormField::Organization, "ong1");
        form.set_field(FormField::Participant, "si");
        form.set_field(FormField::Crop, "cafe");
        form
    }

    #[test]
    fn input_normalization() {
        let mut form = PolygonForm::new();
        form.set_field(FormField::Dni, "12.345-678x");
        assert_eq!(form.dni, "12345678");
        form.set_field(FormField::GivenNames, "josé maría");
        assert_eq!(form.given_names, "JOSÉ MARÍA");
        form.set_field(FormField::BirthDate, " 1990-01-01 ");
        assert_eq!(form.birth_date, "1990-01-01");
    }

    #[test]
    fn filled_form_is_valid() {
        let form = filled();
        assert_eq!(form.paternal_surname, "PEREZ");
        assert!(form.validate().is_ok());
    }

    #[test]
    fn empty_form_reports_every_required_field() {
        let err = PolygonForm::new().validate().unwrap_err();
        assert_eq!(err.problems.len(), FormField::TEXT_FIELDS.len());
        assert!(err
            .problems
            .iter()
            .all(|(_, problem)| *problem == FieldProblem::Required));
    }

    #[test]
    fn dni_pattern() {
        assert!(is_valid_dni("00000000"));
        assert!(!is_valid_dni("1234567"));
        assert!(!is_valid_dni("123456789"));
        assert!(!is_valid_dni("1234567a"));
        let mut form = filled();
        form.dni = "1234567".into();
        let err = form.validate().unwrap_err();
        assert_eq!(
            err.problems,
            vec![(FormField::Dni, FieldProblem::PatternMismatch)]
        );
    }

    #[test]
    fn submitted_dni_is_not_rewritten() {
        for raw in ["12a345678", "1234-5678", "12.345.678"] {
            let mut form = filled();
            form.enter_field(FormField::Dni, raw);
            assert_eq!(form.dni, raw);
            assert!(form.validate().unwrap_err().has(FormField::Dni));
        }
        let mut form = filled();
        form.enter_field(FormField::Dni, " 87654321 ");
        form.enter_field(FormField::Crop, "cacao");
        assert_eq!(form.dni, "87654321");
        assert_eq!(form.crop, "CACAO");
        assert!(form.validate().is_ok());
    }

    #[test]
    fn birth_date_formats() {
        assert_eq!(
            parse_birth_date("1990-01-01"),
            NaiveDate::from_ymd_opt(1990, 1, 1)
        );
        assert_eq!(
            parse_birth_date("1990-01-01T00:00:00"),
            NaiveDate::from_ymd_opt(1990, 1, 1)
        );
        assert_eq!(
            parse_birth_date("1990-01-01T10:30:00-05:00"),
            NaiveDate::from_ymd_opt(1990, 1, 1)
        );
        assert_eq!(parse_birth_date("01/01/1990"), None);
        let mut form = filled();
        form.birth_date = "1990-13-01".into();
        assert!(form.validate().unwrap_err().has(FormField::BirthDate));
    }

    #[test]
    fn photo_cap() {
        let mut form = filled();
        for i in 0..MAX_PHOTOS {
            form.add_photo(format!("photo_{}.jpeg", i)).unwrap();
        }
        assert!(form.photos_full());
        assert_eq!(
            form.add_photo("photo_extra.jpeg"),
            Err(PhotoLimitReached { max: MAX_PHOTOS })
        );
        assert_eq!(form.remove_photo(0).as_deref(), Some("photo_0.jpeg"));
        assert_eq!(form.remove_photo(10), None);
        assert_eq!(form.photos.len(), MAX_PHOTOS - 1);

        form.photos.push("a.jpeg".into());
        form.photos.push("b.jpeg".into());
        let err = form.validate().unwrap_err();
        assert!(err.has(FormField::Photos));
    }

    #[test]
    fn serializes_with_column_names() {
        let json = serde_json::to_value(filled()).unwrap();
        assert_eq!(json["apellido_paterno"], "PEREZ");
        assert_eq!(json["cultivo"], "CAFE");
        assert!(json["fotos"].as_array().unwrap().is_empty());
    }

    #[test]
    fn error_message_names_columns() {
        let mut form = filled();
        form.crop.clear();
        let msg = form.validate().unwrap_err().to_string();
        assert_eq!(msg, "form validation failed: cultivo is required");
    }
}
