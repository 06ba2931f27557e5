use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{MAX_IMAGES, MIN_IMAGES};

/// Article fields that carry a presence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Body,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Body => "body",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Title => write!(f, "Title"),
            Field::Body => write!(f, "Body"),
        }
    }
}

/// A user-facing reason an article or image could not be saved.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationError {
    #[error("{0} can't be blank")]
    BlankField(Field),

    #[error("An article needs at least {} image", MIN_IMAGES)]
    RequireImages,

    #[error("An article can have at most {} images", MAX_IMAGES)]
    TooManyImages,

    #[error("Please upload an image")]
    AssetMissing,
}

impl ValidationError {
    /// Stable machine-readable identifier, used in JSON responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::BlankField(_) => "blank_field",
            ValidationError::RequireImages => "require_images",
            ValidationError::TooManyImages => "too_many_images",
            ValidationError::AssetMissing => "asset_missing",
        }
    }

    pub fn field(&self) -> Option<Field> {
        match self {
            ValidationError::BlankField(field) => Some(*field),
            _ => None,
        }
    }
}

/// An ordered collection of [`ValidationError`]s reported together.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("{}", join_messages(.0))]
pub struct ValidationErrors(Vec<ValidationError>);

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error unless an identical one is already present.
    pub fn push(&mut self, error: ValidationError) {
        if !self.0.contains(&error) {
            self.0.push(error);
        }
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = ValidationError>) {
        for error in other {
            self.push(error);
        }
    }

    pub fn contains(&self, error: &ValidationError) -> bool {
        self.0.contains(error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[ValidationError] {
        &self.0
    }

    /// `Ok(())` when nothing was collected, otherwise the collection itself.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

impl FromIterator<ValidationError> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = ValidationError>>(iter: I) -> Self {
        let mut errors = Self::new();
        errors.extend(iter);
        errors
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
