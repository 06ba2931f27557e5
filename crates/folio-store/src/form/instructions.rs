//! Per-image instructions submitted with an article save.
//!
//! Clients send `image_attributes`: a map from a key (the image id for
//! existing images, any token for new uploads) to loosely typed fields.
//! [`classify`] turns each entry into an [`ImageInstruction`] or drops it with
//! a [`DiscardReason`].

use std::collections::HashSet;

use folio_shared::AssetRef;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Submitted instructions in submission order.
pub type ImageAttributes = IndexMap<String, ImageAttribute>;

/// One submitted instruction, exactly as the client sent it.
///
/// `id` and `position` accept JSON strings or numbers, `_destroy` accepts
/// `"true"`/`"false"`, `"1"`/`"0"` or a boolean.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttribute {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cl_id: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub position: Option<String>,

    #[serde(
        rename = "_destroy",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub destroy: Option<String>,
}

impl ImageAttribute {
    /// Copy every field `other` carries over this one.
    pub fn overlay(&mut self, other: ImageAttribute) {
        if other.id.is_some() {
            self.id = other.id;
        }
        if other.cl_id.is_some() {
            self.cl_id = other.cl_id;
        }
        if other.position.is_some() {
            self.position = other.position;
        }
        if other.destroy.is_some() {
            self.destroy = other.destroy;
        }
    }

    /// `Some(true)` for a removal request, `Some(false)` for an explicit keep,
    /// `None` when absent or unreadable.
    pub fn destroy_flag(&self) -> Option<bool> {
        match self.destroy.as_deref().map(str::trim) {
            Some("true") | Some("1") => Some(true),
            Some("false") | Some("0") => Some(false),
            _ => None,
        }
    }

    /// The submitted position as an integer, `None` when absent or unreadable.
    pub fn parsed_position(&self) -> Option<i64> {
        self.position.as_deref()?.trim().parse().ok()
    }

    fn trimmed_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Text(String),
        Int(i64),
        Bool(bool),
    }

    Ok(
        Option::<Lenient>::deserialize(deserializer)?.map(|value| match value {
            Lenient::Text(s) => s,
            Lenient::Int(n) => n.to_string(),
            Lenient::Bool(b) => b.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// What a sanitized instruction asks the save to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInstruction {
    /// Attach a newly uploaded asset. `None` means "after the others".
    Create {
        asset: AssetRef,
        position: Option<i64>,
    },
    /// Keep an existing image, moved to `position`.
    Update { id: Uuid, position: i64 },
    /// Remove an existing image.
    Delete { id: Uuid },
}

/// Why a submitted instruction was dropped before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// `id` is unreadable or names an image of another article.
    ForeignImageReference,
    /// Removal requested for something that was never saved.
    DestroyWithoutId,
    /// An existing image with nothing to update.
    UpdateWithoutPosition,
    /// Neither `id` nor `cl_id`.
    Empty,
}

/// Sanitize and classify one instruction against the ids `owned` by the
/// article being saved.
///
/// Precedence: removal of an owned image, then a new upload, then a move.
pub fn classify_entry(
    attribute: &ImageAttribute,
    owned: &HashSet<Uuid>,
) -> Result<ImageInstruction, DiscardReason> {
    let id = match attribute.trimmed_id() {
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) if owned.contains(&id) => Some(id),
            _ => return Err(DiscardReason::ForeignImageReference),
        },
        None => None,
    };

    if attribute.destroy_flag() == Some(true) {
        return id
            .map(|id| ImageInstruction::Delete { id })
            .ok_or(DiscardReason::DestroyWithoutId);
    }

    if let Some(cl_id) = &attribute.cl_id {
        return Ok(ImageInstruction::Create {
            asset: AssetRef::new(cl_id.clone()),
            position: attribute.parsed_position(),
        });
    }

    match (id, attribute.parsed_position()) {
        (Some(id), Some(position)) => Ok(ImageInstruction::Update { id, position }),
        (Some(_), None) => Err(DiscardReason::UpdateWithoutPosition),
        (None, _) => Err(DiscardReason::Empty),
    }
}

/// Classify every entry in submission order, logging and dropping the ones
/// that do not survive sanitization.
pub fn classify(attributes: &ImageAttributes, owned: &HashSet<Uuid>) -> Vec<ImageInstruction> {
    attributes
        .iter()
        .filter_map(|(key, attribute)| match classify_entry(attribute, owned) {
            Ok(instruction) => Some(instruction),
            Err(reason) => {
                tracing::debug!(key = %key, ?reason, "discarding image instruction");
                None
            }
        })
        .collect()
}
