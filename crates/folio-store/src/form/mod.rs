//! Saving an article together with its image set.
//!
//! [`ArticleForm`] is the only way articles are created or updated. A save
//! sanitizes the submitted image instructions, validates the end state the
//! submission asks for (title, body, and an image count within
//! [`MIN_IMAGES`]..=[`MAX_IMAGES`]) and, only if everything passes, applies
//! the article fields, image removals, moves and additions inside a single
//! transaction.
//!
//! During a save the form is the sole authority on the image count: rows are
//! inserted with the row-level count check switched off and removed through
//! the unguarded bulk delete. The row-level guards in [`crate::images`] only
//! protect the direct single-image paths. Before committing, the form counts
//! the article's rows once more.
//!
//! Saving the same submission twice inserts its new images twice.

pub mod instructions;


use std::collections::{HashMap, HashSet};

use folio_shared::constants::{MAX_IMAGES, MIN_IMAGES};
use folio_shared::{AssetRef, ValidationError, ValidationErrors};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::articles;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::images;
use crate::models::{Article, Image};

pub use instructions::{
    classify, classify_entry, DiscardReason, ImageAttribute, ImageAttributes, ImageInstruction,
};

/// The save payload as submitted.
///
/// `cl_ids` is the older additions-only shape; each entry behaves like an
/// `image_attributes` entry carrying just a `cl_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleParams {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub image_attributes: Option<ImageAttributes>,
    #[serde(default)]
    pub cl_ids: Option<Vec<String>>,
}

/// Where a form is in its save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveState {
    Initialized,
    Validating,
    /// Validation failed; nothing was written.
    Rejected,
    Applying,
    Committed,
    /// A write failed part-way; the transaction was rolled back.
    RolledBack,
}

/// The article/image save coordinator.
#[derive(Debug, Clone)]
pub struct ArticleForm {
    article: Option<Article>,
    title: String,
    body: String,
    image_attributes: ImageAttributes,
    cl_ids: Vec<String>,
    /// Images of the article as last read, used to tell owned ids apart.
    owned: HashSet<Uuid>,
    errors: ValidationErrors,
    state: SaveState,
}

impl ArticleForm {
    /// Form for a new article.
    pub fn new(params: ArticleParams) -> Self {
        Self {
            article: None,
            title: params.title.unwrap_or_default(),
            body: params.body.unwrap_or_default(),
            image_attributes: params.image_attributes.unwrap_or_default(),
            cl_ids: params.cl_ids.unwrap_or_default(),
            owned: HashSet::new(),
            errors: ValidationErrors::new(),
            state: SaveState::Initialized,
        }
    }

    /// Form pre-filled from an existing article: its title and body, and one
    /// keep-instruction per current image keyed by the image id.
    pub fn edit(article: Article, images: &[Image]) -> Self {
        Self::for_update(article, images, ArticleParams::default())
    }

    /// Form for updating `article`: the [`edit`](Self::edit) defaults with
    /// the submission laid over them. Submitted image entries are merged
    /// field by field into the default entry with the same key, so
    /// `{ "<image id>": { "_destroy": "true" } }` is a complete removal
    /// request. Omitted `title`/`body` keep their stored values.
    pub fn for_update(article: Article, images: &[Image], params: ArticleParams) -> Self {
        let mut image_attributes = default_image_attributes(images);
        for (key, attribute) in params.image_attributes.unwrap_or_default() {
            image_attributes.entry(key).or_default().overlay(attribute);
        }

        Self {
            title: params.title.unwrap_or_else(|| article.title.clone()),
            body: params.body.unwrap_or_else(|| article.body.clone()),
            article: Some(article),
            image_attributes,
            cl_ids: params.cl_ids.unwrap_or_default(),
            owned: images.iter().map(|image| image.id).collect(),
            errors: ValidationErrors::new(),
            state: SaveState::Initialized,
        }
    }

    // ------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------

    /// Validate and, if valid, persist the submission atomically.
    ///
    /// Returns `Ok(true)` once committed and `Ok(false)` when the submission
    /// was rejected or rolled back; [`errors`](Self::errors) then lists every
    /// problem found. Database failures are returned as `Err` after rolling
    /// back.
    pub fn save(&mut self, db: &mut Database) -> Result<bool> {
        self.errors = ValidationErrors::new();
        self.state = SaveState::Validating;

        let tx = db.conn_mut().transaction()?;

        let article_id = self.article.as_ref().map(|a| a.id);
        let owned = match article_id {
            Some(id) => images::image_positions(&tx, id)?,
            None => HashMap::new(),
        };
        self.owned = owned.keys().copied().collect();
        let plan = SavePlan::build(self.instructions(), &owned);

        self.errors
            .extend(articles::validate_article(&self.title, &self.body));
        if plan.surviving < MIN_IMAGES {
            self.errors.push(ValidationError::RequireImages);
        }
        if plan.surviving > MAX_IMAGES {
            self.errors.push(ValidationError::TooManyImages);
        }

        if !self.errors.is_empty() {
            self.state = SaveState::Rejected;
            tracing::debug!(
                article_id = ?article_id,
                surviving = plan.surviving,
                errors = %self.errors,
                "article save rejected"
            );
            return Ok(false);
        }

        self.state = SaveState::Applying;
        match plan.apply(&tx, article_id, &self.title, &self.body) {
            Ok(article) => {
                if let Err(e) = tx.commit() {
                    self.state = SaveState::RolledBack;
                    return Err(e.into());
                }
                tracing::info!(
                    article_id = %article.id,
                    created = plan.creates.len(),
                    moved = plan.updates.len(),
                    deleted = plan.deletes.len(),
                    "article saved"
                );
                self.article = Some(article);
                self.state = SaveState::Committed;
                Ok(true)
            }
            Err(StoreError::Invalid(errors)) => {
                drop(tx);
                tracing::warn!(article_id = ?article_id, errors = %errors, "article save rolled back");
                self.errors.extend(errors);
                self.state = SaveState::RolledBack;
                Ok(false)
            }
            Err(other) => {
                drop(tx);
                self.state = SaveState::RolledBack;
                Err(other)
            }
        }
    }

    fn instructions(&self) -> Vec<ImageInstruction> {
        let mut instructions = classify(&self.image_attributes, &self.owned);
        instructions.extend(self.cl_ids.iter().map(|cl_id| ImageInstruction::Create {
            asset: AssetRef::new(cl_id.clone()),
            position: None,
        }));
        instructions
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The saved article, or the article being edited.
    pub fn article(&self) -> Option<&Article> {
        self.article.as_ref()
    }

    pub fn is_persisted(&self) -> bool {
        self.article.is_some()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// The instructions as submitted (merged with defaults when updating).
    pub fn image_attributes(&self) -> &ImageAttributes {
        &self.image_attributes
    }

    /// Asset references of newly uploaded images, in submission order. A
    /// rejected form hands these back so nothing has to be uploaded again.
    /// Entries the save would discard are left out.
    pub fn new_cl_ids(&self) -> Vec<&str> {
        self.image_attributes
            .values()
            .filter(|attribute| {
                matches!(
                    classify_entry(attribute, &self.owned),
                    Ok(ImageInstruction::Create { .. })
                )
            })
            .filter_map(|attribute| attribute.cl_id.as_deref())
            .chain(self.cl_ids.iter().map(String::as_str))
            .collect()
    }

    /// Ids of the images the submission asks to remove, as submitted.
    pub fn destroying_image_ids(&self) -> Vec<&str> {
        self.image_attributes
            .values()
            .filter(|attribute| attribute.destroy_flag() == Some(true))
            .filter_map(|attribute| attribute.id.as_deref())
            .collect()
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn state(&self) -> SaveState {
        self.state
    }
}

fn default_image_attributes(images: &[Image]) -> ImageAttributes {
    images
        .iter()
        .map(|image| {
            let key = image.id.to_string();
            let attribute = ImageAttribute {
                id: Some(key.clone()),
                cl_id: None,
                position: Some(image.position.to_string()),
                destroy: Some("false".to_string()),
            };
            (key, attribute)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Classified instructions reduced to the three write sets.
#[derive(Debug, Default, PartialEq, Eq)]
struct SavePlan {
    deletes: Vec<Uuid>,
    updates: Vec<(Uuid, i64)>,
    creates: Vec<(AssetRef, i64)>,
    /// Images the article will own after the save: every owned image not
    /// being removed, whether or not it was moved, plus the creates.
    surviving: usize,
}

impl SavePlan {
    /// Reduce `instructions` against the article's current images, given as
    /// id to stored position.
    ///
    /// A removal wins over any move of the same image; repeated moves keep
    /// the last position. New images without a position follow the highest
    /// position among everything else that survives, in submission order.
    fn build(instructions: Vec<ImageInstruction>, owned: &HashMap<Uuid, i64>) -> Self {
        let mut deletes: Vec<Uuid> = Vec::new();
        let mut moves: Vec<(Uuid, i64)> = Vec::new();
        let mut uploads: Vec<(AssetRef, Option<i64>)> = Vec::new();

        for instruction in instructions {
            match instruction {
                ImageInstruction::Delete { id } => {
                    if !deletes.contains(&id) {
                        deletes.push(id);
                    }
                }
                ImageInstruction::Update { id, position } => moves.push((id, position)),
                ImageInstruction::Create { asset, position } => uploads.push((asset, position)),
            }
        }

        let mut last_position: HashMap<Uuid, i64> = HashMap::new();
        let mut updates: Vec<(Uuid, i64)> = Vec::new();
        for (id, position) in moves {
            if deletes.contains(&id) {
                continue;
            }
            if last_position.insert(id, position).is_none() {
                updates.push((id, position));
            }
        }
        for update in &mut updates {
            update.1 = last_position[&update.0];
        }

        let retained: Vec<i64> = owned
            .iter()
            .filter(|(id, _)| !deletes.contains(id))
            .map(|(id, stored)| last_position.get(id).copied().unwrap_or(*stored))
            .collect();

        let mut next = retained
            .iter()
            .copied()
            .chain(uploads.iter().filter_map(|(_, p)| *p))
            .max()
            .unwrap_or(0);
        let creates: Vec<(AssetRef, i64)> = uploads
            .into_iter()
            .map(|(asset, position)| {
                let position = position.unwrap_or_else(|| {
                    next += 1;
                    next
                });
                (asset, position)
            })
            .collect();

        Self {
            surviving: retained.len() + creates.len(),
            deletes,
            updates,
            creates,
        }
    }

    /// Write the article and its image changes on `conn`. The caller owns
    /// the transaction.
    fn apply(
        &self,
        conn: &Connection,
        article_id: Option<Uuid>,
        title: &str,
        body: &str,
    ) -> Result<Article> {
        let article = match article_id {
            Some(id) => articles::update_article(conn, id, title, body)?,
            None => articles::insert_article(conn, title, body)?,
        };

        images::delete_images(conn, article.id, &self.deletes)?;
        for (id, position) in &self.updates {
            images::update_position(conn, article.id, *id, *position)?;
        }
        for (asset, position) in &self.creates {
            images::insert_image(conn, article.id, asset, *position, false)?;
        }

        let count = images::count_images(conn, article.id)?;
        if count < MIN_IMAGES {
            return Err(ValidationErrors::from(ValidationError::RequireImages).into());
        }
        if count > MAX_IMAGES {
            return Err(ValidationErrors::from(ValidationError::TooManyImages).into());
        }

        Ok(article)
    }
}
