//! CRUD operations for [`Image`] records and the row-level image guards.
//!
//! Two layers protect the per-article image bounds. [`crate::ArticleForm`]
//! checks the whole intended image set before a bulk save and is the only
//! authority while it runs: it calls [`insert_image`] with
//! `enforce_count_limit = false` and deletes through [`delete_images`], which
//! has no per-row guard. The direct single-image methods on [`Database`]
//! (`create_image`, `update_image`, `destroy_image`) enforce the bounds
//! themselves, each inside its own transaction.

use std::collections::HashMap;

use chrono::Utc;
use folio_shared::constants::{MAX_IMAGES, MIN_IMAGES};
use folio_shared::{AssetRef, ValidationError, ValidationErrors};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::articles;
use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{timestamp_column, uuid_column, Image};

impl Database {
    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// An article's images ordered by position, ties in insertion order.
    pub fn list_images(&self, article_id: Uuid) -> Result<Vec<Image>> {
        list_images(self.conn(), article_id)
    }

    /// Fetch one image, scoped to its article. An image that exists but
    /// belongs to another article is reported as [`StoreError::NotFound`].
    pub fn get_image(&self, article_id: Uuid, image_id: Uuid) -> Result<Image> {
        get_image(self.conn(), article_id, image_id)
    }

    pub fn count_images(&self, article_id: Uuid) -> Result<usize> {
        count_images(self.conn(), article_id)
    }

    pub fn count_all_images(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Whether any stored asset reference contains `fragment`.
    pub fn asset_referenced(&self, fragment: &str) -> Result<bool> {
        let pattern = escape_like(fragment);
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM images WHERE cl_id LIKE '%' || ?1 || '%' ESCAPE '\\'
             )",
            params![pattern],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // ------------------------------------------------------------------
    // Direct single-image writes
    // ------------------------------------------------------------------

    /// Attach one new image to an article.
    ///
    /// Without an explicit position the image goes after the current last
    /// one. Fails with `TooManyImages` when the article is already full.
    pub fn create_image(
        &mut self,
        article_id: Uuid,
        cl_id: &AssetRef,
        position: Option<i64>,
    ) -> Result<Image> {
        let tx = self.conn_mut().transaction()?;
        articles::get_article(&tx, article_id)?;

        let position = match position {
            Some(p) => p,
            None => max_position(&tx, article_id)? + 1,
        };
        let image = insert_image(&tx, article_id, cl_id, position, true)?;
        tx.commit()?;

        tracing::info!(article_id = %article_id, image_id = %image.id, "image attached");
        Ok(image)
    }

    /// Replace an image's asset reference and/or move it.
    pub fn update_image(
        &mut self,
        article_id: Uuid,
        image_id: Uuid,
        cl_id: Option<&AssetRef>,
        position: Option<i64>,
    ) -> Result<Image> {
        let tx = self.conn_mut().transaction()?;
        let mut image = get_image(&tx, article_id, image_id)?;

        if let Some(cl_id) = cl_id {
            if cl_id.is_blank() {
                return Err(ValidationErrors::from(ValidationError::AssetMissing).into());
            }
            image.cl_id = cl_id.clone();
        }
        if let Some(position) = position {
            image.position = position;
        }
        image.updated_at = Utc::now();

        tx.execute(
            "UPDATE images SET cl_id = ?1, position = ?2, updated_at = ?3
             WHERE id = ?4 AND article_id = ?5",
            params![
                image.cl_id.as_str(),
                image.position,
                image.updated_at.to_rfc3339(),
                image_id.to_string(),
                article_id.to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(image)
    }

    /// Remove one image, refusing to leave the article below
    /// [`MIN_IMAGES`].
    ///
    /// The count check and the delete share a transaction; when the guard
    /// trips the transaction is rolled back and the image stays.
    pub fn destroy_image(&mut self, article_id: Uuid, image_id: Uuid) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        get_image(&tx, article_id, image_id)?;

        let remaining = count_images(&tx, article_id)?.saturating_sub(1);
        if remaining < MIN_IMAGES {
            tracing::debug!(
                article_id = %article_id,
                image_id = %image_id,
                "refusing to destroy the article's last image"
            );
            return Err(ValidationErrors::from(ValidationError::RequireImages).into());
        }

        tx.execute(
            "DELETE FROM images WHERE id = ?1 AND article_id = ?2",
            params![image_id.to_string(), article_id.to_string()],
        )?;
        tx.commit()?;

        tracing::info!(article_id = %article_id, image_id = %image_id, "image destroyed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Entity rules
// ---------------------------------------------------------------------------

/// Row-level checks for a new image about to be inserted under `article_id`.
///
/// `enforce_count_limit` is `false` when the caller has already validated the
/// article's whole image set (the bulk save path).
pub fn validate_image(
    conn: &Connection,
    article_id: Uuid,
    cl_id: &AssetRef,
    enforce_count_limit: bool,
) -> Result<ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if cl_id.is_blank() {
        errors.push(ValidationError::AssetMissing);
    }
    if enforce_count_limit && count_images(conn, article_id)? + 1 > MAX_IMAGES {
        errors.push(ValidationError::TooManyImages);
    }
    Ok(errors)
}

// ---------------------------------------------------------------------------
// Connection-level helpers (usable inside a transaction)
// ---------------------------------------------------------------------------

pub(crate) fn insert_image(
    conn: &Connection,
    article_id: Uuid,
    cl_id: &AssetRef,
    position: i64,
    enforce_count_limit: bool,
) -> Result<Image> {
    validate_image(conn, article_id, cl_id, enforce_count_limit)?.into_result()?;

    let now = Utc::now();
    let image = Image {
        id: Uuid::new_v4(),
        article_id,
        cl_id: cl_id.clone(),
        position,
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO images (id, article_id, cl_id, position, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            image.id.to_string(),
            image.article_id.to_string(),
            image.cl_id.as_str(),
            image.position,
            image.created_at.to_rfc3339(),
            image.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(image)
}

pub(crate) fn list_images(conn: &Connection, article_id: Uuid) -> Result<Vec<Image>> {
    let mut stmt = conn.prepare(
        "SELECT id, article_id, cl_id, position, created_at, updated_at
         FROM images
         WHERE article_id = ?1
         ORDER BY position ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![article_id.to_string()], row_to_image)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StoreError::Sqlite)
}

pub(crate) fn get_image(conn: &Connection, article_id: Uuid, image_id: Uuid) -> Result<Image> {
    conn.query_row(
        "SELECT id, article_id, cl_id, position, created_at, updated_at
         FROM images
         WHERE id = ?1 AND article_id = ?2",
        params![image_id.to_string(), article_id.to_string()],
        row_to_image,
    )
    .map_err(not_found)
}

pub(crate) fn count_images(conn: &Connection, article_id: Uuid) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM images WHERE article_id = ?1",
        params![article_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Stored position of every image currently owned by `article_id`.
pub(crate) fn image_positions(conn: &Connection, article_id: Uuid) -> Result<HashMap<Uuid, i64>> {
    let mut stmt = conn.prepare("SELECT id, position FROM images WHERE article_id = ?1")?;
    let rows = stmt.query_map(params![article_id.to_string()], |row| {
        let id_str: String = row.get(0)?;
        Ok((uuid_column(0, &id_str)?, row.get::<_, i64>(1)?))
    })?;
    rows.collect::<std::result::Result<HashMap<_, _>, _>>()
        .map_err(StoreError::Sqlite)
}

/// Bulk delete without the per-row minimum guard. Only images owned by
/// `article_id` are touched.
pub(crate) fn delete_images(conn: &Connection, article_id: Uuid, ids: &[Uuid]) -> Result<usize> {
    let mut stmt = conn.prepare("DELETE FROM images WHERE id = ?1 AND article_id = ?2")?;
    let mut deleted = 0;
    for id in ids {
        deleted += stmt.execute(params![id.to_string(), article_id.to_string()])?;
    }
    Ok(deleted)
}

pub(crate) fn update_position(
    conn: &Connection,
    article_id: Uuid,
    image_id: Uuid,
    position: i64,
) -> Result<()> {
    let affected = conn.execute(
        "UPDATE images SET position = ?1, updated_at = ?2 WHERE id = ?3 AND article_id = ?4",
        params![
            position,
            Utc::now().to_rfc3339(),
            image_id.to_string(),
            article_id.to_string(),
        ],
    )?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

fn max_position(conn: &Connection, article_id: Uuid) -> Result<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(position) FROM images WHERE article_id = ?1",
        params![article_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(0))
}

// `%` and `_` are wildcards in LIKE; `\` is the escape character used above.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Map a `rusqlite::Row` to an [`Image`].
fn row_to_image(row: &rusqlite::Row<'_>) -> rusqlite::Result<Image> {
    let id_str: String = row.get(0)?;
    let article_id_str: String = row.get(1)?;
    let cl_id: String = row.get(2)?;
    let position: i64 = row.get(3)?;
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;

    Ok(Image {
        id: uuid_column(0, &id_str)?,
        article_id: uuid_column(1, &article_id_str)?,
        cl_id: AssetRef::new(cl_id),
        position,
        created_at: timestamp_column(4, &created_str)?,
        updated_at: timestamp_column(5, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::test_db;
    use crate::models::Article;

    fn article_with_images(db: &Database, count: usize) -> Article {
        let article = articles::insert_article(db.conn(), "title", "body").unwrap();
        for i in 0..count {
            let asset = AssetRef::new(format!("image/upload/v1/asset{i}.jpg"));
            insert_image(db.conn(), article.id, &asset, i as i64 + 1, true).unwrap();
        }
        article
    }

    fn rejection(err: StoreError) -> ValidationErrors {
        match err {
            StoreError::Invalid(errors) => errors,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn new_image_valid_up_to_max() {
        let (db, _dir) = test_db();
        for existing in [0, 1, 9] {
            let article = article_with_images(&db, existing);
            let errors = validate_image(db.conn(), article.id, &"x.jpg".into(), true).unwrap();
            assert!(errors.is_empty(), "{existing} existing images");
        }
    }

    #[test]
    fn eleventh_image_rejected() {
        let (db, _dir) = test_db();
        let article = article_with_images(&db, 10);
        let errors = validate_image(db.conn(), article.id, &"x.jpg".into(), true).unwrap();
        assert!(errors.contains(&ValidationError::TooManyImages));
    }

    #[test]
    fn count_limit_can_be_waived() {
        let (db, _dir) = test_db();
        let article = article_with_images(&db, 10);
        let errors = validate_image(db.conn(), article.id, &"x.jpg".into(), false).unwrap();
        assert!(errors.is_empty());
    }

    #[test]
    fn blank_asset_rejected() {
        let (db, _dir) = test_db();
        let article = article_with_images(&db, 1);
        let err = insert_image(db.conn(), article.id, &" ".into(), 2, true).unwrap_err();
        assert!(rejection(err).contains(&ValidationError::AssetMissing));
        assert_eq!(db.count_images(article.id).unwrap(), 1);
    }

    #[test]
    fn create_image_appends_and_guards_max() {
        let (mut db, _dir) = test_db();
        let article = article_with_images(&db, 9);

        let tenth = db.create_image(article.id, &"ten.jpg".into(), None).unwrap();
        assert_eq!(tenth.position, 10);

        let err = db
            .create_image(article.id, &"eleven.jpg".into(), None)
            .unwrap_err();
        assert!(rejection(err).contains(&ValidationError::TooManyImages));
        assert_eq!(db.count_images(article.id).unwrap(), 10);
    }

    #[test]
    fn create_image_for_missing_article() {
        let (mut db, _dir) = test_db();
        let err = db
            .create_image(Uuid::new_v4(), &"x.jpg".into(), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn destroy_last_image_is_refused() {
        let (mut db, _dir) = test_db();
        let article = article_with_images(&db, 1);
        let image = db.list_images(article.id).unwrap().remove(0);

        let err = db.destroy_image(article.id, image.id).unwrap_err();
        assert!(rejection(err).contains(&ValidationError::RequireImages));
        assert_eq!(db.count_images(article.id).unwrap(), 1);
    }

    #[test]
    fn destroy_one_of_two() {
        let (mut db, _dir) = test_db();
        let article = article_with_images(&db, 2);
        let image = db.list_images(article.id).unwrap().remove(1);

        db.destroy_image(article.id, image.id).unwrap();
        assert_eq!(db.count_images(article.id).unwrap(), 1);
    }

    #[test]
    fn destroy_scoped_to_article() {
        let (mut db, _dir) = test_db();
        let mine = article_with_images(&db, 2);
        let other = article_with_images(&db, 2);
        let foreign = db.list_images(other.id).unwrap().remove(0);

        let err = db.destroy_image(mine.id, foreign.id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        assert_eq!(db.count_images(other.id).unwrap(), 2);
    }

    #[test]
    fn images_ordered_by_position_then_insertion() {
        let (db, _dir) = test_db();
        let article = articles::insert_article(db.conn(), "title", "body").unwrap();
        insert_image(db.conn(), article.id, &"c.jpg".into(), 3, true).unwrap();
        insert_image(db.conn(), article.id, &"a.jpg".into(), 1, true).unwrap();
        insert_image(db.conn(), article.id, &"b1.jpg".into(), 2, true).unwrap();
        insert_image(db.conn(), article.id, &"b2.jpg".into(), 2, true).unwrap();

        let refs: Vec<_> = db
            .list_images(article.id)
            .unwrap()
            .into_iter()
            .map(|i| i.cl_id.to_string())
            .collect();
        assert_eq!(refs, vec!["a.jpg", "b1.jpg", "b2.jpg", "c.jpg"]);
    }

    #[test]
    fn update_image_swaps_order() {
        let (mut db, _dir) = test_db();
        let article = article_with_images(&db, 3);
        let images = db.list_images(article.id).unwrap();

        db.update_image(article.id, images[0].id, None, Some(2)).unwrap();
        db.update_image(article.id, images[1].id, None, Some(1)).unwrap();

        let ids: Vec<_> = db.list_images(article.id).unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![images[1].id, images[0].id, images[2].id]);
    }

    #[test]
    fn update_image_rejects_blank_asset() {
        let (mut db, _dir) = test_db();
        let article = article_with_images(&db, 1);
        let image = db.list_images(article.id).unwrap().remove(0);

        let err = db
            .update_image(article.id, image.id, Some(&"".into()), None)
            .unwrap_err();
        assert!(rejection(err).contains(&ValidationError::AssetMissing));
        assert_eq!(db.get_image(article.id, image.id).unwrap().cl_id, image.cl_id);
    }

    #[test]
    fn asset_reference_lookup_is_literal() {
        let (db, _dir) = test_db();
        let article = articles::insert_article(db.conn(), "title", "body").unwrap();
        insert_image(
            db.conn(),
            article.id,
            &"image/upload/v1/abc_123.jpg#sig".into(),
            1,
            true,
        )
        .unwrap();

        assert!(db.asset_referenced("abc_123").unwrap());
        assert!(!db.asset_referenced("abcx123").unwrap());
        assert!(!db.asset_referenced("%").unwrap());
        assert!(!db.asset_referenced("zzz").unwrap());
    }
}
