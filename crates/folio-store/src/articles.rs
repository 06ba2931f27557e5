//! CRUD operations for [`Article`] records.
//!
//! Creating and updating articles goes through [`crate::ArticleForm`], which
//! calls the connection-level helpers below inside its transaction. Deleting
//! an article is direct and cascades to its images.

use chrono::Utc;
use folio_shared::{Field, ValidationError, ValidationErrors};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::images;
use crate::models::{timestamp_column, uuid_column, Article, ArticleWithImages};

impl Database {
    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single article by UUID.
    pub fn get_article(&self, id: Uuid) -> Result<Article> {
        get_article(self.conn(), id)
    }

    /// Fetch an article together with its images in display order.
    pub fn get_article_with_images(&self, id: Uuid) -> Result<ArticleWithImages> {
        let article = get_article(self.conn(), id)?;
        let images = images::list_images(self.conn(), id)?;
        Ok(ArticleWithImages { article, images })
    }

    /// List all articles with their images, newest first.
    pub fn list_articles(&self) -> Result<Vec<ArticleWithImages>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, title, body, created_at, updated_at
             FROM articles
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], row_to_article)?;

        let mut articles = Vec::new();
        for row in rows {
            let article = row?;
            let images = images::list_images(self.conn(), article.id)?;
            articles.push(ArticleWithImages { article, images });
        }
        Ok(articles)
    }

    pub fn count_articles(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete an article by UUID.  Returns `true` if a row was deleted.
    ///
    /// Images go with it through `ON DELETE CASCADE`; the per-article image
    /// minimum does not apply to removing the whole aggregate. The uploads
    /// stay at the asset host and are logged by public id.
    pub fn delete_article(&self, id: Uuid) -> Result<bool> {
        let orphaned: Vec<String> = images::list_images(self.conn(), id)?
            .iter()
            .filter_map(|image| image.cl_id.public_id().map(str::to_owned))
            .collect();

        let affected = self
            .conn()
            .execute("DELETE FROM articles WHERE id = ?1", params![id.to_string()])?;
        if affected > 0 {
            tracing::info!(article_id = %id, orphaned_assets = ?orphaned, "article deleted");
        }
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Entity rules
// ---------------------------------------------------------------------------

/// Presence rules for an article's own fields. Both fields are checked.
pub fn validate_article(title: &str, body: &str) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    if title.trim().is_empty() {
        errors.push(ValidationError::BlankField(Field::Title));
    }
    if body.trim().is_empty() {
        errors.push(ValidationError::BlankField(Field::Body));
    }
    errors
}

// ---------------------------------------------------------------------------
// Connection-level helpers (usable inside a transaction)
// ---------------------------------------------------------------------------

pub(crate) fn get_article(conn: &Connection, id: Uuid) -> Result<Article> {
    conn.query_row(
        "SELECT id, title, body, created_at, updated_at
         FROM articles
         WHERE id = ?1",
        params![id.to_string()],
        row_to_article,
    )
    .map_err(not_found)
}

pub(crate) fn insert_article(conn: &Connection, title: &str, body: &str) -> Result<Article> {
    validate_article(title, body).into_result()?;

    let now = Utc::now();
    let article = Article {
        id: Uuid::new_v4(),
        title: title.to_string(),
        body: body.to_string(),
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO articles (id, title, body, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            article.id.to_string(),
            article.title,
            article.body,
            article.created_at.to_rfc3339(),
            article.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(article)
}

pub(crate) fn update_article(
    conn: &Connection,
    id: Uuid,
    title: &str,
    body: &str,
) -> Result<Article> {
    validate_article(title, body).into_result()?;

    let affected = conn.execute(
        "UPDATE articles SET title = ?1, body = ?2, updated_at = ?3 WHERE id = ?4",
        params![title, body, Utc::now().to_rfc3339(), id.to_string()],
    )?;
    if affected == 0 {
        return Err(crate::StoreError::NotFound);
    }
    get_article(conn, id)
}

/// Map a `rusqlite::Row` to an [`Article`].
fn row_to_article(row: &rusqlite::Row<'_>) -> rusqlite::Result<Article> {
    let id_str: String = row.get(0)?;
    let title: String = row.get(1)?;
    let body: String = row.get(2)?;
    let created_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;

    Ok(Article {
        id: uuid_column(0, &id_str)?,
        title,
        body,
        created_at: timestamp_column(3, &created_str)?,
        updated_at: timestamp_column(4, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::test_db;
    use crate::StoreError;

    #[test]
    fn blank_title_and_body_both_reported() {
        let errors = validate_article(" ", "");
        assert!(errors.contains(&ValidationError::BlankField(Field::Title)));
        assert!(errors.contains(&ValidationError::BlankField(Field::Body)));
    }

    #[test]
    fn insert_rejects_blank_fields() {
        let (db, _dir) = test_db();
        let err = insert_article(db.conn(), "", "body").unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert_eq!(db.count_articles().unwrap(), 0);
    }

    #[test]
    fn insert_get_update() {
        let (db, _dir) = test_db();
        let article = insert_article(db.conn(), "title", "body").unwrap();

        let fetched = db.get_article(article.id).unwrap();
        assert_eq!(fetched.title, "title");

        let updated = update_article(db.conn(), article.id, "new title", "new body").unwrap();
        assert_eq!(updated.title, "new title");
        assert_eq!(updated.body, "new body");
        assert_eq!(updated.created_at, article.created_at);
    }

    #[test]
    fn update_missing_article() {
        let (db, _dir) = test_db();
        let err = update_article(db.conn(), Uuid::new_v4(), "t", "b").unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn get_missing_article() {
        let (db, _dir) = test_db();
        assert!(matches!(
            db.get_article(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn delete_cascades_to_images() {
        let (db, _dir) = test_db();
        let article = insert_article(db.conn(), "title", "body").unwrap();
        images::insert_image(db.conn(), article.id, &"a.jpg".into(), 1, true).unwrap();
        images::insert_image(db.conn(), article.id, &"b.jpg".into(), 2, true).unwrap();

        assert!(db.delete_article(article.id).unwrap());
        assert_eq!(db.count_all_images().unwrap(), 0);
        assert!(!db.delete_article(article.id).unwrap());
    }

    #[test]
    fn list_includes_ordered_images() {
        let (db, _dir) = test_db();
        let article = insert_article(db.conn(), "title", "body").unwrap();
        images::insert_image(db.conn(), article.id, &"second.jpg".into(), 2, true).unwrap();
        images::insert_image(db.conn(), article.id, &"first.jpg".into(), 1, true).unwrap();

        let listed = db.list_articles().unwrap();
        assert_eq!(listed.len(), 1);
        let refs: Vec<_> = listed[0].images.iter().map(|i| i.cl_id.as_str()).collect();
        assert_eq!(refs, vec!["first.jpg", "second.jpg"]);
    }
}
