//! v001 -- Initial schema creation: `articles` and `images`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Articles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS articles (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    title      TEXT NOT NULL,
    body       TEXT NOT NULL,
    created_at TEXT NOT NULL,                 -- RFC-3339
    updated_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Images
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS images (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    article_id TEXT NOT NULL,                 -- FK -> articles(id)
    cl_id      TEXT NOT NULL,                 -- asset reference at the media host
    position   INTEGER NOT NULL,              -- 1-based display order, not unique
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_images_article_position
    ON images(article_id, position);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
