//! # folio-store
//!
//! SQLite storage for Folio articles and their images.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for both entities,
//! plus the [`ArticleForm`] coordinator that saves an article together with
//! its image set as one transaction.

pub mod articles;
pub mod database;
pub mod form;
pub mod images;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use form::{ArticleForm, ArticleParams, ImageAttribute, ImageAttributes, SaveState};
pub use models::*;
