//! # folio-shared
//!
//! Types shared between the store and the HTTP server: the image-count
//! bounds, the user-facing validation errors and the asset reference type.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Field, ValidationError, ValidationErrors};
pub use types::AssetRef;
