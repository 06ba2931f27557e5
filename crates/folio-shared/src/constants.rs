/// Application name
pub const APP_NAME: &str = "Folio";

/// Fewest images a persisted article may own
pub const MIN_IMAGES: usize = 1;

/// Most images a persisted article may own
pub const MAX_IMAGES: usize = 10;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default request body limit in bytes (1 MiB). Asset bytes never reach the
/// server, only their references.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
