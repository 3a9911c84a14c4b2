//! pixiv-relay - hotlink-safe image relay for pixiv illustrations.
//!
//! This library provides functionality for:
//! - Parsing image request paths (`/<illust id>[-<page>].jpg`)
//! - Retrieving illustration metadata from the JSON API or the artwork page
//! - Deriving per-page image URLs and validating page selectors
//! - Streaming images back with long-lived cache headers, optionally keeping
//!   one copy on disk

pub mod config;
pub mod error;
pub mod page;
pub mod path;
pub mod relay;
pub mod routes;
pub mod state;
pub mod store;
pub mod upstream;

// Re-export commonly used types
pub use config::Config;
pub use error::{ConfigError, PageError, RelayError, UpstreamError};
pub use path::ImageRequest;
pub use relay::ImageRelay;
pub use routes::router;
pub use state::AppState;
pub use store::ImageStore;
pub use upstream::{IllustrationMetadata, MetadataSource};
