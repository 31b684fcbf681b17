//! Tunegrab Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod catalog;
pub mod config;
pub mod cover;
pub mod credential;
pub mod download;
pub mod fetcher;
pub mod janitor;
pub mod server;
pub mod tagger;

// Re-export commonly used types for convenience
pub use catalog::{Catalog, HttpCatalog};
pub use config::AppConfig;
pub use credential::CredentialStore;
pub use download::DownloadOrchestrator;
pub use server::{run_server, RequestsLoggingLevel};
