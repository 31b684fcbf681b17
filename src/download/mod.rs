pub mod models;
pub mod orchestrator;

pub use models::{sanitize_filename, DownloadResult, QualityTier, SongInfo};
pub use orchestrator::{DownloadError, DownloadOrchestrator};
