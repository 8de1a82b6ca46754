pub mod broadcast;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod processor;
pub mod prompt;
pub mod provider;
pub mod secrets;
pub mod session;
pub mod slug;
pub mod storage;
pub mod worker;

pub use broadcast::{BatchEvent, BatchSummary, BatchTotals, JobProgressBroadcaster, JobStatus};
pub use config::{load_config, Config, ProviderKind};
pub use error::{AltomaticError, ConfigError, ProcessError, Result, StorageError, WorkerError};
pub use pipeline::{Pipeline, PipelineConfig};
pub use provider::{build_provider, Analysis, ProviderError, VisionProvider};
pub use secrets::{resolve_secret, SecretError};
pub use session::{BatchOrchestrator, CancelToken, ResultRow, SessionReport};
pub use slug::{slugify, SlugAllocator, SlugError};
