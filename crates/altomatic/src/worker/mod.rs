pub mod job;
pub mod pool;
pub mod scanner;

pub use job::{AttemptOutcome, Job, JobOptions};
pub use pool::WorkerPool;
pub use scanner::{expand_input, ImageScanner};
