pub mod accumulation;
pub mod ingestion;
pub mod replay;
pub mod scheduler;

pub use accumulation::{AccumulateError, AccumulationService};
pub use ingestion::{IngestError, IngestOutcome, RecoveryIngestion};
pub use replay::Replayer;
pub use scheduler::{RetryScheduler, SweepReport};
