//! Background-process support for disclosure document structuring and
//! comparison: the on-disk record stores, the per-identifier lock
//! registry, the progress reporter, and the retention sweeper.
//! `disclosure-core` owns the extraction/comparison algorithms; this
//! crate owns everything that makes them durable across process restarts.

pub mod comparison_store;
pub mod config;
pub mod locks;
pub mod metadata_store;
pub mod progress;
pub mod retention;

pub use comparison_store::{ComparisonDescriptor, ComparisonStore};
pub use config::Config;
pub use locks::LockRegistry;
pub use metadata_store::MetadataStore;
pub use progress::ProgressReporter;
pub use retention::{RetentionSweeper, SweepReport};
