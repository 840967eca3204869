//! Configuration for processes embedding the changeset syncer.
//!
//! Loads a [`ServiceConfig`] from the environment, an explicit file or one of
//! the default locations, and sets up `tracing` the same way for every
//! binary.

pub mod logging;
pub mod models;

pub use logging::{DEFAULT_LOG_FILTER, init_tracing};
pub use models::syncer::{ServiceConfig, SyncerConfigSource, load_dotenv};
