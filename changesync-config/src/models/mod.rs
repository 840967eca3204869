pub mod syncer;

pub use syncer::{ServiceConfig, SyncerConfigSource};
