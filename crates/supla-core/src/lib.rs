//! supla-core: concurrent poll, fetch and extract pipeline for SUPLA device status pages.

pub mod counter;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod pool;
pub mod sink;
pub mod types;

pub use counter::AttemptCounter;
pub use error::{BuildError, ExtractError, PollFailure};
pub use extract::{Extractor, Field, FieldMarker, MarkerBlock, MarkerLayout};
pub use fetch::Fetcher;
pub use pool::CycleRunner;
pub use sink::RecordSink;
pub use types::*;
