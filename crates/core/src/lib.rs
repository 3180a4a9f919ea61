pub mod config;
mod error;
pub mod export;
pub mod loader;
pub mod progress;
pub mod session;
pub mod store;
pub mod time;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{ActionError, ExportError, JobError};
pub use export::{MixRequest, export_mix, save_mix};
pub use loader::{ALLOWED_EXTENSIONS, LoadOptions};
pub use progress::{ProgressBand, ProgressPolicy};
pub use session::Session;
pub use store::{Action, PlaybackState, ProcessingStatus, SourceFile, Store, Track, TrackUpdate};
pub use time::{format_time, is_partial_time, parse_time};

pub use stem_client::{AudioInfo, HttpApi, JobId, MixedAudio, SeparationApi};
pub use stem_engine::{CpalOutput, TransportEngine, VirtualOutput};
pub use stem_transport::{AudioArc, Clock, MonotonicClock, StemId};
