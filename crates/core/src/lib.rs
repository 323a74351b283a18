pub mod coordinator;
pub mod session;
pub mod track;

#[cfg(test)]
mod testing;

pub use coordinator::Coordinator;
pub use session::{PartUpdate, PlayerSession};
pub use track::{SoundingInstance, StartMode, TrackState, UpdateFn};

pub use quartet_loader::{
    FetchError, Fetcher, FileFetcher, HttpFetcher, LoadError, SchemeFetcher, TrackLoad,
    TrackLoader,
};
pub use quartet_transport::{AudioArc, Clock, InstanceId, Output, OutputError, Part};
