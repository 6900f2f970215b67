//! Session services: token lifecycle, availability, source selection, and
//! the playback session state machine.

pub mod availability;
pub mod session;
pub mod source_selector;
pub mod token_manager;

pub use availability::{AvailabilityMonitor, AvailabilityResult, StreamDiagnostics};
pub use session::{PlaybackSession, SessionDeps, SessionPolicy};
pub use source_selector::{
    LatencyProfile, SelectionError, SourceCriterion, SourceSelector, SourceSet, StreamSource,
};
pub use token_manager::{StreamToken, TokenError, TokenManager};
