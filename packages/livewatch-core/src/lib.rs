//! Livewatch Core - resilient live-playback session controller.
//!
//! This crate implements the playback controller shared by every Livewatch
//! client surface (web, mobile, Smart TV, headless). It sits in front of a
//! third-party media server and a thin admission API, and owns everything
//! between "the screen wants to play" and "the engine is rendering frames".
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`api`]: Admission API collaborator (token issuance, status probe, quality catalog)
//! - [`services`]: Token lifecycle, availability probing, source selection, and
//!   the playback session state machine
//! - [`engine`]: Playback engine capability interface
//! - [`lifecycle`]: Host foreground/background coordination
//! - [`events`]: Event system for status and failure reporting
//! - [`state`]: Configuration and session state types
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate defines several traits to decouple core logic from platform-specific
//! implementations:
//!
//! - [`AdmissionApi`](api::AdmissionApi): Talking to the admission API
//! - [`PlaybackEngine`](engine::PlaybackEngine): Attaching a player to a stream URI
//! - [`LifecycleHooks`](lifecycle::LifecycleHooks): Reacting to host visibility changes
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//!
//! Each platform supplies a thin [`PlaybackEngine`](engine::PlaybackEngine) adapter;
//! everything else is shared.

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_fixtures;

// Re-export commonly used types at the crate root
pub use api::{AdmissionApi, CredentialProvider, HttpAdmissionApi, StaticCredentials};
pub use context::ApiEndpoints;
pub use engine::{EngineError, EngineEvent, EngineEventSink, LoggingEngine, PlaybackEngine};
pub use error::{ErrorCode, LivewatchError, LivewatchResult, SessionError, SessionResult};
pub use events::{
    AvailabilityEvent, BroadcastEvent, BroadcastEventBridge, EventEmitter, FailureEvent,
    SessionEvent,
};
pub use lifecycle::{HostSignal, LifecycleCoordinator, LifecycleHooks};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{Config, PlaybackMetrics, SessionSnapshot, SessionStatus};
pub use utils::now_millis;

// Re-export service types
pub use services::availability::{AvailabilityMonitor, AvailabilityResult};
pub use services::session::{PlaybackSession, SessionDeps, SessionPolicy};
pub use services::source_selector::{
    LatencyProfile, SelectionError, SourceCriterion, SourceSelector, SourceSet, StreamSource,
};
pub use services::token_manager::{StreamToken, TokenError, TokenManager};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_session, bootstrap_session_with_api, BootstrappedSession};
