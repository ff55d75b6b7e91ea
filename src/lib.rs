/// The four-move action space
pub mod action;

/// Simulation engine: episode state and the transition function
pub mod engine;

/// Environment traits and episode reports
pub mod env;

/// Error types
pub mod error;

/// Observations and their integer encoding
pub mod observation;

/// Stochastic tile behaviour
pub mod rule;

/// World-description language parser
pub mod wdl;

/// Parsed world model
pub mod world;

pub use action::Action;
pub use engine::{Engine, EngineConfig, StepInfo, Transition};
pub use error::Error;
pub use observation::{Observation, ObservationCodec};
pub use wdl::ParseError;
pub use world::{Location, Tile, WorldModel};
