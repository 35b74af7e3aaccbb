//! Stream watch automation: page inspection, stream discovery and the
//! navigation loop, independent of any particular browser binding.

pub mod config;
pub mod controller;
pub mod error;
pub mod locator;
pub mod page;
pub mod platform;
pub mod state;
pub mod status;

pub use controller::{Controller, Session, Sleeper, StatusLog, TokioSleeper};
pub use error::{ConfigError, CycleError, PageError};
pub use locator::StreamCandidate;
pub use status::StatusSnapshot;
