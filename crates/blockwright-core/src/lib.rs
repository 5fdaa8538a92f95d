//! Build executor, drift monitor, material gate and agent session for
//! Blockwright.
//!
//! # Modules
//!
//! - [`executor`] -- [`BuildExecutor`], the resumable build state machine.
//! - [`session`] -- [`AgentSession`] actor and its [`AgentHandle`].
//! - [`command`] -- [`Command`] values and the [`CommandDecoder`] seam.
//! - [`capabilities`] -- [`WorldActions`], the world the executor drives.
//! - [`sim`] -- [`SimulatedWorld`] for dry runs and tests.
//! - [`drift`] -- Distance bands between the agent and the build.
//! - [`gate`] -- Material availability reports.
//! - [`events`] -- [`EventBus`] for outbound build events.
//! - [`config`] -- Configuration loading from `blockwright-config.yaml`.
//! - [`error`] -- [`BuildError`], [`ActionError`], [`DecodeError`].

pub mod capabilities;
pub mod command;
pub mod config;
pub mod drift;
pub mod error;
pub mod events;
pub mod executor;
pub mod gate;
pub mod session;
pub mod sim;

pub use capabilities::WorldActions;
pub use command::{Command, CommandDecoder};
pub use config::{BlockwrightConfig, ConfigError, LogFormat, StoreBackend};
pub use drift::{DriftClass, DriftReading, DriftThresholds};
pub use error::{ActionError, BuildError, DecodeError};
pub use events::EventBus;
pub use executor::{BuildExecutor, ExecutorSettings, FailurePolicy, StartRequest, StepOutcome};
pub use gate::{GateReport, MaterialLine};
pub use session::{AgentHandle, AgentSession, Reply};
pub use sim::SimulatedWorld;
