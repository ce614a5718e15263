//! Frame-by-frame control of a running FCEUX emulator for reinforcement
//! learning: button input over UDP, screens and RAM pages over TCP, and a
//! reset/step episode loop with pluggable reward policies.

pub mod command;
pub mod config;
pub mod emulator;
pub mod env;
pub mod error;
pub mod frame;
pub mod process;
pub mod ram;
pub mod reward;
pub mod transport;

pub use command::{Button, Command};
pub use config::{BridgeConfig, ColorMode, GameKind};
pub use emulator::EmulatorControl;
pub use env::{Action, EpisodePhase, FceuxEnv, StepResult};
pub use error::{BridgeError, Result};
pub use frame::{FrameCodec, Observation};
pub use process::EmulatorProcess;
pub use ram::{RamAddress, RamPage, RamSnapshot};
pub use reward::{BossFight, RewardOutcome, RewardPolicy, StepInfo};
pub use transport::{Channel, SessionEndpoint, TransportOptions, TransportSession};

#[cfg(test)]
mod fake_emulator;
