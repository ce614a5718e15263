use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

// =============================================================================
// Protocol Constants
// =============================================================================

pub const DEFAULT_SCREEN_MSG_LEN: usize = 245_771;
pub const SCREEN_HEADER_LEN: usize = 11;
pub const SCREEN_WIDTH: usize = 256;
pub const SCREEN_CHANNELS: usize = 4;
pub const RAM_PAGE_LEN: usize = 256;
pub const RAM_BLOCKS: u8 = 8;

// =============================================================================
// Color Modes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    #[default]
    Luminosity,
    Average,
    RgbArray,
    ArgbArray,
}

impl ColorMode {
    pub fn output_channels(self) -> usize {
        match self {
            ColorMode::Luminosity | ColorMode::Average => 1,
            ColorMode::RgbArray => 3,
            ColorMode::ArgbArray => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColorMode::Luminosity => "luminosity",
            ColorMode::Average => "average",
            ColorMode::RgbArray => "rgb_array",
            ColorMode::ArgbArray => "argb_array",
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "luminosity" => Ok(ColorMode::Luminosity),
            "average" => Ok(ColorMode::Average),
            "rgb_array" => Ok(ColorMode::RgbArray),
            "argb_array" => Ok(ColorMode::ArgbArray),
            other => Err(BridgeError::Configuration(format!(
                "unsupported color mode `{other}` (expected luminosity, average, rgb_array or argb_array)"
            ))),
        }
    }
}

// =============================================================================
// Named Environments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameKind {
    Kirby,
    Mm2,
    #[default]
    Mm2Boss,
}

impl GameKind {
    pub fn env_id(self) -> &'static str {
        match self {
            GameKind::Kirby => "NESKirby-v0",
            GameKind::Mm2 => "NESMM2-v0",
            GameKind::Mm2Boss => "NESMM2Boss-v0",
        }
    }

    pub fn has_boss_fight(self) -> bool {
        matches!(self, GameKind::Mm2Boss)
    }
}

impl FromStr for GameKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kirby" | "NESKirby-v0" => Ok(GameKind::Kirby),
            "mm2" | "NESMM2-v0" => Ok(GameKind::Mm2),
            "mm2-boss" | "NESMM2Boss-v0" => Ok(GameKind::Mm2Boss),
            other => Err(BridgeError::Configuration(format!("unknown game `{other}`"))),
        }
    }
}

// =============================================================================
// Config Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub host: String,
    pub udp_port: u16,
    pub tcp_port_screen: u16,
    pub tcp_port_ram: u16,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            udp_port: 9788,
            tcp_port_screen: 9799,
            tcp_port_ram: 9798,
        }
    }
}

impl EndpointConfig {
    pub fn is_local(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub screen_msg_len: usize,
    pub padding_length: usize,
    pub read_timeout_ms: u64,
    pub screen_chunk_size: usize,
    pub ram_chunk_size: usize,
    pub color_mode: ColorMode,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            screen_msg_len: DEFAULT_SCREEN_MSG_LEN,
            padding_length: 0,
            read_timeout_ms: 2_000,
            screen_chunk_size: 4096,
            ram_chunk_size: 128,
            color_mode: ColorMode::Luminosity,
        }
    }
}

impl ProtocolConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Spawn the emulator ourselves. Only honoured for a local host.
    pub launch: bool,
    pub binary: String,
    pub rom_path: Option<PathBuf>,
    pub lua_path: PathBuf,
    pub load_state: Option<u8>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub startup_delay_ms: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            launch: true,
            binary: "fceux".to_string(),
            rom_path: None,
            lua_path: PathBuf::from("lua/connector_screen_v2.lua"),
            load_state: Some(1),
            stdout_path: PathBuf::from("stdout_emu.txt"),
            stderr_path: PathBuf::from("stderr_emu.txt"),
            startup_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeConfig {
    pub save_slot: u8,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self { save_slot: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BossFightConfig {
    pub agent_health_address: u16,
    pub boss_health_address: u16,
    pub agent_damage_weight: f64,
    pub boss_damage_weight: f64,
    pub terminal_bonus: f64,
    pub agent_invincible: bool,
    /// Accepted for parity with the connector script; it has no command for it yet.
    pub boss_invincible: bool,
}

impl Default for BossFightConfig {
    fn default() -> Self {
        Self {
            agent_health_address: 0x06C0,
            boss_health_address: 0x06C1,
            agent_damage_weight: 4.0,
            boss_damage_weight: 1.0,
            terminal_bonus: 20.0,
            agent_invincible: true,
            boss_invincible: false,
        }
    }
}

// =============================================================================
// Top-level Config
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub game: GameKind,
    pub endpoint: EndpointConfig,
    pub protocol: ProtocolConfig,
    pub emulator: EmulatorConfig,
    pub episode: EpisodeConfig,
    pub boss_fight: BossFightConfig,
}

impl BridgeConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| BridgeError::ConfigFile {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })
    }

    /// Parses only; call [`validate`](Self::validate) once CLI overrides are applied.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| BridgeError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| BridgeError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BridgeError::Configuration(format!("failed to serialize config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.protocol;
        if p.screen_chunk_size == 0 || p.ram_chunk_size == 0 {
            return Err(BridgeError::Configuration(
                "chunk sizes must be non-zero".to_string(),
            ));
        }
        if p.read_timeout_ms == 0 {
            return Err(BridgeError::Configuration(
                "read_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.emulator.launch && self.endpoint.is_local() && self.emulator.rom_path.is_none() {
            return Err(BridgeError::Configuration(
                "emulator.launch is set but emulator.rom_path is missing".to_string(),
            ));
        }
        Ok(())
    }
}
