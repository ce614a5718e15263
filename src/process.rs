use std::fs::File;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::EmulatorConfig;
use crate::error::{BridgeError, Result};

/// A running FCEUX instance. Killed and reaped on drop.
pub struct EmulatorProcess {
    child: Child,
    binary: String,
}

impl EmulatorProcess {
    /// Argument list handed to the emulator binary.
    pub fn command_args(config: &EmulatorConfig) -> Result<Vec<String>> {
        let rom = config.rom_path.as_ref().ok_or_else(|| {
            BridgeError::Configuration("emulator.rom_path is required to launch".to_string())
        })?;
        let mut args = vec![
            "--loadlua".to_string(),
            config.lua_path.to_string_lossy().into_owned(),
        ];
        if let Some(slot) = config.load_state {
            args.push("--loadstate".to_string());
            args.push(slot.to_string());
        }
        args.push(rom.to_string_lossy().into_owned());
        Ok(args)
    }

    pub fn spawn(config: &EmulatorConfig) -> Result<Self> {
        let args = Self::command_args(config)?;
        let stdout = File::create(&config.stdout_path)?;
        let stderr = File::create(&config.stderr_path)?;
        let child = Command::new(&config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                binary: config.binary.clone(),
                source,
            })?;
        info!(binary = %config.binary, pid = child.id(), ?args, "emulator started");
        // The connector script needs a moment to open its listeners.
        std::thread::sleep(Duration::from_millis(config.startup_delay_ms));
        Ok(Self {
            child,
            binary: config.binary.clone(),
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!(binary = %self.binary, error = %e, "failed to kill emulator");
        }
        let _ = self.child.wait();
        info!(binary = %self.binary, "emulator stopped");
    }
}

impl Drop for EmulatorProcess {
    fn drop(&mut self) {
        self.stop();
    }
}
