use tracing::{debug, info, warn};

use crate::command::{Button, Command};
use crate::config::BridgeConfig;
use crate::emulator::EmulatorControl;
use crate::error::{BridgeError, Result};
use crate::frame::Observation;
use crate::process::EmulatorProcess;
use crate::ram::{RamPage, RamSnapshot};
use crate::reward::{BossFight, RewardPolicy, StepInfo};

// =============================================================================
// Action Space
// =============================================================================

/// Button codes indexed by `action % 6`. Start and Select stay unreachable
/// from the discrete action space.
pub const ACTION_BUTTONS: [Button; 6] = [
    Button::Up,
    Button::Left,
    Button::Down,
    Button::Right,
    Button::A,
    Button::B,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action(u8);

impl Action {
    pub const COUNT: usize = 12;

    pub fn from_index(i: usize) -> Result<Self> {
        if i >= Self::COUNT {
            return Err(BridgeError::InvalidAction {
                index: i,
                count: Self::COUNT,
            });
        }
        Ok(Self(i as u8))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn button(self) -> Button {
        ACTION_BUTTONS[self.index() % ACTION_BUTTONS.len()]
    }

    /// Indices below 6 release, the rest press.
    pub fn is_press(self) -> bool {
        self.index() >= ACTION_BUTTONS.len()
    }

    pub fn to_command(self) -> Command {
        if self.is_press() {
            Command::Press(self.button())
        } else {
            Command::Release(self.button())
        }
    }
}

// =============================================================================
// Episode State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePhase {
    Ready,
    Running,
}

pub struct StepResult {
    /// `None` when the screen channel stayed silent or sent a short payload.
    pub observation: Option<Observation>,
    /// Unset without a reward policy, or when a RAM read failed this step.
    pub reward: Option<f64>,
    pub done: Option<bool>,
    pub info: StepInfo,
}

// =============================================================================
// FCEUX Environment
// =============================================================================

pub struct FceuxEnv {
    // Sockets drop before the process is killed.
    control: EmulatorControl,
    policy: Option<Box<dyn RewardPolicy>>,
    phase: EpisodePhase,
    save_slot: u8,
    steps: u64,
    total_reward: f64,
    last_ram: RamSnapshot,
    emulator: Option<EmulatorProcess>,
}

impl FceuxEnv {
    /// Spawns the emulator when configured to, connects, and attaches the
    /// game's reward policy.
    pub fn launch(config: &BridgeConfig) -> Result<Self> {
        config.validate()?;
        let emulator = if config.emulator.launch {
            if config.endpoint.is_local() {
                Some(EmulatorProcess::spawn(&config.emulator)?)
            } else {
                warn!(host = %config.endpoint.host, "emulator.launch ignored for a remote host");
                None
            }
        } else {
            None
        };

        let control = EmulatorControl::connect(config)?;
        let policy: Option<Box<dyn RewardPolicy>> = if config.game.has_boss_fight() {
            Some(Box::new(BossFight::new(&config.boss_fight)?))
        } else {
            None
        };

        let mut env = Self::with_control(control, config.episode.save_slot, policy)?;
        env.emulator = emulator;
        info!(env_id = config.game.env_id(), "environment ready");
        Ok(env)
    }

    pub fn with_control(
        control: EmulatorControl,
        save_slot: u8,
        mut policy: Option<Box<dyn RewardPolicy>>,
    ) -> Result<Self> {
        if let Some(p) = policy.as_mut() {
            p.attach(&control)?;
            debug!(policy = p.name(), blocks = ?p.tracked_blocks(), "reward policy attached");
        }
        Ok(Self {
            control,
            policy,
            phase: EpisodePhase::Ready,
            save_slot,
            steps: 0,
            total_reward: 0.0,
            last_ram: RamSnapshot::default(),
            emulator: None,
        })
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn total_reward(&self) -> f64 {
        self.total_reward
    }

    pub fn last_ram(&self) -> &RamSnapshot {
        &self.last_ram
    }

    pub fn observation_shape(&self) -> Vec<usize> {
        self.control.codec().output_shape()
    }

    pub fn control(&mut self) -> &mut EmulatorControl {
        &mut self.control
    }

    pub fn has_emulator_process(&self) -> bool {
        self.emulator.is_some()
    }

    pub fn reset(&mut self) -> Result<Option<Observation>> {
        let obs = self.control.load_state(self.save_slot)?;
        // Clean the pipes of anything queued before the load.
        self.control.drain();

        self.phase = EpisodePhase::Running;
        self.steps = 0;
        self.total_reward = 0.0;
        self.last_ram = RamSnapshot::default();
        if obs.is_none() {
            warn!(slot = self.save_slot, "no observation after loading state");
        }
        Ok(obs)
    }

    pub fn step(&mut self, action: Action) -> Result<StepResult> {
        if self.phase != EpisodePhase::Running {
            return Err(BridgeError::EpisodeNotRunning);
        }

        let pre = self.read_tracked_ram()?;

        self.control.send(&action.to_command())?;
        self.control.advance_frame(1)?;
        let observation = self.control.get_screen()?;

        let post = self.read_tracked_ram()?;

        let mut reward = None;
        let mut done = None;
        let mut info = StepInfo::new();
        if let (Some(policy), Some(pre), Some(post)) = (self.policy.as_mut(), pre, post) {
            match policy.evaluate(&pre, &post) {
                Some(outcome) => {
                    reward = Some(outcome.reward);
                    done = Some(outcome.done);
                    info = outcome.info;
                }
                None => warn!(policy = policy.name(), "reward policy could not read its RAM cells"),
            }
            self.last_ram = post;
        }

        self.steps += 1;
        if let Some(r) = reward {
            self.total_reward += r;
        }
        if done == Some(true) {
            info!(
                steps = self.steps,
                total_reward = self.total_reward,
                "episode finished"
            );
            self.phase = EpisodePhase::Ready;
        }

        Ok(StepResult {
            observation,
            reward,
            done,
            info,
        })
    }

    pub fn get_ram(&mut self, block_id: u8) -> Result<Option<RamPage>> {
        self.control.get_ram(block_id)
    }

    pub fn get_screen(&mut self) -> Result<Option<Observation>> {
        self.control.get_screen()
    }

    /// Reads every block the policy tracks. `Ok(None)` without a policy, or
    /// when a page went missing (already logged by the facade).
    fn read_tracked_ram(&mut self) -> Result<Option<RamSnapshot>> {
        let Some(policy) = self.policy.as_ref() else {
            return Ok(None);
        };
        let blocks = policy.tracked_blocks().to_vec();
        let mut snapshot = RamSnapshot::default();
        for block in blocks {
            match self.control.get_ram(block)? {
                Some(page) => snapshot.insert(page),
                None => {
                    warn!(block, "RAM page missing, reward unavailable this step");
                    return Ok(None);
                }
            }
        }
        Ok(Some(snapshot))
    }
}
