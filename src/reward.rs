use std::collections::BTreeMap;

use tracing::debug;

use crate::command::Command;
use crate::config::BossFightConfig;
use crate::emulator::EmulatorControl;
use crate::error::Result;
use crate::ram::{RamAddress, RamSnapshot};

/// Per-step diagnostics, e.g. post-action health values.
pub type StepInfo = BTreeMap<&'static str, i64>;

#[derive(Debug, Clone, PartialEq)]
pub struct RewardOutcome {
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Scores a step from the RAM pages read before and after it.
pub trait RewardPolicy: Send {
    fn name(&self) -> &'static str;

    /// RAM blocks to read around each step, without duplicates.
    fn tracked_blocks(&self) -> &[u8];

    /// Called once when the policy is attached to a live session.
    fn attach(&mut self, _control: &EmulatorControl) -> Result<()> {
        Ok(())
    }

    /// `None` when a required value is missing from either snapshot.
    fn evaluate(&mut self, pre: &RamSnapshot, post: &RamSnapshot) -> Option<RewardOutcome>;
}

// =============================================================================
// Boss Fight
// =============================================================================

pub struct BossFight {
    agent_health: RamAddress,
    boss_health: RamAddress,
    blocks: Vec<u8>,
    agent_damage_weight: f64,
    boss_damage_weight: f64,
    terminal_bonus: f64,
    agent_invincible: bool,
}

impl BossFight {
    pub fn new(config: &BossFightConfig) -> Result<Self> {
        let agent_health = RamAddress::resolve(config.agent_health_address)?;
        let boss_health = RamAddress::resolve(config.boss_health_address)?;
        let mut blocks = vec![agent_health.block];
        if boss_health.block != agent_health.block {
            blocks.push(boss_health.block);
        }
        Ok(Self {
            agent_health,
            boss_health,
            blocks,
            agent_damage_weight: config.agent_damage_weight,
            boss_damage_weight: config.boss_damage_weight,
            terminal_bonus: config.terminal_bonus,
            agent_invincible: config.agent_invincible,
        })
    }

    pub fn agent_health_address(&self) -> RamAddress {
        self.agent_health
    }

    pub fn boss_health_address(&self) -> RamAddress {
        self.boss_health
    }

    /// Health values are raw bytes; a misread that aliases to 0 ends the episode.
    pub fn score(&self, agent: (u8, u8), boss: (u8, u8)) -> RewardOutcome {
        let (agent_pre, agent_post) = agent;
        let (boss_pre, boss_post) = boss;
        let agent_damage = agent_pre as i32 - agent_post as i32;
        let boss_damage = boss_pre as i32 - boss_post as i32;

        let mut reward = self.boss_damage_weight * boss_damage as f64
            - self.agent_damage_weight * agent_damage as f64;
        if boss_post == 0 {
            reward += self.terminal_bonus;
        }
        if agent_post == 0 {
            reward -= self.terminal_bonus;
        }
        let done = agent_post == 0 || boss_post == 0;

        let mut info = StepInfo::new();
        info.insert("agent_health", agent_post as i64);
        info.insert("boss_health", boss_post as i64);
        RewardOutcome { reward, done, info }
    }
}

impl RewardPolicy for BossFight {
    fn name(&self) -> &'static str {
        "boss-fight"
    }

    fn tracked_blocks(&self) -> &[u8] {
        &self.blocks
    }

    fn attach(&mut self, control: &EmulatorControl) -> Result<()> {
        if self.agent_invincible {
            debug!("enabling agent invincibility");
            control.send(&Command::invincibility(true))?;
        }
        Ok(())
    }

    fn evaluate(&mut self, pre: &RamSnapshot, post: &RamSnapshot) -> Option<RewardOutcome> {
        let agent = (pre.read(self.agent_health)?, post.read(self.agent_health)?);
        let boss = (pre.read(self.boss_health)?, post.read(self.boss_health)?);
        let outcome = self.score(agent, boss);
        debug!(
            agent_pre = agent.0,
            agent_post = agent.1,
            boss_pre = boss.0,
            boss_post = boss.1,
            reward = outcome.reward,
            done = outcome.done,
            "boss fight step"
        );
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::RamPage;

    fn snapshot(cells: &[(u16, u8)]) -> RamSnapshot {
        let mut pages: BTreeMap<u8, [u8; 256]> = BTreeMap::new();
        for &(addr, value) in cells {
            let a = RamAddress::resolve(addr).unwrap();
            pages.entry(a.block).or_insert([0u8; 256])[a.offset as usize] = value;
        }
        let mut snap = RamSnapshot::default();
        for (block, bytes) in pages {
            snap.insert(RamPage::from_bytes(block, &bytes).unwrap());
        }
        snap
    }

    #[test]
    fn agent_damage_is_weighted() {
        let policy = BossFight::new(&BossFightConfig::default()).unwrap();
        let out = policy.score((100, 90), (50, 50));
        assert_eq!(out.reward, -40.0);
        assert!(!out.done);
        assert_eq!(out.info["agent_health"], 90);
        assert_eq!(out.info["boss_health"], 50);
    }

    #[test]
    fn boss_kill_adds_bonus_and_ends() {
        let policy = BossFight::new(&BossFightConfig::default()).unwrap();
        let out = policy.score((28, 28), (3, 0));
        assert_eq!(out.reward, 3.0 + 20.0);
        assert!(out.done);
    }

    #[test]
    fn agent_death_subtracts_bonus_and_ends() {
        let policy = BossFight::new(&BossFightConfig::default()).unwrap();
        let out = policy.score((2, 0), (10, 10));
        assert_eq!(out.reward, -4.0 * 2.0 - 20.0);
        assert!(out.done);
    }

    #[test]
    fn both_terminal_conditions_checked_independently() {
        let policy = BossFight::new(&BossFightConfig::default()).unwrap();
        let out = policy.score((1, 0), (1, 0));
        assert_eq!(out.reward, 1.0 - 4.0 + 20.0 - 20.0);
        assert!(out.done);
    }

    #[test]
    fn healing_counts_as_negative_damage() {
        let policy = BossFight::new(&BossFightConfig::default()).unwrap();
        let out = policy.score((10, 14), (20, 20));
        assert_eq!(out.reward, 16.0);
    }

    #[test]
    fn shared_block_is_tracked_once() {
        let policy = BossFight::new(&BossFightConfig::default()).unwrap();
        assert_eq!(policy.tracked_blocks(), &[6]);

        let split = BossFight::new(&BossFightConfig {
            boss_health_address: 0x0120,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(split.tracked_blocks(), &[6, 1]);
    }

    #[test]
    fn out_of_range_address_rejected() {
        let err = BossFight::new(&BossFightConfig {
            agent_health_address: 0x2000,
            ..Default::default()
        });
        assert!(err.is_err());
    }

    #[test]
    fn evaluate_reads_snapshots() {
        let mut policy = BossFight::new(&BossFightConfig::default()).unwrap();
        let pre = snapshot(&[(0x06C0, 28), (0x06C1, 28)]);
        let post = snapshot(&[(0x06C0, 28), (0x06C1, 26)]);
        let out = policy.evaluate(&pre, &post).unwrap();
        assert_eq!(out.reward, 2.0);
        assert!(!out.done);

        let empty = RamSnapshot::default();
        assert!(policy.evaluate(&pre, &empty).is_none());
    }
}
