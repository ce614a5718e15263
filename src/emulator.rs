//! Typed request/response operations over a [`TransportSession`].
//!
//! Recoverable transport failures (timeouts, wrong-length payloads) never
//! leave this layer as errors: they come back as `None`.

use tracing::{debug, warn};

use crate::command::Command;
use crate::config::{BridgeConfig, RAM_BLOCKS, RAM_PAGE_LEN};
use crate::error::{BridgeError, Result};
use crate::frame::{FrameCodec, Observation};
use crate::ram::RamPage;
use crate::transport::{Channel, SessionEndpoint, TransportOptions, TransportSession};

pub struct EmulatorControl {
    transport: TransportSession,
    codec: FrameCodec,
    last_ram_block: u8,
    frames_advanced: u64,
}

impl EmulatorControl {
    pub fn new(transport: TransportSession, codec: FrameCodec) -> Self {
        Self {
            transport,
            codec,
            last_ram_block: 0,
            frames_advanced: 0,
        }
    }

    /// Builds the codec first so a bad color mode or geometry fails before any socket opens.
    pub fn connect(config: &BridgeConfig) -> Result<Self> {
        let p = &config.protocol;
        let codec = FrameCodec::new(p.color_mode, p.screen_msg_len, p.padding_length)?;
        let transport = TransportSession::connect(
            SessionEndpoint::from(&config.endpoint),
            TransportOptions::from(p),
        )?;
        Ok(Self::new(transport, codec))
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub fn transport(&self) -> &TransportSession {
        &self.transport
    }

    /// Frames requested through [`advance_frame`](Self::advance_frame) over the session's lifetime.
    pub fn frames_advanced(&self) -> u64 {
        self.frames_advanced
    }

    pub fn send(&self, command: &Command) -> Result<()> {
        self.transport.send(command)
    }

    pub fn advance_frame(&mut self, n_frames: u32) -> Result<()> {
        self.send(&Command::Advance(n_frames))?;
        self.frames_advanced += n_frames as u64;
        Ok(())
    }

    pub fn set_flag(&self, code: char, value: u32) -> Result<()> {
        self.send(&Command::Flag { code, value })
    }

    pub fn send_fin(&self) -> Result<()> {
        self.send(&Command::Finalize)
    }

    /// Loads `slot`, runs one frame and returns the screen that follows.
    pub fn load_state(&mut self, slot: u8) -> Result<Option<Observation>> {
        self.send(&Command::LoadState(slot))?;
        self.send(&Command::RequestScreen)?;
        self.advance_frame(1)?;
        self.get_screen()
    }

    pub fn get_ram(&mut self, block_id: u8) -> Result<Option<RamPage>> {
        let block = block_id % RAM_BLOCKS;
        self.send(&Command::RequestRam(block))?;
        self.last_ram_block = block;
        absorb(self.receive_ram_response())
    }

    pub fn get_screen(&mut self) -> Result<Option<Observation>> {
        self.send(&Command::RequestScreen)?;
        absorb(self.receive_screen_response())
    }

    /// Raw screen receive; unlike [`get_screen`](Self::get_screen) a timeout
    /// is returned as `Err(Timeout)`.
    pub fn receive_screen_response(&mut self) -> Result<Option<Observation>> {
        let expected = self.codec.screen_msg_len();
        let Some(payload) = self.transport.receive(Channel::Screen, expected)? else {
            return Ok(None);
        };
        self.codec.decode(&payload).map(Some)
    }

    /// Raw RAM receive, attributed to the block most recently requested.
    pub fn receive_ram_response(&mut self) -> Result<Option<RamPage>> {
        let Some(payload) = self.transport.receive(Channel::Ram, RAM_PAGE_LEN)? else {
            return Ok(None);
        };
        let padding = self.transport.options().padding_length;
        let body = &payload[padding..payload.len() - padding];
        Ok(RamPage::from_bytes(self.last_ram_block, body))
    }

    /// Best-effort read of one queued response on each channel.
    pub fn drain(&mut self) {
        for (channel, outcome) in [
            (Channel::Screen, self.receive_screen_response().map(|o| o.is_some())),
            (Channel::Ram, self.receive_ram_response().map(|o| o.is_some())),
        ] {
            match outcome {
                Ok(true) => debug!(%channel, "drained stale response"),
                Ok(false) => debug!(%channel, "drained malformed response"),
                Err(BridgeError::Timeout(_)) => debug!(%channel, "nothing to drain"),
                Err(e) => warn!(%channel, error = %e, "drain failed"),
            }
        }
    }
}

/// Turns recoverable transport errors into "no data this tick".
fn absorb<T>(outcome: Result<Option<T>>) -> Result<Option<T>> {
    match outcome {
        Err(e) if e.is_recoverable() => {
            warn!(error = %e, "no response this tick");
            Ok(None)
        }
        other => other,
    }
}
