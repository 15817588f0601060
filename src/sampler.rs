use std::path::PathBuf;

use crate::{
    config::Run,
    error::ReelResult,
    frame_name,
    surface::{Surface, VectorFormat},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SamplerState {
    #[default]
    Idle,
    Running,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new frame file was written.
    Captured { sequence: u32, path: PathBuf },
    /// The frame file already existed and was left alone.
    Skipped { sequence: u32, path: PathBuf },
    /// The sampler is not running; nothing happened and the tick should not be re-armed.
    Inactive,
}

impl TickOutcome {
    pub fn rearm(&self) -> bool {
        !matches!(self, Self::Inactive)
    }
}

/// Periodic capture of a surface into numbered frame files.
///
/// The sampler does not own a timer. Whoever drives it calls [`FrameSampler::tick`] once per
/// period and re-arms while the outcome asks for it.
#[derive(Clone, Debug)]
pub struct FrameSampler {
    format: VectorFormat,
    state: SamplerState,
    next_sequence: u32,
    captured: u32,
    skipped: u32,
}

impl FrameSampler {
    pub fn new(format: VectorFormat) -> Self {
        Self {
            format,
            state: SamplerState::Idle,
            next_sequence: 1,
            captured: 0,
            skipped: 0,
        }
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SamplerState::Running
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn captured(&self) -> u32 {
        self.captured
    }

    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    pub fn start(&mut self) {
        self.state = SamplerState::Running;
        self.next_sequence = 1;
        self.captured = 0;
        self.skipped = 0;
    }

    pub fn stop(&mut self, run: &Run) {
        self.state = SamplerState::Stopped;
        self.next_sequence = 1;
        tracing::info!(
            name = run.name(),
            captured = self.captured,
            skipped = self.skipped,
            "finished draw"
        );
    }

    /// Capture one frame, unless stopped or the frame file already exists.
    ///
    /// Either way a running sampler advances its sequence number.
    pub fn tick(&mut self, run: &Run, surface: &dyn Surface) -> ReelResult<TickOutcome> {
        if !self.is_running() {
            return Ok(TickOutcome::Inactive);
        }

        let sequence = self.next_sequence;
        let path = frame_name::frame_path(
            run.temp_dir()?,
            run.name(),
            sequence,
            self.format.extension(),
        );

        let outcome = if path.exists() {
            tracing::debug!(sequence, path = %path.display(), "frame exists, skipping");
            self.skipped += 1;
            TickOutcome::Skipped { sequence, path }
        } else {
            surface.snapshot_to(&path, self.format)?;
            tracing::debug!(sequence, path = %path.display(), "captured frame");
            self.captured += 1;
            TickOutcome::Captured { sequence, path }
        };

        self.next_sequence += 1;
        Ok(outcome)
    }
}
