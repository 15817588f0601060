#![forbid(unsafe_code)]

pub mod assemble;
pub mod config;
pub mod convert;
pub mod error;
pub mod event_loop;
pub mod frame_name;
pub mod recorder;
pub mod routine;
pub mod sampler;
pub mod surface;
pub mod turtle;

pub use assemble::{AnimationAssembler, EncodeOptions, EncodeOutcome, FrameTiming};
pub use config::{Run, RunConfig, TUNABLES};
pub use convert::{CommandConverter, ConvertReport, RasterConverter, ResvgConverter};
pub use error::{ReelError, ReelResult};
pub use event_loop::{ClockMode, EventLoop};
pub use recorder::{CaptureOptions, CaptureReport, RecordOptions, RecordReport, Recorder};
pub use routine::{DrawRoutine, RotatingSquares, Spiral};
pub use sampler::{FrameSampler, SamplerState, TickOutcome};
pub use surface::{Surface, VectorFormat};
pub use turtle::Turtle;
