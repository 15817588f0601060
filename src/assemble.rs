use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::Context as _;
use image::{
    Delay, Frame, RgbaImage,
    codecs::gif::{GifEncoder, Repeat},
};

use crate::{
    config::Run,
    convert::{self, ConvertReport, RasterConverter},
    error::{ReelError, ReelResult},
    frame_name,
    surface::VectorFormat,
};

pub const GIF_EXTENSION: &str = "gif";

/// Raster extensions accepted as animation frames.
pub const RASTER_SOURCE_EXTENSIONS: &[&str] = &["png", "gif", "pgm", "ppm"];

/// How long each frame is shown. Frame rate and duration are alternatives, never combined.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum FrameTiming {
    /// One frame per sampling interval of the run.
    #[default]
    Interval,
    Fps(f64),
    DurationMs(u32),
}

impl FrameTiming {
    pub fn frame_duration_ms(self, interval_ms: u32) -> ReelResult<u32> {
        match self {
            Self::Interval => Ok(interval_ms),
            Self::Fps(fps) => {
                if !fps.is_finite() || fps <= 0.0 {
                    return Err(ReelError::validation(format!(
                        "fps must be finite and > 0, got {fps}"
                    )));
                }
                Ok(((1000.0 / fps) as u32).max(1))
            }
            Self::DurationMs(0) => Err(ReelError::validation("frame duration must be > 0 ms")),
            Self::DurationMs(ms) => Ok(ms),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EncodeOptions {
    /// Defaults to the run name. `.gif` is appended when missing.
    pub output_name: Option<String>,
    pub output_dir: PathBuf,
    pub timing: FrameTiming,
    /// 0 loops forever.
    pub loop_count: u16,
    /// Open the output directory in the desktop file manager afterwards.
    ///
    /// Off by default so library callers and tests never launch a file manager. The `framereel`
    /// binary turns it on unless `--no-reveal` is given.
    pub reveal: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            output_name: None,
            output_dir: PathBuf::from("."),
            timing: FrameTiming::Interval,
            loop_count: 0,
            reveal: false,
        }
    }
}

impl EncodeOptions {
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.timing = FrameTiming::Fps(fps);
        self
    }

    pub fn with_duration_ms(mut self, ms: u32) -> Self {
        self.timing = FrameTiming::DurationMs(ms);
        self
    }

    pub fn with_loop_count(mut self, loop_count: u16) -> Self {
        self.loop_count = loop_count;
        self
    }

    pub fn with_reveal(mut self, reveal: bool) -> Self {
        self.reveal = reveal;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodeOutcome {
    /// No raster frames matched; nothing was written.
    NoFrames,
    Written {
        path: PathBuf,
        frames: usize,
        frame_duration_ms: u32,
        loop_count: u16,
    },
}

pub fn output_file_name(name: &str) -> String {
    let has_ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(GIF_EXTENSION));
    if has_ext {
        name.to_string()
    } else {
        format!("{name}.{GIF_EXTENSION}")
    }
}

/// Turns the frames of one run into a GIF.
pub struct AnimationAssembler<'a> {
    run: &'a Run,
    format: VectorFormat,
}

impl<'a> AnimationAssembler<'a> {
    pub fn new(run: &'a Run) -> Self {
        Self {
            run,
            format: VectorFormat::Svg,
        }
    }

    pub fn with_format(mut self, format: VectorFormat) -> Self {
        self.format = format;
        self
    }

    pub fn convert_frames(&self, converter: &dyn RasterConverter) -> ReelResult<ConvertReport> {
        convert::convert_frames(self.run, self.format, converter)
    }

    /// Raster frames of the run in sequence order.
    pub fn raster_frames(&self) -> ReelResult<Vec<PathBuf>> {
        let dir = self.run.temp_dir()?;
        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("list '{}'", dir.display()))? {
            let path = entry.with_context(|| format!("list '{}'", dir.display()))?.path();
            let Some(frame) = frame_name::parse_frame_path(self.run.name(), &path) else {
                continue;
            };
            if RASTER_SOURCE_EXTENSIONS
                .iter()
                .any(|ext| frame.has_extension(ext))
            {
                frames.push((frame.sequence, path.clone()));
            }
        }
        frames.sort();
        Ok(frames.into_iter().map(|(_, p)| p).collect())
    }

    #[tracing::instrument(skip_all, fields(name = self.run.name()))]
    pub fn encode(&self, opts: &EncodeOptions) -> ReelResult<EncodeOutcome> {
        let frames = self.raster_frames()?;
        if frames.is_empty() {
            tracing::warn!(
                dir = %self.run.temp_dir()?.display(),
                "there is no image for '{}*' in the temp directory",
                self.run.name()
            );
            return Ok(EncodeOutcome::NoFrames);
        }

        let frame_duration_ms = opts.timing.frame_duration_ms(self.run.interval_ms())?;
        let file_name = output_file_name(opts.output_name.as_deref().unwrap_or(self.run.name()));
        if !opts.output_dir.is_dir() {
            return Err(ReelError::MissingDirectory(opts.output_dir.clone()));
        }
        let out_path = opts.output_dir.join(file_name);

        let images = load_frames(&frames)?;
        let mut part = out_path.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);

        if let Err(err) = write_gif(&part, images, frame_duration_ms, opts.loop_count) {
            let _ = std::fs::remove_file(&part);
            return Err(err);
        }
        std::fs::rename(&part, &out_path)
            .with_context(|| format!("move '{}' into place", out_path.display()))?;

        tracing::info!(
            path = %out_path.display(),
            frames = frames.len(),
            frame_duration_ms,
            loop_count = opts.loop_count,
            "wrote gif"
        );

        if opts.reveal {
            reveal_directory(&opts.output_dir);
        }

        Ok(EncodeOutcome::Written {
            path: out_path,
            frames: frames.len(),
            frame_duration_ms,
            loop_count: opts.loop_count,
        })
    }
}

fn load_frames(paths: &[PathBuf]) -> ReelResult<Vec<RgbaImage>> {
    let mut images: Vec<RgbaImage> = Vec::with_capacity(paths.len());
    for path in paths {
        let img = image::open(path)
            .with_context(|| format!("decode frame '{}'", path.display()))?
            .to_rgba8();
        if let Some(first) = images.first() {
            if img.dimensions() != first.dimensions() {
                return Err(ReelError::encode(format!(
                    "frame '{}' is {}x{}, expected {}x{} like the first frame",
                    path.display(),
                    img.width(),
                    img.height(),
                    first.width(),
                    first.height()
                )));
            }
        }
        images.push(img);
    }
    Ok(images)
}

fn write_gif(
    path: &Path,
    images: Vec<RgbaImage>,
    frame_duration_ms: u32,
    loop_count: u16,
) -> ReelResult<()> {
    let file = File::create(path).with_context(|| format!("create '{}'", path.display()))?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));

    let repeat = match loop_count {
        0 => Repeat::Infinite,
        n => Repeat::Finite(n),
    };
    encoder
        .set_repeat(repeat)
        .map_err(|e| ReelError::encode(format!("set loop count: {e}")))?;

    let delay = Delay::from_numer_denom_ms(frame_duration_ms, 1);
    for (i, img) in images.into_iter().enumerate() {
        encoder
            .encode_frame(Frame::from_parts(img, 0, 0, delay))
            .map_err(|e| ReelError::encode(format!("frame {i}: {e}")))?;
    }
    Ok(())
}

/// Best effort: a headless host simply logs a warning.
pub fn reveal_directory(dir: &Path) {
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());

    #[cfg(target_os = "macos")]
    let program = "open";
    #[cfg(target_os = "windows")]
    let program = "explorer";
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let program = "xdg-open";

    match Command::new(program)
        .arg(&dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(_) => tracing::debug!(dir = %dir.display(), "revealed output directory"),
        Err(e) => tracing::warn!(dir = %dir.display(), "could not open output directory: {e}"),
    }
}
