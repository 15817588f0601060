//! Vector frame -> raster frame conversion.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::Context as _;

use crate::{
    config::Run,
    error::{ReelError, ReelResult},
    frame_name,
    surface::VectorFormat,
};

pub const RASTER_EXTENSION: &str = "png";

pub trait RasterConverter {
    fn name(&self) -> &str;

    /// Checked once before the first conversion of a batch.
    fn ensure_available(&self) -> ReelResult<()> {
        Ok(())
    }

    /// Write a PNG rendering of the vector file `src` to `dst`.
    fn convert(&self, src: &Path, dst: &Path) -> ReelResult<()>;
}

/// In-process SVG rasterizer.
#[derive(Clone, Debug)]
pub struct ResvgConverter {
    pub scale: f32,
}

impl Default for ResvgConverter {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

impl RasterConverter for ResvgConverter {
    fn name(&self) -> &str {
        "resvg"
    }

    fn convert(&self, src: &Path, dst: &Path) -> ReelResult<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ReelError::validation("resvg scale must be finite and > 0"));
        }

        let bytes =
            std::fs::read(src).with_context(|| format!("read vector frame '{}'", src.display()))?;
        let tree = usvg::Tree::from_data(&bytes, &usvg::Options::default())
            .with_context(|| format!("parse svg '{}'", src.display()))?;

        let size = tree.size();
        let width = (size.width() * self.scale).ceil().max(1.0) as u32;
        let height = (size.height() * self.scale).ceil().max(1.0) as u32;

        let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| ReelError::converter(format!("cannot allocate {width}x{height} pixmap")))?;
        let xform = resvg::tiny_skia::Transform::from_scale(self.scale, self.scale);
        resvg::render(&tree, xform, &mut pixmap.as_mut());

        let rgba: Vec<u8> = pixmap
            .pixels()
            .iter()
            .flat_map(|px| {
                let c = px.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect();

        image::save_buffer_with_format(
            dst,
            &rgba,
            width,
            height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", dst.display()))?;
        Ok(())
    }
}

/// Runs an external program once per frame.
///
/// `{input}` and `{output}` in the argument list are replaced by the source and target paths.
#[derive(Clone, Debug)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
}

impl CommandConverter {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn rsvg_convert() -> Self {
        Self::new(
            "rsvg-convert",
            ["--format", "png", "--output", "{output}", "{input}"],
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn expand_args(&self, src: &Path, dst: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|a| match a.as_str() {
                "{input}" => src.as_os_str().to_owned(),
                "{output}" => dst.as_os_str().to_owned(),
                other => OsString::from(
                    other
                        .replace("{input}", &src.to_string_lossy())
                        .replace("{output}", &dst.to_string_lossy()),
                ),
            })
            .collect()
    }
}

impl RasterConverter for CommandConverter {
    fn name(&self) -> &str {
        &self.program
    }

    fn ensure_available(&self) -> ReelResult<()> {
        let ok = Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !ok {
            return Err(ReelError::converter(format!(
                "'{}' is required for frame conversion, but was not found on PATH",
                self.program
            )));
        }
        Ok(())
    }

    fn convert(&self, src: &Path, dst: &Path) -> ReelResult<()> {
        let output = Command::new(&self.program)
            .args(self.expand_args(src, dst))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ReelError::converter(format!("failed to spawn '{}': {e}", self.program)))?;

        if !output.status.success() {
            return Err(ReelError::converter(format!(
                "'{}' exited with status {} on '{}': {}",
                self.program,
                output.status,
                src.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if !dst.exists() {
            return Err(ReelError::converter(format!(
                "'{}' reported success but wrote no '{}'",
                self.program,
                dst.display()
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConvertReport {
    pub converted: usize,
    pub cached: usize,
}

fn part_path(dst: &Path) -> PathBuf {
    let mut s = dst.as_os_str().to_owned();
    s.push(".part");
    PathBuf::from(s)
}

/// Rasterize every vector frame of `run` that has no raster sibling yet.
///
/// A raster file is only ever moved into place once complete, so its existence is enough to
/// treat the frame as converted.
#[tracing::instrument(skip_all, fields(name = run.name(), converter = converter.name()))]
pub fn convert_frames(
    run: &Run,
    format: VectorFormat,
    converter: &dyn RasterConverter,
) -> ReelResult<ConvertReport> {
    let dir = run.temp_dir()?;
    let mut report = ConvertReport::default();
    let mut pending = Vec::new();

    for entry in std::fs::read_dir(dir).with_context(|| format!("list '{}'", dir.display()))? {
        let path = entry.with_context(|| format!("list '{}'", dir.display()))?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(frame) = frame_name::parse_frame_file(run.name(), file_name) else {
            continue;
        };
        if !frame.suffix.eq_ignore_ascii_case(format.extension()) {
            continue;
        }

        let dst = dir.join(frame_name::raster_file_name(file_name, RASTER_EXTENSION));
        if dst.exists() {
            report.cached += 1;
        } else {
            pending.push((path, dst));
        }
    }

    if pending.is_empty() {
        tracing::debug!(cached = report.cached, "nothing to convert");
        return Ok(report);
    }

    converter.ensure_available()?;
    pending.sort();

    for (src, dst) in pending {
        let part = part_path(&dst);
        if let Err(err) = converter.convert(&src, &part) {
            let _ = std::fs::remove_file(&part);
            return Err(err);
        }
        std::fs::rename(&part, &dst)
            .with_context(|| format!("move '{}' into place", dst.display()))?;
        tracing::debug!(src = %src.display(), dst = %dst.display(), "converted frame");
        report.converted += 1;
    }

    tracing::info!(
        converted = report.converted,
        cached = report.cached,
        "converted frames"
    );
    Ok(report)
}
