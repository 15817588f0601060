//! Frame file naming.
//!
//! Captured frames are addressed purely by filename: `{name}_{seq:04}.{ext}`. The sequence number
//! is zero padded so that plain lexical order of the filenames is capture order, and it is
//! recovered by parsing the filename back. There is no index file.

use std::path::{Path, PathBuf};

/// Minimum number of digits in a sequence number.
pub const SEQUENCE_WIDTH: usize = 4;

pub fn frame_file_name(name: &str, sequence: u32, ext: &str) -> String {
    format!("{name}_{sequence:0width$}.{ext}", width = SEQUENCE_WIDTH)
}

pub fn frame_path(dir: &Path, name: &str, sequence: u32, ext: &str) -> PathBuf {
    dir.join(frame_file_name(name, sequence, ext))
}

/// `abc_0001.svg` + `png` -> `abc_0001.svg.png`.
pub fn raster_file_name(vector_file_name: &str, raster_ext: &str) -> String {
    format!("{vector_file_name}.{raster_ext}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameFile<'a> {
    pub sequence: u32,
    /// Everything after the sequence number and its dot, e.g. `svg` or `svg.png`.
    pub suffix: &'a str,
}

impl FrameFile<'_> {
    pub fn last_extension(&self) -> &str {
        self.suffix.rsplit('.').next().unwrap_or(self.suffix)
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        self.last_extension().eq_ignore_ascii_case(ext)
    }
}

/// Parse `file_name` as a frame of run `name`.
///
/// Only the canonical form produced by [`frame_file_name`] is accepted, so `abc2_0001.svg` is not a
/// frame of run `abc` and `abc_01.svg` is not a frame of anything.
pub fn parse_frame_file<'a>(name: &str, file_name: &'a str) -> Option<FrameFile<'a>> {
    let rest = file_name.strip_prefix(name)?.strip_prefix('_')?;
    let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits < SEQUENCE_WIDTH {
        return None;
    }

    let (seq, tail) = rest.split_at(digits);
    let sequence: u32 = seq.parse().ok()?;
    if format!("{sequence:0width$}", width = SEQUENCE_WIDTH) != seq {
        return None;
    }

    let suffix = tail.strip_prefix('.')?;
    if suffix.is_empty() {
        return None;
    }
    Some(FrameFile { sequence, suffix })
}

pub fn parse_frame_path<'a>(name: &str, path: &'a Path) -> Option<FrameFile<'a>> {
    parse_frame_file(name, path.file_name()?.to_str()?)
}
