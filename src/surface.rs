use std::{path::Path, time::Duration};

use crate::error::ReelResult;

/// Vector formats a surface can snapshot to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorFormat {
    #[default]
    Svg,
}

impl VectorFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
        }
    }
}

/// A live drawing surface the sampler can snapshot.
///
/// The sampler holds the surface only for the length of a capture; it never creates or destroys
/// one.
pub trait Surface {
    fn reset(&mut self);

    /// Move the observed instant to `now`. Snapshots show the surface as of this instant.
    fn seek(&mut self, now: Duration);

    fn snapshot_to(&self, path: &Path, format: VectorFormat) -> ReelResult<()>;
}
