use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use serde_json::{Map, Value};

use crate::error::{ReelError, ReelResult};

pub const DEFAULT_TEMP_DIR: &str = "__temp_frames__";
pub const DEFAULT_INTERVAL_MS: u32 = 100;
pub const DEFAULT_REBUILD: bool = true;

fn default_temp_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TEMP_DIR)
}

fn default_interval_ms() -> u32 {
    DEFAULT_INTERVAL_MS
}

fn default_rebuild() -> bool {
    DEFAULT_REBUILD
}

/// Settings for one named capture run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunConfig {
    /// Filename prefix for every artifact of the run.
    pub name: String,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Sampling period. Also the default per-frame duration of the GIF.
    #[serde(default = "default_interval_ms", alias = "duration")]
    pub interval_ms: u32,
    /// Purge this run's earlier frames before capturing.
    #[serde(default = "default_rebuild")]
    pub rebuild: bool,
}

impl RunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            temp_dir: default_temp_dir(),
            interval_ms: DEFAULT_INTERVAL_MS,
            rebuild: DEFAULT_REBUILD,
        }
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u32) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_rebuild(mut self, rebuild: bool) -> Self {
        self.rebuild = rebuild;
        self
    }

    /// Apply tunables by name (see [`TUNABLES`]). All options are checked before any is applied.
    pub fn apply_options(&mut self, options: &Map<String, Value>) -> ReelResult<()> {
        let updates = options
            .iter()
            .map(|(key, value)| check_option(key, value))
            .collect::<ReelResult<Vec<_>>>()?;

        for update in updates {
            match update {
                Update::Interval(ms) => self.interval_ms = ms,
                Update::Rebuild(b) => self.rebuild = b,
                Update::TempDir(dir) => self.temp_dir = dir,
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> ReelResult<()> {
        validate_name(&self.name)?;
        if self.interval_ms == 0 {
            return Err(ReelError::validation("interval_ms must be > 0"));
        }
        if self.temp_dir.as_os_str().is_empty() {
            return Err(ReelError::validation("temp_dir must not be empty"));
        }
        Ok(())
    }
}

/// A run name ends up inside filenames, so it has to be a single path component.
pub fn validate_name(name: &str) -> ReelResult<()> {
    if name.is_empty() {
        return Err(ReelError::validation("run name must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(ReelError::validation(format!(
            "run name '{name}' is not a valid filename"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '\0' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
    {
        return Err(ReelError::validation(format!(
            "run name '{name}' contains '{}' which is not allowed in a filename",
            c.escape_default()
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionKind {
    Integer,
    Boolean,
    Path,
}

impl OptionKind {
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Path => "string",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Path => value.is_string(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Tunable {
    pub key: &'static str,
    pub kind: OptionKind,
}

/// Every option `Run::configure` accepts. Keys are matched after uppercasing.
pub const TUNABLES: &[Tunable] = &[
    Tunable {
        key: "DURATION",
        kind: OptionKind::Integer,
    },
    Tunable {
        key: "REBUILD",
        kind: OptionKind::Boolean,
    },
    Tunable {
        key: "TEMP_DIR",
        kind: OptionKind::Path,
    },
];

pub fn lookup_tunable(key: &str) -> Option<&'static Tunable> {
    let upper = key.to_ascii_uppercase();
    TUNABLES.iter().find(|t| t.key == upper)
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

enum Update {
    Interval(u32),
    Rebuild(bool),
    TempDir(PathBuf),
}

fn check_option(key: &str, value: &Value) -> ReelResult<Update> {
    let tunable = lookup_tunable(key).ok_or_else(|| ReelError::UnknownOption(key.to_string()))?;
    if !tunable.kind.accepts(value) {
        return Err(ReelError::TypeMismatch {
            name: tunable.key.to_string(),
            expected: tunable.kind.type_name(),
            actual: json_type_name(value),
        });
    }

    match (tunable.key, value) {
        ("DURATION", v) => {
            let ms = v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|&n| n > 0)
                .ok_or_else(|| {
                    ReelError::validation(format!("DURATION must be a positive u32, got {v}"))
                })?;
            Ok(Update::Interval(ms))
        }
        ("REBUILD", Value::Bool(b)) => Ok(Update::Rebuild(*b)),
        ("TEMP_DIR", Value::String(s)) if !s.is_empty() => Ok(Update::TempDir(PathBuf::from(s))),
        ("TEMP_DIR", _) => Err(ReelError::validation("TEMP_DIR must not be empty")),
        (key, _) => Err(ReelError::UnknownOption(key.to_string())),
    }
}

/// A validated run whose temp directory has been created.
#[derive(Clone, Debug)]
pub struct Run {
    config: RunConfig,
}

impl Run {
    pub fn new(config: RunConfig) -> ReelResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.temp_dir).with_context(|| {
            format!(
                "failed to create temp directory '{}'",
                config.temp_dir.display()
            )
        })?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn interval_ms(&self) -> u32 {
        self.config.interval_ms
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.config.interval_ms))
    }

    pub fn rebuild(&self) -> bool {
        self.config.rebuild
    }

    /// The temp directory. It is not recreated if it disappeared after construction.
    pub fn temp_dir(&self) -> ReelResult<&Path> {
        let dir = self.config.temp_dir.as_path();
        if !dir.is_dir() {
            return Err(ReelError::MissingDirectory(dir.to_path_buf()));
        }
        Ok(dir)
    }

    /// Apply tunables by name.
    ///
    /// All options are checked before any is applied; on error the run is left untouched.
    ///
    /// A new `TEMP_DIR` is not created here; use [`RunConfig::apply_options`] before
    /// [`Run::new`] when the directory may not exist yet.
    pub fn configure(&mut self, options: &Map<String, Value>) -> ReelResult<()> {
        self.config.apply_options(options)?;
        tracing::debug!(config = ?self.config, "run reconfigured");
        Ok(())
    }

    /// Read a tunable back by name, in the same representation `configure` takes.
    pub fn option(&self, key: &str) -> ReelResult<Value> {
        let tunable = lookup_tunable(key).ok_or_else(|| ReelError::UnknownOption(key.to_string()))?;
        Ok(match tunable.key {
            "DURATION" => Value::from(self.config.interval_ms),
            "REBUILD" => Value::from(self.config.rebuild),
            _ => Value::from(self.config.temp_dir.to_string_lossy().into_owned()),
        })
    }
}
