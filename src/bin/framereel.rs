use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use framereel::{
    AnimationAssembler, CaptureOptions, ClockMode, CommandConverter, EncodeOptions, EncodeOutcome,
    RasterConverter, RecordOptions, Recorder, ResvgConverter, RotatingSquares, Run, RunConfig,
    Spiral, Turtle,
};

#[derive(Parser, Debug)]
#[command(name = "framereel", version)]
struct Cli {
    /// Log more (-v debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a drawing routine, convert the frames and encode a GIF.
    Record(RecordArgs),
    /// Rasterize captured frames that have not been converted yet.
    Convert(ConvertArgs),
    /// Encode already rasterized frames into a GIF.
    Encode(EncodeArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Run name, used as the filename prefix of every frame.
    #[arg(long)]
    name: Option<String>,

    /// JSON run configuration: name, temp_dir, interval_ms, rebuild and an `options` object.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the intermediate frames.
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Sampling interval in milliseconds.
    #[arg(long = "interval")]
    interval_ms: Option<u32>,

    /// Keep frames from an earlier run instead of purging them.
    #[arg(long)]
    no_rebuild: bool,

    /// Set a tunable, e.g. `--set duration=200`. VALUE is parsed as JSON, falling back to a string.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output file name (defaults to the run name, `.gif` is appended when missing).
    #[arg(long)]
    out: Option<String>,

    /// Directory the GIF is written to.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Frames per second of the GIF.
    #[arg(long, conflicts_with = "duration")]
    fps: Option<f64>,

    /// Milliseconds each frame is shown.
    #[arg(long)]
    duration: Option<u32>,

    /// Number of loops, 0 loops forever.
    #[arg(long = "loop", default_value_t = 0)]
    loop_count: u16,

    /// Do not open the output directory when done.
    #[arg(long)]
    no_reveal: bool,
}

#[derive(Args, Debug)]
struct ConverterArgs {
    /// Vector to raster converter.
    #[arg(long, value_enum, default_value_t = ConverterChoice::Resvg)]
    converter: ConverterChoice,

    /// Raster scale for the resvg converter.
    #[arg(long, default_value_t = 1.0)]
    scale: f32,

    /// Program for `--converter command`.
    #[arg(long, required_if_eq("converter", "command"))]
    converter_program: Option<String>,

    /// Arguments for `--converter command`; `{input}` and `{output}` are substituted.
    #[arg(long = "converter-arg", allow_hyphen_values = true)]
    converter_args: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ConverterChoice {
    Resvg,
    RsvgConvert,
    Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoutineChoice {
    Squares,
    Spiral,
}

#[derive(Parser, Debug)]
struct RecordArgs {
    #[command(flatten)]
    run: RunArgs,

    #[command(flatten)]
    output: OutputArgs,

    #[command(flatten)]
    converter: ConverterArgs,

    /// Drawing routine to record.
    #[arg(long, value_enum, default_value_t = RoutineChoice::Squares)]
    routine: RoutineChoice,

    /// Canvas width in pixels.
    #[arg(long, default_value_t = 440)]
    width: u32,

    /// Canvas height in pixels.
    #[arg(long, default_value_t = 340)]
    height: u32,

    /// Milliseconds to wait before the routine starts drawing.
    #[arg(long, default_value_t = 0)]
    start_after: u64,

    /// Milliseconds after the routine starts at which recording stops.
    #[arg(long, default_value_t = 2500)]
    end_after: u64,

    /// Pace the capture on the wall clock instead of virtual time.
    #[arg(long)]
    realtime: bool,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    #[command(flatten)]
    run: RunArgs,

    #[command(flatten)]
    converter: ConverterArgs,
}

#[derive(Parser, Debug)]
struct EncodeArgs {
    #[command(flatten)]
    run: RunArgs,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    name: Option<String>,
    temp_dir: Option<PathBuf>,
    #[serde(alias = "duration")]
    interval_ms: Option<u32>,
    rebuild: Option<bool>,
    #[serde(default)]
    options: Map<String, Value>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Record(args) => cmd_record(args),
        Command::Convert(args) => cmd_convert(args),
        Command::Encode(args) => cmd_encode(args),
    }
}

fn init_tracing(verbose: u8) {
    let default = if verbose > 0 { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_config_file(path: &Path) -> anyhow::Result<ConfigFile> {
    let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
    let cfg = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse config '{}'", path.display()))?;
    Ok(cfg)
}

fn parse_set(pairs: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut out = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("--set expects KEY=VALUE, got '{pair}'"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        out.insert(key.to_string(), value);
    }
    Ok(out)
}

/// Flags win over the config file, which wins over defaults. Tunables from the file's `options`
/// and then `--set` are applied last, on top of both.
fn build_run(args: &RunArgs) -> anyhow::Result<Run> {
    let file = match &args.config {
        Some(path) => read_config_file(path)?,
        None => ConfigFile::default(),
    };

    let name = args
        .name
        .clone()
        .or(file.name)
        .context("a run name is required (--name or \"name\" in --config)")?;
    let mut cfg = RunConfig::new(name);
    if let Some(dir) = args.temp_dir.clone().or(file.temp_dir) {
        cfg = cfg.with_temp_dir(dir);
    }
    if let Some(ms) = args.interval_ms.or(file.interval_ms) {
        cfg = cfg.with_interval_ms(ms);
    }
    if let Some(rebuild) = file.rebuild {
        cfg = cfg.with_rebuild(rebuild);
    }
    if args.no_rebuild {
        cfg = cfg.with_rebuild(false);
    }

    // Before Run::new, so a TEMP_DIR given here is the one that gets created.
    cfg.apply_options(&file.options)?;
    cfg.apply_options(&parse_set(&args.set)?)?;
    Ok(Run::new(cfg)?)
}

fn make_converter(args: &ConverterArgs) -> anyhow::Result<Box<dyn RasterConverter>> {
    Ok(match args.converter {
        ConverterChoice::Resvg => Box::new(ResvgConverter { scale: args.scale }),
        ConverterChoice::RsvgConvert => Box::new(CommandConverter::rsvg_convert()),
        ConverterChoice::Command => {
            let program = args
                .converter_program
                .clone()
                .context("--converter command needs --converter-program")?;
            Box::new(CommandConverter::new(program, args.converter_args.clone()))
        }
    })
}

fn encode_options(args: &OutputArgs) -> EncodeOptions {
    let mut opts = EncodeOptions::default()
        .with_output_dir(args.out_dir.clone())
        .with_loop_count(args.loop_count)
        .with_reveal(!args.no_reveal);
    if let Some(name) = &args.out {
        opts = opts.with_output_name(name.clone());
    }
    if let Some(fps) = args.fps {
        opts = opts.with_fps(fps);
    }
    if let Some(ms) = args.duration {
        opts = opts.with_duration_ms(ms);
    }
    opts
}

fn report_outcome(outcome: &EncodeOutcome) {
    match outcome {
        EncodeOutcome::NoFrames => eprintln!("no frames to encode"),
        EncodeOutcome::Written { path, frames, .. } => {
            eprintln!("wrote {} ({frames} frames)", path.display())
        }
    }
}

fn cmd_record(args: RecordArgs) -> anyhow::Result<()> {
    let run = build_run(&args.run)?;
    let surface = Turtle::new(args.width, args.height);

    let recorder = Recorder::new(run, surface);
    let mut recorder = match args.routine {
        RoutineChoice::Squares => recorder.with_routine(RotatingSquares::default()),
        RoutineChoice::Spiral => recorder.with_routine(Spiral::default()),
    };
    recorder.set_converter(make_converter(&args.converter)?);

    let opts = RecordOptions {
        capture: CaptureOptions {
            start_after_ms: args.start_after,
            end_after_ms: args.end_after,
            clock: if args.realtime {
                ClockMode::Realtime
            } else {
                ClockMode::Virtual
            },
        },
        encode: encode_options(&args.output),
    };

    let report = recorder.record(None, &opts)?;
    eprintln!(
        "captured {} frames ({} kept from before), converted {}",
        report.capture.captured, report.capture.skipped, report.convert.converted
    );
    report_outcome(&report.encode);
    Ok(())
}

fn cmd_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let run = build_run(&args.run)?;
    let converter = make_converter(&args.converter)?;
    let report = AnimationAssembler::new(&run).convert_frames(converter.as_ref())?;
    eprintln!(
        "converted {} frames ({} already converted)",
        report.converted, report.cached
    );
    Ok(())
}

fn cmd_encode(args: EncodeArgs) -> anyhow::Result<()> {
    let run = build_run(&args.run)?;
    let outcome = AnimationAssembler::new(&run).encode(&encode_options(&args.output))?;
    report_outcome(&outcome);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory as _;
        Cli::command().debug_assert();
    }

    fn run_args(name: &str, set: &[&str]) -> RunArgs {
        RunArgs {
            name: Some(name.to_string()),
            config: None,
            temp_dir: None,
            interval_ms: None,
            no_rebuild: false,
            set: set.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn temp_dir_from_set_is_created_instead_of_the_default() {
        let default_existed = Path::new(framereel::config::DEFAULT_TEMP_DIR).exists();
        let tmp = tempfile::tempdir().unwrap();
        let fresh = tmp.path().join("fresh");

        let set = format!("temp_dir={}", fresh.display());
        let run = build_run(&run_args("x", &[set.as_str(), "duration=50"])).unwrap();
        assert_eq!(run.temp_dir().unwrap(), fresh.as_path());
        assert_eq!(run.interval_ms(), 50);
        if !default_existed {
            assert!(!Path::new(framereel::config::DEFAULT_TEMP_DIR).exists());
        }
    }

    #[test]
    fn temp_dir_from_config_options_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let fresh = tmp.path().join("from_options");
        let config = tmp.path().join("run.json");
        let json = serde_json::json!({ "name": "clip", "options": { "temp_dir": fresh } });
        std::fs::write(&config, json.to_string()).unwrap();

        let mut args = run_args("clip", &[]);
        args.name = None;
        args.config = Some(config);
        let run = build_run(&args).unwrap();
        assert_eq!(run.name(), "clip");
        assert!(fresh.is_dir());
    }

    #[test]
    fn bad_set_creates_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let fresh = tmp.path().join("never");
        let set = format!("temp_dir={}", fresh.display());
        assert!(build_run(&run_args("x", &[set.as_str(), "colour=red"])).is_err());
        assert!(!fresh.exists());
    }

    #[test]
    fn cli_reveals_unless_told_not_to() {
        let cli = Cli::try_parse_from(["framereel", "encode", "--name", "x"]).unwrap();
        let Command::Encode(args) = cli.cmd else {
            panic!("expected encode");
        };
        assert!(encode_options(&args.output).reveal);

        let cli = Cli::try_parse_from(["framereel", "encode", "--name", "x", "--no-reveal"]).unwrap();
        let Command::Encode(args) = cli.cmd else {
            panic!("expected encode");
        };
        assert!(!encode_options(&args.output).reveal);
    }

    #[test]
    fn set_values_parse_as_json_or_string() {
        let m = parse_set(&[
            "duration=200".to_string(),
            "rebuild=false".to_string(),
            "temp_dir=frames/x".to_string(),
        ])
        .unwrap();
        assert_eq!(m["duration"], Value::from(200));
        assert_eq!(m["rebuild"], Value::from(false));
        assert_eq!(m["temp_dir"], Value::from("frames/x"));
        assert!(parse_set(&["nope".to_string()]).is_err());
    }
}
