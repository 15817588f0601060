//! Recording lifecycle: purge, capture on a timer while the routine draws, stop, convert, encode.

use std::time::Duration;

use anyhow::Context as _;
use serde_json::{Map, Value};

use crate::{
    assemble::{AnimationAssembler, EncodeOptions, EncodeOutcome},
    config::Run,
    convert::{ConvertReport, RasterConverter, ResvgConverter},
    error::{ReelError, ReelResult},
    event_loop::{ClockMode, EventLoop},
    frame_name,
    routine::DrawRoutine,
    sampler::FrameSampler,
    surface::{Surface, VectorFormat},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// Delay before the routine is invoked. Frames keep being captured meanwhile.
    pub start_after_ms: u64,
    /// How long after the routine is invoked the sampler stops.
    pub end_after_ms: u64,
    pub clock: ClockMode,
}

#[derive(Clone, Debug, Default)]
pub struct RecordOptions {
    pub capture: CaptureOptions,
    pub encode: EncodeOptions,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub purged: usize,
    pub captured: u32,
    pub skipped: u32,
    /// Loop time when the last event was handled.
    pub elapsed: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordReport {
    pub capture: CaptureReport,
    pub convert: ConvertReport,
    pub encode: EncodeOutcome,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RecordEvent {
    Capture,
    Draw,
    Stop,
    FinishStop,
}

pub struct Recorder<S> {
    run: Run,
    surface: S,
    routine: Option<Box<dyn DrawRoutine<S>>>,
    converter: Box<dyn RasterConverter>,
    format: VectorFormat,
}

impl<S: Surface> Recorder<S> {
    pub fn new(run: Run, surface: S) -> Self {
        Self {
            run,
            surface,
            routine: None,
            converter: Box::new(ResvgConverter::default()),
            format: VectorFormat::Svg,
        }
    }

    pub fn with_routine(mut self, routine: impl DrawRoutine<S> + 'static) -> Self {
        self.routine = Some(Box::new(routine));
        self
    }

    pub fn with_converter(mut self, converter: impl RasterConverter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    pub fn set_converter(&mut self, converter: Box<dyn RasterConverter>) {
        self.converter = converter;
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn configure(&mut self, options: &Map<String, Value>) -> ReelResult<()> {
        self.run.configure(options)
    }

    /// Delete every frame file of this run (`{name}_{seq:04}.*`, `0000` included), vector or
    /// raster. Other runs' files stay.
    pub fn purge(&self) -> ReelResult<usize> {
        purge_frames(&self.run)
    }

    /// Record frames until the stop timer fires.
    ///
    /// `routine`, when given, replaces the configured one.
    #[tracing::instrument(skip_all, fields(name = self.run.name()))]
    pub fn capture(
        &mut self,
        routine: Option<Box<dyn DrawRoutine<S>>>,
        opts: &CaptureOptions,
    ) -> ReelResult<CaptureReport> {
        if let Some(routine) = routine {
            self.routine = Some(routine);
        }
        let Some(routine) = self.routine.as_mut() else {
            return Err(ReelError::MissingDrawRoutine);
        };
        self.run.temp_dir()?;

        self.surface.reset();
        let purged = if self.run.rebuild() {
            purge_frames(&self.run)?
        } else {
            0
        };

        let interval = self.run.interval();
        let end_after = Duration::from_millis(opts.end_after_ms);
        let run = &self.run;
        let surface = &mut self.surface;
        let mut sampler = FrameSampler::new(self.format);
        let mut lp = EventLoop::new(opts.clock);

        sampler.start();
        tracing::info!(
            interval_ms = run.interval_ms(),
            start_after_ms = opts.start_after_ms,
            end_after_ms = opts.end_after_ms,
            "start recording"
        );
        lp.defer(RecordEvent::Capture);
        lp.schedule(
            Duration::from_millis(opts.start_after_ms),
            RecordEvent::Draw,
        );

        lp.run(|lp, event| {
            match event {
                RecordEvent::Capture => {
                    surface.seek(lp.now());
                    if sampler.tick(run, &*surface)?.rearm() {
                        lp.schedule(interval, RecordEvent::Capture);
                    }
                }
                RecordEvent::Draw => {
                    surface.seek(lp.now());
                    routine.draw(surface);
                    lp.schedule(end_after, RecordEvent::Stop);
                }
                // Ticks already due at this instant still capture before the stop lands.
                RecordEvent::Stop => lp.defer(RecordEvent::FinishStop),
                RecordEvent::FinishStop => sampler.stop(run),
            }
            Ok(())
        })?;

        Ok(CaptureReport {
            purged,
            captured: sampler.captured(),
            skipped: sampler.skipped(),
            elapsed: lp.now(),
        })
    }

    /// Capture, convert and encode in one go.
    pub fn record(
        &mut self,
        routine: Option<Box<dyn DrawRoutine<S>>>,
        opts: &RecordOptions,
    ) -> ReelResult<RecordReport> {
        let capture = self.capture(routine, &opts.capture)?;

        let assembler = AnimationAssembler::new(&self.run).with_format(self.format);
        tracing::info!("convert frames...");
        let convert = assembler.convert_frames(self.converter.as_ref())?;
        tracing::info!("encode gif...");
        let encode = assembler.encode(&opts.encode)?;
        tracing::info!(name = self.run.name(), "done");

        Ok(RecordReport {
            capture,
            convert,
            encode,
        })
    }
}

pub fn purge_frames(run: &Run) -> ReelResult<usize> {
    let dir = run.temp_dir()?;
    let mut removed = 0;
    for entry in std::fs::read_dir(dir).with_context(|| format!("list '{}'", dir.display()))? {
        let path = entry.with_context(|| format!("list '{}'", dir.display()))?.path();
        if frame_name::parse_frame_path(run.name(), &path).is_none() || !path.is_file() {
            continue;
        }
        std::fs::remove_file(&path).with_context(|| format!("remove '{}'", path.display()))?;
        removed += 1;
    }
    tracing::debug!(removed, "purged previous frames");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{config::RunConfig, turtle::Turtle};

    fn recorder(dir: &Path, name: &str, interval_ms: u32, rebuild: bool) -> Recorder<Turtle> {
        let run = Run::new(
            RunConfig::new(name)
                .with_temp_dir(dir)
                .with_interval_ms(interval_ms)
                .with_rebuild(rebuild),
        )
        .unwrap();
        Recorder::new(run, Turtle::new(120, 120))
    }

    fn square(t: &mut Turtle) {
        t.speed(1.0);
        for _ in 0..4 {
            t.forward(50.0);
            t.right(90.0);
        }
    }

    fn frames_of(dir: &Path, name: &str, ext: &str) -> Vec<u32> {
        let mut seqs: Vec<u32> = std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| {
                let p = e.unwrap().path();
                let f = frame_name::parse_frame_path(name, &p)?;
                (f.suffix == ext).then_some(f.sequence)
            })
            .collect();
        seqs.sort();
        seqs
    }

    fn capture_count(interval_ms: u32, start_after_ms: u64, end_after_ms: u64) -> u32 {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = recorder(tmp.path(), "b", interval_ms, true).with_routine(square);
        let report = rec
            .capture(
                None,
                &CaptureOptions {
                    start_after_ms,
                    end_after_ms,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(frames_of(tmp.path(), "b", "svg").len() as u32, report.captured);
        report.captured
    }

    #[test]
    fn frame_count_is_floor_plus_one() {
        for (interval, end) in [(200, 2500), (200, 2400), (100, 0), (100, 99), (300, 300), (7, 1000)] {
            assert_eq!(
                capture_count(interval, 0, end),
                (end / u64::from(interval)) as u32 + 1,
                "interval {interval} end_after {end}"
            );
        }
    }

    #[test]
    fn start_after_extends_the_recording() {
        assert_eq!(capture_count(100, 300, 500), 9);
    }

    #[test]
    fn first_frame_is_taken_before_drawing_starts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = recorder(tmp.path(), "sq", 100, true).with_routine(square);
        rec.capture(
            None,
            &CaptureOptions {
                end_after_ms: 2000,
                ..Default::default()
            },
        )
        .unwrap();

        let first = std::fs::read_to_string(tmp.path().join("sq_0001.svg")).unwrap();
        let mid = std::fs::read_to_string(tmp.path().join("sq_0003.svg")).unwrap();
        let last = std::fs::read_to_string(tmp.path().join("sq_0021.svg")).unwrap();
        assert!(!first.contains("<line"));
        assert_eq!(mid.matches("<line").count(), 1);
        assert_eq!(last.matches("<line").count(), 4);
    }

    #[test]
    fn missing_routine_fails_before_touching_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("r_0001.svg"), "old").unwrap();
        let mut rec = recorder(tmp.path(), "r", 100, true);

        let err = rec.capture(None, &CaptureOptions::default()).unwrap_err();
        assert!(matches!(err, ReelError::MissingDrawRoutine));
        assert!(tmp.path().join("r_0001.svg").exists());
    }

    #[test]
    fn supplied_routine_replaces_configured_one() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = recorder(tmp.path(), "r", 100, true).with_routine(|_: &mut Turtle| {});
        rec.capture(
            Some(Box::new(|t: &mut Turtle| {
                t.speed(0.0);
                t.forward(10.0);
            })),
            &CaptureOptions::default(),
        )
        .unwrap();
        assert_eq!(rec.surface().stroke_count(), 1);
    }

    #[test]
    fn rebuild_purges_only_this_run() {
        let tmp = tempfile::tempdir().unwrap();
        for f in [
            "r_0001.svg",
            "r_0001.svg.png",
            "r_0042.svg",
            "r_0000.svg",
            "r2_0001.svg",
            "xr_0001.svg",
            "r_notes.txt",
        ] {
            std::fs::write(tmp.path().join(f), "old").unwrap();
        }

        let rec = recorder(tmp.path(), "r", 100, true);
        assert_eq!(rec.purge().unwrap(), 4);
        for kept in ["r2_0001.svg", "xr_0001.svg", "r_notes.txt"] {
            assert!(tmp.path().join(kept).exists(), "{kept}");
        }
        assert!(!tmp.path().join("r_0042.svg").exists());
        assert!(!tmp.path().join("r_0000.svg").exists());
    }

    #[test]
    fn resume_without_rebuild_keeps_existing_frames() {
        let tmp = tempfile::tempdir().unwrap();
        for seq in 1..=5 {
            std::fs::write(tmp.path().join(frame_name::frame_file_name("r", seq, "svg")), "old")
                .unwrap();
        }

        let mut rec = recorder(tmp.path(), "r", 100, false).with_routine(square);
        let report = rec
            .capture(
                None,
                &CaptureOptions {
                    end_after_ms: 700,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(report.skipped, 5);
        assert_eq!(report.captured, 3);
        assert_eq!(report.purged, 0);
        assert_eq!(frames_of(tmp.path(), "r", "svg"), (1..=8).collect::<Vec<_>>());
        for seq in 1..=5 {
            let p = tmp.path().join(frame_name::frame_file_name("r", seq, "svg"));
            assert_eq!(std::fs::read_to_string(p).unwrap(), "old");
        }
    }

    #[test]
    fn snapshot_failure_aborts_the_recording() {
        struct Broken;

        impl Surface for Broken {
            fn reset(&mut self) {}

            fn seek(&mut self, _now: Duration) {}

            fn snapshot_to(&self, _path: &Path, _format: VectorFormat) -> ReelResult<()> {
                Err(ReelError::Other(anyhow::anyhow!("disk full")))
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let run = Run::new(RunConfig::new("b").with_temp_dir(tmp.path())).unwrap();
        let mut rec = Recorder::new(run, Broken).with_routine(|_: &mut Broken| {});
        let err = rec.capture(None, &CaptureOptions::default()).unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }
}
