use std::{
    path::{Path, PathBuf},
    process::Command,
};

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_framereel")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "framereel.exe"
            } else {
                "framereel"
            });
            p
        })
}

fn count_with_suffix(dir: &Path, suffix: &str) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .ends_with(suffix)
        })
        .count()
}

#[test]
fn cli_record_writes_frames_and_gif() {
    let tmp = tempfile::tempdir().unwrap();
    let frames = tmp.path().join("frames");

    let status = Command::new(exe())
        .args(["record", "--name", "smoke", "--temp-dir"])
        .arg(&frames)
        .arg("--out-dir")
        .arg(tmp.path())
        .args([
            "--interval",
            "200",
            "--end-after",
            "1000",
            "--width",
            "64",
            "--height",
            "64",
            "--no-reveal",
        ])
        .status()
        .unwrap();

    assert!(status.success());
    assert_eq!(count_with_suffix(&frames, ".svg"), 6);
    assert_eq!(count_with_suffix(&frames, ".svg.png"), 6);
    assert!(tmp.path().join("smoke.gif").exists());
}

#[test]
fn cli_encode_reads_config_file_options() {
    let tmp = tempfile::tempdir().unwrap();
    let frames = tmp.path().join("frames");
    std::fs::create_dir_all(&frames).unwrap();
    for seq in 1..=2 {
        image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]))
            .save(frames.join(format!("clip_{seq:04}.svg.png")))
            .unwrap();
    }

    let config = tmp.path().join("run.json");
    let json = serde_json::json!({
        "name": "clip",
        "temp_dir": frames,
        "options": { "duration": 150, "rebuild": false },
    });
    std::fs::write(&config, serde_json::to_vec_pretty(&json).unwrap()).unwrap();

    let status = Command::new(exe())
        .arg("encode")
        .arg("--config")
        .arg(&config)
        .arg("--out-dir")
        .arg(tmp.path())
        .args(["--out", "renamed", "--no-reveal"])
        .status()
        .unwrap();

    assert!(status.success());
    assert!(tmp.path().join("renamed.gif").exists());
}

#[test]
fn cli_rejects_unknown_tunable() {
    let tmp = tempfile::tempdir().unwrap();
    let output = Command::new(exe())
        .args(["encode", "--name", "clip", "--temp-dir"])
        .arg(tmp.path())
        .args(["--set", "colour=red", "--no-reveal"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("colour"));
}
