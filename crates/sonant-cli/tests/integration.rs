//! Integration tests for sonant-cli.
//!
//! Tests invoke the built binary and check its output files.

use std::process::Command;

fn sonant_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sonant"))
}

// ---------------------------------------------------------------------------
// `sonant params`
// ---------------------------------------------------------------------------

#[test]
fn cli_params_lists_the_table() {
    let output = sonant_bin()
        .arg("params")
        .output()
        .expect("failed to run sonant params");

    assert!(output.status.success(), "sonant params failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for id in ["volume", "filter_cutoff", "amp_release", "macro2_randomness"] {
        assert!(stdout.contains(id), "listing should contain '{id}'");
    }
}

#[test]
fn cli_params_unknown_group_fails() {
    let output = sonant_bin()
        .args(["params", "--group", "Nonexistent"])
        .output()
        .expect("failed to run sonant params");
    assert!(!output.status.success());
}

// ---------------------------------------------------------------------------
// `sonant render`
// ---------------------------------------------------------------------------

#[test]
fn cli_render_writes_stereo_wav() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chord.wav");

    let output = sonant_bin()
        .arg("render")
        .arg(&path)
        .args(["--note", "60", "--note", "64", "--duration", "0.25", "--tail", "0.25"])
        .args(["--set", "filter_cutoff=1200", "--set", "amp_release=0.1"])
        .output()
        .expect("failed to run sonant render");
    assert!(
        output.status.success(),
        "sonant render failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48000);
    assert_eq!(reader.duration(), 24000);

    let samples: Vec<f32> = reader.into_samples::<f32>().map(Result::unwrap).collect();
    assert!(samples.iter().any(|s| s.abs() > 0.01));
    // The release is over well before the file ends.
    assert!(samples[samples.len() - 200..].iter().all(|s| s.abs() < 1e-3));
}

#[test]
fn cli_render_rejects_unknown_parameter() {
    let dir = tempfile::tempdir().unwrap();
    let output = sonant_bin()
        .arg("render")
        .arg(dir.path().join("out.wav"))
        .args(["--set", "wobble=3"])
        .output()
        .expect("failed to run sonant render");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("wobble"));
}

#[test]
fn cli_render_reads_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("engine.toml");
    std::fs::write(&config, "polyphony = 2\n\n[params]\nvolume = 0.5\n").unwrap();
    let path = dir.path().join("out.wav");

    let output = sonant_bin()
        .arg("render")
        .arg(&path)
        .arg("--config")
        .arg(&config)
        .args(["--duration", "0.1", "--tail", "0.0"])
        .output()
        .expect("failed to run sonant render");
    assert!(output.status.success());
    assert_eq!(hound::WavReader::open(&path).unwrap().duration(), 4800);
}
