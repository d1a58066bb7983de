use std::{fs, process::Command};

use anyhow::{Context, Result};
use serde::Deserialize;
use tempfile::tempdir;

#[derive(Debug, Deserialize)]
struct DemoLog {
    scenes: Vec<SceneRecord>,
    sounds: Vec<SoundRecord>,
    host_commands: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SceneRecord {
    scene: String,
    outcome: String,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SoundRecord {
    sound: String,
}

fn run_demo(extra: &[&str]) -> Result<DemoLog> {
    let temp = tempdir().context("creating temp dir for demo log")?;
    let log_path = temp.path().join("demo_log.json");

    let mut args = extra.to_vec();
    let log_arg = log_path.to_string_lossy().to_string();
    args.extend_from_slice(&["--event-log-json", &log_arg]);

    let status = Command::new(env!("CARGO_BIN_EXE_choreo_engine"))
        .args(&args)
        .status()
        .context("running choreo_engine demo")?;
    assert!(status.success(), "choreo_engine exited with {status}");
    assert!(log_path.is_file(), "demo log missing");

    let data = fs::read(&log_path).context("reading demo log")?;
    serde_json::from_slice(&data).context("parsing demo log json")
}

#[test]
fn cuff_demo_restrains_and_plays_the_cuff_sound() -> Result<()> {
    let log = run_demo(&["--scene", "cuff"])?;

    assert_eq!(log.scenes.len(), 1);
    assert_eq!(log.scenes[0].scene, "cuff");
    assert_eq!(log.scenes[0].outcome, "completed");
    assert!(log.sounds.iter().any(|s| s.sound == "handcuffsPutOn"));

    let attaches = log
        .host_commands
        .iter()
        .filter(|cmd| cmd.get("kind").and_then(|k| k.as_str()) == Some("attach"))
        .count();
    assert_eq!(attaches, 1);
    Ok(())
}

#[test]
fn interrupted_frisk_is_reported_in_the_log() -> Result<()> {
    let log = run_demo(&["--scene", "frisk", "--interrupt-frisk-step", "2"])?;

    assert_eq!(log.scenes.len(), 1);
    let frisk = &log.scenes[0];
    assert_eq!(frisk.scene, "frisk");
    assert_eq!(frisk.outcome, "aborted");
    let detail = frisk.detail.as_deref().unwrap_or_default();
    assert!(detail.starts_with("step 2 of 7"), "{detail}");
    Ok(())
}

#[test]
fn default_run_stages_every_scene() -> Result<()> {
    let log = run_demo(&[])?;

    let order: Vec<&str> = log.scenes.iter().map(|s| s.scene.as_str()).collect();
    assert_eq!(order, vec!["cuff", "frisk", "uncuff"]);
    assert!(log.scenes.iter().all(|s| s.outcome == "completed"));
    let sounds: Vec<&str> = log.sounds.iter().map(|s| s.sound.as_str()).collect();
    assert_eq!(sounds, vec!["handcuffsPutOn", "handcuffsTakenOff"]);
    Ok(())
}
