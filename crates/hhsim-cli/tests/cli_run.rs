use assert_cmd::Command;
use predicates::prelude::*;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// `hhsim` with a quiet config so tests never read the user's own
fn hhsim(dir: &Path) -> Result<Command, Box<dyn Error>> {
    let config = dir.join("config.toml");
    if !config.exists() {
        fs::write(&config, "[preferences]\nshow_progress = false\n")?;
    }
    let mut cmd = Command::cargo_bin("hhsim")?;
    cmd.arg("-c").arg(&config);
    Ok(cmd)
}

fn init_templates(dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    hhsim(dir)?.arg("init").arg(dir).assert().success();
    Ok(dir.join("hodgkin_huxley.toml"))
}

#[test]
fn init_writes_both_templates() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    init_templates(tmp.path())?;
    assert!(tmp.path().join("passive.toml").exists());
    assert!(tmp.path().join("hodgkin_huxley.toml").exists());

    // A second init must not clobber edits
    hhsim(tmp.path())?
        .arg("init")
        .arg(tmp.path())
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--force"));
    hhsim(tmp.path())?
        .args(["init", "--force"])
        .arg(tmp.path())
        .assert()
        .success();
    Ok(())
}

#[test]
fn run_writes_csv_trace() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let experiment = init_templates(tmp.path())?;
    let out = tmp.path().join("trace.csv");

    hhsim(tmp.path())?
        .arg("run")
        .arg(&experiment)
        .args(["--t1", "20"])
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let text = fs::read_to_string(&out)?;
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("time_ms,v_mv,na.m,na.h,k.n"));
    let first: Vec<f64> = lines
        .next()
        .ok_or("empty trace")?
        .split(',')
        .map(str::parse)
        .collect::<Result<_, _>>()?;
    assert_eq!(first[0], 0.0);
    assert!((first[1] + 65.0).abs() < 0.1, "starts at rest, got {}", first[1]);

    let last = text.lines().last().ok_or("empty trace")?;
    assert!(last.starts_with("20,"), "ends on the horizon: {}", last);
    Ok(())
}

#[test]
fn run_uses_experiment_output_path() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    init_templates(tmp.path())?;

    hhsim(tmp.path())?
        .arg("run")
        .arg(tmp.path().join("passive.toml"))
        .assert()
        .success();

    let text = fs::read_to_string(tmp.path().join("passive.csv"))?;
    assert!(text.starts_with("time_ms,v_mv\n"));
    assert_eq!(text.lines().count(), 2002);
    Ok(())
}

#[test]
fn run_json_reports_outcome() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let experiment = init_templates(tmp.path())?;
    let out = tmp.path().join("result.json");

    hhsim(tmp.path())?
        .arg("run")
        .arg(&experiment)
        .args(["--t1", "5", "--method", "rk4"])
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out)?)?;
    assert_eq!(value["outcome"]["status"], "completed");
    assert_eq!(value["method"], "runge_kutta4");
    assert_eq!(value["species"], serde_json::json!(["na", "k", "leak"]));
    Ok(())
}

#[test]
fn sweep_prints_fi_table() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let experiment = init_templates(tmp.path())?;

    hhsim(tmp.path())?
        .arg("sweep")
        .arg(&experiment)
        .args(["--amplitudes", "0,15", "-j", "2"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("amplitude,spike_count,rate_hz,pattern,phase\n"))
        .stdout(predicate::str::contains("0,0,0,quiescent,completed"))
        .stdout(predicate::str::contains("15,7,"));
    Ok(())
}

#[test]
fn inspect_shows_resting_state() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let experiment = init_templates(tmp.path())?;

    hhsim(tmp.path())?
        .arg("inspect")
        .arg(&experiment)
        .arg("--rates")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"Resting potential: -6[45]\.\d+ mV")?)
        .stdout(predicate::str::contains("na.m"))
        .stdout(predicate::str::contains("k.n"));
    Ok(())
}

#[test]
fn diverging_run_exits_with_partial_output() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let experiment = tmp.path().join("unstable.toml");
    fs::write(
        &experiment,
        r#"
[membrane]
preset = "hodgkin_huxley"

[domain]
policy = "extrapolate"

[stimulus.step]
onset = 1.0
offset = 50.0
amplitude = 30.0

[simulation]
t1 = 50.0
dt = 1.0
method = "euler"
"#,
    )?;
    let out = tmp.path().join("unstable.csv");

    hhsim(tmp.path())?
        .arg("run")
        .arg(&experiment)
        .arg("-o")
        .arg(&out)
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("diverged"));

    let rows = fs::read_to_string(&out)?.lines().count();
    assert!(rows > 1 && rows < 51, "partial trace expected, got {} rows", rows);
    Ok(())
}
