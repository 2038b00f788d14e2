//! Process entry point tests, run against the built binary

use anyhow::Result;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn binary() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_neural_net_rust"));
    for key in ["NEURAL_NET_CONFIG", "NEURAL_NET_PLOT_PATH", "NEURAL_NET_EPOCHS", "RUST_LOG"] {
        cmd.env_remove(key);
    }
    cmd
}

#[test]
fn test_missing_argument_is_usage_error() -> Result<()> {
    let output = binary().output()?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}

#[test]
fn test_successful_run() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    write!(file, "a,b,label\n1,2,0\n3,4,1\n5,6,0\n")?;
    file.flush()?;
    let dir = tempfile::tempdir()?;
    let plot = dir.path().join("cli.png");
    let report = dir.path().join("report.json");
    let model = dir.path().join("model.json");

    let output = binary()
        .arg(file.path())
        .args(["--epochs", "20", "--progress-every", "5"])
        .arg("--plot")
        .arg(&plot)
        .arg("--report-json")
        .arg(&report)
        .arg("--model-out")
        .arg(&model)
        .output()?;

    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout)?;
    let progress: Vec<&str> = stdout.lines().filter(|l| l.starts_with("epoch ")).collect();
    assert_eq!(progress.len(), 4);
    assert!(progress[3].starts_with("epoch 20/20 loss="));
    assert!(stdout.contains("Training complete! 20/20 epochs"));

    assert!(plot.exists());
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report)?)?;
    assert_eq!(json["epochs"].as_array().map(Vec::len), Some(20));
    assert!(model.exists());
    assert_eq!(std::fs::read_to_string(dir.path().join("model.json.hash"))?.len(), 64);
    Ok(())
}

#[test]
fn test_bad_input_exits_nonzero() -> Result<()> {
    let output = binary().arg("/nonexistent/cli.csv").output()?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("Error:"));
    Ok(())
}

#[test]
fn test_divergence_exit_code() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    write!(file, "x,y\n1,10\n2,40\n3,90\n4,160\n")?;
    file.flush()?;
    let dir = tempfile::tempdir()?;
    let plot = dir.path().join("diverged.png");
    let args = ["--learning-rate", "1e12", "--no-standardize"];

    let strict = binary().arg(file.path()).args(args).arg("--plot").arg(&plot).output()?;
    assert_eq!(strict.status.code(), Some(1));
    assert!(String::from_utf8(strict.stdout)?.contains("Training diverged"));

    let allowed = binary()
        .arg(file.path())
        .args(args)
        .arg("--allow-divergence")
        .arg("--plot")
        .arg(&plot)
        .output()?;
    assert_eq!(allowed.status.code(), Some(0));
    Ok(())
}
