use anyhow::Result;
use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;

fn project() -> Result<TempDir> {
    let temp = TempDir::new()?;
    temp.child("main.kicad_pro").write_str("{}")?;
    temp.child("main.kicad_sch")
        .write_str("(kicad_sch (version 20231120) (generator \"eeschema\"))")?;
    Ok(temp)
}

fn multiboard(temp: &TempDir, args: &[&str]) -> Result<(bool, String, String)> {
    let output = Command::cargo_bin("multiboard")?
        .args(args)
        .current_dir(temp.path())
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()?;
    Ok((
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    ))
}

#[test]
fn test_new_then_list() -> Result<()> {
    let temp = project()?;

    let (ok, stdout, _) = multiboard(&temp, &["new", "Power Supply", "-m", "5V rail"])?;
    assert!(ok);
    assert!(stdout.contains("boards/Power_Supply/Power_Supply.kicad_pcb"));

    let (ok, stdout, _) = multiboard(&temp, &["list"])?;
    assert!(ok);
    assert!(stdout.contains("Power Supply"));
    assert!(stdout.contains("5V rail"));
    assert!(!stdout.contains("missing"));
    Ok(())
}

#[test]
fn test_ports_from_the_command_line() -> Result<()> {
    let temp = project()?;
    multiboard(&temp, &["new", "IO"])?;

    let (ok, stdout, _) = multiboard(
        &temp,
        &["port", "set", "IO", "VBUS", "--side", "left", "--position", "0.2"],
    )?;
    assert!(ok);
    assert!(stdout.contains("left edge, net VBUS"));
    let config = std::fs::read_to_string(temp.child(".kicad_multiboard.json").path())?;
    assert!(config.contains("\"VBUS\""));

    let (ok, _, stderr) = multiboard(&temp, &["port", "set", "IO", "X", "--side", "middle"])?;
    assert!(!ok);
    assert!(stderr.contains("unknown side 'middle'"));

    let (ok, _, _) = multiboard(&temp, &["port", "remove", "IO", "VBUS"])?;
    assert!(ok);
    Ok(())
}

#[test]
fn test_errors_exit_nonzero() -> Result<()> {
    let temp = project()?;
    let (ok, _, stderr) = multiboard(&temp, &["remove", "Nope"])?;
    assert!(!ok);
    assert!(stderr.contains("Error: Board 'Nope' not found"));

    let (ok, _, _) = multiboard(&temp, &["update"])?;
    assert!(!ok);
    Ok(())
}
