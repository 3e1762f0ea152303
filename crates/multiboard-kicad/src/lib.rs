pub mod drc;

use anyhow::{Context, Result, anyhow};
use multiboard_command_runner::CommandRunner;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub use drc::{DrcItem, DrcReport, DrcViolation};

/// Install locations. Every lookup honours an environment override first.
pub mod paths {
    use std::path::{Path, PathBuf};

    /// Location of `kicad-cli`: `KICAD_CLI`, then `PATH`, then the platform
    /// default install location.
    pub fn kicad_cli() -> String {
        if let Ok(cli) = std::env::var("KICAD_CLI") {
            return expand_home(&cli);
        }
        if let Ok(found) = which::which("kicad-cli") {
            return found.to_string_lossy().into_owned();
        }
        default_kicad_cli()
    }

    #[cfg(target_os = "macos")]
    fn default_kicad_cli() -> String {
        "/Applications/KiCad/KiCad.app/Contents/MacOS/kicad-cli".to_string()
    }

    #[cfg(target_os = "windows")]
    fn default_kicad_cli() -> String {
        newest_windows_install()
            .map(|dir| dir.join("bin").join("kicad-cli.exe"))
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files\KiCad\9.0\bin\kicad-cli.exe"))
            .to_string_lossy()
            .into_owned()
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn default_kicad_cli() -> String {
        "/usr/bin/kicad-cli".to_string()
    }

    /// Directory holding KiCad's stock `*.pretty` footprint libraries.
    pub fn system_footprint_dir() -> Option<PathBuf> {
        for var in ["KICAD9_FOOTPRINT_DIR", "KICAD8_FOOTPRINT_DIR", "KICAD_FOOTPRINT_DIR"] {
            if let Ok(dir) = std::env::var(var) {
                let dir = PathBuf::from(expand_home(&dir));
                if dir.is_dir() {
                    return Some(dir);
                }
            }
        }
        footprint_dir_candidates().into_iter().find(|d| d.is_dir())
    }

    #[cfg(target_os = "macos")]
    fn footprint_dir_candidates() -> Vec<PathBuf> {
        vec![PathBuf::from(
            "/Applications/KiCad/KiCad.app/Contents/SharedSupport/footprints",
        )]
    }

    #[cfg(target_os = "windows")]
    fn footprint_dir_candidates() -> Vec<PathBuf> {
        newest_windows_install()
            .map(|dir| vec![dir.join("share").join("kicad").join("footprints")])
            .unwrap_or_default()
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn footprint_dir_candidates() -> Vec<PathBuf> {
        vec![
            PathBuf::from("/usr/share/kicad/footprints"),
            PathBuf::from("/usr/local/share/kicad/footprints"),
        ]
    }

    /// The user's global `fp-lib-table`, from the newest KiCad version that
    /// has one.
    pub fn global_fp_lib_table() -> Option<PathBuf> {
        let base = dirs::preference_dir()?.join("kicad");
        newest_version_dir(&base, |dir| dir.join("fp-lib-table").is_file())
            .map(|dir| dir.join("fp-lib-table"))
    }

    #[cfg(target_os = "windows")]
    fn newest_windows_install() -> Option<PathBuf> {
        let bases = [
            std::env::var("LOCALAPPDATA")
                .ok()
                .map(|p| PathBuf::from(p).join("Programs").join("KiCad")),
            std::env::var("ProgramFiles")
                .ok()
                .map(|p| PathBuf::from(p).join("KiCad")),
        ];
        bases
            .into_iter()
            .flatten()
            .find_map(|base| newest_version_dir(&base, |dir| dir.join("bin").is_dir()))
    }

    /// Highest-sorting child directory of `base` (e.g. `9.0` over `8.0`)
    /// that satisfies `accept`.
    fn newest_version_dir(base: &Path, accept: impl Fn(&Path) -> bool) -> Option<PathBuf> {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(base)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        dirs.into_iter().rev().find(|d| accept(d))
    }

    fn expand_home(path: &str) -> String {
        match (path.strip_prefix('~'), dirs::home_dir()) {
            (Some(rest), Some(home)) => format!("{}{}", home.to_string_lossy(), rest),
            _ => path.to_string(),
        }
    }
}

/// Check if KiCad is installed and return a helpful error if not
pub fn check_kicad_installed() -> Result<()> {
    let kicad_path = paths::kicad_cli();

    if !Path::new(&kicad_path).exists() {
        return Err(anyhow!(
            "KiCad CLI not found at expected location: {}\n\
             Please ensure KiCad is installed. You can download it from https://www.kicad.org/\n\
             If KiCad is installed in a non-standard location, set the KICAD_CLI environment variable.",
            kicad_path
        ));
    }

    let output = CommandRunner::new(&kicad_path)
        .arg("--version")
        .run()
        .with_context(|| format!("Failed to execute KiCad CLI at {kicad_path}"))?;
    if !output.success {
        return Err(anyhow!(
            "KiCad CLI found but failed to execute. Please check your KiCad installation."
        ));
    }
    log::debug!("Using kicad-cli {}", output.output().trim());
    Ok(())
}

/// Builder for KiCad CLI commands
#[derive(Debug, Default)]
pub struct KiCadCliBuilder {
    args: Vec<String>,
    env_vars: BTreeMap<String, String>,
    current_dir: Option<PathBuf>,
}

impl KiCadCliBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command (e.g., "pcb", "sch")
    pub fn command(mut self, cmd: &str) -> Self {
        self.args.push(cmd.to_string());
        self
    }

    /// Add a subcommand (e.g., "drc", "export")
    pub fn subcommand(mut self, subcmd: &str) -> Self {
        self.args.push(subcmd.to_string());
        self
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Execute the command. On a non-zero exit the tool's output becomes
    /// part of the error.
    pub fn run(self) -> Result<()> {
        check_kicad_installed()?;

        let mut cmd = CommandRunner::new(paths::kicad_cli()).args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd = cmd.current_dir(dir);
        }
        for (key, value) in self.env_vars {
            cmd = cmd.env(key, value);
        }

        let output = cmd.run().context("Failed to execute kicad-cli")?;
        if !output.success {
            anyhow::bail!(
                "kicad-cli {} failed:\n{}",
                self.args.first().map(String::as_str).unwrap_or_default(),
                output.output().trim_end()
            );
        }
        Ok(())
    }
}

/// Run KiCad DRC on a board and return the parsed JSON report.
///
/// Violations the user excluded inside KiCad are included and flagged with
/// [`DrcViolation::excluded`].
pub fn run_drc_report(pcb_path: impl AsRef<Path>, working_dir: Option<&Path>) -> Result<DrcReport> {
    let pcb_path = pcb_path.as_ref();
    if !pcb_path.exists() {
        anyhow::bail!("PCB file not found: {}", pcb_path.display());
    }

    let temp_file =
        NamedTempFile::new().context("Failed to create temporary file for DRC output")?;
    let temp_path = temp_file.path();

    let mut builder = KiCadCliBuilder::new()
        .command("pcb")
        .subcommand("drc")
        .arg("--format")
        .arg("json")
        .arg("--severity-all") // Report all severities (errors and warnings)
        .arg("--severity-exclusions") // Include violations excluded by user in KiCad
        .arg("--output")
        .arg(temp_path.to_string_lossy())
        .arg(pcb_path.to_string_lossy());

    if let Some(dir) = working_dir {
        builder = builder.current_dir(dir);
    }

    builder.run().context("Failed to run KiCad DRC")?;

    DrcReport::from_file(temp_path).context("Failed to parse DRC report")
}

/// Export a KiCad XML netlist (`kicadxml`) of `schematic_path` to `output`.
pub fn export_netlist(
    schematic_path: impl AsRef<Path>,
    output: impl AsRef<Path>,
    working_dir: Option<&Path>,
) -> Result<()> {
    let schematic_path = schematic_path.as_ref();
    if !schematic_path.exists() {
        anyhow::bail!("Schematic file not found: {}", schematic_path.display());
    }

    let mut builder = KiCadCliBuilder::new()
        .command("sch")
        .subcommand("export")
        .arg("netlist")
        .arg("--format")
        .arg("kicadxml")
        .arg("--output")
        .arg(output.as_ref().to_string_lossy())
        .arg(schematic_path.to_string_lossy());

    // Library tables in the project use ${KIPRJMOD}.
    if let Some(dir) = working_dir {
        builder = builder
            .current_dir(dir)
            .env("KIPRJMOD", dir.to_string_lossy());
    }

    builder.run().context("Failed to export netlist")
}
