use crate::error::{ModStageError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The converter's staging folders are shared per-install state; two
/// concurrent invocations would corrupt each other's inputs and outputs.
/// Every run holds this gate for its whole copy/execute/cleanup span.
static INVOCATION_GATE: Mutex<()> = Mutex::new(());

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(windows)]
const WRAPPER_NAME: &str = "run_converter.bat";
#[cfg(not(windows))]
const WRAPPER_NAME: &str = "run_converter.sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    /// Packed inputs colocated with the converter become fragments in
    /// `To Edit`.
    FileToXml,
    /// Fragment directories already in `To Edit` become packed files in
    /// `Packed Files`.
    XmlToFile,
}

impl std::fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionMode::FileToXml => write!(f, "file-to-xml"),
            ConversionMode::XmlToFile => write!(f, "xml-to-file"),
        }
    }
}

/// Result of one converter invocation.
///
/// There is no `success` flag on purpose: the converter has no trustworthy
/// exit or timing signal, so the only truth is the presence of output files,
/// which the caller scans for afterwards.
#[derive(Debug, Clone)]
pub struct ToolRun {
    /// The wall-clock bound expired and the process was killed. This is the
    /// normal way a batch run ends.
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    /// How many input copies were staged beside the executable.
    pub staged_inputs: usize,
    /// Leftover-copy cleanup problems, reported but not fatal.
    pub cleanup_warnings: Vec<String>,
}

/// Drives the external converter as a black box.
///
/// Inputs are copied beside the executable (it only operates on colocated
/// files), then a disposable wrapper script runs it headless with a bounded
/// timeout and the wrapper is deleted no matter how the run ended.
pub struct ToolRunner {
    executable: PathBuf,
    timeout: Duration,
    packed_extension: String,
}

impl ToolRunner {
    pub fn new<P: Into<PathBuf>>(executable: P) -> Self {
        Self {
            executable: executable.into(),
            timeout: Duration::from_secs(30),
            packed_extension: "ee".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_packed_extension<S: Into<String>>(mut self, extension: S) -> Self {
        self.packed_extension = extension.into().trim_start_matches('.').to_lowercase();
        self
    }

    /// Check the fatal precondition without touching any files.
    pub fn verify_executable(&self) -> Result<()> {
        if !self.executable.is_file() {
            return Err(ModStageError::ConverterMissing {
                path: self.executable.display().to_string(),
            });
        }
        Ok(())
    }

    /// Copy `inputs` beside the executable, run it once, and clean up the
    /// input copies whether or not the run nominally succeeded.
    pub fn run(&self, inputs: &[PathBuf], mode: ConversionMode) -> Result<ToolRun> {
        self.verify_executable()?;
        let tool_dir = match self.executable.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let _gate = INVOCATION_GATE
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut staged = Vec::with_capacity(inputs.len());
        for input in inputs {
            let name = input
                .file_name()
                .ok_or_else(|| ModStageError::InvalidInput {
                    path: input.display().to_string(),
                })?;
            let dest = tool_dir.join(name);
            fs::copy(input, &dest)?;
            staged.push(dest);
        }

        let outcome = self.run_wrapper(&tool_dir, mode);

        // Input copies must not survive into the next run, success or not.
        let mut cleanup_warnings = self.remove_leftover_inputs(&tool_dir);
        for dest in &staged {
            if dest.exists() {
                if let Err(e) = fs::remove_file(dest) {
                    cleanup_warnings
                        .push(format!("Failed to remove {}: {}", dest.display(), e));
                }
            }
        }

        let mut run = outcome?;
        run.staged_inputs = staged.len();
        run.cleanup_warnings = cleanup_warnings;
        Ok(run)
    }

    fn run_wrapper(&self, tool_dir: &Path, mode: ConversionMode) -> Result<ToolRun> {
        let script_path = tool_dir.join(WRAPPER_NAME);
        write_wrapper_script(&script_path, tool_dir, &self.executable)?;

        let spawned = spawn_wrapper(&script_path, tool_dir);
        let result = match spawned {
            Ok(child) => self.wait_with_timeout(child),
            Err(e) => Err(ModStageError::ToolLaunch {
                message: format!("{} run: {}", mode, e),
            }),
        };

        // The wrapper is disposable; remove it regardless of outcome.
        let _ = fs::remove_file(&script_path);

        result
    }

    fn wait_with_timeout(&self, mut child: Child) -> Result<ToolRun> {
        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Ok(ToolRun {
                        timed_out: false,
                        exit_code: status.code(),
                        staged_inputs: 0,
                        cleanup_warnings: Vec::new(),
                    });
                }
                Ok(None) => {
                    if start.elapsed() >= self.timeout {
                        // The converter does not reliably terminate after
                        // finishing batch work; expiry is the normal
                        // completion signal, not a failure.
                        let _ = child.kill();
                        let _ = child.wait();
                        return Ok(ToolRun {
                            timed_out: true,
                            exit_code: None,
                            staged_inputs: 0,
                            cleanup_warnings: Vec::new(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ModStageError::Io(e));
                }
            }
        }
    }

    /// Remove any packed-format files left directly in the converter's
    /// directory from this or an earlier run.
    fn remove_leftover_inputs(&self, tool_dir: &Path) -> Vec<String> {
        let mut warnings = Vec::new();
        let Ok(entries) = fs::read_dir(tool_dir) else {
            return warnings;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_input = path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(&self.packed_extension));
            if is_input {
                if let Err(e) = fs::remove_file(&path) {
                    warnings.push(format!("Failed to remove {}: {}", path.display(), e));
                }
            }
        }

        warnings
    }
}

#[cfg(windows)]
fn write_wrapper_script(script_path: &Path, tool_dir: &Path, executable: &Path) -> Result<()> {
    let script = format!(
        "@echo off\r\ncd /d \"{}\"\r\necho.|\"{}\" >nul 2>&1\r\nexit /b 0\r\n",
        tool_dir.display(),
        executable.display()
    );
    fs::write(script_path, script)?;
    Ok(())
}

#[cfg(not(windows))]
fn write_wrapper_script(script_path: &Path, tool_dir: &Path, executable: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        "#!/bin/sh\ncd \"{}\" || exit 1\n\"{}\" </dev/null >/dev/null 2>&1\nexit 0\n",
        tool_dir.display(),
        executable.display()
    );
    fs::write(script_path, script)?;
    fs::set_permissions(script_path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(windows)]
fn spawn_wrapper(script_path: &Path, tool_dir: &Path) -> std::io::Result<Child> {
    use std::os::windows::process::CommandExt;

    const CREATE_NO_WINDOW: u32 = 0x0800_0000;

    Command::new("cmd")
        .arg("/C")
        .arg(script_path)
        .current_dir(tool_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .creation_flags(CREATE_NO_WINDOW)
        .spawn()
}

#[cfg(not(windows))]
fn spawn_wrapper(script_path: &Path, tool_dir: &Path) -> std::io::Result<Child> {
    Command::new("sh")
        .arg(script_path)
        .current_dir(tool_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
}
