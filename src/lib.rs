pub mod cli;
pub mod config;
pub mod error;
pub mod staging;
pub mod invoker;
pub mod scanner;
pub mod deploy;
pub mod patcher;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, Command, OutputFormat};
pub use config::{CliOverrides, Config};
pub use error::{ModStageError, Result, UserFriendlyError};

// Core functionality re-exports
pub use deploy::{DeployOutcome, DeployedSet, Deployer, MatchMode, RestoreOutcome};
pub use invoker::{ConversionMode, ToolRun, ToolRunner};
pub use patcher::PatchSummary;
pub use scanner::{OutputScanner, StagedFile};
pub use staging::StagingArea;
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::task;

/// Main library interface for ModStage functionality.
///
/// One instance drives one operation at a time: the converter invocation and
/// output scan run on a blocking worker while the foreground stays
/// responsive, and the Ctrl+C flag is consulted at the two coarse
/// checkpoints (after the tool call returns, after the scan).
pub struct ModStage {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
    deployed: DeployedSet,
}

impl ModStage {
    /// Create a new ModStage instance with the provided configuration
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet);
        let shutdown = GracefulShutdown::new()?;

        Ok(Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
            deployed: DeployedSet::new(),
        })
    }

    /// Create a new ModStage instance for testing (no signal handler conflicts)
    pub fn new_for_test(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet);
        let shutdown = GracefulShutdown::new_for_test();

        Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
            deployed: DeployedSet::new(),
        }
    }

    /// Create a ModStage instance from CLI arguments
    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Self::new(config, output_mode, cli_args.verbose, cli_args.quiet)
    }

    /// Convert packed files into editable fragments in `To Edit`.
    pub async fn unpack(&self, inputs: Vec<PathBuf>) -> Result<Vec<StagedFile>> {
        if inputs.is_empty() {
            return Err(ModStageError::Config {
                message: "No input files given".to_string(),
            });
        }

        let packed_ext = self.config.packed_ext().to_lowercase();
        for input in &inputs {
            let valid = input.is_file()
                && input
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(&packed_ext));
            if !valid {
                return Err(ModStageError::InvalidInput {
                    path: input.display().to_string(),
                });
            }
        }

        let runner = self.tool_runner();
        runner.verify_executable()?;

        let area = StagingArea::from_config(&self.config);
        area.ensure_exists()?;
        self.log_warnings(area.prepare_unpack());

        self.output_formatter
            .start_operation("Converting packed files to fragments");
        let run = self.run_converter(runner, inputs, ConversionMode::FileToXml).await?;

        // Checkpoint: after the tool call returns.
        self.shutdown.check_cancelled()?;

        let fragments = OutputScanner::new(self.config.fragment_ext()).scan(area.to_edit());
        for fragment in &fragments {
            self.output_formatter
                .debug(&format!("fragment: {}", fragment.display_path()));
        }

        // Checkpoint: after the scan, before reporting results.
        self.shutdown.check_cancelled()?;

        self.output_formatter.print_operation_summary(
            "unpack",
            &[
                ("inputs staged", run.staged_inputs),
                ("fragments produced", fragments.len()),
            ],
            &[],
            &[],
        );

        Ok(fragments)
    }

    /// Convert the fragment directories staged in `To Edit` back into packed
    /// files, optionally narrowed to one vehicle.
    pub async fn repack(&self, vehicle: Option<String>) -> Result<Vec<StagedFile>> {
        let runner = self.tool_runner();
        runner.verify_executable()?;

        let area = StagingArea::from_config(&self.config);
        area.ensure_exists()?;

        let staged_dirs = area.fragment_vehicle_dirs(self.config.fragment_ext());

        if let Some(name) = vehicle.as_deref() {
            let wanted = area.to_edit().join(name);
            if !staged_dirs.contains(&wanted) {
                return Err(ModStageError::InvalidInput {
                    path: wanted.display().to_string(),
                });
            }
        }

        if staged_dirs.is_empty() {
            // Nothing staged; don't bother the converter.
            self.output_formatter
                .info("No staged fragment directories to repack");
            self.output_formatter.print_operation_summary(
                "repack",
                &[("packed files produced", 0)],
                &[],
                &[],
            );
            return Ok(Vec::new());
        }

        self.log_warnings(area.prepare_repack());

        self.output_formatter
            .start_operation("Converting fragments back to packed files");
        let _run = self
            .run_converter(runner, Vec::new(), ConversionMode::XmlToFile)
            .await?;

        // Checkpoint: after the tool call returns.
        self.shutdown.check_cancelled()?;

        let mut outputs = OutputScanner::new(self.config.packed_ext()).scan(area.packed_files());
        if let Some(name) = vehicle.as_deref() {
            outputs = filter_vehicle_outputs(outputs, name, self.config.match_mode);
        }
        for output in &outputs {
            self.output_formatter
                .debug(&format!("packed output: {}", output.display_path()));
        }

        // Checkpoint: after the scan, before reporting results.
        self.shutdown.check_cancelled()?;

        self.output_formatter.print_operation_summary(
            "repack",
            &[("packed files produced", outputs.len())],
            &[],
            &[],
        );

        Ok(outputs)
    }

    /// Deploy everything currently in `Packed Files` over the originals.
    pub fn deploy(&mut self) -> Result<DeployOutcome> {
        let area = StagingArea::from_config(&self.config);
        let staged = OutputScanner::new(self.config.packed_ext()).scan(area.packed_files());

        if staged.is_empty() {
            self.output_formatter
                .info("No produced packed files found to deploy");
            self.output_formatter.print_operation_summary(
                "deploy",
                &[("vehicles deployed", 0)],
                &[],
                &[],
            );
            return Ok(DeployOutcome::default());
        }

        self.output_formatter
            .start_operation("Deploying packed files over originals");
        let started = Instant::now();
        let pb = self.progress_manager.create_file_progress(staged.len() as u64);

        let deployer = Deployer::new(&self.config);
        let outcome = {
            let bar = pb.clone();
            let mut progress = move |index: usize, _total: usize, filename: &str| {
                bar.set_position(index as u64);
                bar.set_message(format!("Deploying {}", filename));
            };
            deployer.deploy(
                &staged,
                &self.config.vehicles_path,
                &mut self.deployed,
                Some(&mut progress),
            )?
        };

        ui::progress::finish_progress_with_summary(
            &pb,
            &format!("Deployed {} vehicles", outcome.deployed.len()),
            started.elapsed(),
        );

        for error in &outcome.errors {
            self.output_formatter.warning(error);
        }

        let details: Vec<String> = outcome
            .deployed
            .iter()
            .map(|name| format!("deployed: {}", name))
            .collect();
        self.output_formatter.print_operation_summary(
            "deploy",
            &[
                ("outputs considered", staged.len()),
                ("vehicles deployed", outcome.deployed.len()),
                ("skipped", outcome.errors.len()),
            ],
            &details,
            &outcome.errors,
        );

        Ok(outcome)
    }

    /// Restore originals from their backups under the vehicles root.
    pub fn restore(&mut self) -> Result<RestoreOutcome> {
        self.output_formatter
            .start_operation("Restoring originals from backups");
        let started = Instant::now();
        let spinner = self.progress_manager.create_spinner("Scanning for backups...");

        let outcome = {
            let bar = spinner.clone();
            let mut progress = move |_restored: usize, original: &str| {
                bar.set_message(format!("Restoring {}", original));
            };
            deploy::restore_backups(
                &self.config.vehicles_path,
                &self.config.backup_suffix,
                Some(&mut progress),
            )?
        };

        ui::progress::finish_progress_with_summary(
            &spinner,
            &format!("Restored {} files", outcome.restored),
            started.elapsed(),
        );

        for error in &outcome.errors {
            self.output_formatter.warning(error);
        }

        // The tree is pristine again; the session highlight set resets.
        self.deployed.clear();

        self.output_formatter.print_operation_summary(
            "restore",
            &[
                ("files restored", outcome.restored),
                ("failed", outcome.failed),
            ],
            &[],
            &outcome.errors,
        );

        Ok(outcome)
    }

    /// Apply the performance table to one fragment, or to every staged
    /// fragment of interest when no file is given.
    pub fn patch(&self, file: Option<&Path>) -> Result<PatchSummary> {
        match file {
            Some(path) => {
                let elements = patcher::patch_file(path)?;
                self.output_formatter.print_operation_summary(
                    "patch",
                    &[("files patched", 1), ("elements patched", elements)],
                    &[],
                    &[],
                );
                Ok(PatchSummary {
                    files_patched: 1,
                    elements_patched: elements,
                    errors: Vec::new(),
                })
            }
            None => {
                let area = StagingArea::from_config(&self.config);
                let summary =
                    patcher::patch_staged(area.to_edit(), self.config.fragment_ext());

                for error in &summary.errors {
                    self.output_formatter.warning(error);
                }

                self.output_formatter.print_operation_summary(
                    "patch",
                    &[
                        ("files patched", summary.files_patched),
                        ("elements patched", summary.elements_patched),
                        ("failed", summary.errors.len()),
                    ],
                    &[],
                    &summary.errors,
                );

                Ok(summary)
            }
        }
    }

    /// Report what is currently staged, produced and deployed.
    pub fn status(&self) -> StatusReport {
        let area = StagingArea::from_config(&self.config);

        let fragment_dirs: Vec<String> = area
            .fragment_vehicle_dirs(self.config.fragment_ext())
            .iter()
            .filter_map(|dir| dir.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();

        let packed = OutputScanner::new(self.config.packed_ext()).scan(area.packed_files());
        let deployable = deploy::deployable_vehicles(&packed);
        let packed_outputs: Vec<String> =
            packed.iter().map(|output| output.display_path()).collect();
        let deployed: Vec<String> = self.deployed.names().map(String::from).collect();

        let report = StatusReport {
            fragment_dirs,
            packed_outputs,
            deployable,
            deployed,
        };

        let mut details: Vec<String> = Vec::new();
        details.extend(
            report
                .fragment_dirs
                .iter()
                .map(|name| format!("staged: {}", name)),
        );
        details.extend(
            report
                .deployable
                .iter()
                .map(|name| format!("deployable: {}", name)),
        );
        self.output_formatter.print_operation_summary(
            "status",
            &[
                ("staged fragment dirs", report.fragment_dirs.len()),
                ("packed outputs", report.packed_outputs.len()),
                ("deployable vehicles", report.deployable.len()),
                ("deployed this session", report.deployed.len()),
            ],
            &details,
            &[],
        );

        report
    }

    /// Forget which vehicles were deployed this session.
    pub fn clear_deployed(&mut self) {
        self.deployed.clear();
    }

    /// Generate sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config).map_err(ModStageError::Io)?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn deployed(&self) -> &DeployedSet {
        &self.deployed
    }

    /// Check if shutdown has been requested
    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    /// Request graceful shutdown
    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    /// Handle error with user-friendly output
    pub fn handle_error(&self, error: &ModStageError) {
        self.output_formatter.print_user_friendly_error(error);
    }

    fn tool_runner(&self) -> ToolRunner {
        ToolRunner::new(self.config.converter_path.clone())
            .with_timeout(self.config.tool_timeout())
            .with_packed_extension(self.config.packed_ext())
    }

    async fn run_converter(
        &self,
        runner: ToolRunner,
        inputs: Vec<PathBuf>,
        mode: ConversionMode,
    ) -> Result<ToolRun> {
        let started = Instant::now();
        let spinner = self.progress_manager.create_spinner("Running converter...");

        let outcome = task::spawn_blocking(move || runner.run(&inputs, mode))
            .await
            .map_err(|e| ModStageError::Config {
                message: format!("Worker task failed: {}", e),
            });

        let run = match outcome {
            Ok(Ok(run)) => run,
            Ok(Err(e)) | Err(e) => {
                spinner.abandon_with_message("Converter run failed");
                return Err(e);
            }
        };

        let finished = if run.timed_out {
            // Expected with this converter; the output scan decides success.
            "Converter finished (timeout bound reached)"
        } else {
            "Converter finished"
        };
        ui::progress::finish_progress_with_summary(&spinner, finished, started.elapsed());

        self.log_warnings(run.cleanup_warnings.clone());
        Ok(run)
    }

    fn log_warnings(&self, warnings: Vec<String>) {
        for warning in warnings {
            self.output_formatter.warning(&warning);
        }
    }
}

/// Current staging state, as shown by `modstage status`.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub fragment_dirs: Vec<String>,
    pub packed_outputs: Vec<String>,
    pub deployable: Vec<String>,
    pub deployed: Vec<String>,
}

/// Narrow repack outputs to one vehicle: files under the vehicle's own
/// output directory win; otherwise fall back to a name match, mirroring the
/// converter's two possible output layouts.
fn filter_vehicle_outputs(
    outputs: Vec<StagedFile>,
    vehicle: &str,
    match_mode: MatchMode,
) -> Vec<StagedFile> {
    let in_vehicle_dir: Vec<StagedFile> = outputs
        .iter()
        .filter(|output| output.vehicle_name().as_deref() == Some(vehicle))
        .cloned()
        .collect();
    if !in_vehicle_dir.is_empty() {
        return in_vehicle_dir;
    }

    outputs
        .into_iter()
        .filter(|output| {
            output
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| match_mode.matches(stem, vehicle))
        })
        .collect()
}

/// Get version information
pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
