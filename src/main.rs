use clap::Parser;
use modstage::{
    Cli, Command, ModStage, ModStageError, OutputFormatter, OutputMode, UserFriendlyError,
};
use std::process;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    // Handle special commands first
    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let Some(ref command) = cli.command else {
        eprintln!("No command given. See `modstage --help`.");
        return 2;
    };

    let mut app = match ModStage::from_cli(&cli) {
        Ok(app) => app,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for(&e);
        }
    };

    if cli.dry_run {
        return handle_dry_run(command, &app);
    }

    let result = match command {
        Command::Unpack { files } => app.unpack(files.clone()).await.map(|fragments| {
            if fragments.is_empty() {
                2 // The converter ran but produced nothing worth reporting as success
            } else {
                0
            }
        }),
        Command::Repack { vehicle } => app
            .repack(vehicle.clone())
            .await
            .map(|outputs| if outputs.is_empty() { 2 } else { 0 }),
        Command::Deploy => app
            .deploy()
            .map(|outcome| if outcome.errors.is_empty() { 0 } else { 2 }),
        Command::Restore => app
            .restore()
            .map(|outcome| if outcome.failed == 0 { 0 } else { 2 }),
        Command::Patch { file } => app.patch(file.as_deref()).map(|summary| {
            if summary.errors.is_empty() {
                0
            } else {
                7 // markup failures are hard failures of the operation
            }
        }),
        Command::Status => {
            app.status();
            Ok(0)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            app.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(error: &ModStageError) -> i32 {
    match error {
        ModStageError::Cancelled => 130, // Interrupted (SIGINT)
        ModStageError::Config { .. } => 2,
        ModStageError::ConverterMissing { .. } => 3,
        ModStageError::VehiclesRootMissing { .. } => 4,
        ModStageError::InvalidInput { .. } => 5,
        ModStageError::ToolLaunch { .. } => 6,
        ModStageError::MalformedFragment { .. } => 7,
        ModStageError::NoMatch { .. } => 8,
        _ => 1, // General error
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| modstage::config::DEFAULT_CONFIG_FILE.to_string());

    match ModStage::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated configuration file: {}", config_path);
            println!("\nEdit it to point at your converter executable and vehicles root,");
            println!("then run, for example:");
            println!("  modstage unpack <file.ee> --config {}", config_path);
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_dry_run(command: &Command, app: &ModStage) -> i32 {
    let formatter = app.output_formatter();
    let config = app.config();

    formatter.start_operation("DRY RUN MODE - no files will be touched");
    formatter.print_separator();

    let plan = match command {
        Command::Unpack { files } => format!(
            "unpack: clear staging, copy {} input(s) beside the converter, run it, scan for fragments",
            files.len()
        ),
        Command::Repack { vehicle } => match vehicle {
            Some(name) => format!(
                "repack: clear packed output, run the converter, collect packed files for '{}'",
                name
            ),
            None => "repack: clear packed output, run the converter, collect packed files".to_string(),
        },
        Command::Deploy => {
            "deploy: match produced packed files to originals, back each up once, overwrite"
                .to_string()
        }
        Command::Restore => "restore: copy every backup over its original, keeping backups".to_string(),
        Command::Patch { file } => match file {
            Some(path) => format!("patch: apply the performance table to {}", path.display()),
            None => "patch: apply the performance table to staged vehicle_misc fragments"
                .to_string(),
        },
        Command::Status => "status: report staging state".to_string(),
    };
    println!("  {}", plan);

    println!("  converter: {}", config.converter_path.display());
    println!("  vehicles root: {}", config.vehicles_path.display());
    println!("  To Edit: {}", config.to_edit_dir().display());
    println!("  Packed Files: {}", config.packed_files_dir().display());
    println!("  timeout: {}s (expiry counts as completion)", config.tool_timeout_secs);
    println!("  match mode: {:?}", config.match_mode);

    formatter.print_separator();
    formatter.success("Dry run completed");
    0
}

fn print_startup_error(error: &ModStageError) {
    // Create a basic formatter for startup errors
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}
