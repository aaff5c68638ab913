use crate::config::{CliOverrides, Config};
use crate::deploy::MatchMode;
use crate::error::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "modstage")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Convert packed game-asset files with an external converter and deploy them into a mod tree")]
#[command(
    long_about = "ModStage drives an external, closed-source converter to turn packed \
                  game-asset files (.ee) into editable XML fragments and back, then \
                  copies the produced files over their originals in a mod source tree, \
                  backing each original up once."
)]
#[command(after_help = "EXAMPLES:\n  \
    modstage unpack vehicles/Falcon.ee\n  \
    modstage patch\n  \
    modstage repack Falcon\n  \
    modstage deploy --vehicles dropzone/editor/entities/vehicles\n  \
    modstage restore\n  \
    modstage status --output-format json")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the JSON configuration file (created with defaults on first run)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the converter executable (overrides the config file)
    #[arg(long, global = true)]
    pub converter: Option<PathBuf>,

    /// Root of the original vehicle directories (overrides the config file)
    #[arg(long, global = true)]
    pub vehicles: Option<PathBuf>,

    /// Converter timeout in seconds; expiry counts as completion
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// How outputs are matched back to originals
    #[arg(long, global = true, value_enum)]
    pub match_mode: Option<MatchMode>,

    /// Output format for results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Show what would be done without touching any files
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Write a configuration file with defaults and exit
    #[arg(long)]
    pub generate_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert packed files into editable XML fragments
    Unpack {
        /// Packed files to convert
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Convert staged XML fragments back into packed files
    Repack {
        /// Only repack this vehicle's fragment directory
        vehicle: Option<String>,
    },

    /// Copy produced packed files over their originals, backing each up once
    Deploy,

    /// Restore originals from their backups (backups are kept)
    Restore,

    /// Apply the performance table to staged vehicle_misc fragments
    Patch {
        /// Patch a single fragment file instead of the staged set
        file: Option<PathBuf>,
    },

    /// Show staged fragments, produced packed files and deployable vehicles
    Status,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_converter_path(self.converter.clone())
            .with_vehicles_path(self.vehicles.clone())
            .with_timeout(self.timeout)
            .with_match_mode(self.match_mode)
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}
