use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModStageError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Converter executable not found: {path}")]
    ConverterMissing { path: String },

    #[error("Vehicles root not found: {path}")]
    VehiclesRootMissing { path: String },

    #[error("Invalid input file: {path}")]
    InvalidInput { path: String },

    #[error("Failed to launch converter: {message}")]
    ToolLaunch { message: String },

    #[error("No original found for vehicle: {vehicle}")]
    NoMatch { vehicle: String },

    #[error("Malformed XML in {path}: {message}")]
    MalformedFragment { path: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Operation was cancelled by user")]
    Cancelled,
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for ModStageError {
    fn user_message(&self) -> String {
        match self {
            ModStageError::ConverterMissing { path } => {
                format!("Converter executable not found: {}", path)
            }
            ModStageError::VehiclesRootMissing { path } => {
                format!("Vehicles root directory not found: {}", path)
            }
            ModStageError::InvalidInput { path } => {
                format!("Not a valid packed input file: {}", path)
            }
            ModStageError::ToolLaunch { message } => {
                format!("Failed to launch the converter: {}", message)
            }
            ModStageError::NoMatch { vehicle } => {
                format!("No original file matched vehicle: {}", vehicle)
            }
            ModStageError::MalformedFragment { path, message } => {
                format!("Fragment {} is not well-formed: {}", path, message)
            }
            ModStageError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            ModStageError::Cancelled => "Operation was cancelled by user".to_string(),
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            ModStageError::ConverterMissing { .. } => Some(
                "Set the converter path in the configuration file or pass it with --converter."
                    .to_string(),
            ),
            ModStageError::VehiclesRootMissing { .. } => Some(
                "Set the vehicles root in the configuration file or pass it with --vehicles."
                    .to_string(),
            ),
            ModStageError::InvalidInput { .. } => Some(
                "Inputs must be existing packed files with the configured extension (default .ee)."
                    .to_string(),
            ),
            ModStageError::ToolLaunch { .. } => Some(
                "Check that the converter executable is runnable and that its directory is writable."
                    .to_string(),
            ),
            ModStageError::MalformedFragment { .. } => Some(
                "Fix the markup by hand or regenerate the fragment with `modstage unpack`."
                    .to_string(),
            ),
            ModStageError::Config { .. } => Some(
                "Check the configuration file syntax; regenerate defaults with --generate-config."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ModStageError {
    fn from(error: serde_json::Error) -> Self {
        ModStageError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModStageError>;
