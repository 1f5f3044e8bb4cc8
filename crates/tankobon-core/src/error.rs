use thiserror::Error;

/// All errors that can occur in tankobon-core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Invalid backup {path}: {reason}")]
    InvalidBackup { path: String, reason: String },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Process exit codes used by the CLI.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    FileSystemError = 4,
    Conflict = 7,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<&CoreError> for ExitCode {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::BackupNotFound(_) => Self::NotFound,
            CoreError::InvalidBackup { .. } | CoreError::Json(_) => Self::InvalidArgs,
            CoreError::ConfigError(_) | CoreError::TomlParse(_) | CoreError::TomlSerialize(_) => {
                Self::InvalidArgs
            }
            CoreError::Io(_) => Self::FileSystemError,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
