//! Error types and handling for FastConvert

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for FastConvert operations
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Main error type for FastConvert operations
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Input expansion produced no convertible files
    #[error("No valid image files found in the given inputs")]
    InputsEmpty,

    /// A list file references itself, directly or through other list files
    #[error("Cyclic list file reference: {}", format_chain(chain))]
    CyclicListFile { chain: Vec<PathBuf> },

    /// A list file could not be read
    #[error("Cannot read list file {path:?}: {source}")]
    ListFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source image could not be read or decoded
    #[error("Decode failed for {path:?}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Output image could not be encoded or written
    #[error("Encode failed for {path:?}: {message}")]
    Encode { path: PathBuf, message: String },

    /// Destination directory could not be created
    #[error("Cannot prepare output path {path:?}: {source}")]
    OutputPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Timestamps could not be copied onto the output
    #[error("Cannot copy timestamps onto {path:?}: {source}")]
    Timestamps {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source could not be moved to the trash after conversion
    #[error("Cannot move {path:?} to trash: {message}")]
    SourceRemoval { path: PathBuf, message: String },

    /// The batch was stopped while this file was pending
    #[error("Stopped before {path:?} finished")]
    Stopped { path: PathBuf },

    /// I/O related errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Invalid conversion parameters
    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerdeError(String),

    /// System resource errors
    #[error("System resource error: {message}")]
    SystemError { message: String },
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl ConvertError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new invalid parameters error
    pub fn invalid_parameters<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    pub fn decode<P: AsRef<Path>, S: ToString>(path: P, message: S) -> Self {
        Self::Decode {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn encode<P: AsRef<Path>, S: ToString>(path: P, message: S) -> Self {
        Self::Encode {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn output_path<P: AsRef<Path>>(path: P, source: std::io::Error) -> Self {
        Self::OutputPath {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn stopped<P: AsRef<Path>>(path: P) -> Self {
        Self::Stopped {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a new system error
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::SystemError {
            message: message.into(),
        }
    }

    /// Per-file failures that are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. }
                | Self::Encode { .. }
                | Self::OutputPath { .. }
                | Self::Timestamps { .. }
                | Self::SourceRemoval { .. }
                | Self::IoError(_)
        )
    }

    /// Errors that abort a batch before any file is processed
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Self::InputsEmpty
                | Self::CyclicListFile { .. }
                | Self::ListFile { .. }
                | Self::ConfigError { .. }
                | Self::InvalidParameters { .. }
        )
    }

    /// Short category name used in logs and JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputsEmpty => "inputs_empty",
            Self::CyclicListFile { .. } => "cyclic_list_file",
            Self::ListFile { .. } => "list_file",
            Self::Decode { .. } => "decode",
            Self::Encode { .. } => "encode",
            Self::OutputPath { .. } => "output_path",
            Self::Timestamps { .. } => "timestamps",
            Self::SourceRemoval { .. } => "source_removal",
            Self::Stopped { .. } => "stopped",
            Self::IoError(_) => "io",
            Self::ConfigError { .. } => "config",
            Self::InvalidParameters { .. } => "invalid_parameters",
            Self::SerdeError(_) => "serde",
            Self::SystemError { .. } => "system",
        }
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::ListFile { path, .. }
            | Self::Decode { path, .. }
            | Self::Encode { path, .. }
            | Self::OutputPath { path, .. }
            | Self::Timestamps { path, .. }
            | Self::SourceRemoval { path, .. }
            | Self::Stopped { path } => Some(path),
            Self::CyclicListFile { chain } => chain.first().map(PathBuf::as_path),
            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::InputsEmpty => {
                "No convertible images found. Supported inputs: .png .jpg .jpeg .webp .avif"
                    .to_string()
            }
            Self::Decode { message, .. } => format!("cannot read image ({message})"),
            Self::Encode { message, .. } => format!("cannot write image ({message})"),
            Self::OutputPath { path, source } => {
                format!("cannot create directory for {} ({source})", path.display())
            }
            Self::Timestamps { source, .. } => format!("cannot copy timestamps ({source})"),
            Self::SourceRemoval { message, .. } => format!("cannot move source to trash ({message})"),
            Self::Stopped { .. } => "stopped".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<toml::de::Error> for ConvertError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerdeError(format!("TOML parsing error: {err}"))
    }
}

impl From<toml::ser::Error> for ConvertError {
    fn from(err: toml::ser::Error) -> Self {
        Self::SerdeError(format!("TOML serialization error: {err}"))
    }
}

impl From<serde_yaml::Error> for ConvertError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerdeError(format!("YAML error: {err}"))
    }
}
