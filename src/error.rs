//! Error types for drill-rig.
//!
//! Provides unified error handling across configuration, motor control,
//! operator commands, and the date lockout.

use core::fmt;

use chrono::NaiveDate;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all drill-rig operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration parsing, validation, or persistence error
    Config(ConfigError),
    /// Motor operation error
    Motor(MotorError),
    /// Operator command rejected
    Command(CommandError),
    /// Date lockout refused the operation
    Lockout(LockoutError),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse a JSON or TOML document
    ParseError(String),
    /// File I/O error
    IoError(String),
    /// Failed to serialize a document
    SerializeError(String),
    /// Dotted parameter path does not name an existing value
    UnknownParameter(String),
    /// New value does not fit the parameter's type
    TypeMismatch {
        /// Dotted parameter path
        path: String,
        /// Deserializer message
        reason: String,
    },
    /// A value is outside its allowed range
    InvalidValue {
        /// Field name as written in the document
        field: &'static str,
        /// Explanation
        reason: &'static str,
    },
    /// Target date does not exist on the calendar
    InvalidDate {
        /// Year
        year: i32,
        /// Month
        month: u32,
        /// Day
        day: u32,
    },
}

/// Motor operation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MotorError {
    /// Pin operation failed
    PinError,
}

/// Operator command rejections.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Mode number outside 1-5
    InvalidMode(u8),
    /// Logic identifier is neither A nor B
    InvalidLogic(String),
    /// No logic has been selected yet
    NoLogicSelected,
    /// No logic is currently running
    NoActiveLogic,
    /// An automatic cycle is waiting or running
    CycleBusy,
    /// Manual mode is active
    ManualActive,
    /// Manual mode is not active
    ManualInactive,
    /// Homing has not finished yet
    NotHomed,
    /// Configuration cannot change while a logic is active
    LogicActive,
    /// Controller is already running
    AlreadyRunning,
    /// Operation requires a Logic B date source
    NoDateGate,
    /// The controller thread could not be started
    ThreadSpawn(String),
}

/// Date lockout refusals (Logic B).
#[derive(Debug, Clone, PartialEq)]
pub enum LockoutError {
    /// Target date reached or passed
    TargetDateReached {
        /// Configured target date
        target: NaiveDate,
    },
    /// Date source returned an implausible value or failed
    ImplausibleClock(String),
    /// Lockout latched earlier; only reprogramming the clock clears it
    Latched,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Motor(e) => write!(f, "Motor error: {}", e),
            Error::Command(e) => write!(f, "Command rejected: {}", e),
            Error::Lockout(e) => write!(f, "Lockout: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::SerializeError(msg) => write!(f, "Serialize error: {}", msg),
            ConfigError::UnknownParameter(path) => write!(f, "Unknown parameter '{}'", path),
            ConfigError::TypeMismatch { path, reason } => {
                write!(f, "Value for '{}' has the wrong type: {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::InvalidDate { year, month, day } => {
                write!(f, "Invalid date {}/{}/{}", year, month, day)
            }
        }
    }
}

impl fmt::Display for MotorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorError::PinError => write!(f, "GPIO pin operation failed"),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::InvalidMode(n) => write!(f, "Invalid mode {}. Must be 1-5", n),
            CommandError::InvalidLogic(s) => write!(f, "Invalid logic '{}'. Must be A or B", s),
            CommandError::NoLogicSelected => write!(f, "No logic selected"),
            CommandError::NoActiveLogic => write!(f, "No logic is running"),
            CommandError::CycleBusy => write!(f, "An automatic cycle is waiting or running"),
            CommandError::ManualActive => write!(f, "Manual mode is active"),
            CommandError::ManualInactive => write!(f, "Manual mode is not active"),
            CommandError::NotHomed => write!(f, "Homing has not finished"),
            CommandError::LogicActive => {
                write!(f, "Parameters cannot change while a logic is running")
            }
            CommandError::AlreadyRunning => write!(f, "Controller is already running"),
            CommandError::NoDateGate => write!(f, "This logic has no date source"),
            CommandError::ThreadSpawn(msg) => {
                write!(f, "Cannot spawn controller thread: {}", msg)
            }
        }
    }
}

impl fmt::Display for LockoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockoutError::TargetDateReached { target } => {
                write!(f, "Target date {} has been reached", target.format("%Y/%m/%d"))
            }
            LockoutError::ImplausibleClock(msg) => write!(f, "Clock is implausible: {}", msg),
            LockoutError::Latched => {
                write!(f, "Date lockout is latched; reprogram the clock to clear it")
            }
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<MotorError> for Error {
    fn from(e: MotorError) -> Self {
        Error::Motor(e)
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Error::Command(e)
    }
}

impl From<LockoutError> for Error {
    fn from(e: LockoutError) -> Self {
        Error::Lockout(e)
    }
}

impl std::error::Error for Error {}

impl std::error::Error for ConfigError {}

impl std::error::Error for MotorError {}

impl std::error::Error for CommandError {}

impl std::error::Error for LockoutError {}
