//! Error types for stepper-segments.
//!
//! Only configuration and setup paths return errors. Conditions on the motion
//! path (buffer full or empty, underrun, hold to zero, probe trip) are flags and
//! signals, never `Err`.

use core::fmt;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all stepper-segments operations.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Configuration parsing or validation error
    Config(ConfigError),
    /// Step engine setup error
    Engine(EngineError),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// No registered step engine carries the configured name
    UnknownEngine(heapless::String<32>),
    /// Two step engines registered under the same name
    DuplicateEngine(heapless::String<32>),
    /// Engine registry has no free entries
    RegistryFull,
    /// Configured axis count is outside `1..=MAX_AXES`
    InvalidAxisCount(usize),
    /// Step pulse width must be at least one microsecond
    InvalidPulseWidth(u32),
    /// Driver enable delay exceeds `MAX_DISABLE_DELAY_US`
    InvalidDisableDelay(u32),
    /// Timer frequency is zero or too low to derive an AMASS threshold
    InvalidTimerFrequency(u32),
    /// Acceleration tick rate must be > 0
    InvalidAccelerationTicks(u32),
    /// Pin number does not fit the 32-bit output word
    InvalidPin(u8),
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

/// Step engine setup errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineError {
    /// All hardware pulse channels are allocated
    NoFreeChannel,
    /// Pin number does not exist on the output port
    InvalidPin(u8),
    /// Operation requires an initialized engine
    NotInitialized,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Engine(e) => write!(f, "Step engine error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::UnknownEngine(name) => {
                write!(f, "No step engine named '{}' is registered", name)
            }
            ConfigError::DuplicateEngine(name) => {
                write!(f, "Step engine '{}' registered twice", name)
            }
            ConfigError::RegistryFull => write!(f, "Step engine registry is full"),
            ConfigError::InvalidAxisCount(n) => {
                write!(f, "Invalid axis count: {}. Must be 1-{}", n, crate::motion::MAX_AXES)
            }
            ConfigError::InvalidPulseWidth(us) => {
                write!(f, "Invalid pulse width: {}us. Must be >= 1", us)
            }
            ConfigError::InvalidDisableDelay(us) => write!(
                f,
                "Invalid driver enable delay: {}us. Must be <= {}",
                us,
                crate::config::MAX_DISABLE_DELAY_US
            ),
            ConfigError::InvalidTimerFrequency(hz) => {
                write!(f, "Invalid step timer frequency: {}Hz", hz)
            }
            ConfigError::InvalidAccelerationTicks(v) => {
                write!(f, "Invalid acceleration ticks per second: {}. Must be > 0", v)
            }
            ConfigError::InvalidPin(pin) => write!(f, "Invalid pin number: {}. Must be 0-31", pin),
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NoFreeChannel => write!(f, "No free pulse channel"),
            EngineError::InvalidPin(pin) => write!(f, "Pin {} is not on the output port", pin),
            EngineError::NotInitialized => write!(f, "Step engine not initialized"),
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Error::Engine(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for EngineError {}
