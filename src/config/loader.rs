//! Machine configuration from TOML (std only).

use std::fs;
use std::path::Path;

use heapless::String;

use crate::error::{ConfigError, Error, Result};

use super::SystemConfig;

/// Longest prefix of `text` that fits `N` bytes without splitting a character.
fn truncated<const N: usize>(text: &str) -> String<N> {
    let mut end = text.len().min(N);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::new();
    let _ = out.push_str(&text[..end]);
    out
}

/// Read and validate a machine configuration file.
///
/// # Errors
///
/// Returns `IoError` if the file cannot be read, `ParseError` if it is not
/// a valid `[stepping]`/`[[axes]]` document, or the validation error.
///
/// # Example
///
/// ```rust,ignore
/// use stepper_segments::load_config;
///
/// let config = load_config("machine.toml")?;
/// let engine = registry.take(config.engine_name())?;
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SystemConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        let msg = format!("{}: {}", path.display(), e);
        Error::Config(ConfigError::IoError(truncated(&msg)))
    })?;

    parse_config(&content)
}

/// Parse and validate a machine configuration document.
///
/// # Errors
///
/// Returns `ParseError` with the TOML error message, or the validation error.
pub fn parse_config(content: &str) -> Result<SystemConfig> {
    let config: SystemConfig = toml::from_str(content)
        .map_err(|e| Error::Config(ConfigError::ParseError(truncated(e.message()))))?;

    super::validation::validate_config(&config)?;
    Ok(config)
}
