//! Interceptor configuration and named presets.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Text encoding of the source and target files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// UTF-8. Invalid sequences decode to U+FFFD.
    #[default]
    Utf8,
    /// ISO-8859-1, one byte per character.
    Latin1,
}

impl Encoding {
    /// Decode raw bytes read from the source file.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }

    /// Length of the prefix of `bytes` that can be decoded now.
    ///
    /// A UTF-8 sequence cut off at the end of `bytes` is excluded so that it
    /// can be read again once the writer finishes it. Latin-1 never splits.
    pub fn complete_len(&self, bytes: &[u8]) -> usize {
        match self {
            Encoding::Utf8 => bytes.len() - incomplete_utf8_tail(bytes),
            Encoding::Latin1 => bytes.len(),
        }
    }

    /// Encode text for writing to the sink file.
    ///
    /// Latin-1 cannot represent characters above U+00FF; those become `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
        }
    }
}

/// Number of trailing bytes forming the start of a multi-byte UTF-8
/// sequence that has not been completed yet.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            _ => Err(Error::UnsupportedEncoding(s.to_string())),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Encoding {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

/// Immutable interceptor settings.
///
/// Build one from [`Config::default`], a named preset via
/// [`Config::from_preset`], or JSON. Every path runs the same validation, so
/// a `Config` value is always in range.
///
/// # Examples
///
/// ```
/// use logtap::{Config, ConfigOverrides};
///
/// let config = Config::from_preset(
///     "aggressive",
///     ConfigOverrides {
///         buffer_size: Some(50),
///         ..Default::default()
///     },
/// )
/// .unwrap();
/// assert_eq!(config.debounce_interval(), 0.01);
/// assert_eq!(config.buffer_size(), 50);
///
/// let config: Config = serde_json::from_str(r#"{"debounce_interval": 0.25}"#).unwrap();
/// assert_eq!(config.debounce_interval(), 0.25);
/// assert_eq!(config.buffer_size(), 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConfigOverrides")]
pub struct Config {
    debounce_interval: f64,
    buffer_size: usize,
    max_file_size: Option<u64>,
    encoding: Encoding,
    follow_rotations: bool,
    retry_on_error: bool,
    retry_max_attempts: u32,
    retry_delay: f64,
}

/// Explicit field values layered over a base configuration.
///
/// `None` keeps the base value. Signed fields are signed so that negative
/// input is rejected by validation rather than by the type system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    pub debounce_interval: Option<f64>,
    pub buffer_size: Option<i64>,
    pub max_file_size: Option<u64>,
    pub encoding: Option<String>,
    pub follow_rotations: Option<bool>,
    pub retry_on_error: Option<bool>,
    pub retry_max_attempts: Option<i64>,
    pub retry_delay: Option<f64>,
}

struct Preset {
    name: &'static str,
    debounce_interval: f64,
    buffer_size: usize,
    retry_max_attempts: u32,
    retry_delay: f64,
}

const PRESETS: [Preset; 3] = [
    Preset {
        name: "aggressive",
        debounce_interval: 0.01,
        buffer_size: 10_000,
        retry_max_attempts: 5,
        retry_delay: 0.5,
    },
    Preset {
        name: "balanced",
        debounce_interval: 0.1,
        buffer_size: 1000,
        retry_max_attempts: 3,
        retry_delay: 1.0,
    },
    Preset {
        name: "conservative",
        debounce_interval: 0.5,
        buffer_size: 500,
        retry_max_attempts: 1,
        retry_delay: 2.0,
    },
];

impl Default for Config {
    fn default() -> Self {
        Config {
            debounce_interval: 0.1,
            buffer_size: 1000,
            max_file_size: None,
            encoding: Encoding::Utf8,
            follow_rotations: true,
            retry_on_error: true,
            retry_max_attempts: 3,
            retry_delay: 1.0,
        }
    }
}

impl Config {
    /// Names accepted by [`Config::from_preset`].
    pub fn preset_names() -> impl Iterator<Item = &'static str> {
        PRESETS.iter().map(|p| p.name)
    }

    /// Start from a named preset and apply `overrides` on top.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownPreset`] for an unrecognized name, or a validation
    /// error if an override is out of range.
    pub fn from_preset(name: &str, overrides: ConfigOverrides) -> Result<Self> {
        let preset = PRESETS
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::UnknownPreset {
                name: name.to_string(),
            })?;
        let base = Config {
            debounce_interval: preset.debounce_interval,
            buffer_size: preset.buffer_size,
            retry_max_attempts: preset.retry_max_attempts,
            retry_delay: preset.retry_delay,
            ..Config::default()
        };
        overrides.apply(base)
    }

    pub fn debounce_interval(&self) -> f64 {
        self.debounce_interval
    }

    /// The debounce interval as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_secs_f64(self.debounce_interval)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn follow_rotations(&self) -> bool {
        self.follow_rotations
    }

    pub fn retry_on_error(&self) -> bool {
        self.retry_on_error
    }

    pub fn retry_max_attempts(&self) -> u32 {
        self.retry_max_attempts
    }

    pub fn retry_delay(&self) -> f64 {
        self.retry_delay
    }

    /// Pause between retry attempts as a [`Duration`].
    pub fn retry_pause(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay)
    }
}

impl ConfigOverrides {
    /// Merge these overrides into `base`, validating the result.
    pub fn apply(self, base: Config) -> Result<Config> {
        let debounce_interval = self.debounce_interval.unwrap_or(base.debounce_interval);
        if !debounce_interval.is_finite() || debounce_interval < 0.0 {
            return Err(Error::InvalidConfig(
                "debounce_interval must be non-negative".to_string(),
            ));
        }

        let buffer_size = match self.buffer_size {
            Some(n) if n <= 0 => {
                return Err(Error::InvalidConfig(
                    "buffer_size must be positive".to_string(),
                ));
            }
            Some(n) => usize::try_from(n)
                .map_err(|_| Error::InvalidConfig("buffer_size is too large".to_string()))?,
            None => base.buffer_size,
        };

        let retry_max_attempts = match self.retry_max_attempts {
            Some(n) if n < 0 => {
                return Err(Error::InvalidConfig(
                    "retry_max_attempts must be non-negative".to_string(),
                ));
            }
            Some(n) => u32::try_from(n).map_err(|_| {
                Error::InvalidConfig("retry_max_attempts is too large".to_string())
            })?,
            None => base.retry_max_attempts,
        };

        let retry_delay = self.retry_delay.unwrap_or(base.retry_delay);
        if !retry_delay.is_finite() || retry_delay < 0.0 {
            return Err(Error::InvalidConfig(
                "retry_delay must be non-negative".to_string(),
            ));
        }

        let encoding = match self.encoding {
            Some(name) => name.parse()?,
            None => base.encoding,
        };

        Ok(Config {
            debounce_interval,
            buffer_size,
            max_file_size: self.max_file_size.or(base.max_file_size),
            encoding,
            follow_rotations: self.follow_rotations.unwrap_or(base.follow_rotations),
            retry_on_error: self.retry_on_error.unwrap_or(base.retry_on_error),
            retry_max_attempts,
            retry_delay,
        })
    }
}

impl TryFrom<ConfigOverrides> for Config {
    type Error = Error;

    fn try_from(overrides: ConfigOverrides) -> Result<Self> {
        overrides.apply(Config::default())
    }
}
