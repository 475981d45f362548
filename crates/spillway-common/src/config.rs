//! Spill configuration.
//!
//! [`SpillConfig`] is built once and handed to the collection constructors.
//! The `with_*` methods return modified copies, so a config shared between
//! several collections can never change under them.
//!
//! For callers that carry options in a string-keyed property bag, the
//! [`SpillConfig::from_properties`] and [`SpillConfig::to_properties`]
//! conversions translate at the boundary using the `spill.*` keys below.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Whether spilled segments are compressed (`true`/`false`).
pub const SPILL_COMPRESS: &str = "spill.compress";
/// Comma-delimited codec names to try, in order.
pub const SPILL_CODECS: &str = "spill.codecs";
/// Tuples a list holds in memory before spilling.
pub const LIST_THRESHOLD: &str = "spill.list.threshold";
/// Tuples a map holds in memory, summed over all partitions.
pub const MAP_THRESHOLD: &str = "spill.map.threshold";
/// Initial capacity of a map's key table.
pub const MAP_CAPACITY: &str = "spill.map.capacity";
/// Load factor of a map's key table.
pub const MAP_LOADFACTOR: &str = "spill.map.loadfactor";
/// Which partition a map spills when over its threshold.
pub const MAP_POLICY: &str = "spill.map.policy";
/// Directory under which spill files are created.
pub const SPILL_DIR: &str = "spill.dir";

/// Default in-memory tuple cap for a list.
pub const DEFAULT_LIST_THRESHOLD: usize = 10 * 1000;
/// Default aggregate in-memory tuple cap for a map.
pub const DEFAULT_MAP_THRESHOLD: usize = 10 * 1000;
/// Default initial capacity of a map's key table.
pub const DEFAULT_MAP_INITIAL_CAPACITY: usize = 100 * 1000;
/// Default load factor of a map's key table.
pub const DEFAULT_MAP_LOAD_FACTOR: f32 = 0.75;

/// Errors from [`SpillConfig::validate()`] and property parsing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// List spill threshold must be greater than zero.
    #[error("list spill threshold must be greater than zero")]
    ZeroListThreshold,
    /// Map spill threshold must be greater than zero.
    #[error("map spill threshold must be greater than zero")]
    ZeroMapThreshold,
    /// Load factor must be finite and positive.
    #[error("map load factor must be finite and positive, was {0}")]
    InvalidLoadFactor(f32),
    /// A property value could not be parsed.
    #[error("invalid value {value:?} for property {key}")]
    InvalidProperty {
        /// Property key.
        key: String,
        /// Offending value.
        value: String,
    },
}

/// Which partition a spillable map flushes when its aggregate in-memory
/// count exceeds the map threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionSpillPolicy {
    /// The partition whose most recent append is the oldest.
    #[default]
    LeastRecentlyAppended,
    /// The partition with the most buffered tuples; ties go to the partition
    /// created first.
    LargestBuffer,
}

impl PartitionSpillPolicy {
    /// Returns the property-bag name of the policy.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LeastRecentlyAppended => "least_recently_appended",
            Self::LargestBuffer => "largest_buffer",
        }
    }
}

impl fmt::Display for PartitionSpillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionSpillPolicy {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "least_recently_appended" | "lra" => Ok(Self::LeastRecentlyAppended),
            "largest_buffer" | "largest" => Ok(Self::LargestBuffer),
            _ => Err(()),
        }
    }
}

/// Configuration for spillable tuple lists and maps.
///
/// # Examples
///
/// ```
/// use spillway_common::SpillConfig;
///
/// let config = SpillConfig::default()
///     .with_list_threshold(1_000)
///     .with_codec("lz4");
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpillConfig {
    /// Whether new spill segments are compressed.
    pub compress: bool,

    /// Codec names to try, first usable wins.
    pub codecs: Vec<String>,

    /// In-memory tuples per list before a spill.
    pub list_threshold: usize,

    /// Aggregate in-memory tuples per map before a partition is spilled.
    pub map_threshold: usize,

    /// Initial capacity of a map's key table.
    pub map_initial_capacity: usize,

    /// Load factor of a map's key table.
    pub map_load_factor: f32,

    /// Parent directory for spill files. `None` uses the system temp dir.
    pub spill_dir: Option<PathBuf>,

    /// Partition selection when a map overflows.
    pub spill_policy: PartitionSpillPolicy,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            compress: true,
            codecs: Vec::new(),
            list_threshold: DEFAULT_LIST_THRESHOLD,
            map_threshold: DEFAULT_MAP_THRESHOLD,
            map_initial_capacity: DEFAULT_MAP_INITIAL_CAPACITY,
            map_load_factor: DEFAULT_MAP_LOAD_FACTOR,
            spill_dir: None,
            spill_policy: PartitionSpillPolicy::default(),
        }
    }
}

impl SpillConfig {
    /// Enables or disables compression of new segments.
    #[must_use]
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Replaces the codec candidate list.
    #[must_use]
    pub fn with_codecs<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codecs = codecs.into_iter().map(Into::into).collect();
        self
    }

    /// Appends codec candidates after the ones already listed, keeping
    /// their order. Names already present are not repeated.
    #[must_use]
    pub fn with_additional_codecs<I, S>(mut self, codecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for codec in codecs {
            let codec = codec.into();
            if !self.codecs.contains(&codec) {
                self.codecs.push(codec);
            }
        }
        self
    }

    /// Appends one codec candidate.
    #[must_use]
    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codecs.push(codec.into());
        self
    }

    /// Sets the per-list spill threshold.
    #[must_use]
    pub fn with_list_threshold(mut self, threshold: usize) -> Self {
        self.list_threshold = threshold;
        self
    }

    /// Sets the per-map aggregate spill threshold.
    #[must_use]
    pub fn with_map_threshold(mut self, threshold: usize) -> Self {
        self.map_threshold = threshold;
        self
    }

    /// Sets the initial capacity of a map's key table.
    #[must_use]
    pub fn with_map_initial_capacity(mut self, capacity: usize) -> Self {
        self.map_initial_capacity = capacity;
        self
    }

    /// Sets the load factor of a map's key table.
    #[must_use]
    pub fn with_map_load_factor(mut self, load_factor: f32) -> Self {
        self.map_load_factor = load_factor;
        self
    }

    /// Sets the parent directory for spill files.
    #[must_use]
    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    /// Sets the partition spill policy.
    #[must_use]
    pub fn with_spill_policy(mut self, policy: PartitionSpillPolicy) -> Self {
        self.spill_policy = policy;
        self
    }

    /// Validates the configuration.
    ///
    /// Thresholds of zero are rejected rather than rounded up.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any setting is invalid.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.list_threshold == 0 {
            return Err(ConfigError::ZeroListThreshold);
        }
        if self.map_threshold == 0 {
            return Err(ConfigError::ZeroMapThreshold);
        }
        if !self.map_load_factor.is_finite() || self.map_load_factor <= 0.0 {
            return Err(ConfigError::InvalidLoadFactor(self.map_load_factor));
        }
        Ok(())
    }

    /// Number of keys a map reserves room for up front.
    ///
    /// A table of `map_initial_capacity` slots grows once it is
    /// `map_load_factor` full, so that many keys fit before any rehash.
    #[must_use]
    pub fn map_capacity_hint(&self) -> usize {
        (self.map_initial_capacity as f64 * f64::from(self.map_load_factor)).ceil() as usize
    }

    /// Builds a validated configuration from `spill.*` properties on top of
    /// the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidProperty`] for an unparsable value, or
    /// any [`validate`](Self::validate) failure.
    pub fn from_properties<I, K, V>(properties: I) -> std::result::Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::default().apply_properties(properties)
    }

    /// Overlays `spill.*` properties on this configuration and validates the
    /// result. Keys outside the `spill.*` set are ignored.
    ///
    /// `spill.codecs` replaces the candidate list like every other key; use
    /// [`with_additional_codecs`](Self::with_additional_codecs) to extend it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidProperty`] for an unparsable value, or
    /// any [`validate`](Self::validate) failure.
    pub fn apply_properties<I, K, V>(mut self, properties: I) -> std::result::Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in properties {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                SPILL_COMPRESS => self.compress = parse_bool(key, value)?,
                SPILL_CODECS => {
                    self.codecs = value
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                LIST_THRESHOLD => self.list_threshold = parse(key, value)?,
                MAP_THRESHOLD => self.map_threshold = parse(key, value)?,
                MAP_CAPACITY => self.map_initial_capacity = parse(key, value)?,
                MAP_LOADFACTOR => self.map_load_factor = parse(key, value)?,
                MAP_POLICY => {
                    self.spill_policy = value.parse().map_err(|()| invalid(key, value))?;
                }
                SPILL_DIR => self.spill_dir = Some(PathBuf::from(value)),
                _ => {}
            }
        }

        self.validate()?;
        Ok(self)
    }

    /// Renders this configuration as `spill.*` properties.
    ///
    /// The codec list is omitted when empty, and the spill directory when
    /// unset.
    #[must_use]
    pub fn to_properties(&self) -> Vec<(&'static str, String)> {
        let mut props = Vec::with_capacity(8);
        if !self.codecs.is_empty() {
            props.push((SPILL_CODECS, self.codecs.join(",")));
        }
        props.push((SPILL_COMPRESS, self.compress.to_string()));
        props.push((LIST_THRESHOLD, self.list_threshold.to_string()));
        props.push((MAP_THRESHOLD, self.map_threshold.to_string()));
        props.push((MAP_CAPACITY, self.map_initial_capacity.to_string()));
        props.push((MAP_LOADFACTOR, self.map_load_factor.to_string()));
        props.push((MAP_POLICY, self.spill_policy.to_string()));
        if let Some(dir) = &self.spill_dir {
            props.push((SPILL_DIR, dir.display().to_string()));
        }
        props
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidProperty {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> std::result::Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> std::result::Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}
