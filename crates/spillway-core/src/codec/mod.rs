//! Compression codecs for spill segments.
//!
//! Which codecs exist depends on how the crate was built: each one sits
//! behind a cargo feature, and a codec that was compiled out still has a
//! name but probes as [`CodecAvailability::Unavailable`]. Callers therefore
//! pass an ordered list of candidate names and take the first one that
//! resolves.
//!
//! | Name | Aliases | Feature | Notes |
//! |------|---------|---------|-------|
//! | `lz4` | `lz4-frame`, `lz4_flex` | `lz4` (default) | Fast, moderate ratio |
//! | `zstd` | `zstandard` | `zstd` | Better ratio, slower |
//!
//! Resolution never fails: unknown or unavailable names are skipped, and if
//! nothing resolves (or compression is disabled) segments are written
//! uncompressed.

mod stream;

pub use stream::{CodecReader, CodecWriter};

use std::fmt;

/// Zstd compression level used for spills. Spills favour speed.
pub(crate) const ZSTD_LEVEL: i32 = 1;

/// A compression codec that can encode spill segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpillCodec {
    /// LZ4 frame format.
    Lz4,
    /// Zstandard streaming format.
    Zstd,
}

impl SpillCodec {
    /// Returns the canonical name of the codec.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    /// Returns the tag written into segment headers.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Lz4 => 1,
            Self::Zstd => 2,
        }
    }

    /// Maps a segment-header tag back to a codec. Tag 0 means uncompressed.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Option<Self>> {
        match tag {
            0 => Some(None),
            1 => Some(Some(Self::Lz4)),
            2 => Some(Some(Self::Zstd)),
            _ => None,
        }
    }

    /// Returns whether this build can encode and decode the codec.
    #[must_use]
    pub const fn is_compiled_in(&self) -> bool {
        match self {
            Self::Lz4 => cfg!(feature = "lz4"),
            Self::Zstd => cfg!(feature = "zstd"),
        }
    }
}

impl fmt::Display for SpillCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of probing a codec name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecAvailability {
    /// The codec can be used.
    Available(SpillCodec),
    /// The name is unknown, or its implementation is not in this build.
    Unavailable,
}

impl CodecAvailability {
    /// Returns the codec if available.
    #[must_use]
    pub const fn codec(&self) -> Option<SpillCodec> {
        match self {
            Self::Available(codec) => Some(*codec),
            Self::Unavailable => None,
        }
    }

    fn probe(codec: SpillCodec) -> Self {
        if codec.is_compiled_in() {
            Self::Available(codec)
        } else {
            Self::Unavailable
        }
    }
}

/// Name-to-codec lookup table.
///
/// Resolution is deterministic for a given registry and candidate list.
///
/// # Examples
///
/// ```
/// use spillway_core::codec::CodecRegistry;
///
/// let registry = CodecRegistry::builtin();
/// // Unknown names are skipped, not fatal.
/// let codec = registry.resolve(&["snappy", "gzip"], true);
/// assert!(codec.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    /// Normalized name and probe result, in registration order.
    entries: Vec<(String, CodecAvailability)>,
}

impl CodecRegistry {
    /// Creates a registry that knows no codecs.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a registry with the codecs this crate ships.
    #[must_use]
    pub fn builtin() -> Self {
        let lz4 = CodecAvailability::probe(SpillCodec::Lz4);
        let zstd = CodecAvailability::probe(SpillCodec::Zstd);

        let mut registry = Self::empty();
        for name in ["lz4", "lz4-frame", "lz4_flex"] {
            registry.register(name, lz4);
        }
        for name in ["zstd", "zstandard"] {
            registry.register(name, zstd);
        }
        registry
    }

    /// Registers (or replaces) the probe result for a name.
    ///
    /// Registering [`CodecAvailability::Unavailable`] hides a codec, which is
    /// how environments without a given implementation are simulated.
    pub fn register(&mut self, name: &str, availability: CodecAvailability) {
        let name = normalize(name);
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = availability,
            None => self.entries.push((name, availability)),
        }
    }

    /// Probes a single codec name. Matching ignores case and surrounding
    /// whitespace.
    #[must_use]
    pub fn probe(&self, name: &str) -> CodecAvailability {
        let name = normalize(name);
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map_or(CodecAvailability::Unavailable, |(_, availability)| *availability)
    }

    /// Returns the first usable codec among `names`, or `None` when
    /// compression is disabled or nothing resolves.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S], enabled: bool) -> Option<SpillCodec> {
        if !enabled {
            tracing::debug!("spill compression disabled");
            return None;
        }

        for name in names {
            let name = name.as_ref();
            match self.probe(name) {
                CodecAvailability::Available(codec) => {
                    tracing::info!(codec = codec.name(), requested = name, "resolved spill codec");
                    return Some(codec);
                }
                CodecAvailability::Unavailable => {
                    tracing::warn!(codec = name, "spill codec unavailable, skipping");
                }
            }
        }

        if !names.is_empty() {
            tracing::info!("no spill codec resolved, spills are uncompressed");
        }
        None
    }

    /// Iterates over registered names and their probe results.
    pub fn entries(&self) -> impl Iterator<Item = (&str, CodecAvailability)> {
        self.entries.iter().map(|(n, a)| (n.as_str(), *a))
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for codec in [SpillCodec::Lz4, SpillCodec::Zstd] {
            assert_eq!(SpillCodec::from_tag(codec.tag()), Some(Some(codec)));
        }
        assert_eq!(SpillCodec::from_tag(0), Some(None));
        assert_eq!(SpillCodec::from_tag(9), None);
    }

    #[test]
    fn test_unknown_names_are_skipped() {
        let registry = CodecRegistry::builtin();
        assert_eq!(registry.probe("org.example.Bogus"), CodecAvailability::Unavailable);
        assert_eq!(registry.resolve(&["bogus", "also-bogus"], true), None);
    }

    #[test]
    fn test_disabled_ignores_candidates() {
        let mut registry = CodecRegistry::empty();
        registry.register("fake", CodecAvailability::Available(SpillCodec::Lz4));
        assert_eq!(registry.resolve(&["fake"], false), None);
        assert_eq!(registry.resolve(&["fake"], true), Some(SpillCodec::Lz4));
    }

    #[test]
    fn test_first_available_wins() {
        let mut registry = CodecRegistry::empty();
        registry.register("a", CodecAvailability::Unavailable);
        registry.register("b", CodecAvailability::Available(SpillCodec::Zstd));
        registry.register("c", CodecAvailability::Available(SpillCodec::Lz4));

        assert_eq!(registry.resolve(&["a", "b", "c"], true), Some(SpillCodec::Zstd));
        assert_eq!(registry.resolve(&["c", "b"], true), Some(SpillCodec::Lz4));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = CodecRegistry::builtin();
        registry.register("LZ4", CodecAvailability::Unavailable);
        assert_eq!(registry.probe("lz4"), CodecAvailability::Unavailable);
        assert_eq!(registry.entries().filter(|(n, _)| *n == "lz4").count(), 1);
    }

    #[test]
    fn test_probe_normalizes() {
        let registry = CodecRegistry::builtin();
        assert_eq!(registry.probe("  ZSTD "), registry.probe("zstd"));
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_builtin_lz4() {
        let registry = CodecRegistry::builtin();
        assert_eq!(
            registry.probe("lz4-frame"),
            CodecAvailability::Available(SpillCodec::Lz4)
        );
        assert_eq!(
            registry.resolve(&["bogus", "lz4"], true),
            Some(SpillCodec::Lz4)
        );
    }

    #[cfg(not(feature = "zstd"))]
    #[test]
    fn test_compiled_out_codec_is_unavailable() {
        let registry = CodecRegistry::builtin();
        assert_eq!(registry.probe("zstd"), CodecAvailability::Unavailable);
    }

    #[test]
    fn test_availability_codec() {
        assert_eq!(
            CodecAvailability::Available(SpillCodec::Zstd).codec(),
            Some(SpillCodec::Zstd)
        );
        assert_eq!(CodecAvailability::Unavailable.codec(), None);
    }
}
