//! Spill configuration from a JSON file plus `--set` overrides.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use spillway_common::SpillConfig;

/// Parses a `KEY=VALUE` argument.
pub fn parse_property(arg: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{arg}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property key in `{arg}`"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Builds the configuration: defaults, then the file, then overrides.
pub fn load(path: Option<&Path>, properties: &[(String, String)]) -> Result<SpillConfig> {
    let base = match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("cannot open config file {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => SpillConfig::default(),
    };

    let config = base
        .apply_properties(properties.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .context("invalid spill configuration")?;

    tracing::debug!(?config, "loaded spill configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spillway_common::PartitionSpillPolicy;
    use std::io::Write;

    #[test]
    fn test_parse_property() {
        assert_eq!(
            parse_property("spill.list.threshold = 5").unwrap(),
            ("spill.list.threshold".to_string(), "5".to_string())
        );
        assert_eq!(
            parse_property("spill.codecs=zstd,lz4").unwrap().1,
            "zstd,lz4"
        );
        assert!(parse_property("no-equals").is_err());
        assert!(parse_property("=1").is_err());
    }

    #[test]
    fn test_overrides_apply_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"list_threshold": 7, "spill_policy": "largest_buffer"}}"#).unwrap();

        let props = vec![("spill.map.threshold".to_string(), "9".to_string())];
        let config = load(Some(file.path()), &props).unwrap();

        assert_eq!(config.list_threshold, 7);
        assert_eq!(config.map_threshold, 9);
        assert_eq!(config.spill_policy, PartitionSpillPolicy::LargestBuffer);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let props = vec![("spill.list.threshold".to_string(), "0".to_string())];
        assert!(load(None, &props).is_err());
    }
}
