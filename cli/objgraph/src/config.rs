//! `--config` file parsing.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use objgraph::{ChecksumPolicy, CodecConfig, ResolvePolicy};

/// Top-level configuration file. Unknown tables are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub codec: CodecConfig,
}

impl ConfigFile {
    pub fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing codec configuration")
    }
}

/// Resolve the effective codec settings. `--strict` overrides both policies
/// from the file.
pub fn load(path: Option<&Path>, strict: bool) -> Result<CodecConfig> {
    let mut codec = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ConfigFile::from_str(&text)
                .with_context(|| format!("in {}", path.display()))?
                .codec
        }
        None => CodecConfig::default(),
    };
    if strict {
        codec.checksum = ChecksumPolicy::Strict;
        codec.resolve = ResolvePolicy::strict();
    }
    Ok(codec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_codec_table() {
        let file = ConfigFile::from_str(
            r#"
[codec]
max_depth = 50
checksum = "strict"
compression_level = 9

[codec.resolve]
max_unresolved = 3
"#,
        )
        .unwrap();
        assert_eq!(file.codec.max_depth, 50);
        assert_eq!(file.codec.checksum, ChecksumPolicy::Strict);
        assert_eq!(file.codec.compression_level, 9);
        assert_eq!(file.codec.resolve.max_unresolved, Some(3));
        assert_eq!(file.codec.resolve.max_write_failures, None);
    }

    #[test]
    fn missing_table_is_default() {
        let file = ConfigFile::from_str("[other]\nkey = 1\n").unwrap();
        assert_eq!(file.codec, CodecConfig::default());
    }

    #[test]
    fn bad_policy_rejected() {
        assert!(ConfigFile::from_str("[codec]\nchecksum = \"sometimes\"\n").is_err());
    }

    #[test]
    fn strict_flag_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objgraph.toml");
        fs::write(&path, "[codec]\nchecksum = \"lenient\"\nmax_depth = 7\n").unwrap();

        let codec = load(Some(&path), true).unwrap();
        assert_eq!(codec.checksum, ChecksumPolicy::Strict);
        assert_eq!(codec.resolve, ResolvePolicy::strict());
        assert_eq!(codec.max_depth, 7);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("nope.toml")), false).is_err());
    }
}
