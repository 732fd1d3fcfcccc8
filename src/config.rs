use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::mangler::MangleMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Emit minified output instead of the beautiful form.
    pub minify: bool,

    /// Identifier shortening mode, applied only on the minify pipeline.
    pub mangle: MangleMode,

    /// Textual substitutions applied to each module source before any
    /// parsing. Insertion order is kept, but correct usage must not depend
    /// on it.
    pub define: IndexMap<String, String>,
}

impl Config {
    /// Load configuration from an explicit path, or from `luapack.toml` in
    /// the current directory when present. Missing config is not an error.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_file = config_path.map(|p| p.to_path_buf()).or_else(|| {
            let path = PathBuf::from("luapack.toml");
            if path.exists() { Some(path) } else { None }
        });

        if let Some(config_file) = config_file {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("failed to read config file: {:?}", config_file))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {:?}", config_file))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.minify);
        assert_eq!(config.mangle, MangleMode::None);
        assert!(config.define.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            "minify = true\nmangle = \"auto\"\n\n[define]\nVERSION = \"\\\"1.2\\\"\"\nDEBUG = \"false\"\n",
        )
        .unwrap();
        assert!(config.minify);
        assert_eq!(config.mangle, MangleMode::Auto);
        assert_eq!(config.define["VERSION"], "\"1.2\"");
        assert_eq!(config.define["DEBUG"], "false");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(None).unwrap();
        assert!(!config.minify);
    }
}
