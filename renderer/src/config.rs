use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Compiler settings. Loadable from TOML:
///
/// ```toml
/// strict_scoping = false
/// max_import_depth = 8
/// max_nesting_depth = 32
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Run `for`, `each` and context imports in isolated scopes.
    pub strict_scoping: bool,
    pub max_import_depth: usize,
    /// Deepest block nesting accepted, counted across inlined imports.
    pub max_nesting_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            strict_scoping: true,
            max_import_depth: emboss::Parser::DEFAULT_MAX_IMPORT_DEPTH,
            max_nesting_depth: emboss::Parser::DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Set one key from its textual form, as given on a command line.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let raw = raw.trim();
        match key {
            "strict_scoping" => {
                self.strict_scoping = match raw {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(ConfigError::NotBoolean {
                            key: key.to_string(),
                            value: raw.to_string(),
                        });
                    }
                };
            }
            "max_import_depth" => self.max_import_depth = parse_integer(key, raw)?,
            "max_nesting_depth" => self.max_nesting_depth = parse_integer(key, raw)?,
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }
}

fn parse_integer(key: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.parse().map_err(|_| ConfigError::NotInteger {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.strict_scoping);
        assert_eq!(config.max_import_depth, 32);
        assert_eq!(config.max_nesting_depth, 64);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml_str("strict_scoping = false").unwrap();
        assert!(!config.strict_scoping);
        assert_eq!(config.max_import_depth, 32);
        assert!(matches!(Config::from_toml_str("colour = 1"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn set_rejects_non_boolean_scoping() {
        let mut config = Config::default();
        config.set("strict_scoping", "false").unwrap();
        assert!(!config.strict_scoping);
        let err = config.set("strict_scoping", "yes").unwrap_err();
        assert_eq!(err.to_string(), "strict_scoping must be boolean, got 'yes'");
        assert!(matches!(config.set("depth", "1"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_nesting_depth() {
        let mut config = Config::default();
        config.set("max_nesting_depth", " 8 ").unwrap();
        assert_eq!(config.max_nesting_depth, 8);
        assert!(matches!(
            config.set("max_nesting_depth", "deep"),
            Err(ConfigError::NotInteger { .. })
        ));
        assert_eq!(config.max_nesting_depth, 8);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_import_depth = 4").unwrap();
        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.max_import_depth, 4);
        assert!(matches!(
            Config::load_from_path(Path::new("/nonexistent/emboss.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
