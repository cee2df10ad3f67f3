//! Process configuration.
//!
//! [`Settings`] is built once at start-up (from an optional YAML file plus
//! command-line overrides) and handed to the pipeline by reference. Keyword
//! tables are resolved here so every upload sees the same immutable tables.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::matcher::KeywordTable;

pub const DEFAULT_STORE_DIR: &str = ".esg-rollup";
pub const DEFAULT_COMPLETER_TIMEOUT_SECS: u64 = 60;

/// On-disk shape of the settings file. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    pub store_dir: Option<PathBuf>,
    pub completer: Option<CompleterSettings>,
    pub keywords: KeywordOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CompleterSettings {
    /// Program and arguments; the program receives a JSON request on stdin.
    pub command: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_COMPLETER_TIMEOUT_SECS
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct KeywordOverrides {
    pub environmental: BTreeMap<String, Vec<String>>,
    pub financial: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub store_dir: PathBuf,
    pub completer_command: Option<Vec<String>>,
    pub completer_timeout: Duration,
    environmental: KeywordTable,
    financial: KeywordTable,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            completer_command: None,
            completer_timeout: Duration::from_secs(DEFAULT_COMPLETER_TIMEOUT_SECS),
            environmental: KeywordTable::environmental(),
            financial: KeywordTable::financial(),
        }
    }
}

impl Settings {
    pub fn from_file(file: SettingsFile) -> Result<Self> {
        let mut settings = Settings::default();
        if let Some(dir) = file.store_dir {
            settings.store_dir = dir;
        }
        if let Some(completer) = file.completer {
            ensure!(
                !completer.command.is_empty(),
                "completer.command must name a program"
            );
            ensure!(
                completer.timeout_secs > 0,
                "completer.timeout_secs must be greater than zero"
            );
            settings.completer_command = Some(completer.command);
            settings.completer_timeout = Duration::from_secs(completer.timeout_secs);
        }
        settings.environmental = settings
            .environmental
            .with_overrides(&file.keywords.environmental);
        settings.financial = settings.financial.with_overrides(&file.keywords.financial);
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Opening settings file {path:?}"))?;
        let file: SettingsFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("Parsing settings file {path:?}"))?;
        Self::from_file(file)
    }

    /// Loads `path` when given, otherwise starts from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn environmental_keywords(&self) -> &KeywordTable {
        &self.environmental
    }

    pub fn financial_keywords(&self) -> &KeywordTable {
        &self.financial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_file_overrides_defaults() {
        let yaml = r#"
store_dir: /tmp/esg-state
completer:
  command: ["python3", "fill.py"]
  timeout_secs: 5
keywords:
  environmental:
    energy: ["mwh", "kwh"]
"#;
        let file: SettingsFile = serde_yaml::from_str(yaml).unwrap();
        let settings = Settings::from_file(file).unwrap();
        assert_eq!(settings.store_dir, PathBuf::from("/tmp/esg-state"));
        assert_eq!(settings.completer_timeout, Duration::from_secs(5));
        assert_eq!(
            settings.completer_command.as_deref(),
            Some(["python3".to_string(), "fill.py".to_string()].as_slice())
        );
        assert_eq!(
            settings.environmental_keywords().keywords("energy").unwrap(),
            ["mwh", "kwh"]
        );
        assert_eq!(
            settings.financial_keywords(),
            &KeywordTable::financial()
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = serde_yaml::from_str::<SettingsFile>("storage: x\n").unwrap_err();
        assert!(err.to_string().contains("storage"));
    }

    #[test]
    fn empty_completer_command_is_an_error() {
        let file = SettingsFile {
            completer: Some(CompleterSettings {
                command: vec![],
                timeout_secs: 10,
            }),
            ..SettingsFile::default()
        };
        assert!(Settings::from_file(file).is_err());
    }
}
