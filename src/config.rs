//! Harness configuration.
//!
//! Loadable from an optional TOML file via the `config` crate; every field
//! is also overridable from the CLI. Precedence: CLI flag > file value >
//! built-in default (§1a, §6a).

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[clap(rename_all = "kebab-case")]
pub enum Rideable {
    OfDeque,
    MmDeque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[clap(rename_all = "kebab-case")]
pub enum TestKind {
    QueueVerify,
    StackVerify,
    Potato,
    InsertRemove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[clap(rename_all = "kebab-case")]
pub enum AccessType {
    Queue,
    Stack,
    Random,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub rideable: Rideable,
    pub test: TestKind,
    pub threads: usize,
    pub seconds: u64,
    pub buffer_size: usize,
    pub elimination: bool,
    pub access_type: AccessType,
    pub log_level: String,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rideable: Rideable::OfDeque,
            test: TestKind::InsertRemove,
            threads: 4,
            seconds: 5,
            buffer_size: 1024,
            elimination: false,
            access_type: AccessType::Random,
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// Mirror of [`Config`] with every field optional, the shape a partially
/// filled TOML file or a partially specified CLI invocation deserializes
/// into. `merge` applies only the fields that are `Some`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PartialConfig {
    pub rideable: Option<Rideable>,
    pub test: Option<TestKind>,
    pub threads: Option<usize>,
    pub seconds: Option<u64>,
    pub buffer_size: Option<usize>,
    pub elimination: Option<bool>,
    pub access_type: Option<AccessType>,
    pub log_level: Option<String>,
    pub json: Option<bool>,
}

impl Config {
    #[must_use]
    pub fn merge(mut self, partial: PartialConfig) -> Self {
        if let Some(v) = partial.rideable {
            self.rideable = v;
        }
        if let Some(v) = partial.test {
            self.test = v;
        }
        if let Some(v) = partial.threads {
            self.threads = v;
        }
        if let Some(v) = partial.seconds {
            self.seconds = v;
        }
        if let Some(v) = partial.buffer_size {
            self.buffer_size = v;
        }
        if let Some(v) = partial.elimination {
            self.elimination = v;
        }
        if let Some(v) = partial.access_type {
            self.access_type = v;
        }
        if let Some(v) = partial.log_level {
            self.log_level = v;
        }
        if let Some(v) = partial.json {
            self.json = v;
        }
        self
    }

    /// Errors
    /// Returns [`ConfigError::Load`] if `path` is given and the file can't
    /// be read or doesn't deserialize into [`PartialConfig`].
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(path) = path {
            let built = config::Config::builder()
                .add_source(config::File::with_name(path))
                .build()
                .map_err(|source| ConfigError::Load { path: path.to_string(), source })?;
            let partial: PartialConfig = built
                .try_deserialize()
                .map_err(|source| ConfigError::Load { path: path.to_string(), source })?;
            cfg = cfg.merge(partial);
        }
        Ok(cfg)
    }

    /// Errors
    /// Returns a [`ConfigError`] describing the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if ![512, 1024, 4096, 8192].contains(&self.buffer_size) {
            return Err(ConfigError::InvalidBufferSize(self.buffer_size));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_threads_is_rejected() {
        let cfg = Config { threads: 0, ..Config::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroThreads)));
    }

    #[test]
    fn bad_buffer_size_is_rejected() {
        let cfg = Config { buffer_size: 777, ..Config::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidBufferSize(777))));
    }

    #[test]
    fn merge_overrides_only_present_fields() {
        let cfg = Config::default().merge(PartialConfig {
            threads: Some(16),
            ..PartialConfig::default()
        });
        assert_eq!(cfg.threads, 16);
        assert_eq!(cfg.buffer_size, Config::default().buffer_size);
    }
}
