use serde_derive::Deserialize;

/// Logging configuration, loadable from a TOML file or an inline string.
///
/// Field names and accepted values mirror `sloggers::LoggerConfig` directly; this
/// type exists so callers can load it with `serdeconv` without depending on the
/// `sloggers` config enum's own (de)serialization quirks.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(rename = "type", default = "default_type")]
    pub kind: String,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_destination")]
    pub destination: String,
}

fn default_type() -> String {
    "terminal".to_owned()
}

fn default_level() -> String {
    "info".to_owned()
}

fn default_destination() -> String {
    "stderr".to_owned()
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            kind: default_type(),
            level: default_level(),
            destination: default_destination(),
        }
    }
}

impl LogConfig {
    /// Parse a config from an inline TOML string, e.g. the crate's own default.
    pub fn from_toml_str(raw: &str) -> Result<Self, serdeconv::Error> {
        serdeconv::from_toml_str(raw)
    }

    /// Load a config from a TOML file on disk.
    pub fn from_toml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, serdeconv::Error> {
        serdeconv::from_toml_file(path)
    }

    fn to_toml(&self) -> String {
        format!(
            "type = \"{}\"\nlevel = \"{}\"\ndestination = \"{}\"\n",
            self.kind, self.level, self.destination
        )
    }

    pub(crate) fn build(&self) -> Result<sloggers::LoggerConfig, serdeconv::Error> {
        serdeconv::from_toml_str(&self.to_toml())
    }
}
