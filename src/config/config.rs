use anyhow::{Context, Result};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::capture::ExportOrder;

pub const DEFAULT_SELECTOR: &str = "img.TurntablePistolViewer_viewer__Bl1_D";
pub const DEFAULT_PAGE_URL: &str =
    "https://us.glock.com/en/products/commercial-firearms/pistols/g19-gen6";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub selector: String,
    #[serde(default = "default_attribute")]
    pub attribute: String,
    pub page_url: String,
}

impl fmt::Display for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "selector={}, attribute={}, page={}",
            self.selector, self.attribute, self.page_url
        )
    }
}

fn default_attribute() -> String {
    "src".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub ordering: ExportOrder,
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_pretty() -> bool {
    true
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ordering: ExportOrder::None,
            pretty: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// 从指定路径加载配置
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise the default location if a file
    /// exists there, otherwise built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }

        match Self::default_config_path() {
            Ok(default_path) if default_path.exists() => Self::load_from(default_path),
            _ => Ok(Self::default()),
        }
    }

    /// 获取默认配置文件路径
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("无法获取配置目录")?
            .join("turntable-capture");
        Ok(config_dir.join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.selector.trim().is_empty() {
            anyhow::bail!("target.selector must not be empty");
        }
        if let Err(e) = Selector::parse(&self.target.selector) {
            anyhow::bail!("target.selector `{}` is invalid: {}", self.target.selector, e);
        }
        if self.target.attribute.trim().is_empty() {
            anyhow::bail!("target.attribute must not be empty");
        }
        Url::parse(&self.target.page_url)
            .with_context(|| format!("target.page_url `{}` is not absolute", self.target.page_url))?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: TargetConfig {
                selector: DEFAULT_SELECTOR.to_string(),
                attribute: default_attribute(),
                page_url: DEFAULT_PAGE_URL.to_string(),
            },
            export: ExportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config() {
        let config = Config::load_from("config/config.example.toml").unwrap();
        assert_eq!(config.target.selector, DEFAULT_SELECTOR);
        assert_eq!(config.target.attribute, "src");
        assert_eq!(config.export.ordering, ExportOrder::None);
        assert!(config.export.pretty);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[target]
selector = "img.viewer"
page_url = "https://shop.example.com/p/1"

[export]
ordering = "numeric-suffix"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.target.attribute, "src");
        assert_eq!(config.export.ordering, ExportOrder::NumericSuffix);
        assert!(config.export.pretty);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load_from("/nonexistent/config.toml").is_err());
    }

    #[test]
    fn test_load_explicit_path_wins() {
        assert!(Config::load_or_default(Some(Path::new("/nonexistent/config.toml"))).is_err());
    }

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_selector() {
        let mut config = Config::default();
        config.target.selector = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_selector() {
        let mut config = Config::default();
        config.target.selector = "img[".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_attribute() {
        let mut config = Config::default();
        config.target.attribute = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_relative_page_url() {
        let mut config = Config::default();
        config.target.page_url = "/products/g19".to_string();
        assert!(config.validate().is_err());
    }
}
