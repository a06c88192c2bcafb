use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::transaction::ResourceManagerConfig;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub transaction: TransactionConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transaction: TransactionConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TransactionConfig {
    /// 默认事务超时（毫秒），停止时默认等待其两倍
    pub default_timeout_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: ResourceManagerConfig::DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
    pub file: String,
    pub max_file_size: u64,
    pub max_files: usize,
    /// 告警及以上级别同时输出到 stderr
    pub warnings_to_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
            file: "localtx".to_string(),
            max_file_size: 100 * 1024 * 1024, // 100MB
            max_files: 5,
            warnings_to_stderr: true,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        if config.transaction.default_timeout_ms == 0 {
            return Err("default_timeout_ms 必须大于 0".into());
        }
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl From<&Config> for ResourceManagerConfig {
    fn from(config: &Config) -> Self {
        ResourceManagerConfig::default()
            .with_default_timeout(Duration::from_millis(config.transaction.default_timeout_ms))
    }
}
