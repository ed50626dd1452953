//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 网络配置
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    // 本地缓存与存储
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_storage_file")]
    pub storage_file: String,

    // 交互节奏
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
    #[serde(default = "default_progress_save_interval_ms")]
    pub progress_save_interval_ms: u64,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            cache_ttl_secs: default_cache_ttl_secs(),
            storage_file: default_storage_file(),
            search_debounce_ms: default_search_debounce_ms(),
            progress_save_interval_ms: default_progress_save_interval_ms(),
            base_dir: None,
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 7] = [
            FieldMeta {
                name: "api_base_url",
                description: "后端 API 根地址（包含 /api 前缀）",
            },
            FieldMeta {
                name: "request_timeout",
                description: "请求超时时间（秒）",
            },
            FieldMeta {
                name: "connect_timeout",
                description: "连接超时时间（秒）",
            },
            FieldMeta {
                name: "cache_ttl_secs",
                description: "本地读缓存有效期（秒）",
            },
            FieldMeta {
                name: "storage_file",
                description: "本地键值存储文件（相对路径基于数据目录）",
            },
            FieldMeta {
                name: "search_debounce_ms",
                description: "搜索输入防抖间隔（毫秒）",
            },
            FieldMeta {
                name: "progress_save_interval_ms",
                description: "阅读进度最短保存间隔（毫秒）",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "api_base_url must be an http(s) url, got '{base}'"
            )));
        }
        let positives = [
            ("request_timeout", self.request_timeout),
            ("connect_timeout", self.connect_timeout),
            ("cache_ttl_secs", self.cache_ttl_secs),
            ("search_debounce_ms", self.search_debounce_ms),
            ("progress_save_interval_ms", self.progress_save_interval_ms),
        ];
        if let Some((name, _)) = positives.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Validation(format!("{name} must be > 0")));
        }
        if self.storage_file.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// 记录数据目录，用于解析相对路径的存储文件。
    pub fn with_base_dir(mut self, dir: Option<&Path>) -> Self {
        self.base_dir = dir.map(Path::to_path_buf);
        self
    }

    pub fn storage_path(&self) -> PathBuf {
        let file = PathBuf::from(self.storage_file.trim());
        match &self.base_dir {
            Some(base) if file.is_relative() => base.join(file),
            _ => file,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn progress_save_interval(&self) -> Duration {
        Duration::from_millis(self.progress_save_interval_ms)
    }
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_cache_ttl_secs() -> u64 {
    5 * 60
}

fn default_storage_file() -> String {
    "cloud_storage.json".to_string()
}

fn default_search_debounce_ms() -> u64 {
    300
}

fn default_progress_save_interval_ms() -> u64 {
    5000
}
