use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// 目录服务查询参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub url: String,
    pub protocols: String,
    pub limit: u32,
    pub page: u32,
    pub sort_by: String,
    pub sort_type: String,
    /// 请求超时（毫秒）
    pub timeout: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: "https://proxylist.geonode.com/api/proxy-list".to_string(),
            protocols: "http".to_string(),
            limit: 500,
            page: 1,
            sort_by: "lastChecked".to_string(),
            sort_type: "desc".to_string(),
            timeout: 10_000,
        }
    }
}

impl DirectoryConfig {
    /// 拼接完整的目录请求地址
    pub fn request_url(&self) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| anyhow!("解析目录服务地址失败 {}: {}", self.url, e))?;
        url.query_pairs_mut()
            .append_pair("protocols", &self.protocols)
            .append_pair("limit", &self.limit.to_string())
            .append_pair("page", &self.page.to_string())
            .append_pair("sort_by", &self.sort_by)
            .append_pair("sort_type", &self.sort_type);
        Ok(url)
    }

    pub fn get_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub directory: DirectoryConfig,

    // 探测参数
    pub probe_url: String,
    pub timeout: u64,
    pub max_attempts: usize,

    // 全部失败时是否清除代理
    pub clear_on_exhaustion: bool,

    // 进度显示
    pub print_progress: bool,

    // 输出配置
    pub output_file: Option<String>,

    // 日志配置
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: DirectoryConfig::default(),
            probe_url: "https://api.ipify.org?format=json".to_string(),
            timeout: 5000,
            max_attempts: 0,
            clear_on_exhaustion: true,
            print_progress: true,
            output_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.directory.request_url()?;
        Url::parse(&self.probe_url)
            .map_err(|e| anyhow!("解析探测地址失败 {}: {}", self.probe_url, e))?;
        if self.timeout == 0 {
            bail!("探测超时不能为 0");
        }
        if self.directory.timeout == 0 {
            bail!("目录请求超时不能为 0");
        }
        Ok(())
    }

    pub fn get_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.clear_on_exhaustion);
        assert_eq!(config.get_timeout_duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_request_url_carries_query() {
        let url = DirectoryConfig::default().request_url().unwrap();
        assert_eq!(url.host_str(), Some("proxylist.geonode.com"));
        assert_eq!(
            url.query(),
            Some("protocols=http&limit=500&page=1&sort_by=lastChecked&sort_type=desc")
        );
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "timeout: 2500\ndirectory:\n  limit: 20\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.timeout, 2500);
        assert_eq!(config.directory.limit, 20);
        assert_eq!(config.directory.sort_by, "lastChecked");
        assert_eq!(config.probe_url, Config::default().probe_url);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::default();
        config.max_attempts = 3;
        config.output_file = Some("result.json".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.timeout = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.probe_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.directory.url = "::".to_string();
        assert!(config.validate().is_err());
    }
}
