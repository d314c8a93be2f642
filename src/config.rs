use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Absent section means caching is off.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Aggregate byte budget for the local tier.
    #[serde(default = "default_max_cost")]
    pub max_cost: u64,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Remote tier address, e.g. "redis://127.0.0.1:6379/0". Absent means
    /// local tier only.
    #[serde(default)]
    pub redis_url: Option<String>,
}

fn default_max_cost() -> u64 {
    32 * 1024 * 1024
}

fn default_ttl_secs() -> u64 {
    300
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.db.path.as_os_str().is_empty() {
        anyhow::bail!("db.path must not be empty");
    }

    if let Some(cache) = &config.cache {
        if cache.max_cost == 0 {
            anyhow::bail!("cache.max_cost must be > 0");
        }
        if cache.ttl_secs == 0 {
            anyhow::bail!("cache.ttl_secs must be > 0");
        }
        if let Some(url) = &cache.redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                anyhow::bail!("cache.redis_url must start with redis:// or rediss://");
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let file = write_config("[db]\npath = \"./data/catalog.db\"\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.db.path, PathBuf::from("./data/catalog.db"));
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert!(config.cache.is_none());
    }

    #[test]
    fn cache_section_defaults_and_validation() {
        let file = write_config(
            "[db]\npath = \"./data/catalog.db\"\n\n[cache]\nredis_url = \"redis://127.0.0.1:6379/0\"\n",
        );
        let config = load_config(file.path()).unwrap();
        let cache = config.cache.unwrap();
        assert_eq!(cache.max_cost, 32 * 1024 * 1024);
        assert_eq!(cache.ttl_secs, 300);
        assert_eq!(cache.redis_url.as_deref(), Some("redis://127.0.0.1:6379/0"));

        let bad = write_config("[db]\npath = \"x.db\"\n\n[cache]\nmax_cost = 0\n");
        assert!(load_config(bad.path()).is_err());

        let bad_url = write_config("[db]\npath = \"x.db\"\n\n[cache]\nredis_url = \"http://x\"\n");
        assert!(load_config(bad_url.path()).is_err());
    }

    #[test]
    fn missing_file_is_a_readable_error() {
        let err = load_config(Path::new("/nonexistent/catsearch.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
