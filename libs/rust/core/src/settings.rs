//! Layered configuration: defaults, optional YAML file, then `FEDROUND__*` env.

use anyhow::Result;
use config::builder::{ConfigBuilder, DefaultState};
use serde::Deserialize;
use std::path::PathBuf;

use crate::ledger::ReopenPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend { Memory, Sled }

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    pub root: PathBuf,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    pub service_name: String,
    pub http_port: u16,
    pub log_level: String,
    pub json_log: bool,
    pub max_upload_bytes: usize,
    pub storage: StorageConfig,
    pub artifacts: ArtifactConfig,
    pub reopen_policy: ReopenPolicy,
}

fn defaults(service: &str) -> Result<ConfigBuilder<DefaultState>> {
    Ok(config::Config::builder()
        .set_default("service_name", service)?
        .set_default("http_port", 8080_i64)?
        .set_default("log_level", "info")?
        .set_default("json_log", false)?
        .set_default("max_upload_bytes", 256_i64 * 1024 * 1024)?
        .set_default("storage.backend", "sled")?
        .set_default("storage.path", "./data/coordinator")?
        .set_default("artifacts.root", "./media")?
        .set_default("artifacts.base_url", "/media/")?
        .set_default("reopen_policy", "allow")?)
}

pub fn load_config(service: &str) -> Result<CoordinatorConfig> {
    let mut builder = defaults(service)?;
    if let Ok(file) = std::env::var("FEDROUND_CONFIG_FILE") {
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix("FEDROUND").separator("__"));
    Ok(builder.build()?.try_deserialize()?)
}

impl CoordinatorConfig {
    /// Defaults overlaid with a YAML document; no environment lookup.
    pub fn from_yaml(service: &str, yaml: &str) -> Result<Self> {
        let builder = defaults(service)?.add_source(config::File::from_str(yaml, config::FileFormat::Yaml));
        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let cfg = CoordinatorConfig::from_yaml("coordinator-service", "{}").unwrap();
        assert_eq!(cfg.service_name, "coordinator-service");
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.storage.backend, StorageBackend::Sled);
        assert_eq!(cfg.reopen_policy, ReopenPolicy::Allow);
        assert!(!cfg.json_log);
    }

    #[test]
    fn yaml_overrides_nested_keys() {
        let yaml = "http_port: 9100\nreopen_policy: reject\nstorage:\n  backend: memory\nartifacts:\n  base_url: https://cdn.example.org/models/\n";
        let cfg = CoordinatorConfig::from_yaml("svc", yaml).unwrap();
        assert_eq!(cfg.http_port, 9100);
        assert_eq!(cfg.reopen_policy, ReopenPolicy::Reject);
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert_eq!(cfg.storage.path, PathBuf::from("./data/coordinator"));
        assert_eq!(cfg.artifacts.base_url, "https://cdn.example.org/models/");
    }
}
