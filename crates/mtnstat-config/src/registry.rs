use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::model::MountainConfig;

/// Read-only, process-wide catalog of mountain scraping contracts.
#[derive(Debug, Clone)]
pub struct ConfigRegistry {
    configs: HashMap<String, MountainConfig>,
}

impl ConfigRegistry {
    /// Scan `dir` for `*.yaml`/`*.yml` files, each containing one
    /// `MountainConfig`. Duplicate ids are rejected.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut configs = HashMap::new();

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("reading config directory {}", dir.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yaml" || e == "yml")
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }

            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let cfg: MountainConfig = serde_yaml::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;

            if configs.contains_key(&cfg.id) {
                bail!("duplicate mountain id '{}' in {}", cfg.id, path.display());
            }
            configs.insert(cfg.id.clone(), cfg);
        }

        if configs.is_empty() {
            warn!(dir = %dir.display(), "no mountain configs found");
        } else {
            info!(count = configs.len(), "loaded mountain configs");
        }

        Ok(Self { configs })
    }

    pub fn from_configs(configs: Vec<MountainConfig>) -> Result<Self> {
        let mut map = HashMap::new();
        for cfg in configs {
            if map.contains_key(&cfg.id) {
                bail!("duplicate mountain id '{}'", cfg.id);
            }
            map.insert(cfg.id.clone(), cfg);
        }
        Ok(Self { configs: map })
    }

    pub fn get(&self, id: &str) -> Option<&MountainConfig> {
        self.configs.get(id)
    }

    pub fn all(&self) -> Vec<&MountainConfig> {
        self.configs.values().collect()
    }

    pub fn enabled(&self) -> Vec<&MountainConfig> {
        self.configs.values().filter(|c| c.enabled).collect()
    }

    pub fn by_batch(&self, n: u32) -> Vec<&MountainConfig> {
        self.configs
            .values()
            .filter(|c| c.enabled && c.batch == Some(n))
            .collect()
    }

    pub fn batches(&self) -> Vec<u32> {
        let mut batches: Vec<u32> = self
            .configs
            .values()
            .filter_map(|c| c.batch)
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        batches.sort_unstable();
        batches
    }
}
