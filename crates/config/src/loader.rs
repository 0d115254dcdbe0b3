use std::path::Path;

use anyhow::Context;

use crate::{Config, StorageConfig, StoreErrorPolicy};

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

    parse(&content)
}

pub(crate) fn parse(content: &str) -> anyhow::Result<Config> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;

    for warning in collect_warnings(&config) {
        log::warn!("{warning}");
    }

    Ok(config)
}

/// Settings that are valid but most likely not what the operator meant.
fn collect_warnings(config: &Config) -> Vec<String> {
    let rate_limit = &config.rate_limit;
    let mut warnings = Vec::new();

    let in_memory = matches!(rate_limit.storage, StorageConfig::Memory(_));

    if in_memory && rate_limit.on_store_error == StoreErrorPolicy::Open {
        warnings.push(
            "`rate_limit.on_store_error = \"open\"` has no effect with in-memory storage, which cannot fail"
                .to_string(),
        );
    }

    warnings
}
