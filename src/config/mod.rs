pub mod link_config;

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::link_config::LinkConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub link: LinkConfig,
}

impl AppConfig {
    /// Loads every config file found in `config_dir`
    pub async fn load(config_dir: &Path) -> Result<Self> {
        Ok(AppConfig {
            link: LinkConfig::load_config(config_dir).await?,
        })
    }
}
