// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ProcdagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ProcdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.server, raw.runner))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.server.host.trim().is_empty() {
        return Err(ProcdagError::Config(
            "[server].host must not be empty".to_string(),
        ));
    }

    if cfg.runner.metrics_interval_secs == 0 {
        return Err(ProcdagError::Config(
            "[runner].metrics_interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.runner.kill_grace_secs == 0 {
        return Err(ProcdagError::Config(
            "[runner].kill_grace_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}
