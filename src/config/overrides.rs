//! Command-line overrides layered over the config file.
//!
//! Applied to the initial config and again to every reloaded one, so a file
//! change never silently undoes a flag.

use crate::config::schema::GateConfig;

/// Values that take precedence over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub upstream_address: Option<String>,
    pub status_code: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut GateConfig) {
        if let Some(bind) = &self.bind_address {
            config.listener.bind_address = bind.clone();
        }
        if let Some(upstream) = &self.upstream_address {
            config.upstream.address = upstream.clone();
        }
        if let Some(status_code) = &self.status_code {
            config.gate.status_code = status_code.clone();
        }
    }
}
