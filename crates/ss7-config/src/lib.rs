//! SS7 stack configuration.
//!
//! TOML configuration parsing for the signalling core:
//! - router mode (endpoint or transfer point), restart/isolation/route
//!   test timing, advertisement policy
//! - local point codes per variant
//! - which built-in user parts to create
//!
//! Only the typed structures live here; the stack never touches the
//! filesystem itself.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub name: String,
    /// Act as a signalling transfer point.
    pub transfer: bool,
    /// Start the MTP restart sequence immediately.
    pub autostart: bool,
    /// Report unavailable user parts upstream (UPU).
    pub send_upu: bool,
    /// Report failed transfers upstream (TFP).
    pub send_tfp: bool,
    /// Restart duration in ms; 0 picks the mode default (60 s for an
    /// STP, 10 s for an endpoint), minimum 5 s.
    pub start_time_ms: u64,
    /// Isolation grace period in ms, minimum 500.
    pub isolation_ms: u64,
    /// Route test period in ms, minimum 10 s; 0 disables testing.
    pub test_routes_ms: u64,
    /// Also test routes in Restricted state.
    pub test_restricted: bool,
    /// Create the management user part.
    pub management: bool,
    /// Create the link test maintenance user part.
    pub maintenance: bool,
    /// Local point codes, one `"TYPE,pc"` entry per variant.
    pub local: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: "ss7router".to_string(),
            transfer: false,
            autostart: true,
            send_upu: true,
            send_tfp: true,
            start_time_ms: 0,
            isolation_ms: 1000,
            test_routes_ms: 50_000,
            test_restricted: false,
            management: true,
            maintenance: true,
            local: Vec::new(),
        }
    }
}

impl StackConfig {
    pub fn parse(text: &str) -> anyhow::Result<StackConfig> {
        toml::from_str(text).context("invalid stack configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<StackConfig> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text)
    }
}
