//! Configuration surface for the auto tuner.

use serde::{Deserialize, Serialize};

use cinder_net::ServerConfig;
use cinder_search::SaConfig;
use cinder_types::{Bound, DEFAULT_STEP};

/// Top-level configuration for a search session.
///
/// One struct covers both roles: the process hosting the server
/// (`is_server = true`) and pure worker processes pointing at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerConfig {
    /// Server host. Empty means auto-resolve when hosting; worker processes
    /// must name the host explicitly.
    pub server_host: String,
    /// Server port. Zero picks an ephemeral port when hosting.
    pub server_port: u16,

    /// Starting annealing temperature.
    pub init_temperature: f64,
    /// Multiplicative cooling factor, `0 < r < 1`.
    pub reduce_rate: f64,
    /// Feasibility attempts before a proposal falls back.
    pub max_try_number: usize,

    /// Cap on concurrent client sessions at the server.
    pub max_client_num: usize,
    /// Global budget of accepted observations.
    pub search_steps: u64,

    /// Domain bounds, scalar or per-dimension.
    pub min_ratios: Bound,
    pub max_ratios: Bound,
    /// Quantization step between ratios and tokens.
    pub step: f64,

    /// Namespace key scoping requests on a shared server.
    pub key: String,
    /// Whether this process hosts the server or only a client.
    pub is_server: bool,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            server_host: String::new(),
            server_port: 0,
            init_temperature: 100.0,
            reduce_rate: 0.85,
            max_try_number: 300,
            max_client_num: 10,
            search_steps: 300,
            min_ratios: Bound::Scalar(0.0),
            max_ratios: Bound::Scalar(0.9),
            step: DEFAULT_STEP,
            key: "cinder".to_string(),
            is_server: true,
        }
    }
}

impl TunerConfig {
    pub fn with_server_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.server_host = host.into();
        self.server_port = port;
        self
    }

    pub fn with_temperature(mut self, init_temperature: f64, reduce_rate: f64) -> Self {
        self.init_temperature = init_temperature;
        self.reduce_rate = reduce_rate;
        self
    }

    pub fn with_bounds(mut self, min: impl Into<Bound>, max: impl Into<Bound>) -> Self {
        self.min_ratios = min.into();
        self.max_ratios = max.into();
        self
    }

    pub fn with_search_steps(mut self, steps: u64) -> Self {
        self.search_steps = steps;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Worker-process role: connect to an existing server instead of
    /// hosting one.
    pub fn as_client(mut self, host: impl Into<String>, port: u16) -> Self {
        self.is_server = false;
        self.server_host = host.into();
        self.server_port = port;
        self
    }

    pub(crate) fn sa_config(&self) -> SaConfig {
        SaConfig::default()
            .with_temperature(self.init_temperature, self.reduce_rate)
            .with_max_try_number(self.max_try_number)
    }

    pub(crate) fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server_host.clone(),
            port: self.server_port,
            max_client_num: self.max_client_num,
            search_steps: self.search_steps,
            key: self.key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain() {
        let config = TunerConfig::default()
            .with_server_address("10.0.0.5", 8180)
            .with_temperature(50.0, 0.9)
            .with_bounds(0.0, vec![0.5, 0.9])
            .with_search_steps(40)
            .with_key("session-a");

        assert_eq!(config.server_host, "10.0.0.5");
        assert_eq!(config.init_temperature, 50.0);
        assert_eq!(config.max_ratios, Bound::PerDim(vec![0.5, 0.9]));
        assert_eq!(config.search_steps, 40);
        assert!(config.is_server);

        let worker = config.as_client("10.0.0.5", 8180);
        assert!(!worker.is_server);
    }

    #[test]
    fn serde_round_trip() {
        let config = TunerConfig::default().with_bounds(vec![0.0, 0.1], 0.9);
        let json = serde_json::to_string(&config).unwrap();
        let back: TunerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
