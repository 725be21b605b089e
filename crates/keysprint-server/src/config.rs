//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the keysprint server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Capacity of each participant's outbound frame queue.
    pub send_queue_size: usize,
    /// Seconds between server-initiated Ping frames.
    pub ping_interval_secs: u64,
    /// Seconds between abandoned-game sweeps.
    pub sweep_interval_secs: u64,
    /// Age after which a game nobody ever joined is reaped.
    pub abandoned_after_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            send_queue_size: 256,
            ping_interval_secs: 30,
            sweep_interval_secs: 60,
            abandoned_after_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bind() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_queue_size() {
        assert_eq!(ServerConfig::default().send_queue_size, 256);
    }

    #[test]
    fn default_intervals() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.ping_interval_secs, 30);
        assert_eq!(cfg.sweep_interval_secs, 60);
        assert_eq!(cfg.abandoned_after_secs, 300);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8000,
            send_queue_size: 64,
            ping_interval_secs: 10,
            sweep_interval_secs: 15,
            abandoned_after_secs: 60,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.port, cfg.port);
        assert_eq!(back.send_queue_size, cfg.send_queue_size);
        assert_eq!(back.abandoned_after_secs, cfg.abandoned_after_secs);
    }

    #[test]
    fn deserialize_from_json() {
        let json = r#"{"host":"10.0.0.1","port":3000,"send_queue_size":16,"ping_interval_secs":5,"sweep_interval_secs":7,"abandoned_after_secs":30}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.host, "10.0.0.1");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.send_queue_size, 16);
    }
}
