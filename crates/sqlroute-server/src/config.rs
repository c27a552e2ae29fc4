use std::env;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub timeout_ms: u64,
    pub max_msg_bytes: usize,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            max_msg_bytes: 1_000_000,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(n) = lookup("SQLROUTE_SERVER_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            cfg.timeout_ms = n;
        }
        if let Some(n) = lookup("SQLROUTE_SERVER_MAX_BYTES").and_then(|v| v.parse().ok()) {
            cfg.max_msg_bytes = n;
        }
        if let Some(v) = lookup("SQLROUTE_LOG") {
            cfg.log_level = v;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_values_keep_defaults() {
        let cfg = ServerConfig::from_lookup(|k| match k {
            "SQLROUTE_SERVER_TIMEOUT_MS" => Some("soon".into()),
            "SQLROUTE_SERVER_MAX_BYTES" => Some("2048".into()),
            _ => None,
        });
        assert_eq!(cfg.timeout_ms, 60_000);
        assert_eq!(cfg.max_msg_bytes, 2048);
        assert_eq!(cfg.log_level, "info");
    }
}
