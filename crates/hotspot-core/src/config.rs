//! Server and access-point configuration

use crate::{Error, Result};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

/// Wireless authentication mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    Open,
    #[default]
    Wpa2AesPsk,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Open => "open",
            AuthMode::Wpa2AesPsk => "WPA2-AES-PSK",
        }
    }

    pub fn requires_passphrase(&self) -> bool {
        matches!(self, AuthMode::Wpa2AesPsk)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access point the responder is served on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    pub ssid: String,
    pub passphrase: String,
    pub auth: AuthMode,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        Self {
            ssid: "PicoW_Info".to_string(),
            passphrase: "picopass".to_string(),
            auth: AuthMode::Wpa2AesPsk,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    /// Listen backlog
    pub backlog: u32,
    /// Live sessions admitted at once
    pub max_sessions: usize,
    /// Idle time before a connection is closed
    pub poll_interval: Duration,
    /// Address of the access point itself
    pub gateway: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub access_point: AccessPointConfig,
    /// GPIO driven by the control page
    pub output_pin: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 80,
            backlog: 1,
            max_sessions: 1,
            poll_interval: Duration::from_secs(5),
            gateway: Ipv4Addr::new(192, 168, 4, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            access_point: AccessPointConfig::default(),
            output_pin: 13,
        }
    }
}

impl ServerConfig {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn gateway(mut self, gateway: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        self.gateway = gateway;
        self.netmask = netmask;
        self
    }

    pub fn access_point(mut self, ssid: impl Into<String>, passphrase: impl Into<String>) -> Self {
        self.access_point.ssid = ssid.into();
        self.access_point.passphrase = passphrase.into();
        self
    }

    pub fn output_pin(mut self, pin: u8) -> Self {
        self.output_pin = pin;
        self
    }

    /// Address of the control page
    pub fn control_url(&self) -> String {
        format!("http://{}{}", self.gateway, crate::content::INFO_PATH)
    }

    /// Check the configuration for values the responder cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.backlog == 0 {
            return Err(Error::Config("backlog must be at least 1".into()));
        }
        if self.max_sessions == 0 {
            return Err(Error::Config("max_sessions must be at least 1".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be positive".into()));
        }

        let ssid_len = self.access_point.ssid.len();
        if !(1..=32).contains(&ssid_len) {
            return Err(Error::Config(format!("SSID must be 1-32 bytes, got {ssid_len}")));
        }
        if self.access_point.auth.requires_passphrase() {
            let pass_len = self.access_point.passphrase.chars().count();
            if !(8..=63).contains(&pass_len) {
                return Err(Error::Config(format!(
                    "{} passphrase must be 8-63 characters, got {pass_len}",
                    self.access_point.auth
                )));
            }
        }

        let mask = u32::from(self.netmask);
        if mask.leading_ones() + mask.trailing_zeros() != 32 {
            return Err(Error::Config(format!("netmask {} is not contiguous", self.netmask)));
        }
        let host = u32::from(self.gateway) & !mask;
        if mask != u32::MAX && (host == 0 || host == !mask) {
            return Err(Error::Config(format!(
                "gateway {} is not a host address in its subnet",
                self.gateway
            )));
        }
        Ok(())
    }

    /// Defaults overridden by `HOTSPOT_*` environment variables, validated
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`ServerConfig::from_env`] with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = parse_var(&lookup, "HOTSPOT_PORT")? {
            config.port = port;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "HOTSPOT_POLL_SECS")? {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(gateway) = parse_var(&lookup, "HOTSPOT_GATEWAY")? {
            config.gateway = gateway;
        }
        if let Some(ssid) = lookup("HOTSPOT_SSID") {
            config.access_point.ssid = ssid;
        }
        if let Some(passphrase) = lookup("HOTSPOT_PASSPHRASE") {
            config.access_point.passphrase = passphrase;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<V, F>(lookup: &F, key: &str) -> Result<Option<V>>
where
    V: FromStr,
    V::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}={raw:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 80);
        assert_eq!(config.backlog, 1);
        assert_eq!(config.max_sessions, 1);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.access_point.ssid, "PicoW_Info");
        assert_eq!(config.access_point.auth, AuthMode::Wpa2AesPsk);
        assert_eq!(config.control_url(), "http://192.168.4.1/info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::default()
            .port(8080)
            .max_sessions(4)
            .poll_interval(Duration::from_secs(10))
            .access_point("Lab", "longenough")
            .output_pin(15);
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_sessions, 4);
        assert_eq!(config.access_point.ssid, "Lab");
        assert_eq!(config.output_pin, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let bad = [
            ServerConfig::default().backlog(0),
            ServerConfig::default().max_sessions(0),
            ServerConfig::default().poll_interval(Duration::ZERO),
            ServerConfig::default().access_point("", "picopass"),
            ServerConfig::default().access_point("x".repeat(33), "picopass"),
            ServerConfig::default().access_point("Lab", "short"),
            ServerConfig::default().access_point("Lab", "p".repeat(64)),
            ServerConfig::default().gateway(Ipv4Addr::new(192, 168, 4, 0), Ipv4Addr::new(255, 255, 255, 0)),
            ServerConfig::default().gateway(Ipv4Addr::new(192, 168, 4, 255), Ipv4Addr::new(255, 255, 255, 0)),
            ServerConfig::default().gateway(Ipv4Addr::new(192, 168, 4, 1), Ipv4Addr::new(255, 0, 255, 0)),
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{config:?}");
        }
    }

    #[test]
    fn test_open_network_needs_no_passphrase() {
        let mut config = ServerConfig::default().access_point("Lab", "");
        config.access_point.auth = AuthMode::Open;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HOTSPOT_PORT", "8080"),
            ("HOTSPOT_POLL_SECS", " 10 "),
            ("HOTSPOT_GATEWAY", "10.0.0.1"),
            ("HOTSPOT_SSID", "Bench"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.gateway, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(config.access_point.ssid, "Bench");
        assert_eq!(config.access_point.passphrase, "picopass");
    }

    #[test]
    fn test_from_lookup_invalid_values() {
        for vars in [
            [("HOTSPOT_PORT", "eighty")],
            [("HOTSPOT_GATEWAY", "192.168.4")],
            [("HOTSPOT_POLL_SECS", "0")],
            [("HOTSPOT_PASSPHRASE", "short")],
        ] {
            let err = ServerConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{vars:?}");
        }
    }
}
