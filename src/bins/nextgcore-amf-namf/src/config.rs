//! AMF Configuration
//!
//! The `amf:` section of the NextGCore YAML configuration file.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::Value;

use crate::context::{AmfId, Guami, PlmnId};
use crate::sbi_path::{NfUri, UriScheme};
use crate::timer::{AmfTimerConfigs, TimerConfig};

/// AMF configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AmfConfig {
    /// SBI settings
    pub sbi: SbiConfig,
    /// Served GUAMI list (the first entry is used for temporary identifiers)
    pub guami: Vec<GuamiConfig>,
    /// Timer settings
    pub time: TimeConfig,
    /// Pool sizes
    pub max: MaxConfig,
}

impl AmfConfig {
    /// Load the `amf:` section from a YAML file, falling back to defaults
    /// when the file or the section is missing.
    pub fn load(path: &str) -> Result<Self> {
        log::info!("Loading configuration from: {}", path);

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Could not read config file '{}': {}. Using defaults.", path, e);
                return Ok(Self::default());
            }
        };

        Self::from_yaml_str(&content)
    }

    /// Parse a YAML document holding an `amf:` section
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let yaml: Value = serde_yaml::from_str(content).context("Failed to parse YAML config")?;

        let Some(amf_section) = yaml.get("amf") else {
            log::warn!("No 'amf' section in config file");
            return Ok(Self::default());
        };

        let config: AmfConfig =
            serde_yaml::from_value(amf_section.clone()).context("Invalid 'amf' section")?;
        log::info!(
            "AMF configuration loaded: SBI {}, {} GUAMI, max {} UEs",
            config.sbi.server.nf_uri().base_uri(),
            config.guami.len(),
            config.max.ue
        );
        Ok(config)
    }

    /// First served GUAMI
    pub fn guami(&self) -> Guami {
        self.guami
            .first()
            .map(GuamiConfig::to_guami)
            .unwrap_or_else(|| Guami {
                plmn_id: PlmnId::new("999", "70"),
                amf_id: AmfId { region: 2, set: 1, pointer: 0 },
            })
    }
}

/// SBI settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SbiConfig {
    /// Own Namf server
    pub server: SbiServerConfig,
    /// Maximum number of cached SBI clients
    pub max_clients: usize,
}

impl Default for SbiConfig {
    fn default() -> Self {
        Self {
            server: SbiServerConfig::default(),
            max_clients: 512,
        }
    }
}

/// Own SBI server address
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SbiServerConfig {
    /// "http" or "https"
    pub scheme: String,
    /// Address or FQDN advertised to peers
    pub address: String,
    /// Port
    pub port: u16,
}

impl Default for SbiServerConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            address: "127.0.0.5".to_string(),
            port: 7777,
        }
    }
}

impl SbiServerConfig {
    /// Server URI used to build callback locations
    pub fn nf_uri(&self) -> NfUri {
        let scheme = if self.scheme.eq_ignore_ascii_case("https") {
            UriScheme::Https
        } else {
            UriScheme::Http
        };
        NfUri::new(scheme, &self.address, self.port)
    }
}

/// GUAMI entry
#[derive(Debug, Clone, Deserialize)]
pub struct GuamiConfig {
    /// PLMN ID
    pub plmn_id: PlmnIdConfig,
    /// AMF ID
    pub amf_id: AmfIdConfig,
}

impl GuamiConfig {
    fn to_guami(&self) -> Guami {
        Guami {
            plmn_id: PlmnId::new(&self.plmn_id.mcc.to_digits(3), &self.plmn_id.mnc.to_digits(2)),
            amf_id: AmfId {
                region: self.amf_id.region,
                set: self.amf_id.set,
                pointer: self.amf_id.pointer,
            },
        }
    }
}

/// PLMN ID entry
#[derive(Debug, Clone, Deserialize)]
pub struct PlmnIdConfig {
    /// MCC
    pub mcc: Digits,
    /// MNC
    pub mnc: Digits,
}

/// MCC/MNC written either as a string or as a YAML integer
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Digits {
    Str(String),
    Num(u64),
}

impl Digits {
    fn to_digits(&self, min_width: usize) -> String {
        match self {
            Digits::Str(s) => s.clone(),
            Digits::Num(n) => format!("{:0width$}", n, width = min_width),
        }
    }
}

/// AMF ID entry
#[derive(Debug, Clone, Deserialize)]
pub struct AmfIdConfig {
    /// Region
    pub region: u8,
    /// Set
    pub set: u16,
    /// Pointer
    #[serde(default)]
    pub pointer: u8,
}

/// Timer settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// T3513 (paging)
    pub t3513: Option<TimerValueConfig>,
}

impl TimeConfig {
    /// Timer configuration with overrides applied
    pub fn timer_configs(&self) -> AmfTimerConfigs {
        let mut configs = AmfTimerConfigs::default();
        if let Some(ref t3513) = self.t3513 {
            configs.t3513 = t3513.to_timer_config();
        }
        configs
    }
}

/// Timer value entry
#[derive(Debug, Clone, Deserialize)]
pub struct TimerValueConfig {
    /// Duration in milliseconds
    pub value: u64,
    /// Maximum retransmissions
    #[serde(default)]
    pub max_count: u32,
}

impl TimerValueConfig {
    fn to_timer_config(&self) -> TimerConfig {
        TimerConfig {
            enabled: true,
            max_count: self.max_count,
            duration: Duration::from_millis(self.value),
        }
    }
}

/// Pool sizes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaxConfig {
    /// Maximum number of UEs
    pub ue: usize,
}

impl Default for MaxConfig {
    fn default() -> Self {
        Self { ue: 1024 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_str() {
        let yaml = r#"
amf:
  sbi:
    server:
      scheme: https
      address: amf.example.org
      port: 8443
    max_clients: 4
  guami:
    - plmn_id:
        mcc: 001
        mnc: 01
      amf_id:
        region: 2
        set: 1
  time:
    t3513:
      value: 500
      max_count: 3
  max:
    ue: 16
"#;
        let config = AmfConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.sbi.server.nf_uri().base_uri(), "https://amf.example.org:8443");
        assert_eq!(config.sbi.max_clients, 4);
        assert_eq!(config.max.ue, 16);

        let guami = config.guami();
        assert_eq!(guami.plmn_id, PlmnId::new("001", "01"));
        assert_eq!(guami.amf_id.region, 2);

        let timers = config.time.timer_configs();
        assert_eq!(timers.t3513.max_count, 3);
        assert_eq!(timers.t3513.duration, Duration::from_millis(500));
    }

    #[test]
    fn test_missing_section_uses_defaults() {
        let config = AmfConfig::from_yaml_str("smf:\n  foo: 1\n").unwrap();
        assert_eq!(config.sbi.server.port, 7777);
        assert_eq!(config.time.timer_configs().t3513.max_count, 2);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AmfConfig::load("/nonexistent/amf.yaml").unwrap();
        assert_eq!(config.max.ue, 1024);
    }
}
