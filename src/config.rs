use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub idempotency: IdempotencySettings,
    pub upstreams: UpstreamSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdempotencySettings {
    pub ttl_seconds: i64,
    pub sweep_interval_seconds: u64,
    pub header_name: String,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 86400, // 24 hours
            sweep_interval_seconds: 300,
            header_name: "Idempotency-Key".to_string(),
        }
    }
}

impl IdempotencySettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    pub erp: DependencySettings,
    pub warehouse: DependencySettings,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            erp: DependencySettings {
                base_url: "http://localhost:9001".to_string(),
                resilience: ResilienceSettings::default(),
            },
            warehouse: DependencySettings {
                base_url: "http://localhost:9002".to_string(),
                resilience: ResilienceSettings {
                    timeout_ms: 5_000,
                    max_retries: 2,
                    ..ResilienceSettings::default()
                },
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DependencySettings {
    pub base_url: String,
    pub resilience: ResilienceSettings,
}

impl Default for DependencySettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            resilience: ResilienceSettings::default(),
        }
    }
}

/// Per-dependency timeout, retry and circuit breaker knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_max_ms: u64,
    pub failure_ratio: f64,
    pub sampling_window_secs: u64,
    pub minimum_throughput: u32,
    pub break_duration_secs: u64,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 10_000,
            jitter_max_ms: 100,
            failure_ratio: 0.5,
            sampling_window_secs: 30,
            minimum_throughput: 5,
            break_duration_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub product_ttl_secs: u64,
    pub list_ttl_secs: u64,
    /// Upper bound on the TTL of reads served with placeholder stock.
    pub degraded_ttl_secs: u64,
    /// Sliding window as a fraction of the entry TTL, `None` disables sliding expiry.
    pub sliding_ratio: Option<f64>,
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            product_ttl_secs: 300,
            list_ttl_secs: 60,
            degraded_ttl_secs: 5,
            sliding_ratio: Some(0.5),
            max_entries: 10_000,
        }
    }
}

impl CacheSettings {
    pub fn product_ttl(&self) -> Duration {
        Duration::from_secs(self.product_ttl_secs)
    }

    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs)
    }

    pub fn degraded_ttl(&self) -> Duration {
        Duration::from_secs(self.degraded_ttl_secs)
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.idempotency.sweep_interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "idempotency.sweep_interval_seconds must be greater than 0".to_string(),
            ));
        }
        if self.idempotency.ttl_seconds <= 0 {
            return Err(config::ConfigError::Message(
                "idempotency.ttl_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.idempotency.ttl_seconds, 86400);
        assert_eq!(settings.idempotency.sweep_interval(), Duration::from_secs(300));
        assert_eq!(settings.upstreams.erp.resilience.minimum_throughput, 5);
        assert_eq!(settings.upstreams.warehouse.resilience.max_retries, 2);
        assert_eq!(settings.cache.sliding_ratio, Some(0.5));
    }

    #[test]
    fn test_zero_sweep_interval_is_rejected() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.idempotency.sweep_interval_seconds = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("sweep_interval_seconds"));
    }

    #[test]
    fn test_partial_source_keeps_defaults() {
        let settings: Settings = config::Config::builder()
            .set_override("application.port", 9090)
            .unwrap()
            .set_override("upstreams.erp.resilience.max_retries", 5)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.application.port, 9090);
        assert_eq!(settings.upstreams.erp.resilience.max_retries, 5);
        assert_eq!(settings.upstreams.erp.resilience.timeout_ms, 10_000);
        assert_eq!(settings.cache.list_ttl_secs, 60);
    }
}
