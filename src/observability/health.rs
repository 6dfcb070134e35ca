use crate::resilience::{CircuitState, ResilientCall};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Health of the gateway or one of its upstreams, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Health of one upstream, derived from its circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    /// A critical dependency with an open circuit makes the gateway unhealthy.
    pub critical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DependencyHealth {
    pub fn from_circuit(name: impl Into<String>, circuit: CircuitState, critical: bool) -> Self {
        let (status, message) = match circuit {
            CircuitState::Closed => (HealthStatus::Healthy, None),
            CircuitState::HalfOpen => (HealthStatus::Degraded, Some("Circuit half-open, probing")),
            CircuitState::Open if critical => (HealthStatus::Unhealthy, Some("Circuit open")),
            CircuitState::Open => (
                HealthStatus::Degraded,
                Some("Circuit open, serving fallback"),
            ),
        };

        Self {
            name: name.into(),
            status,
            critical,
            message: message.map(str::to_string),
        }
    }
}

/// Gateway health: the worst status among its dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
}

impl AggregatedHealth {
    pub fn new(version: String, uptime_seconds: u64, dependencies: Vec<DependencyHealth>) -> Self {
        let status = dependencies
            .iter()
            .map(|d| d.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            version,
            uptime_seconds,
            dependencies,
        }
    }
}

/// Health checker driven by the circuit state of each upstream.
///
/// No probe traffic is sent: a closed circuit is taken as proof of recent
/// successful calls.
pub struct HealthChecker {
    erp: Arc<ResilientCall>,
    warehouse: Arc<ResilientCall>,
    start_time: std::time::Instant,
}

impl HealthChecker {
    pub fn new(erp: Arc<ResilientCall>, warehouse: Arc<ResilientCall>) -> Self {
        Self {
            erp,
            warehouse,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn check_all(&self) -> AggregatedHealth {
        AggregatedHealth::new(
            env!("CARGO_PKG_VERSION").to_string(),
            self.uptime_seconds(),
            vec![self.check_erp(), self.check_warehouse()],
        )
    }

    /// The ERP is authoritative for product data.
    pub fn check_erp(&self) -> DependencyHealth {
        DependencyHealth::from_circuit(self.erp.name(), self.erp.circuit_state(), true)
    }

    /// Warehouse outages are absorbed with default stock.
    pub fn check_warehouse(&self) -> DependencyHealth {
        DependencyHealth::from_circuit(self.warehouse.name(), self.warehouse.circuit_state(), false)
    }

    pub fn is_alive(&self) -> bool {
        true
    }

    /// Ready while the ERP circuit lets calls through.
    pub fn is_ready(&self) -> bool {
        !self.check_erp().status.is_unhealthy()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
