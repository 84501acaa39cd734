/*
 * Responsibility
 * - Liveness / readiness state machine for orchestrators
 * - Readiness probes every dependency on each call (never cached), each bounded by a timeout
 */
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::repos::error::RepoError;
use crate::repos::health_repo;

/// A dependency the service needs before it can take traffic.
#[async_trait]
pub trait DependencyCheck: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    async fn check(&self) -> Result<(), RepoError>;
}

pub struct DatabaseCheck {
    db: PgPool,
}

impl DatabaseCheck {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DependencyCheck for DatabaseCheck {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn check(&self) -> Result<(), RepoError> {
        health_repo::ping(&self.db).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Live,
    Ready,
    NotReady,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub state: HealthState,
    pub failed_checks: Vec<String>,
    pub passed_checks: Vec<String>,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.state != HealthState::NotReady
    }
}

pub struct HealthProbe {
    checks: Vec<Arc<dyn DependencyCheck>>,
    timeout: Duration,
}

impl HealthProbe {
    pub fn new(checks: Vec<Arc<dyn DependencyCheck>>, timeout: Duration) -> Self {
        Self { checks, timeout }
    }

    /// Answers as long as the process does; touches no dependency.
    pub fn liveness(&self) -> HealthStatus {
        HealthStatus {
            state: HealthState::Live,
            failed_checks: Vec::new(),
            passed_checks: Vec::new(),
        }
    }

    pub async fn readiness(&self) -> HealthStatus {
        let mut failed_checks = Vec::new();
        let mut passed_checks = Vec::new();

        for check in &self.checks {
            let name = check.name();
            match tokio::time::timeout(self.timeout, check.check()).await {
                Ok(Ok(())) => passed_checks.push(name.to_string()),
                Ok(Err(err)) => {
                    tracing::warn!(check = name, error = ?err, "readiness check failed");
                    failed_checks.push(name.to_string());
                }
                Err(_) => {
                    tracing::warn!(
                        check = name,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "readiness check timed out"
                    );
                    failed_checks.push(name.to_string());
                }
            }
        }

        let state = if failed_checks.is_empty() {
            HealthState::Ready
        } else {
            HealthState::NotReady
        };

        HealthStatus {
            state,
            failed_checks,
            passed_checks,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Behaviour {
        Pass,
        Fail,
        Hang,
    }

    pub struct FakeCheck {
        pub behaviour: Behaviour,
        pub calls: AtomicUsize,
    }

    impl FakeCheck {
        pub fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DependencyCheck for FakeCheck {
        fn name(&self) -> &'static str {
            "database"
        }

        async fn check(&self) -> Result<(), RepoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Pass => Ok(()),
                Behaviour::Fail => Err(RepoError::Db(sqlx::Error::PoolTimedOut)),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        }
    }
}
