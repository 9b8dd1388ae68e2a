//! Liveness and readiness handlers.
//!
//! `/health` never checks a dependency: it answers `200` as long as the
//! process is scheduling async tasks at all. `/ready` is the one that
//! actually means something: it reports whether the DB pool and Redis are
//! both reachable right now, so a load balancer can pull an instance out of
//! rotation during an outage instead of routing live traffic into it.

use std::time::Instant;

use serde::Serialize;
use waypoint_redis::RedisClient;
use waypoint_storage::Pool;

/// Always-200 liveness body.
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
}

/// Liveness check: the process is up. No dependency is consulted.
#[must_use]
pub fn liveness(start_time: Instant) -> LivenessResponse {
    LivenessResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
    }
}

/// One dependency's reachability, as reported by `/ready`.
#[derive(Debug, Serialize)]
pub struct DependencyStatus {
    pub name: &'static str,
    pub reachable: bool,
}

/// Readiness body: overall status plus a per-dependency breakdown.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub dependencies: Vec<DependencyStatus>,
}

impl ReadinessResponse {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// Readiness check: DB pool must hand out a connection and Redis must
/// answer a `PING`. Either failing takes the instance out of rotation
/// (`503`) without affecting liveness.
pub async fn readiness(db_pool: &Pool, redis: &RedisClient) -> ReadinessResponse {
    let db_ok = db_pool.get().is_ok();
    let redis_ok = redis.ping().await.is_ok();

    let dependencies = vec![
        DependencyStatus { name: "database", reachable: db_ok },
        DependencyStatus { name: "redis", reachable: redis_ok },
    ];

    ReadinessResponse {
        status: if db_ok && redis_ok { "ready" } else { "not_ready" },
        dependencies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_is_always_ok() {
        let resp = liveness(Instant::now());
        assert_eq!(resp.status, "ok");
    }

    #[tokio::test]
    async fn readiness_reports_db_dependency_name() {
        let pool = waypoint_storage::build_pool("file::memory:?cache=shared").unwrap();
        let redis = RedisClient::connect("redis://127.0.0.1:6379/0").unwrap();
        let resp = readiness(&pool, &redis).await;
        assert_eq!(resp.dependencies[0].name, "database");
        assert_eq!(resp.dependencies[1].name, "redis");
    }

    #[test]
    fn readiness_response_is_ready_helper() {
        let resp = ReadinessResponse { status: "ready", dependencies: vec![] };
        assert!(resp.is_ready());
        let resp = ReadinessResponse { status: "not_ready", dependencies: vec![] };
        assert!(!resp.is_ready());
    }
}
