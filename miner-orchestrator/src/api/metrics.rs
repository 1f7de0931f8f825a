use poem_openapi::payload::Json;
use poem_openapi::OpenApi;

use crate::auth::ApiKeyAuth;
use crate::model::SystemMetrics;
use crate::orchestrator::Orchestrator;

use super::dto::{SystemMetricsDto, WorkerMetricsDto};
use super::{ApiError, ApiTags};

pub struct MetricsApi {
    pub orchestrator: Orchestrator,
}

#[OpenApi]
impl MetricsApi {
    /// Per-worker metrics, as last updated by each worker's adapter.
    #[oai(path = "/api/metrics/miners", method = "get", tag = "ApiTags::Metrics")]
    async fn miner_metrics(&self, auth: ApiKeyAuth) -> Result<Json<Vec<WorkerMetricsDto>>, ApiError> {
        if !self.orchestrator.check_api_key(auth.key()).await {
            return Err(ApiError::unauthorized());
        }
        let metrics = self.orchestrator.supervisor().get_metrics().await;
        Ok(Json(metrics.iter().map(WorkerMetricsDto::from).collect()))
    }

    /// Last host-level CPU/mem/load snapshot.
    #[oai(path = "/api/metrics/system", method = "get", tag = "ApiTags::Metrics")]
    async fn system_metrics(&self, auth: ApiKeyAuth) -> Result<Json<SystemMetricsDto>, ApiError> {
        if !self.orchestrator.check_api_key(auth.key()).await {
            return Err(ApiError::unauthorized());
        }
        let snapshot = self
            .orchestrator
            .system_metrics()
            .latest()
            .await
            .unwrap_or_else(SystemMetrics::default);
        Ok(Json(SystemMetricsDto::from(&snapshot)))
    }
}
