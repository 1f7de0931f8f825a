use poem_openapi::param::Path;
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;

use crate::auth::ApiKeyAuth;
use crate::orchestrator::Orchestrator;

use super::dto::{WorkerDefinitionDto, WorkerDetailDto, WorkerMetricsDto, WorkerRuntimeDto};
use super::{ApiError, ApiTags};

pub struct MinersApi {
    pub orchestrator: Orchestrator,
}

impl MinersApi {
    async fn authorize(&self, auth: &ApiKeyAuth) -> Result<(), ApiError> {
        if self.orchestrator.check_api_key(auth.key()).await {
            Ok(())
        } else {
            Err(ApiError::unauthorized())
        }
    }
}

#[OpenApi]
impl MinersApi {
    /// All registered workers' runtime status.
    #[oai(path = "/api/miners", method = "get", tag = "ApiTags::Miners")]
    async fn list(&self, auth: ApiKeyAuth) -> Result<Json<Vec<WorkerRuntimeDto>>, ApiError> {
        self.authorize(&auth).await?;
        let list = self.orchestrator.supervisor().list().await;
        Ok(Json(list.iter().map(|(_, rt)| rt.into()).collect()))
    }

    /// One worker's definition, runtime, and metrics.
    #[oai(path = "/api/miners/:id", method = "get", tag = "ApiTags::Miners")]
    async fn get(&self, auth: ApiKeyAuth, id: Path<String>) -> Result<Json<WorkerDetailDto>, ApiError> {
        self.authorize(&auth).await?;
        let (definition, runtime) = self.orchestrator.supervisor().get(&id).await?;
        let metrics = self
            .orchestrator
            .supervisor()
            .get_metrics()
            .await
            .into_iter()
            .find(|m| m.id == *id)
            .unwrap_or_else(|| crate::model::WorkerMetrics::new(id.0.clone()));

        Ok(Json(WorkerDetailDto {
            definition: WorkerDefinitionDto::from(&definition),
            runtime: WorkerRuntimeDto::from(&runtime),
            metrics: WorkerMetricsDto::from(&metrics),
        }))
    }

    #[oai(path = "/api/miners/:id/start", method = "post", tag = "ApiTags::Miners")]
    async fn start(&self, auth: ApiKeyAuth, id: Path<String>) -> Result<Json<WorkerRuntimeDto>, ApiError> {
        self.authorize(&auth).await?;
        self.orchestrator.supervisor().start_operator(&id).await?;
        let (_, runtime) = self.orchestrator.supervisor().get(&id).await?;
        Ok(Json(WorkerRuntimeDto::from(&runtime)))
    }

    #[oai(path = "/api/miners/:id/stop", method = "post", tag = "ApiTags::Miners")]
    async fn stop(&self, auth: ApiKeyAuth, id: Path<String>) -> Result<Json<WorkerRuntimeDto>, ApiError> {
        self.authorize(&auth).await?;
        self.orchestrator.supervisor().stop(&id).await?;
        let (_, runtime) = self.orchestrator.supervisor().get(&id).await?;
        Ok(Json(WorkerRuntimeDto::from(&runtime)))
    }

    #[oai(path = "/api/miners/:id/restart", method = "post", tag = "ApiTags::Miners")]
    async fn restart(&self, auth: ApiKeyAuth, id: Path<String>) -> Result<Json<WorkerRuntimeDto>, ApiError> {
        self.authorize(&auth).await?;
        self.orchestrator.supervisor().restart(&id).await?;
        let (_, runtime) = self.orchestrator.supervisor().get(&id).await?;
        Ok(Json(WorkerRuntimeDto::from(&runtime)))
    }

    #[oai(path = "/api/miners/all/start", method = "post", tag = "ApiTags::Miners")]
    async fn start_all(&self, auth: ApiKeyAuth) -> Result<Json<Vec<WorkerRuntimeDto>>, ApiError> {
        self.authorize(&auth).await?;
        self.orchestrator.supervisor().start_all().await;
        let list = self.orchestrator.supervisor().list().await;
        Ok(Json(list.iter().map(|(_, rt)| rt.into()).collect()))
    }

    #[oai(path = "/api/miners/all/stop", method = "post", tag = "ApiTags::Miners")]
    async fn stop_all(&self, auth: ApiKeyAuth) -> Result<Json<Vec<WorkerRuntimeDto>>, ApiError> {
        self.authorize(&auth).await?;
        self.orchestrator.supervisor().stop_all().await;
        let list = self.orchestrator.supervisor().list().await;
        Ok(Json(list.iter().map(|(_, rt)| rt.into()).collect()))
    }
}
