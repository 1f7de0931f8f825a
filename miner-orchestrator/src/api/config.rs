use poem_openapi::payload::Json;
use poem_openapi::{Object, OpenApi};

use crate::auth::ApiKeyAuth;
use crate::orchestrator::Orchestrator;

use super::{ApiError, ApiTags};

pub struct ConfigApi {
    pub orchestrator: Orchestrator,
}

#[derive(Object, Debug, Clone)]
pub struct ReloadResponse {
    pub reloaded: bool,
}

#[OpenApi]
impl ConfigApi {
    /// Re-reads the config source and reconciles workers against it.
    #[oai(path = "/api/config/reload", method = "post", tag = "ApiTags::Config")]
    async fn reload(&self, auth: ApiKeyAuth) -> Result<Json<ReloadResponse>, ApiError> {
        if !self.orchestrator.check_api_key(auth.key()).await {
            return Err(ApiError::unauthorized());
        }
        self.orchestrator.reload_config().await?;
        Ok(Json(ReloadResponse { reloaded: true }))
    }
}
