use poem_openapi::payload::Json;
use poem_openapi::OpenApi;

use crate::model::HealthResponse;

use super::dto::HealthResponseDto;
use super::ApiTags;

pub struct HealthApi;

#[OpenApi]
impl HealthApi {
    /// Liveness check. Unauthenticated, per the control API surface.
    #[oai(path = "/api/health", method = "get", tag = "ApiTags::Health")]
    async fn health(&self) -> Json<HealthResponseDto> {
        Json(
            HealthResponse {
                status: "ok".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }
            .into(),
        )
    }
}
