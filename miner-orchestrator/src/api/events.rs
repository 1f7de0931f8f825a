use poem_openapi::param::Query;
use poem_openapi::payload::Json;
use poem_openapi::OpenApi;

use crate::auth::ApiKeyAuth;
use crate::orchestrator::Orchestrator;

use super::dto::EventDto;
use super::{ApiError, ApiTags};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 5000;

pub struct EventsApi {
    pub orchestrator: Orchestrator,
}

#[OpenApi]
impl EventsApi {
    /// The last `limit` events recorded by the supervisor, oldest first.
    #[oai(path = "/api/events", method = "get", tag = "ApiTags::Events")]
    async fn list(
        &self,
        auth: ApiKeyAuth,
        limit: Query<Option<usize>>,
    ) -> Result<Json<Vec<EventDto>>, ApiError> {
        if !self.orchestrator.check_api_key(auth.key()).await {
            return Err(ApiError::unauthorized());
        }
        let limit = limit.0.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let events = self.orchestrator.events().list(limit);
        Ok(Json(events.iter().map(EventDto::from).collect()))
    }
}
