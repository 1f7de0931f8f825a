//! HTTP façade: a `poem-openapi` service exposing the control surface over
//! the supervisor, with a unified tagged error enum and a `From` ladder
//! from domain errors to HTTP responses.

mod config;
mod dto;
mod events;
mod health;
mod logs;
mod metrics;
mod miners;

use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object, OpenApiService, Tags};

use crate::error::SupervisorError;
use crate::orchestrator::Orchestrator;

pub use config::ConfigApi;
pub use events::EventsApi;
pub use health::HealthApi;
pub use logs::LogsApi;
pub use metrics::MetricsApi;
pub use miners::MinersApi;

#[derive(Tags)]
pub enum ApiTags {
    Health,
    Miners,
    Metrics,
    Events,
    Config,
    Logs,
}

#[derive(Object, Debug, Clone)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }
}

#[derive(ApiResponse, Debug, Clone)]
pub enum ApiError {
    #[oai(status = 401)]
    Unauthorized(Json<ErrorBody>),
    #[oai(status = 404)]
    NotFound(Json<ErrorBody>),
    #[oai(status = 409)]
    Conflict(Json<ErrorBody>),
    #[oai(status = 429)]
    TooManyRequests(Json<ErrorBody>),
    #[oai(status = 500)]
    InternalError(Json<ErrorBody>),
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self::Unauthorized(Json(ErrorBody::new("invalid or missing API key")))
    }

    pub fn quota_exceeded() -> Self {
        Self::TooManyRequests(Json(ErrorBody::new("rate limit exceeded")))
    }
}

impl From<SupervisorError> for ApiError {
    fn from(value: SupervisorError) -> Self {
        match value {
            SupervisorError::NotFound(id) => {
                Self::NotFound(Json(ErrorBody::new(format!("worker not found: {id}"))))
            }
            SupervisorError::UnsupportedType(_)
            | SupervisorError::PreflightFailure { .. }
            | SupervisorError::SpawnFailure { .. }
            | SupervisorError::ParseFailure(_) => {
                Self::Conflict(Json(ErrorBody::new(value.to_string())))
            }
            SupervisorError::TransientRuntimeFailure { .. } => {
                Self::InternalError(Json(ErrorBody::new(value.to_string())))
            }
            SupervisorError::QuotaExceeded(_) => Self::quota_exceeded(),
        }
    }
}

pub type Apis = (
    HealthApi,
    MinersApi,
    MetricsApi,
    EventsApi,
    ConfigApi,
    LogsApi,
);

pub fn make_open_api_service(orchestrator: &Orchestrator) -> OpenApiService<Apis, ()> {
    OpenApiService::new(
        (
            HealthApi,
            MinersApi {
                orchestrator: orchestrator.clone(),
            },
            MetricsApi {
                orchestrator: orchestrator.clone(),
            },
            EventsApi {
                orchestrator: orchestrator.clone(),
            },
            ConfigApi {
                orchestrator: orchestrator.clone(),
            },
            LogsApi {
                orchestrator: orchestrator.clone(),
            },
        ),
        "Miner Orchestrator API",
        env!("CARGO_PKG_VERSION"),
    )
}
