use poem_openapi::param::{Path, Query};
use poem_openapi::payload::Json;
use poem_openapi::{Object, OpenApi};

use crate::auth::ApiKeyAuth;
use crate::orchestrator::Orchestrator;

use super::{ApiError, ApiTags};

const DEFAULT_LINES: usize = 200;
const MAX_LINES: usize = 2000;

pub struct LogsApi {
    pub orchestrator: Orchestrator,
}

#[derive(Object, Debug, Clone)]
pub struct WorkerLogsResponse {
    pub stdout: String,
    pub stderr: String,
}

#[OpenApi]
impl LogsApi {
    /// Tails a worker's stdout/stderr log files, `lines` clamped to
    /// `[1, 2000]`.
    #[oai(path = "/api/logs/:id", method = "get", tag = "ApiTags::Logs")]
    async fn tail(
        &self,
        auth: ApiKeyAuth,
        id: Path<String>,
        lines: Query<Option<usize>>,
    ) -> Result<Json<WorkerLogsResponse>, ApiError> {
        if !self.orchestrator.check_api_key(auth.key()).await {
            return Err(ApiError::unauthorized());
        }

        // Confirms the worker exists before touching the filesystem.
        self.orchestrator.supervisor().get(&id).await?;

        let n = lines.0.unwrap_or(DEFAULT_LINES).clamp(1, MAX_LINES);
        let log_dir = self.orchestrator.log_dir();
        let stdout = tail_file(&log_dir.join(format!("{}.out.log", id.0)), n).await;
        let stderr = tail_file(&log_dir.join(format!("{}.err.log", id.0)), n).await;

        Ok(Json(WorkerLogsResponse { stdout, stderr }))
    }
}

async fn tail_file(path: &std::path::Path, n: usize) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let lines: Vec<&str> = content.lines().collect();
            let skip = lines.len().saturating_sub(n);
            let mut tail = lines[skip..].join("\n");
            if !tail.is_empty() {
                tail.push('\n');
            }
            tail
        }
        Err(_) => String::new(),
    }
}
