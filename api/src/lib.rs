//! jobscan API Module
//!
//! HTTP front end for the artifact query engine: parameter validation,
//! status mapping and the server itself.

pub mod handlers;
pub mod models;
pub mod server;

pub use handlers::*;
pub use models::*;
pub use server::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use jobscan::{EngineConfig, Manager, MemoryArtifactStore, MemoryRecordStore, QuerySources};

    const URL: &str = "https://prow.example/view/gs/test-platform-results/logs/periodic-e2e/101";

    fn manager() -> Arc<Manager> {
        let records = MemoryRecordStore::new().with_record(101, URL, "periodic-e2e");
        let artifacts = MemoryArtifactStore::new()
            .with_object("logs/periodic-e2e/101/build-log.txt", "ok\nerror: boom\nok\n");
        let sources = QuerySources::new(Arc::new(records), Arc::new(artifacts));
        Arc::new(Manager::new(EngineConfig::default(), sources).expect("valid config"))
    }

    async fn get(server: &ApiServer, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = server
            .router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_api_config_creation() {
        let config = ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        };

        assert_eq!(config, ApiConfig::default());
    }

    #[tokio::test]
    async fn test_health() {
        let server = ApiServer::new(ApiConfig::default(), None);
        let (status, body) = get(&server, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "jobscan-api");
    }

    #[tokio::test]
    async fn test_unconfigured_is_503() {
        let server = ApiServer::new(ApiConfig::default(), None);
        let (status, body) = get(&server, "/api/jobs/artifacts?prowJobRuns=1&pathGlob=*").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["errorType"], "APIConfigError");
    }

    #[tokio::test]
    async fn test_missing_param_is_400() {
        let server = ApiServer::new(ApiConfig::default(), Some(manager()));
        let (status, body) = get(&server, "/api/jobs/artifacts?pathGlob=*").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
        assert_eq!(body["errorType"], "ParameterMissing");
        assert_eq!(body["errorParam"], "prowJobRuns");
    }

    #[tokio::test]
    async fn test_bad_knob_is_400() {
        let server = ApiServer::new(ApiConfig::default(), Some(manager()));
        let (status, body) = get(
            &server,
            "/api/jobs/artifacts?prowJobRuns=101&pathGlob=*&textContains=error&beforeContext=99",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorParam"], "beforeContext");
    }

    #[tokio::test]
    async fn test_query_ok_with_partial_failure() {
        let server = ApiServer::new(ApiConfig::default(), Some(manager()));
        let (status, body) = get(
            &server,
            "/api/jobs/artifacts?prowJobRuns=101,999&pathGlob=*.txt&textContains=error",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job_runs"][0]["id"], "101");
        assert_eq!(
            body["job_runs"][0]["artifacts"][0]["matched_content"]["line_matches"]["matches"][0]["match"],
            "error: boom\n"
        );
        assert_eq!(body["errors"][0]["id"], "999");
    }

    #[tokio::test]
    async fn test_invalid_glob_everywhere_is_400() {
        let server = ApiServer::new(ApiConfig::default(), Some(manager()));
        let (status, body) = get(&server, "/api/jobs/artifacts?prowJobRuns=101&pathGlob=%5B").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorParam"], "pathGlob");
    }
}
