#[cfg(test)]
mod tests {
    use axum::{Json, Router, http::StatusCode, routing::get};
    use chrono::{DateTime, Utc};
    use docklab::domain::clock::{LatencyProfile, TokioClock};
    use docklab::domain::labs::models::lab::{Container, ContainerId, Lab, LabId, LabStatus};
    use docklab::domain::labs::models::template::Template;
    use docklab::domain::labs::ports::LabsService;
    use docklab::domain::labs::service::Service;
    use docklab::outbound::api::{ApiError, LabApi};
    use docklab::outbound::lab_memory::LabMemory;
    use docklab::templates::builtin_templates;
    use tokio::net::TcpListener;

    fn container(id: &str, name: &str, image: &str, created: DateTime<Utc>) -> Container {
        Container {
            id: ContainerId::new(id),
            name: name.to_string(),
            image: image.to_string(),
            status: LabStatus::Running,
            ports: vec![],
            created,
        }
    }

    fn remote_labs() -> Vec<Lab> {
        let now: DateTime<Utc> = "2024-01-15T10:30:00Z".parse().unwrap();
        vec![
            Lab {
                id: LabId::new("lab-remote-1"),
                name: "Shared Postgres".to_string(),
                description: "team database".to_string(),
                status: LabStatus::Running,
                compose: "version: '3.8'\nservices:\n  db:\n    image: postgres:15\n".to_string(),
                containers: vec![
                    container("cont-1", "db", "postgres:15", now),
                    container("cont-2", "pgadmin", "dpage/pgadmin4", now),
                ],
                created_at: now,
                is_custom: true,
            },
            Lab {
                id: LabId::new("lab-remote-2"),
                name: "Broken".to_string(),
                description: String::new(),
                status: LabStatus::Error,
                compose: String::new(),
                containers: vec![],
                created_at: now,
                is_custom: false,
            },
        ]
    }

    /// Serve `app` on an ephemeral port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn healthy_api() -> Router {
        Router::new()
            .route("/api/lab", get(|| async { Json(remote_labs()) }))
            .route("/api/lab/templates", get(|| async { Json(builtin_templates()) }))
    }

    #[tokio::test]
    async fn test_fetch_labs_and_import() {
        let base = serve(healthy_api()).await;
        let api = LabApi::new(&base).unwrap();

        let labs = api.fetch_labs().await.unwrap();
        assert_eq!(labs, remote_labs());

        let service = Service::new(LabMemory::default(), TokioClock, LatencyProfile::instant());
        service.import_labs(labs).await;
        let stats = service.stats().await;
        assert_eq!(stats.total_labs, 2);
        assert_eq!(stats.running_labs, 1);
        assert_eq!(stats.running_containers, 2);

        let broken = service.get_lab(&LabId::new("lab-remote-2")).await.unwrap();
        assert_eq!(broken.status, LabStatus::Error);
    }

    #[tokio::test]
    async fn test_fetch_templates() {
        let base = serve(healthy_api()).await;
        let api = LabApi::new(&format!("{base}/")).unwrap();

        let templates: Vec<Template> = api.fetch_templates().await.unwrap();
        assert_eq!(templates, builtin_templates());
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_fetch_failure() {
        let app = Router::new()
            .route("/api/lab", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/api/lab/templates", get(|| async { StatusCode::NOT_FOUND }));
        let api = LabApi::new(&serve(app).await).unwrap();

        let err = api.fetch_labs().await.unwrap_err();
        assert!(matches!(err, ApiError::LabListFetchFailed(_)));
        let err = api.fetch_templates().await.unwrap_err();
        assert!(matches!(err, ApiError::TemplateFetchFailed(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_fetch_failure() {
        let app = Router::new().route("/api/lab", get(|| async { "[{\"id\": 1}]" }));
        let api = LabApi::new(&serve(app).await).unwrap();

        let err = api.fetch_labs().await.unwrap_err();
        assert!(matches!(err, ApiError::LabListFetchFailed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_api() {
        // bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let api = LabApi::new(&format!("http://{addr}")).unwrap();
        let err = api.fetch_templates().await.unwrap_err();
        assert!(matches!(err, ApiError::TemplateFetchFailed(_)));
    }
}
