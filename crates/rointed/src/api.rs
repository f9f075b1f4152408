use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::CommandError;
use crate::engine::Device;
use crate::engine::Engine;
use crate::engine::EngineError;
use crate::engine::EntityCommand;
use crate::engine::IntegrationState;
use crate::engine::state::EntityEntry;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// One entity as exposed over HTTP
#[derive(Debug, Serialize)]
struct EntityView {
    entity_id: String,
    unique_id: String,
    name: String,
    platform: &'static str,
    integration: String,
    available: bool,
    state: serde_json::Value,
}

impl From<&EntityEntry> for EntityView {
    fn from(entry: &EntityEntry) -> Self {
        let e = &entry.entity;
        Self {
            entity_id: e.entity_id(),
            unique_id: e.unique_id(),
            name: e.name(),
            platform: e.platform(),
            integration: entry.integration.clone(),
            available: e.available(),
            state: e.state_json(),
        }
    }
}

/// Engine errors mapped onto HTTP statuses
struct HttpError(EngineError);

impl From<EngineError> for HttpError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::UnknownEntity(_) | EngineError::UnknownIntegration(_) => {
                StatusCode::NOT_FOUND
            }
            EngineError::IntegrationStopped(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Command(CommandError::Rejected { .. }) => StatusCode::BAD_GATEWAY,
            EngineError::Command(CommandError::OutOfRange { .. })
            | EngineError::Command(CommandError::Unsupported(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

#[tracing::instrument(skip(state))]
async fn list_entities(State(state): State<Arc<AppState>>) -> Json<Vec<EntityView>> {
    let snapshot = state.engine.state_snapshot();
    Json(snapshot.entities.values().map(EntityView::from).collect())
}

#[tracing::instrument(skip(state))]
async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityView>, HttpError> {
    let snapshot = state.engine.state_snapshot();
    snapshot
        .entities
        .get(&entity_id)
        .map(|e| Json(EntityView::from(e)))
        .ok_or(HttpError(EngineError::UnknownEntity(entity_id)))
}

#[tracing::instrument(skip(state))]
async fn entity_command(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(command): Json<EntityCommand>,
) -> Result<Json<EntityView>, HttpError> {
    state
        .engine
        .send_entity_command(&entity_id, command)
        .await?;

    let snapshot = state.engine.state_snapshot();
    snapshot
        .entities
        .get(&entity_id)
        .map(|e| Json(EntityView::from(e)))
        .ok_or(HttpError(EngineError::UnknownEntity(entity_id)))
}

#[tracing::instrument(skip(state))]
async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<Device>> {
    let snapshot = state.engine.state_snapshot();
    Json(snapshot.devices.devices().cloned().collect())
}

#[tracing::instrument(skip(state))]
async fn list_integrations(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, IntegrationState>> {
    Json(state.engine.state_snapshot().integrations.clone())
}

#[tracing::instrument(skip(state))]
async fn refresh_integration(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, HttpError> {
    state.engine.request_integration_refresh(&name)?;
    Ok(StatusCode::ACCEPTED)
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/entities", get(list_entities))
        .route("/v1/entities/:entity_id", get(get_entity))
        .route("/v1/entities/:entity_id/command", post(entity_command))
        .route("/v1/devices", get(list_devices))
        .route("/v1/integrations", get(list_integrations))
        .route("/v1/integrations/:name/refresh", post(refresh_integration))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router serving the given engine
pub fn router(engine: Arc<Engine>) -> Router {
    create_router(Arc::new(AppState {
        version: env!("CARGO_PKG_VERSION"),
        engine,
    }))
}

/// Start the HTTP API server
///
/// Binds to `addr` and serves until the provided shutdown signal fires.
pub async fn serve(
    addr: SocketAddr,
    engine: Arc<Engine>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> std::io::Result<()> {
    let app = router(engine);

    tracing::info!("Starting HTTP API server on {}", addr);
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::integrations::rointe::RointeConfig;
    use crate::integrations::rointe::RointeIntegration;
    use crate::integrations::rointe::simulator::SimulatedCloud;
    use crate::integrations::rointe::simulator::tests::cloud;

    struct TestApp {
        cloud: SimulatedCloud,
        engine: Arc<Engine>,
        router: Router,
        task: tokio::task::JoinHandle<()>,
    }

    impl Drop for TestApp {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    /// An engine running the Rointe integration against the test cloud
    async fn app() -> TestApp {
        let cloud = cloud();
        let config = RointeConfig {
            username: "user@example.com".to_string(),
            password: "hunter2".to_string(),
            installation: "inst-1".to_string(),
            local_id: "local-1".to_string(),
            refresh_interval: Duration::from_secs(3600),
            fixture: None,
        };

        let engine = Arc::new(Engine::new());
        engine.register_integration(
            "rointe".to_string(),
            Box::new(RointeIntegration::new(
                cloud.session("user@example.com", "hunter2"),
                &config,
            )),
        );
        let runner = engine.clone();
        let task = tokio::spawn(async move {
            let _ = runner.run().await;
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let state = engine.state_snapshot();
                if state.integrations.get("rointe") == Some(&IntegrationState::Loaded)
                    && state.entities.len() == 18
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        TestApp {
            cloud,
            router: router(engine.clone()),
            engine,
            task,
        }
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn command(entity_id: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/v1/entities/{}/command", entity_id))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let router = super::router(Arc::new(Engine::new()));
        let (status, body) = call(&router, get("/v1/ping")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_info_reports_version() {
        let router = super::router(Arc::new(Engine::new()));
        let (status, body) = call(&router, get("/v1/info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_entities_and_devices() {
        let app = app().await;

        let (status, body) = call(&app.router, get("/v1/entities")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 18);

        let (status, body) = call(&app.router, get("/v1/entities/climate.rointe_a")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Living room");
        assert_eq!(body["integration"], "rointe");
        assert_eq!(body["state"]["state"], "heat");

        let (status, body) = call(&app.router, get("/v1/devices")).await;
        assert_eq!(status, StatusCode::OK);
        let devices = body.as_array().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0]["id"], "rointe:A");
        assert_eq!(devices[0]["entity_ids"].as_array().unwrap().len(), 9);

        let (_, body) = call(&app.router, get("/v1/integrations")).await;
        assert_eq!(body, json!({ "rointe": "loaded" }));
    }

    #[tokio::test]
    async fn test_unknown_entity_is_404() {
        let app = app().await;
        let (status, _) = call(&app.router, get("/v1/entities/climate.nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app.router,
            command("climate.nope", json!({ "command": "set_temperature", "temperature": 20.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_command_updates_state() {
        let app = app().await;
        let (status, body) = call(
            &app.router,
            command(
                "climate.rointe_a",
                json!({ "command": "set_temperature", "temperature": 22.5 }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["temperature"], 22.5);
        assert_eq!(app.cloud.command_log(), vec!["A:set_temp=22.5"]);
    }

    #[tokio::test]
    async fn test_command_errors_map_to_statuses() {
        let app = app().await;

        let (status, _) = call(
            &app.router,
            command(
                "number.rointe_a_eco_temp_preset",
                json!({ "command": "set_value", "value": 25.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(
            &app.router,
            command(
                "sensor.rointe_a_power",
                json!({ "command": "set_value", "value": 1.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        app.cloud.set_reject_commands(true);
        let (status, body) = call(
            &app.router,
            command(
                "climate.rointe_a",
                json!({ "command": "set_hvac_mode", "hvac_mode": "off" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("climate.rointe_a"));
    }

    #[tokio::test]
    async fn test_refresh_endpoint() {
        let app = app().await;
        app.cloud.set_vendor_temperature("B", 23.0);

        let request = Request::builder()
            .method("POST")
            .uri("/v1/integrations/rointe/refresh")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(&app.router, request).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let state = app.engine.state_snapshot();
                let climate = state.entity("climate.rointe_b").unwrap();
                // B is in auto mode with no active preset, so the raw target shows
                if climate.state_json()["temperature"] == 23.0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/v1/integrations/nope/refresh")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(&app.router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
