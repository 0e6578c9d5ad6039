use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::Utc;
use notememo_core::models::{DeviceId, Note, NoteCategory, RecordKind, SyncRecord};
use notememo_core::sync::{
    DocumentStore, RemoteStore, RemoteSyncStatus, SyncEntity, DEVICE_ID_HEADER,
};
use notememo_core::util::{normalize_text_option, parse_iso, to_iso};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{authenticate, AuthenticatedUser};
use crate::config::AppConfig;
use crate::error::AppError;

const UNKNOWN_DEVICE: &str = "unknown";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: DocumentStore,
}

impl AppState {
    pub const fn new(config: Arc<AppConfig>, store: DocumentStore) -> Self {
        Self { config, store }
    }

    pub fn from_config(config: Arc<AppConfig>) -> notememo_core::Result<Self> {
        let store = DocumentStore::open(&config.db_path)?;
        Ok(Self::new(config, store))
    }
}

pub fn app_router(state: AppState) -> Router {
    let record_routes = Router::new()
        .route("/notes", get(list_records::<Note>).post(push_records::<Note>))
        .route(
            "/categories",
            get(list_records::<NoteCategory>).post(push_categories),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_access));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/sync", get(sync_status))
        .merge(record_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn require_access(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.enable_sync {
        return Err(AppError::SyncDisabled);
    }
    let user = authenticate(&state.config, &state.store, request.headers()).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn sync_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RemoteSyncStatus>, AppError> {
    if !state.config.enable_sync {
        return Ok(Json(RemoteSyncStatus {
            enabled: false,
            message: Some("Sync is disabled on this server".to_string()),
            ..RemoteSyncStatus::default()
        }));
    }

    let user = authenticate(&state.config, &state.store, &headers).await?;
    let sync_info = state.store.sync_info(&user.user_id).await?;
    Ok(Json(RemoteSyncStatus {
        enabled: true,
        user_id: Some(user.user_id),
        sync_info,
        message: None,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    since: Option<String>,
    #[serde(default)]
    include_deleted: bool,
}

async fn list_records<R: SyncEntity>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<R>>, AppError> {
    let since = normalize_text_option(query.since)
        .map(|raw| {
            parse_iso(&raw).ok_or_else(|| {
                AppError::bad_request(format!("`since` is not an ISO timestamp: {raw}"))
            })
        })
        .transpose()?;

    let records: Vec<R> = match since {
        Some(since) => {
            RemoteStore::<R>::read_updated_since(&state.store, &user.user_id, since).await?
        }
        None if query.include_deleted => {
            RemoteStore::<R>::read_all(&state.store, &user.user_id).await?
        }
        None => RemoteStore::<R>::read_all(&state.store, &user.user_id)
            .await?
            .into_iter()
            .filter(|record| !record.is_deleted())
            .collect(),
    };
    Ok(Json(records))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushResponse {
    success: bool,
    sync_time: String,
    message: String,
}

fn device_from(headers: &HeaderMap) -> DeviceId {
    headers
        .get(DEVICE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| normalize_text_option(Some(value.to_string())))
        .unwrap_or_else(|| UNKNOWN_DEVICE.to_string())
        .into()
}

fn validate_all<R: SyncRecord>(records: &[R]) -> Result<(), AppError> {
    for record in records {
        record
            .validate()
            .map_err(|error| AppError::bad_request(error.to_string()))?;
    }
    Ok(())
}

async fn push_records<R: SyncEntity>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    Json(records): Json<Vec<R>>,
) -> Result<Json<PushResponse>, AppError> {
    validate_all(&records)?;
    let device = device_from(&headers);
    let receipt = state
        .store
        .upsert_many(&user.user_id, &device, &records)
        .await?;

    tracing::info!(
        kind = %R::KIND,
        device = %device,
        count = records.len(),
        "Accepted push"
    );
    Ok(Json(PushResponse {
        success: true,
        sync_time: to_iso(&receipt.sync_time),
        message: format!("Synced {} {}", records.len(), R::KIND),
    }))
}

/// Categories are pushed as the complete set, so anything absent is removed
async fn push_categories(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    Json(categories): Json<Vec<NoteCategory>>,
) -> Result<Json<PushResponse>, AppError> {
    validate_all(&categories)?;
    let device = device_from(&headers);
    let (receipt, removed) = state
        .store
        .replace_set::<NoteCategory>(&user.user_id, &device, &categories)
        .await?;

    tracing::info!(
        kind = %RecordKind::Categories,
        device = %device,
        count = categories.len(),
        removed,
        "Accepted category set"
    );
    Ok(Json(PushResponse {
        success: true,
        sync_time: to_iso(&receipt.sync_time),
        message: format!("Synced {} {}", categories.len(), RecordKind::Categories),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use notememo_core::config::SyncConfig;
    use notememo_core::db::{Database, NoteRepository, SqliteNoteRepository};
    use notememo_core::models::{NoteDraft, OTHER_CATEGORY};
    use notememo_core::sync::{HttpRemoteStore, RemoteError, SyncService, SyncState};
    use pretty_assertions::assert_eq;

    use super::*;

    const CODE: &str = "123456";

    fn test_config(enable_sync: bool) -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            enable_sync,
            access_codes: vec![CODE.to_string()],
            db_path: ":memory:".into(),
        }
    }

    async fn spawn_server(enable_sync: bool) -> String {
        let store = DocumentStore::open_in_memory().unwrap();
        let state = AppState::new(Arc::new(test_config(enable_sync)), store);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app_router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_config(base_url: &str, code: &str) -> SyncConfig {
        SyncConfig {
            sync_enabled: true,
            api_base_url: Some(base_url.to_string()),
            access_code: Some(code.to_string()),
            fetch_timeout: Duration::from_secs(5),
            ..SyncConfig::default()
        }
    }

    fn device(base_url: &str) -> SyncService {
        let db = Arc::new(Database::open_in_memory().unwrap());
        SyncService::from_config(client_config(base_url, CODE), db).unwrap()
    }

    #[tokio::test]
    async fn healthz_is_public() {
        let base_url = spawn_server(false).await;
        let body: serde_json::Value = reqwest::get(format!("{base_url}/healthz"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn disabled_server_reports_disabled_and_rejects_records() {
        let base_url = spawn_server(false).await;

        let status: RemoteSyncStatus = reqwest::get(format!("{base_url}/sync"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(!status.enabled);
        assert!(status.message.is_some());

        let response = reqwest::Client::new()
            .get(format!("{base_url}/notes"))
            .header("x-access-code", CODE)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wrong_access_code_is_unauthorized() {
        let base_url = spawn_server(true).await;
        let client = HttpRemoteStore::new(base_url, "000000".to_string(), Duration::from_secs(5))
            .unwrap();

        let result: Result<Vec<Note>, RemoteError> = client.read_all("ignored").await;
        assert!(matches!(result, Err(RemoteError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn list_hides_tombstones_unless_requested() {
        let base_url = spawn_server(true).await;
        let client =
            HttpRemoteStore::new(base_url.clone(), CODE.to_string(), Duration::from_secs(5)).unwrap();

        let kept = Note::new(NoteDraft {
            title: "kept".to_string(),
            ..Default::default()
        });
        let mut gone = Note::new(NoteDraft {
            title: "gone".to_string(),
            ..Default::default()
        });
        gone.mark_deleted();
        client
            .upsert_many("ignored", &DeviceId::from("d1"), &[kept.clone(), gone.clone()])
            .await
            .unwrap();

        let synced: Vec<Note> = client.read_all("ignored").await.unwrap();
        assert_eq!(synced.len(), 2);

        let visible: Vec<Note> = reqwest::Client::new()
            .get(format!("{base_url}/notes"))
            .header("x-access-code", CODE)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(visible, vec![kept]);
    }

    #[tokio::test]
    async fn invalid_since_is_bad_request() {
        let base_url = spawn_server(true).await;
        let response = reqwest::Client::new()
            .get(format!("{base_url}/notes?since=yesterday"))
            .header("x-access-code", CODE)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn two_devices_converge_through_server() {
        let base_url = spawn_server(true).await;
        let device_a = device(&base_url);
        let device_b = device(&base_url);

        let created = SqliteNoteRepository::new(device_a.database())
            .create(NoteDraft {
                title: "from A".to_string(),
                content: "hello".to_string(),
                ..Default::default()
            })
            .unwrap();

        assert!(device_a.sync_all().await.is_completed());
        assert!(device_b.sync_all().await.is_completed());

        let on_b = SqliteNoteRepository::new(device_b.database())
            .get(&created.id)
            .unwrap();
        assert_eq!(on_b.map(|note| note.title), Some("from A".to_string()));

        let status = device_b.check_status().await;
        assert_eq!(status.state, SyncState::Enabled);
        assert_eq!(status.devices.len(), 2);
        assert_eq!(device_a.user_identity(), device_b.user_identity());
    }

    #[tokio::test]
    async fn category_push_replaces_set_and_keeps_other() {
        let base_url = spawn_server(true).await;
        let client = HttpRemoteStore::new(base_url, CODE.to_string(), Duration::from_secs(5)).unwrap();
        let device = DeviceId::from("d1");

        client
            .upsert_many(
                "ignored",
                &device,
                &[NoteCategory::new("工作", None), NoteCategory::new("学习", None)],
            )
            .await
            .unwrap();
        client
            .upsert_many("ignored", &device, &[NoteCategory::new("生活", None)])
            .await
            .unwrap();

        let stored: Vec<NoteCategory> = client.read_all("ignored").await.unwrap();
        let mut names: Vec<&str> = stored.iter().map(|category| category.name.as_str()).collect();
        names.sort_unstable();
        let mut expected = vec!["生活", OTHER_CATEGORY];
        expected.sort_unstable();
        assert_eq!(names, expected);
    }
}
