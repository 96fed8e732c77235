// HTTP REST API for drivers, dispatch lists and the CSV export

use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    http::{header, Method, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::Requester;
use crate::db::{DispatchListStore, DriverStore};
use crate::error::ApiError;
use crate::models::{DispatchList, Driver, DriverPayload};
use crate::pagination::Page;
use crate::schema::Action;
use crate::services::{DispatchListService, DriverService, ExportService};

type Params = Query<Vec<(String, String)>>;

#[derive(Clone)]
pub struct AppState {
    pub drivers: DriverService,
    pub dispatch_lists: DispatchListService,
    pub exports: ExportService,
}

impl AppState {
    /// All services over one store
    pub fn with_store<S>(store: Arc<S>) -> Self
    where
        S: DriverStore + DispatchListStore + 'static,
    {
        Self {
            drivers: DriverService::new(store.clone()),
            dispatch_lists: DispatchListService::new(store.clone()),
            exports: ExportService::new(store),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/driver/", get(list_drivers).post(create_driver))
        .route(
            "/driver/{id}/",
            get(retrieve_driver)
                .put(update_driver)
                .patch(partial_update_driver)
                .delete(destroy_driver),
        )
        .route(
            "/driver/dispatchlist/",
            get(list_dispatch_lists).fallback(dispatch_list_unsupported),
        )
        .route(
            "/driver/dispatchlist/{id}/",
            get(retrieve_dispatch_list).fallback(dispatch_list_unsupported),
        )
        .route("/driver/file/", get(export_drivers))
        .route("/health", get(health_check))
        .method_not_allowed_fallback(method_not_allowed)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(Arc::new(state))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method.to_string())
}

/// Non-numeric ids can't exist, so they are a plain miss
fn record_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id).map_err(|_| ApiError::NotFound)
}

fn payload(body: Result<Json<DriverPayload>, JsonRejection>) -> Result<DriverPayload, ApiError> {
    body.map(|Json(p)| p)
        .map_err(|rejection| ApiError::field("non_field_errors", rejection.body_text()))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    uri: Uri,
    Query(params): Params,
) -> Result<Json<Page<Driver>>, ApiError> {
    let page = state
        .drivers
        .list(&requester, &params, uri.path())
        .await?;
    Ok(Json(page))
}

async fn retrieve_driver(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Driver>, ApiError> {
    let id = record_id(path)?;
    Ok(Json(state.drivers.retrieve(&requester, id).await?))
}

// 作成も200を返す（既存クライアント互換）
async fn create_driver(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    body: Result<Json<DriverPayload>, JsonRejection>,
) -> Result<Json<Driver>, ApiError> {
    let payload = payload(body)?;
    Ok(Json(state.drivers.create(&requester, payload).await?))
}

async fn update_driver(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<DriverPayload>, JsonRejection>,
) -> Result<Json<Driver>, ApiError> {
    let id = record_id(path)?;
    let payload = payload(body)?;
    Ok(Json(state.drivers.update(&requester, id, payload).await?))
}

async fn partial_update_driver(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<DriverPayload>, JsonRejection>,
) -> Result<Json<Driver>, ApiError> {
    let id = record_id(path)?;
    let payload = payload(body)?;
    Ok(Json(
        state
            .drivers
            .partial_update(&requester, id, payload)
            .await?,
    ))
}

async fn destroy_driver(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Driver>, ApiError> {
    let id = record_id(path)?;
    Ok(Json(state.drivers.destroy(&requester, id).await?))
}

async fn list_dispatch_lists(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    uri: Uri,
    Query(params): Params,
) -> Result<Json<Page<DispatchList>>, ApiError> {
    let page = state
        .dispatch_lists
        .list(&requester, &params, uri.path())
        .await?;
    Ok(Json(page))
}

async fn retrieve_dispatch_list(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<DispatchList>, ApiError> {
    let id = record_id(path)?;
    Ok(Json(state.dispatch_lists.retrieve(&requester, id).await?))
}

async fn dispatch_list_unsupported(State(state): State<Arc<AppState>>, method: Method) -> ApiError {
    match Action::for_write(&method).map(|action| state.dispatch_lists.resolve(action)) {
        Some(Err(e)) => e,
        _ => ApiError::MethodNotAllowed(method.to_string()),
    }
}

async fn export_drivers(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    Query(params): Params,
) -> Result<Response, ApiError> {
    let export = state.exports.export(&requester, &params)?;
    let disposition = format!("attachment; filename=\"{}\"", export.filename);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(export.body),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TOKEN_HEADER;
    use crate::db::MemoryStore;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::util::ServiceExt; // for `oneshot`

    fn setup_test_app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let app = create_router(AppState::with_store(store.clone()));
        (app, store)
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    async fn send_text(app: &Router, req: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn bob() -> Value {
        json!({
            "driver_name": "Bob",
            "license_plate": "ABC-123",
            "contact": "555-0100",
            "creater": "admin"
        })
    }

    #[tokio::test]
    async fn test_driver_lifecycle_scenario() {
        let (app, store) = setup_test_app();

        // u1 creates Bob -> 200
        let (status, created) =
            send(&app, request(Method::POST, "/driver/", Some("u1"), Some(bob()))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["driver_name"], "Bob");
        assert!(created.get("openid").is_none());
        let id = created["id"].as_i64().unwrap();

        let (_, page) = send(&app, request(Method::GET, "/driver/", Some("u1"), None)).await;
        assert_eq!(page["count"], 1);

        // duplicate -> Conflict, list unchanged
        let (status, body) =
            send(&app, request(Method::POST, "/driver/", Some("u1"), Some(bob()))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["detail"], "Data Exists");
        let (_, page) = send(&app, request(Method::GET, "/driver/", Some("u1"), None)).await;
        assert_eq!(page["count"], 1);

        // u2 sees nothing
        let (_, page) = send(&app, request(Method::GET, "/driver/", Some("u2"), None)).await;
        assert_eq!(page["count"], 0);
        assert_eq!(page["results"], json!([]));

        // u1 deletes -> 200, list empty, row kept with is_delete
        let uri = format!("/driver/{}/", id);
        let (status, deleted) = send(&app, request(Method::DELETE, &uri, Some("u1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["is_delete"], true);

        let (_, page) = send(&app, request(Method::GET, "/driver/", Some("u1"), None)).await;
        assert_eq!(page["count"], 0);
        assert!(store.find(id).await.unwrap().unwrap().is_delete);
    }

    #[tokio::test]
    async fn test_ownership_isolation() {
        let (app, store) = setup_test_app();
        let (_, created) =
            send(&app, request(Method::POST, "/driver/", Some("u1"), Some(bob()))).await;
        let id = created["id"].as_i64().unwrap();
        let uri = format!("/driver/{}/", id);

        let (status, _) = send(&app, request(Method::GET, &uri, Some("u2"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            request(Method::PUT, &uri, Some("u2"), Some(json!({
                "driver_name": "Mallory",
                "license_plate": "X",
                "contact": "X",
                "creater": "X"
            }))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Cannot Update Data Which Not Yours");

        let (status, body) = send(
            &app,
            request(Method::PATCH, &uri, Some("u2"), Some(json!({"contact": "X"}))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Cannot Partial Update Data Which Not Yours");

        let (status, body) = send(&app, request(Method::DELETE, &uri, Some("u2"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Cannot Delete Data Which Not Yours");

        let stored = store.find(id).await.unwrap().unwrap();
        assert_eq!(stored.driver_name, "Bob");
        assert_eq!(stored.contact, "555-0100");
        assert!(!stored.is_delete);
    }

    #[tokio::test]
    async fn test_anonymous_reads_are_empty() {
        let (app, _) = setup_test_app();
        send(&app, request(Method::POST, "/driver/", Some("u1"), Some(bob()))).await;

        let (status, page) = send(&app, request(Method::GET, "/driver/", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["count"], 0);

        let (status, _) =
            send(&app, request(Method::POST, "/driver/", None, Some(bob()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_update_and_partial_update() {
        let (app, _) = setup_test_app();
        let (_, created) =
            send(&app, request(Method::POST, "/driver/", Some("u1"), Some(bob()))).await;
        let uri = format!("/driver/{}/", created["id"]);

        let (status, body) = send(
            &app,
            request(Method::PATCH, &uri, Some("u1"), Some(json!({"contact": "555-0199"}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["contact"], "555-0199");
        assert_eq!(body["driver_name"], "Bob");

        // PUT needs every field
        let (status, body) = send(
            &app,
            request(Method::PUT, &uri, Some("u1"), Some(json!({"driver_name": "Robert"}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["license_plate"][0], "This field is required.");

        let mut full = bob();
        full["driver_name"] = json!("Robert");
        let (status, body) = send(&app, request(Method::PUT, &uri, Some("u1"), Some(full))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["driver_name"], "Robert");
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (app, _) = setup_test_app();

        let (status, body) = send(
            &app,
            request(Method::POST, "/driver/", Some("u1"), Some(json!({"driver_name": "Bob"}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("contact").is_some());

        let (status, body) = send(
            &app,
            request(Method::POST, "/driver/", Some("u1"), Some(json!({"driver_name": 42}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("non_field_errors").is_some());

        let (status, body) =
            send(&app, request(Method::GET, "/driver/?id=abc", Some("u1"), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("id").is_some());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let (app, _) = setup_test_app();

        let (status, body) = send(&app, request(Method::GET, "/driver/99/", Some("u1"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Not found.");

        let (status, _) = send(&app, request(Method::GET, "/driver/abc/", Some("u1"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dispatch_list_is_read_only() {
        let (app, store) = setup_test_app();
        let item = store.insert_dispatch_list("u1", "Bob", "DN-0001");

        let (status, page) =
            send(&app, request(Method::GET, "/driver/dispatchlist/", Some("u1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["count"], 1);
        assert_eq!(page["results"][0]["dn_code"], "DN-0001");

        let uri = format!("/driver/dispatchlist/{}/", item.id);
        let (status, body) = send(&app, request(Method::GET, &uri, Some("u1"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["driver_name"], "Bob");

        let (status, body) = send(
            &app,
            request(Method::POST, "/driver/dispatchlist/", Some("u1"), Some(json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["detail"], "Method \"POST\" not allowed.");

        let (status, _) = send(&app, request(Method::DELETE, &uri, Some("u1"), None)).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_export_is_get_only() {
        let (app, _) = setup_test_app();
        let (status, _) = send(&app, request(Method::POST, "/driver/file/", Some("u1"), None)).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_export_scenario() {
        let (app, _) = setup_test_app();
        for name in ["Bob", "Carol"] {
            let mut body = bob();
            body["driver_name"] = json!(name);
            send(&app, request(Method::POST, "/driver/", Some("u1"), Some(body))).await;
        }

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/driver/file/?lang=zh-hans", Some("u1"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/csv"));
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"driverlist_"));
        assert!(disposition.ends_with(".csv\""));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let zh = String::from_utf8(body.to_vec()).unwrap();

        let (_, en) = send_text(
            &app,
            request(Method::GET, "/driver/file/?lang=en", Some("u1"), None),
        )
        .await;

        let zh: Vec<&str> = zh.lines().collect();
        let en: Vec<&str> = en.lines().collect();
        assert_eq!(zh.len(), 3);
        assert_eq!(en.len(), 3);
        assert_ne!(zh[0], en[0]);
        assert_eq!(zh[1..], en[1..]);
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = setup_test_app();
        let (status, body) = send_text(&app, request(Method::GET, "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }
}
