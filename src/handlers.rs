use std::sync::Arc;

use axum::extract::{FromRequest, MatchedPath, Path, Query, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, Histogram, TextEncoder};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, info_span, instrument, warn};
use validator::Validate;

use crate::error::ApiError;
use crate::models::{Item, ItemDraft};
use crate::query::{ListQuery, PagedResult};
use crate::repo::InventoryRepository;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn InventoryRepository>,
    pub http_duration_histogram: Histogram,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("repo", &"<InventoryRepository>")
            .field("http_duration_histogram", &"<Histogram>")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// JSON extractor that runs the draft's declarative validation before the
/// handler sees the payload. Rejects with 400 and the field violations.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: serde::de::DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state)
            .await
            .map_err(|err| err.into_response())?;
        data.validate()
            .map_err(|errors| ApiError::from(errors).into_response())?;
        Ok(ValidatedJson(data))
    }
}

pub fn router(state: AppState, cors_origin: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(
            cors_origin
                .parse::<HeaderValue>()
                .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:5173")),
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/inventory", get(list_items).post(create_item))
        .route(
            "/api/inventory/:id",
            get(get_item).put(update_item).delete(delete_item),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            http_tracing_middleware,
        ))
        .layer(cors)
        .with_state(state)
}

async fn http_tracing_middleware(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string());

    let path_display = path.as_deref().unwrap_or(uri.path());

    let span = info_span!(
        "http_request",
        method = %method,
        path = path_display,
        uri = %uri,
    );

    let start = std::time::Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed();
    let status = response.status().as_u16();

    state.http_duration_histogram.observe(duration.as_secs_f64());

    if status >= 500 {
        error!(
            parent: &span,
            method = %method,
            path = path_display,
            status = status,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    } else if status >= 400 {
        warn!(
            parent: &span,
            method = %method,
            path = path_display,
            status = status,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    } else {
        info!(
            parent: &span,
            method = %method,
            path = path_display,
            status = status,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    response
}

#[instrument(skip(_state))]
async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[instrument(skip(_state))]
async fn metrics(State(_state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::default_registry().gather();
    let encoded = encoder.encode_to_string(&metric_families).unwrap_or_default();

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        encoded,
    )
}

#[instrument(skip(state))]
async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PagedResult<Item>>, ApiError> {
    let page = state.repo.list(query).await?;
    info!(
        total_count = page.total_count,
        current_page = page.current_page,
        "Listed inventory items"
    );
    Ok(Json(page))
}

#[instrument(skip(state))]
async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Item>, ApiError> {
    let item = state
        .repo
        .get_by_id(id)
        .await?
        .ok_or(ApiError::NotFound(id))?;
    Ok(Json(item))
}

#[instrument(skip(state, draft))]
async fn create_item(
    State(state): State<AppState>,
    ValidatedJson(draft): ValidatedJson<ItemDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.repo.create(draft).await?;
    let location = format!("/api/inventory/{}", item.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(item),
    ))
}

#[instrument(skip(state, draft))]
async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    ValidatedJson(draft): ValidatedJson<ItemDraft>,
) -> Result<Json<Item>, ApiError> {
    let item = state
        .repo
        .update(id, draft)
        .await?
        .ok_or(ApiError::NotFound(id))?;
    Ok(Json(item))
}

#[instrument(skip(state))]
async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    state
        .repo
        .delete(id)
        .await?
        .ok_or(ApiError::NotFound(id))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use mockall::predicate::eq;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::repo::MockInventoryRepository;

    fn item(id: i32, name: &str, quantity: i32, price_cents: i64) -> Item {
        Item {
            id,
            name: name.to_string(),
            quantity,
            price: Decimal::new(price_cents, 2),
        }
    }

    fn test_histogram() -> Histogram {
        Histogram::with_opts(prometheus::HistogramOpts::new(
            "test_http_duration",
            "HTTP request duration",
        ))
        .unwrap()
    }

    fn test_app(repo: MockInventoryRepository) -> Router {
        let state = AppState {
            repo: Arc::new(repo),
            http_duration_histogram: test_histogram(),
        };
        router(state, "http://localhost:5173")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_items_returns_page_from_repository() {
        let mut repo = MockInventoryRepository::new();
        repo.expect_list().returning(|query| {
            Ok(query.execute(vec![item(1, "Item 1", 1, 500), item(2, "Item 2", 10, 1500)]))
        });

        let response = test_app(repo)
            .oneshot(
                Request::builder()
                    .uri("/api/inventory")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["totalCount"], 2);
        assert_eq!(body["totalPages"], 1);
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_item_misses_with_404() {
        let mut repo = MockInventoryRepository::new();
        repo.expect_get_by_id()
            .with(eq(7))
            .returning(|_| Ok(None));

        let response = test_app(repo)
            .oneshot(
                Request::builder()
                    .uri("/api/inventory/7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_item_sets_location_header() {
        let mut repo = MockInventoryRepository::new();
        repo.expect_create()
            .returning(|draft| Ok(item(1, &draft.name, draft.quantity, 100)));

        let response = test_app(repo)
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/inventory")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({"name": "Bolt", "quantity": 5, "price": 1.0}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/api/inventory/1"
        );
    }

    #[tokio::test]
    async fn test_create_item_rejects_invalid_draft_before_storage() {
        // No expectations set: reaching the repository would panic the mock.
        let repo = MockInventoryRepository::new();

        let response = test_app(repo)
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/inventory")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({"name": "Bolt", "quantity": -1, "price": 1.0}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "validation failed");
        assert!(body["details"]["quantity"].is_array());
    }

    #[tokio::test]
    async fn test_delete_item_returns_no_content() {
        let mut repo = MockInventoryRepository::new();
        repo.expect_delete()
            .with(eq(3))
            .returning(|_| Ok(Some(item(3, "Bolt", 5, 100))));

        let response = test_app(repo)
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/api/inventory/3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_storage_error_surfaces_as_500_with_opaque_body() {
        let mut repo = MockInventoryRepository::new();
        repo.expect_get_by_id()
            .returning(|_| Err(anyhow::anyhow!("connection refused")));

        let response = test_app(repo)
            .oneshot(
                Request::builder()
                    .uri("/api/inventory/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "internal server error");
    }
}
