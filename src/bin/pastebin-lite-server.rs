use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing,
};
use pastebin_lite::{
    api::{self, CreatePastePayload, Health},
    clock::{TEST_NOW_HEADER, resolve_now},
    config,
    cors::cors_layer,
    paste_service::{
        CreatePasteError, FetchPasteError, PasteRestService, paste_rest_service_capsule,
    },
    views::{ErrorPage, NotFoundPage, PastePage, render_page},
};
use rearch::Container;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let container = config::init_container().await?;

    let app = Router::new()
        .route("/api/healthz", routing::get(health_check))
        .route("/api/pastes", routing::post(create_paste))
        .route("/api/pastes/{id}", routing::get(fetch_paste_api))
        .route("/p/{id}", routing::get(view_paste_html))
        .layer(cors_layer())
        .with_state(container.clone());

    let listener = TcpListener::bind(container.read(config::addr_capsule)).await?;
    info!(addr = %listener.local_addr()?, "Started listening on TCP");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Resolves the service and the request's notion of "now" together, so the
/// test-mode flag used is the one read at startup.
fn service_and_now(
    container: &Container,
    headers: &HeaderMap,
) -> (Arc<dyn PasteRestService>, OffsetDateTime) {
    let (service, test_mode) =
        container.read((paste_rest_service_capsule, config::test_mode_capsule));
    let override_ms = headers
        .get(TEST_NOW_HEADER)
        .and_then(|value| value.to_str().ok());
    (service, resolve_now(override_ms, test_mode))
}

#[instrument(skip(container))]
async fn health_check(State(container): State<Container>) -> impl IntoResponse {
    container
        .read(paste_rest_service_capsule)
        .health()
        .await
        .map(|()| Json(Health { ok: true }))
        .map_err(|err| {
            let err_uuid = Uuid::new_v4();
            error!(?err_uuid, ?err, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(api::Error {
                    error: "Database unavailable".to_owned(),
                    error_id: err_uuid.to_string(),
                }),
            )
        })
}

#[instrument(skip(container, payload))]
async fn create_paste(
    State(container): State<Container>,
    Json(payload): Json<CreatePastePayload>,
) -> impl IntoResponse {
    container
        .read(paste_rest_service_capsule)
        .create_paste(payload)
        .await
        .map(|created| (StatusCode::CREATED, Json(created)))
        .map_err(|error: CreatePasteError| {
            let err_uuid = Uuid::new_v4();
            match error {
                CreatePasteError::EmptyContent
                | CreatePasteError::InvalidTtl(_)
                | CreatePasteError::InvalidMaxViews(_) => {
                    info!(?err_uuid, ?error, "User submitted a bad request");
                    (
                        StatusCode::BAD_REQUEST,
                        Json(api::Error {
                            error: error.to_string(),
                            error_id: err_uuid.to_string(),
                        }),
                    )
                }
                CreatePasteError::Internal(_) => {
                    error!(?err_uuid, ?error, "Encountered an error during a request");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(api::Error {
                            error: "Internal server error".to_owned(),
                            error_id: err_uuid.to_string(),
                        }),
                    )
                }
            }
        })
}

#[instrument(skip(container, headers))]
async fn fetch_paste_api(
    State(container): State<Container>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (service, now) = service_and_now(&container, &headers);
    service
        .fetch_paste(&id, now)
        .await
        .map(Json)
        .map_err(|error: FetchPasteError| {
            let err_uuid = Uuid::new_v4();
            match error {
                // NOTE: the reason is logged by the service and never exposed
                FetchPasteError::NotFound(_) => (
                    StatusCode::NOT_FOUND,
                    Json(api::Error {
                        error: "Paste not found".to_owned(),
                        error_id: err_uuid.to_string(),
                    }),
                ),
                FetchPasteError::Internal(_) => {
                    error!(?err_uuid, ?error, "Encountered an error during a request");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(api::Error {
                            error: "Internal server error".to_owned(),
                            error_id: err_uuid.to_string(),
                        }),
                    )
                }
            }
        })
}

#[instrument(skip(container, headers))]
async fn view_paste_html(
    State(container): State<Container>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let (service, now) = service_and_now(&container, &headers);
    match service.fetch_paste(&id, now).await {
        Ok(view) => render_page(StatusCode::OK, &PastePage::new(&id, &view)),
        Err(FetchPasteError::NotFound(_)) => render_page(StatusCode::NOT_FOUND, &NotFoundPage),
        Err(error @ FetchPasteError::Internal(_)) => {
            let err_uuid = Uuid::new_v4();
            error!(?err_uuid, ?error, "Encountered an error during a request");
            render_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorPage {
                    error_id: &err_uuid.to_string(),
                },
            )
        }
    }
}
