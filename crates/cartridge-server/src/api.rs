// SPDX-License-Identifier: AGPL-3.0-only
use crate::AppState;
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use cartridge_catalog::{
    CatalogError, ErrorKind, Platform, Release, SoftwareListing, SoftwareWithReleases,
    UpdateRequest,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info, warn};

type ApiError = (StatusCode, String);

pub fn router(state: AppState) -> Router {
    let prefix = state.public_prefix.clone();
    let files = ServeDir::new(state.pipeline.layout().content_root());
    Router::new()
        .route("/update", get(update))
        .route("/api/software", get(list_software))
        .route("/api/software/:name", get(get_software))
        .route("/download/:name/:artifact", get(download_latest))
        .route("/download/:name/:version/:artifact", get(download_version))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .nest_service(&prefix, files)
        .with_state(state)
}

fn catalog_error(err: CatalogError) -> ApiError {
    let status = if err.is_path_traversal() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        match err.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Io | ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    };
    (status, err.to_string())
}

fn secret_matches(given: &str, expected: &str) -> bool {
    given.len() == expected.len()
        && given
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateParams {
    secret: Option<String>,
    platform: Option<String>,
    name: Option<String>,
    version: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    Query(params): Query<UpdateParams>,
) -> impl IntoResponse {
    let secret = params.secret.unwrap_or_default();
    if !secret_matches(&secret, &state.update_secret) {
        warn!("update rejected: bad secret");
        return (StatusCode::UNAUTHORIZED, "Unauthorized".to_string());
    }
    let Some(version) = non_empty(params.version) else {
        return (StatusCode::BAD_REQUEST, "Version not provided".to_string());
    };
    let Some(name) = non_empty(params.name) else {
        return (StatusCode::BAD_REQUEST, "Name not provided".to_string());
    };
    let platform = match params.platform.unwrap_or_default().parse::<Platform>() {
        Ok(p) => p,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()),
    };

    let request = UpdateRequest {
        platform,
        name,
        version,
    };
    let started = Instant::now();
    let result = state.pipeline.ingest(&request).await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(outcome) if outcome.created => {
            state.metrics.record_ingest(platform.tag(), "created", elapsed);
            info!(name = %request.name, version = %request.version, "update applied");
            (
                StatusCode::OK,
                format!("Updated {} {}", request.name, request.version),
            )
        }
        Ok(_) => {
            state.metrics.record_ingest(platform.tag(), "skipped", elapsed);
            (
                StatusCode::OK,
                format!("{} {} already up to date", request.name, request.version),
            )
        }
        Err(e) => {
            state.metrics.record_ingest(platform.tag(), "failed", elapsed);
            error!(name = %request.name, version = %request.version, error = %e, "update failed");
            catalog_error(e)
        }
    }
}

pub async fn list_software(
    State(state): State<AppState>,
) -> Result<Json<Vec<SoftwareListing>>, ApiError> {
    let listings = state.service.list_detailed().await.map_err(catalog_error)?;
    Ok(Json(
        listings
            .iter()
            .map(|l| l.with_public_prefix(&state.public_prefix))
            .collect(),
    ))
}

pub async fn get_software(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SoftwareWithReleases>, ApiError> {
    let mut found = state
        .service
        .software_with_releases(&name)
        .await
        .map_err(catalog_error)?;
    found.releases = found
        .releases
        .iter()
        .map(|r| r.with_public_prefix(&state.public_prefix))
        .collect();
    Ok(Json(found))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Artifact {
    Cartridge,
    Source,
}

impl Artifact {
    fn parse(s: &str) -> Result<Self, ApiError> {
        match s {
            "cartridge" => Ok(Artifact::Cartridge),
            "source" => Ok(Artifact::Source),
            other => Err((StatusCode::NOT_FOUND, format!("unknown artifact {other}"))),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Artifact::Cartridge => "cartridge",
            Artifact::Source => "source",
        }
    }

    fn path(self, release: &Release) -> &str {
        match self {
            Artifact::Cartridge => &release.cartridge_path,
            Artifact::Source => &release.source_path,
        }
    }
}

pub async fn download_latest(
    State(state): State<AppState>,
    Path((name, artifact)): Path<(String, String)>,
    request: Request,
) -> Result<Response, ApiError> {
    let artifact = Artifact::parse(&artifact)?;
    let release = state
        .service
        .latest_release(&name)
        .await
        .map_err(catalog_error)?;
    send_artifact(&state, &release, artifact, request).await
}

pub async fn download_version(
    State(state): State<AppState>,
    Path((name, version, artifact)): Path<(String, String, String)>,
    request: Request,
) -> Result<Response, ApiError> {
    let artifact = Artifact::parse(&artifact)?;
    let release = state
        .service
        .release(&name, &version)
        .await
        .map_err(catalog_error)?;
    send_artifact(&state, &release, artifact, request).await
}

/// Stream the artifact file, honoring `Range`, as an attachment.
async fn send_artifact(
    state: &AppState,
    release: &Release,
    artifact: Artifact,
    request: Request,
) -> Result<Response, ApiError> {
    let relative = artifact.path(release);
    if relative.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("release {} has no {}", release.version, artifact.label()),
        ));
    }
    let path = state.pipeline.layout().resolve(relative).map_err(|e| {
        warn!(error = %e, "refusing artifact outside content root");
        (StatusCode::FORBIDDEN, "forbidden".to_string())
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "artifact name is not a valid header".to_string(),
            )
        })?;

    let served = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    if served.status() == StatusCode::NOT_FOUND {
        return Err((
            StatusCode::NOT_FOUND,
            format!("{} file missing", artifact.label()),
        ));
    }

    let mut response = served.map(Body::new);
    if response.status().is_success() {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, disposition);
        state
            .metrics
            .downloads_total
            .with_label_values(&[artifact.label()])
            .inc();
    }
    Ok(response)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.encode(),
    )
}
