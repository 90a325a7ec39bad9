use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::tracks::{
    Faction, FeedStatus, FileHistorySource, HistoryPage, IngestReport, PushEvent, Sample,
    SourceKind, TrackFilter, TrackStats,
};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::auth::{authorize, Operator};
use crate::web::config::Permission;
use crate::web::feeds::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct RoutesResponse {
    /// Samples per entity, oldest first. Routes with fewer than two samples
    /// carry no direction and should not be drawn as a path.
    pub routes: BTreeMap<String, Vec<Sample>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TracksResponse {
    /// Every held sample per entity, in insertion order.
    pub tracks: BTreeMap<String, Vec<Sample>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Selection {
    pub entity_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/feeds/{faction}/events",
    request_body = PushEvent,
    params(("faction" = Faction, Path, description = "Feed faction")),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Event ingested", body = IngestReport),
        (status = 400, description = "Invalid event", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn push_event(
    State(state): State<AppState>,
    Path(faction): Path<Faction>,
    operator: Operator,
    Json(event): Json<PushEvent>,
) -> ApiResult<Json<IngestReport>> {
    authorize(&operator, Permission::IngestTracks, faction)?;

    let source = event.source_kind();
    let records = event.into_records();
    let report = state.feeds.get(faction).engine().ingest(&records, source);
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/api/feeds/{faction}/history",
    request_body = HistoryPage,
    params(("faction" = Faction, Path, description = "Feed faction")),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "History page appended", body = IngestReport),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn ingest_history(
    State(state): State<AppState>,
    Path(faction): Path<Faction>,
    operator: Operator,
    Json(page): Json<HistoryPage>,
) -> ApiResult<Json<IngestReport>> {
    authorize(&operator, Permission::IngestTracks, faction)?;

    let engine = state.feeds.get(faction).engine();
    Ok(Json(engine.ingest(&page.data, SourceKind::History)))
}

#[utoipa::path(
    get,
    path = "/api/feeds/{faction}/tracks",
    params(("faction" = Faction, Path, description = "Feed faction")),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Unfiltered tracks as held", body = TracksResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn all_tracks(
    State(state): State<AppState>,
    Path(faction): Path<Faction>,
    operator: Operator,
) -> ApiResult<Json<TracksResponse>> {
    authorize(&operator, Permission::ReadTracks, faction)?;
    let tracks = state.feeds.get(faction).engine().query_all();
    Ok(Json(TracksResponse { tracks }))
}

#[utoipa::path(
    get,
    path = "/api/feeds/{faction}/latest",
    params(("faction" = Faction, Path, description = "Feed faction"), TrackFilter),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Latest sample per drone", body = Vec<Sample>),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn latest(
    State(state): State<AppState>,
    Path(faction): Path<Faction>,
    operator: Operator,
    Query(filter): Query<TrackFilter>,
) -> ApiResult<Json<Vec<Sample>>> {
    authorize(&operator, Permission::ReadTracks, faction)?;
    Ok(Json(state.feeds.get(faction).engine().query_latest(&filter)))
}

#[utoipa::path(
    get,
    path = "/api/feeds/{faction}/routes",
    params(("faction" = Faction, Path, description = "Feed faction"), TrackFilter),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Ordered route per drone", body = RoutesResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn routes(
    State(state): State<AppState>,
    Path(faction): Path<Faction>,
    operator: Operator,
    Query(filter): Query<TrackFilter>,
) -> ApiResult<Json<RoutesResponse>> {
    authorize(&operator, Permission::ReadTracks, faction)?;
    let routes = state.feeds.get(faction).engine().query_routes(&filter);
    Ok(Json(RoutesResponse { routes }))
}

#[utoipa::path(
    get,
    path = "/api/feeds/{faction}/stats",
    params(("faction" = Faction, Path, description = "Feed faction"), TrackFilter),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Track statistics", body = TrackStats),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn stats(
    State(state): State<AppState>,
    Path(faction): Path<Faction>,
    operator: Operator,
    Query(filter): Query<TrackFilter>,
) -> ApiResult<Json<TrackStats>> {
    authorize(&operator, Permission::ReadTracks, faction)?;
    Ok(Json(state.feeds.get(faction).engine().query_stats(&filter)))
}

#[utoipa::path(
    delete,
    path = "/api/feeds/{faction}/tracks",
    params(("faction" = Faction, Path, description = "Feed faction")),
    security(("api_key" = [])),
    responses(
        (status = 204, description = "All tracks cleared"),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn clear_tracks(
    State(state): State<AppState>,
    Path(faction): Path<Faction>,
    operator: Operator,
) -> ApiResult<StatusCode> {
    authorize(&operator, Permission::ManageFeeds, faction)?;
    state.feeds.get(faction).engine().clear();
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/feeds/{faction}/tracks/{entity_id}",
    params(
        ("faction" = Faction, Path, description = "Feed faction"),
        ("entity_id" = String, Path, description = "Drone id")
    ),
    security(("api_key" = [])),
    responses(
        (status = 204, description = "Track removed"),
        (status = 404, description = "No such track", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn remove_track(
    State(state): State<AppState>,
    Path((faction, entity_id)): Path<(Faction, String)>,
    operator: Operator,
) -> ApiResult<StatusCode> {
    authorize(&operator, Permission::ManageFeeds, faction)?;
    if state.feeds.get(faction).engine().remove(&entity_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("track_not_found"))
    }
}

#[utoipa::path(
    get,
    path = "/api/feeds/{faction}/selection",
    params(("faction" = Faction, Path, description = "Feed faction")),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Current selection", body = Selection),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn get_selection(
    State(state): State<AppState>,
    Path(faction): Path<Faction>,
    operator: Operator,
) -> ApiResult<Json<Selection>> {
    authorize(&operator, Permission::ReadTracks, faction)?;
    Ok(Json(Selection {
        entity_id: state.feeds.get(faction).engine().selection(),
    }))
}

#[utoipa::path(
    put,
    path = "/api/feeds/{faction}/selection",
    request_body = Selection,
    params(("faction" = Faction, Path, description = "Feed faction")),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Selection stored", body = Selection),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn put_selection(
    State(state): State<AppState>,
    Path(faction): Path<Faction>,
    operator: Operator,
    Json(selection): Json<Selection>,
) -> ApiResult<Json<Selection>> {
    authorize(&operator, Permission::ReadTracks, faction)?;
    let entity_id = selection.entity_id.filter(|id| !id.trim().is_empty());
    let engine = state.feeds.get(faction).engine();
    engine.select(entity_id);
    Ok(Json(Selection {
        entity_id: engine.selection(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/feeds/{faction}/start",
    params(("faction" = Faction, Path, description = "Feed faction")),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Feed polling started", body = FeedStatus),
        (status = 400, description = "No history source configured", body = ErrorResponse),
        (status = 409, description = "Feed already running", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn start_feed(
    State(state): State<AppState>,
    Path(faction): Path<Faction>,
    operator: Operator,
) -> ApiResult<Json<FeedStatus>> {
    authorize(&operator, Permission::ManageFeeds, faction)?;

    let feed = state.feeds.get(faction);
    let path = feed
        .history_file
        .clone()
        .ok_or_else(|| ApiError::Validation(format!("no history source configured for {}", faction)))?;

    let mut session = feed.session.lock().await;
    session.start(Arc::new(FileHistorySource::new(path)))?;
    log::info!("{} started the {} feed", operator.name, faction);
    Ok(Json(session.status()))
}

#[utoipa::path(
    post,
    path = "/api/feeds/{faction}/stop",
    params(("faction" = Faction, Path, description = "Feed faction")),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Feed stopped and its tracks discarded", body = FeedStatus),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn stop_feed(
    State(state): State<AppState>,
    Path(faction): Path<Faction>,
    operator: Operator,
) -> ApiResult<Json<FeedStatus>> {
    authorize(&operator, Permission::ManageFeeds, faction)?;

    let mut session = state.feeds.get(faction).session.lock().await;
    session.stop().await;
    log::info!("{} stopped the {} feed", operator.name, faction);
    Ok(Json(session.status()))
}

#[utoipa::path(
    get,
    path = "/api/feeds/{faction}/status",
    params(("faction" = Faction, Path, description = "Feed faction")),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Feed status", body = FeedStatus),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Key lacks permission on this feed", body = ErrorResponse)
    ),
    tag = "feeds"
)]
pub async fn feed_status(
    State(state): State<AppState>,
    Path(faction): Path<Faction>,
    operator: Operator,
) -> ApiResult<Json<FeedStatus>> {
    authorize(&operator, Permission::ReadTracks, faction)?;
    let session = state.feeds.get(faction).session.lock().await;
    Ok(Json(session.status()))
}
