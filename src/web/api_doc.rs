use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

use super::api::error::ErrorResponse;
use super::api::feeds::{RoutesResponse, Selection, TracksResponse};
use crate::tracks::{
    AttributeValue, Faction, FeedState, FeedStatus, HistoryPage, IngestReport, Position,
    PushEvent, PushKind, Sample, TrackFilter, TrackStats,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::feeds::push_event,
        super::api::feeds::ingest_history,
        super::api::feeds::all_tracks,
        super::api::feeds::latest,
        super::api::feeds::routes,
        super::api::feeds::stats,
        super::api::feeds::clear_tracks,
        super::api::feeds::remove_track,
        super::api::feeds::get_selection,
        super::api::feeds::put_selection,
        super::api::feeds::start_feed,
        super::api::feeds::stop_feed,
        super::api::feeds::feed_status,
    ),
    components(
        schemas(
            ErrorResponse,
            RoutesResponse,
            TracksResponse,
            Selection,
            Faction,
            Sample,
            Position,
            AttributeValue,
            PushEvent,
            PushKind,
            HistoryPage,
            IngestReport,
            TrackFilter,
            TrackStats,
            FeedStatus,
            FeedState,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Track-O-Mat API",
        description = "Drone track aggregation: ingest detections and moves, query latest positions and routes",
        version = "0.1.0"
    ),
    tags(
        (name = "feeds", description = "Track feeds per faction")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
