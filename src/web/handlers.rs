//! Request handlers for the bridge's two document routes.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use super::AppState;
use crate::models::{MergeKind, MergeRequest};

/// Streaming chunk size for document responses; the file is never loaded
/// into memory whole.
const CHUNK_SIZE: usize = 64 * 1024;

/// Single entry point for every request. Paths are matched exactly but
/// case-insensitively; anything else gets an empty 404, mirroring the
/// original bridge which simply did not service unknown paths.
pub async fn serve_document(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path();
    let kind = if path.eq_ignore_ascii_case("/playlist.m3u8") {
        MergeKind::Playlist
    } else if path.eq_ignore_ascii_case("/epg.xml") {
        MergeKind::Epg
    } else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if request.method() != Method::GET {
        return StatusCode::NOT_FOUND.into_response();
    }

    debug!(
        "Serving {} request (force_refresh: {})",
        kind, state.force_refresh
    );
    let merge_request = MergeRequest {
        kind,
        force_refresh: state.force_refresh,
    };
    let result = match state.orchestrator.merge(merge_request).await {
        Ok(result) => result,
        Err(e) => {
            error!("{} merge failed: {}", kind, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let file = match tokio::fs::File::open(&result.file_path).await {
        Ok(file) => file,
        Err(e) => {
            error!(
                "Published {} file missing at {}: {}",
                kind,
                result.file_path.display(),
                e
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let stream = ReaderStream::with_capacity(file, CHUNK_SIZE);
    (
        [(header::CONTENT_TYPE, kind.content_type())],
        Body::from_stream(stream),
    )
        .into_response()
}
