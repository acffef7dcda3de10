//! Audio delivery: resolve through the cache, then redirect or stream

use super::metrics;
use super::state::ServerState;
use crate::audio_cache::{extract_identifier, is_valid_identifier, AudioCache, AudioResource};
use crate::providers::{CapabilityError, ExtractionError};
use axum::{
    body::Body,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::path::Path as FsPath;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, BufReader, SeekFrom},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

const HEADER_BYTE_RANGE: &str = "Range";
const STREAM_BUFFER_SIZE: usize = 4096 * 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start_inclusive: Option<u64>,
    end_inclusive: Option<u64>,
}

impl ByteRange {
    pub fn new(start_inclusive: Option<u64>, end_inclusive: Option<u64>) -> ByteRange {
        ByteRange {
            start_inclusive,
            end_inclusive,
        }
    }

    fn parse<S: AsRef<str>>(s: S) -> Option<ByteRange> {
        let v = s.as_ref();
        let v = v.strip_prefix("bytes=")?;
        let parts: Vec<&str> = v.split('-').collect();
        if parts.len() != 2 {
            return None;
        }

        Some(ByteRange {
            start_inclusive: parts[0].trim().parse::<u64>().ok(),
            end_inclusive: parts[1].trim().parse::<u64>().ok(),
        })
    }

    /// Inclusive `(start, end)` offsets inside a file of `file_length` bytes.
    ///
    /// `None` means the range cannot be satisfied. A missing start is a suffix
    /// range (`bytes=-N`, the last N bytes).
    fn resolve(&self, file_length: u64) -> Option<(u64, u64)> {
        if file_length == 0 {
            return None;
        }
        let last = file_length - 1;
        let (start, end) = match (self.start_inclusive, self.end_inclusive) {
            (None, None) => (0, last),
            (Some(start), None) => (start, last),
            (Some(start), Some(end)) => (start, end.min(last)),
            (None, Some(0)) => return None,
            (None, Some(suffix)) => (file_length - suffix.min(file_length), last),
        };
        if start > end {
            return None;
        }
        Some((start, end))
    }

    fn is_full(&self) -> bool {
        self.start_inclusive.is_none() && self.end_inclusive.is_none()
    }
}

pub struct ByteRangeExtractionError {}

impl IntoResponse for ByteRangeExtractionError {
    fn into_response(self) -> Response {
        StatusCode::BAD_REQUEST.into_response()
    }
}

impl FromRequestParts<ServerState> for Option<ByteRange> {
    type Rejection = ByteRangeExtractionError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        Ok(parts
            .headers
            .get(HEADER_BYTE_RANGE)
            .and_then(|x| x.to_str().ok())
            .and_then(ByteRange::parse))
    }
}

#[derive(Deserialize, Debug)]
pub struct AudioSourceQuery {
    pub source: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn extraction_error_response(track_id: &str, err: &ExtractionError) -> Response {
    metrics::record_error(err.kind(), "audio");
    match err {
        ExtractionError::NotFound(_) => {
            debug!("No audio for {}: {}", track_id, err);
            error_response(StatusCode::NOT_FOUND, err.to_string())
        }
        _ => {
            warn!("Failed to resolve audio for {}: {}", track_id, err);
            error_response(StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

/// `GET /v1/audio/{id}`
pub async fn stream_audio(
    byte_range: Option<ByteRange>,
    State(audio_cache): State<AudioCache>,
    Path(id): Path<String>,
) -> Response {
    if !is_valid_identifier(&id) {
        return error_response(StatusCode::BAD_REQUEST, format!("Invalid track id: {}", id));
    }
    resolve_and_serve(&audio_cache, &id, byte_range).await
}

/// `GET /v1/audio?source=<url>`
pub async fn stream_audio_from_source(
    byte_range: Option<ByteRange>,
    State(audio_cache): State<AudioCache>,
    Query(query): Query<AudioSourceQuery>,
) -> Response {
    let source = match query.source.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return error_response(StatusCode::BAD_REQUEST, "Missing source parameter"),
    };
    match extract_identifier(source) {
        Some(id) => resolve_and_serve(&audio_cache, &id, byte_range).await,
        None => error_response(
            StatusCode::BAD_REQUEST,
            format!("Could not extract a track id from {}", source),
        ),
    }
}

async fn resolve_and_serve(
    audio_cache: &AudioCache,
    track_id: &str,
    byte_range: Option<ByteRange>,
) -> Response {
    match audio_cache.resolve(track_id).await {
        Ok(AudioResource::Remote { url }) => {
            debug!("Redirecting {} to {}", track_id, url);
            Redirect::temporary(&url).into_response()
        }
        Ok(AudioResource::LocalFile {
            path, content_type, ..
        }) => {
            debug!("Streaming {} from {}", track_id, path.display());
            stream_file(&path, &content_type, byte_range).await
        }
        Err(err) => extraction_error_response(track_id, &err),
    }
}

async fn stream_file(path: &FsPath, content_type: &str, byte_range: Option<ByteRange>) -> Response {
    let mut file = match File::open(path).await {
        Ok(x) => x,
        Err(err) => {
            warn!("Cached audio file {} unreadable: {}", path.display(), err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let file_length = match file.metadata().await {
        Ok(x) => x.len(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let partial = byte_range.filter(|r| !r.is_full());
    let (status_code, start, chunk_size) = match partial {
        None => (StatusCode::OK, 0, file_length),
        Some(range) => match range.resolve(file_length) {
            Some((start, end)) => (StatusCode::PARTIAL_CONTENT, start, end - start + 1),
            None => {
                return Response::builder()
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header(header::CONTENT_RANGE, format!("bytes */{}", file_length))
                    .body(Body::empty())
                    .unwrap_or_else(|_| StatusCode::RANGE_NOT_SATISFIABLE.into_response());
            }
        },
    };

    if start > 0 && file.seek(SeekFrom::Start(start)).await.is_err() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let file_reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, file).take(chunk_size);
    let stream = ReaderStream::with_capacity(file_reader, STREAM_BUFFER_SIZE);
    let body = Body::from_stream(stream);

    let mut builder = Response::builder()
        .status(status_code)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, chunk_size);
    if status_code == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!(
                "bytes {}-{}/{}",
                start,
                start + chunk_size - 1,
                file_length
            ),
        );
    }

    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_byte_range(s: &str, a: Option<u64>, b: Option<u64>) {
        assert_eq!(ByteRange::parse(s), Some(ByteRange::new(a, b)));
    }

    fn assert_no_byte_range(s: &str) {
        assert_eq!(ByteRange::parse(s), None);
    }

    #[test]
    fn parses_byte_range() {
        assert_no_byte_range("asd");
        assert_no_byte_range("bytes=");
        assert_no_byte_range("bytes=1-2-3");
        assert_byte_range("bytes=-", None, None);
        assert_byte_range("bytes=11-", Some(11), None);
        assert_byte_range("bytes=-111", None, Some(111));
        assert_byte_range("bytes=11-111", Some(11), Some(111));
    }

    #[test]
    fn resolves_ranges_against_file_length() {
        let len = 100;
        assert_eq!(ByteRange::new(Some(10), None).resolve(len), Some((10, 99)));
        assert_eq!(
            ByteRange::new(Some(10), Some(19)).resolve(len),
            Some((10, 19))
        );
        // End past the file is clamped.
        assert_eq!(
            ByteRange::new(Some(90), Some(500)).resolve(len),
            Some((90, 99))
        );
        // Suffix ranges count from the end.
        assert_eq!(ByteRange::new(None, Some(10)).resolve(len), Some((90, 99)));
        assert_eq!(ByteRange::new(None, Some(500)).resolve(len), Some((0, 99)));

        assert_eq!(ByteRange::new(Some(100), None).resolve(len), None);
        assert_eq!(ByteRange::new(Some(20), Some(10)).resolve(len), None);
        assert_eq!(ByteRange::new(None, Some(0)).resolve(len), None);
        assert_eq!(ByteRange::new(Some(0), None).resolve(0), None);
    }

    #[tokio::test]
    async fn streams_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("abc123.mp3");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let response = stream_file(&path, "audio/mpeg", Some(ByteRange::new(Some(2), Some(5)))).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes 2-5/10"
        );
        assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "4");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"2345");

        let response = stream_file(&path, "audio/mpeg", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "audio/mpeg"
        );
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());

        let response =
            stream_file(&path, "audio/mpeg", Some(ByteRange::new(Some(50), None))).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    }
}
