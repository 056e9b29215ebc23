//! # video-range
//!
//! HTTP range streaming of video files for [`axum`][1].
//!
//! [`RangeServer::serve`] takes a path on disk and the raw `Range` request
//! header and answers with one of four [`Outcome`]s: the full file (200),
//! the requested window (206), `416 Range Not Satisfiable`, or 404. Bodies
//! are streamed in bounded chunks, so seeking around a multi-gigabyte
//! lecture recording never buffers it in memory.
//!
//! The lower layer is generic: anything implementing [`AsyncRead`] and
//! [`AsyncSeekStart`] can be wrapped in [`SizedBody`] and answered with
//! [`Ranged`]. [`AsyncSeekStart`] is a trait defined by this crate which only
//! allows seeking from the start of a file. It is automatically implemented
//! for any type implementing [`AsyncSeek`].
//!
//! ```
//! use axum::Router;
//! use axum::http::{header, HeaderMap};
//! use axum::response::IntoResponse;
//! use axum::routing::get;
//!
//! use video_range::{RangeServer, StreamConfig};
//!
//! async fn lecture(headers: HeaderMap) -> impl IntoResponse {
//!     let server = RangeServer::new(StreamConfig::default()).unwrap();
//!     let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
//!     server.serve("media/lecture.mp4", range).await
//! }
//!
//! let _app = Router::<()>::new().route("/lecture", get(lecture));
//! ```
//!
//! [1]: https://docs.rs/axum

mod config;
mod error;
mod file;
mod range;
mod routes;
mod server;
mod stream;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, ContentType};
use axum_extra::TypedHeader;
use mime_guess::Mime;
use tokio::io::{AsyncRead, AsyncSeek};

pub use config::{AppConfig, MalformedRangePolicy, ServerConfig, StreamConfig, MAX_CHUNK_SIZE};
pub use error::{ConfigError, ServeError};
pub use file::SizedBody;
pub use range::{RangeHeader, ServingPlan};
pub use routes::{router, MediaRoot, VideoResolver};
pub use server::{Outcome, RangeServer};
pub use stream::RangedStream;

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An [`AsyncRead`] and [`AsyncSeekStart`] with a fixed known byte size.
pub trait RangeBody: AsyncRead + AsyncSeekStart {
    /// The total size of the underlying resource.
    ///
    /// This is the snapshot every range is resolved against. Bytes appended
    /// later are never served; bytes removed later abort the stream.
    fn byte_size(&self) -> u64;
}

/// Responder over any [`RangeBody`]. Implements [`IntoResponse`].
#[derive(Debug)]
pub struct Ranged<B: RangeBody + Send + 'static> {
    range: RangeHeader,
    body: B,
    content_type: Option<Mime>,
    chunk_size: usize,
    malformed_range: MalformedRangePolicy,
}

impl<B: RangeBody + Send + 'static> Ranged<B> {
    /// Construct a ranged response over any type implementing [`RangeBody`]
    /// and a parsed `Range` header.
    pub fn new(range: RangeHeader, body: B, content_type: Option<Mime>) -> Self {
        let defaults = StreamConfig::default();
        Ranged {
            range,
            body,
            content_type,
            chunk_size: defaults.chunk_size,
            malformed_range: defaults.malformed_range,
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub fn malformed_range(mut self, policy: MalformedRangePolicy) -> Self {
        self.malformed_range = policy;
        self
    }

    /// Responds to the request, returning headers and body as
    /// [`RangedResponse`]. Returns [`RangeNotSatisfiable`] error if requested
    /// range in header was not satisfiable.
    pub fn try_respond(self) -> Result<RangedResponse<B>, RangeNotSatisfiable> {
        let plan = ServingPlan::compute(self.range, self.body.byte_size(), self.malformed_range)?;
        Ok(RangedResponse::from_plan(plan, self.body, self.content_type, self.chunk_size))
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for Ranged<B> {
    fn into_response(self) -> Response {
        self.try_respond().into_response()
    }
}

/// Error type indicating that the requested range was not satisfiable. Implements [`IntoResponse`].
///
/// Carries `Content-Range: bytes */<size>` so the client can retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeNotSatisfiable(pub ContentRange);

impl RangeNotSatisfiable {
    pub fn for_size(total_size: u64) -> Self {
        RangeNotSatisfiable(ContentRange::unsatisfied_bytes(total_size))
    }
}

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        let status = StatusCode::RANGE_NOT_SATISFIABLE;
        let header = TypedHeader(self.0);
        (status, header, ()).into_response()
    }
}

/// Data type containing computed headers and body for a range response. Implements [`IntoResponse`].
#[derive(Debug)]
pub enum RangedResponse<B> {
    /// Full content response, no usable range requested.
    Full {
        content_length: ContentLength,
        stream: RangedStream<B>,
        content_type: Option<Mime>,
    },
    /// A single satisfiable range.
    Partial {
        content_range: ContentRange,
        content_length: ContentLength,
        stream: RangedStream<B>,
        content_type: Option<Mime>,
    },
}

impl<B: RangeBody + Send + 'static> RangedResponse<B> {
    pub(crate) fn from_plan(
        plan: ServingPlan,
        body: B,
        content_type: Option<Mime>,
        chunk_size: usize,
    ) -> Self {
        let content_length = ContentLength(plan.content_length());
        let stream = RangedStream::new(body, plan.start, plan.content_length(), chunk_size);
        match plan.content_range() {
            Some(content_range) => RangedResponse::Partial {
                content_range,
                content_length,
                stream,
                content_type,
            },
            None => RangedResponse::Full { content_length, stream, content_type },
        }
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedResponse<B> {
    fn into_response(self) -> Response {
        let accept_ranges = TypedHeader(AcceptRanges::bytes());
        match self {
            RangedResponse::Full { content_length, stream, content_type } => (
                StatusCode::OK,
                accept_ranges,
                TypedHeader(content_length),
                content_type.map(|mime| TypedHeader(ContentType::from(mime))),
                stream,
            )
                .into_response(),
            RangedResponse::Partial { content_range, content_length, stream, content_type } => (
                StatusCode::PARTIAL_CONTENT,
                accept_ranges,
                TypedHeader(content_range),
                TypedHeader(content_length),
                content_type.map(|mime| TypedHeader(ContentType::from(mime))),
                stream,
            )
                .into_response(),
        }
    }
}
