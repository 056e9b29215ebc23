use std::path::Path;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mime_guess::Mime;
use tokio::fs::File;
use tracing::instrument;

use crate::config::StreamConfig;
use crate::error::{ConfigError, ServeError};
use crate::file::SizedBody;
use crate::range::{RangeHeader, ServingPlan};
use crate::{RangeBody, RangeNotSatisfiable, RangedResponse};

/// Serves files from disk with `Range` support.
///
/// Holds only immutable configuration; clone it freely across handlers.
/// Every call opens its own file handle, so concurrent requests for the same
/// file never contend.
#[derive(Debug, Clone)]
pub struct RangeServer {
    config: StreamConfig,
    default_mime: Mime,
}

/// Result of [`RangeServer::serve`]. Implements [`IntoResponse`].
#[derive(Debug)]
pub enum Outcome {
    /// 200 with the whole file, or 206 with the planned window.
    Stream(RangedResponse<SizedBody<File>>),
    /// 416, nothing was read from the file.
    Unsatisfiable(RangeNotSatisfiable),
    /// 404. The error is for logging only and never reaches the client.
    NotFound(ServeError),
}

impl Outcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Stream(RangedResponse::Full { .. }) => StatusCode::OK,
            Outcome::Stream(RangedResponse::Partial { .. }) => StatusCode::PARTIAL_CONTENT,
            Outcome::Unsatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            Outcome::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::Stream(response) => response.into_response(),
            Outcome::Unsatisfiable(err) => err.into_response(),
            Outcome::NotFound(_) => StatusCode::NOT_FOUND.into_response(),
        }
    }
}

impl RangeServer {
    pub fn new(config: StreamConfig) -> Result<Self, ConfigError> {
        let default_mime = config.default_mime()?;
        Ok(RangeServer { config, default_mime })
    }

    /// Answer a request for `path` carrying the raw `Range` header value
    /// `range_header`, if any.
    pub async fn serve(&self, path: impl AsRef<Path>, range_header: Option<&str>) -> Outcome {
        self.serve_range(path.as_ref(), RangeHeader::parse(range_header)).await
    }

    /// [`RangeServer::serve`] with an already parsed header.
    #[instrument(skip_all, fields(path = %path.display(), ?range))]
    pub async fn serve_range(&self, path: &Path, range: RangeHeader) -> Outcome {
        // size comes from the open handle, so a file swapped in afterwards
        // cannot change what this response serves
        let body = match SizedBody::open(path).await {
            Ok(body) => body,
            Err(e) => return not_found(e),
        };
        let total_size = body.byte_size();

        let plan = match ServingPlan::compute(range, total_size, self.config.malformed_range) {
            Ok(plan) => plan,
            Err(unsatisfiable) => {
                tracing::debug!(total_size, "range not satisfiable");
                drop(body);
                return Outcome::Unsatisfiable(unsatisfiable);
            }
        };
        tracing::debug!(
            start = plan.start,
            length = plan.length,
            total_size,
            partial = plan.is_partial,
            "serving"
        );

        let content_type = self.content_type(path);
        Outcome::Stream(RangedResponse::from_plan(plan, body, Some(content_type), self.config.chunk_size))
    }

    fn content_type(&self, path: &Path) -> Mime {
        self.config
            .derive_content_type
            .then(|| mime_guess::from_path(path).first())
            .flatten()
            .unwrap_or_else(|| self.default_mime.clone())
    }
}

fn not_found(e: ServeError) -> Outcome {
    match &e {
        ServeError::Io { .. } => tracing::warn!(error = %e, "cannot open resource"),
        _ => tracing::debug!(error = %e, "resource not found"),
    }
    Outcome::NotFound(e)
}
