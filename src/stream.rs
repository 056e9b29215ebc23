use std::pin::Pin;
use std::task::{Context, Poll};
use std::{fmt, io, mem};

use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::{pin_project, pinned_drop};
use tokio::io::ReadBuf;

use crate::RangeBody;

/// Response body stream. Implements [`Stream`], [`Body`], and [`IntoResponse`].
///
/// Yields at most `chunk_size` bytes per item and exactly `length` bytes in
/// total. The wrapped body is dropped as soon as the stream completes or
/// aborts, and otherwise together with the stream, which is how the file
/// handle gets released when the client goes away.
#[pin_project(PinnedDrop)]
pub struct RangedStream<B> {
    state: StreamState,
    length: u64,
    chunk_size: usize,
    #[pin]
    body: Option<B>,
}

impl<B: RangeBody + Send + 'static> RangedStream<B> {
    pub(crate) fn new(body: B, start: u64, length: u64, chunk_size: usize) -> Self {
        RangedStream {
            state: StreamState::Seek { start },
            length,
            chunk_size: chunk_size.max(1),
            body: Some(body),
        }
    }
}

impl<B> fmt::Debug for RangedStream<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangedStream")
            .field("state", &self.state)
            .field("length", &self.length)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

enum StreamState {
    Seek { start: u64 },
    Seeking { remaining: u64 },
    Reading { buffer: BytesMut, remaining: u64 },
    Completed,
    Aborted,
}

impl fmt::Debug for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Seek { start } => f.debug_struct("Seek").field("start", start).finish(),
            StreamState::Seeking { remaining } => {
                f.debug_struct("Seeking").field("remaining", remaining).finish()
            }
            StreamState::Reading { remaining, .. } => {
                f.debug_struct("Reading").field("remaining", remaining).finish()
            }
            StreamState::Completed => f.write_str("Completed"),
            StreamState::Aborted => f.write_str("Aborted"),
        }
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for RangedStream<B> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<B: RangeBody> Body for RangedStream<B> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, StreamState::Completed | StreamState::Aborted)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<B: RangeBody> Stream for RangedStream<B> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();
        let Some(mut body) = this.body.as_mut().as_pin_mut() else {
            return Poll::Ready(None);
        };

        if let StreamState::Seek { start } = *this.state {
            if *this.length == 0 {
                *this.state = StreamState::Completed;
                this.body.set(None);
                return Poll::Ready(None);
            }
            match body.as_mut().start_seek(start) {
                Err(e) => { return abort(this.state, this.body, e); }
                Ok(()) => {
                    let remaining = *this.length;
                    *this.state = StreamState::Seeking { remaining };
                }
            }
        }

        if let StreamState::Seeking { remaining } = *this.state {
            match body.as_mut().poll_complete(cx) {
                Poll::Pending => { return Poll::Pending; }
                Poll::Ready(Err(e)) => { return abort(this.state, this.body, e); }
                Poll::Ready(Ok(())) => {
                    let buffer = BytesMut::with_capacity(chunk_len(*this.chunk_size, remaining));
                    *this.state = StreamState::Reading { buffer, remaining };
                }
            }
        }

        if let StreamState::Reading { buffer, remaining } = this.state {
            if *remaining == 0 {
                *this.state = StreamState::Completed;
                this.body.set(None);
                tracing::trace!(length = *this.length, "range stream completed");
                return Poll::Ready(None);
            }

            // never read past the planned window, even if the file has grown
            let wanted = chunk_len(*this.chunk_size, *remaining);
            buffer.reserve(wanted);
            let uninit = buffer.spare_capacity_mut();
            let nbytes = std::cmp::min(uninit.len(), wanted);

            let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

            match body.as_mut().poll_read(cx, &mut read_buf) {
                Poll::Pending => { return Poll::Pending; }
                Poll::Ready(Err(e)) => { return abort(this.state, this.body, e); }
                Poll::Ready(Ok(())) => {
                    match read_buf.filled().len() {
                        0 => {
                            let missing = *remaining;
                            let e = io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                format!("resource ended {missing} bytes short of the planned range"),
                            );
                            return abort(this.state, this.body, e);
                        }
                        n => {
                            // SAFETY: poll_read has filled the first `n` bytes
                            // of the spare capacity, and `buffer.len()` is 0
                            unsafe { buffer.set_len(buffer.len() + n); }

                            let chunk = mem::take(buffer);

                            // n <= remaining because of the min above
                            *remaining -= n as u64;

                            return Poll::Ready(Some(Ok(chunk.freeze())));
                        }
                    }
                }
            }
        }

        match this.state {
            StreamState::Completed | StreamState::Aborted => Poll::Ready(None),
            _ => unreachable!("every in-flight state returns above"),
        }
    }
}

/// Bytes to read next: `chunk_size`, or less when fewer remain.
fn chunk_len(chunk_size: usize, remaining: u64) -> usize {
    usize::try_from(remaining).map_or(chunk_size, |remaining| remaining.min(chunk_size))
}

fn abort<B>(
    state: &mut StreamState,
    mut body: Pin<&mut Option<B>>,
    e: io::Error,
) -> Poll<Option<io::Result<Bytes>>> {
    tracing::warn!(error = %e, "aborting range stream");
    *state = StreamState::Aborted;
    body.set(None);
    Poll::Ready(Some(Err(e)))
}

#[pinned_drop]
impl<B> PinnedDrop for RangedStream<B> {
    fn drop(self: Pin<&mut Self>) {
        let remaining = match self.state {
            StreamState::Seek { .. } => self.length,
            StreamState::Seeking { remaining } | StreamState::Reading { remaining, .. } => remaining,
            StreamState::Completed | StreamState::Aborted => return,
        };
        if remaining > 0 {
            tracing::debug!(remaining, length = self.length, "range stream dropped before completion");
        }
    }
}
