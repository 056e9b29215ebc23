use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, ReadBuf};

use crate::error::ServeError;
use crate::{AsyncSeekStart, RangeBody};

/// Implements [`RangeBody`] for any [`AsyncRead`] and [`AsyncSeekStart`],
/// pinned to the byte size observed when it was constructed.
#[pin_project]
pub struct SizedBody<B> {
    byte_size: u64,
    #[pin]
    body: B,
}

impl<B> std::fmt::Debug for SizedBody<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SizedBody")
            .field("byte_size", &self.byte_size)
            .finish_non_exhaustive()
    }
}

impl SizedBody<File> {
    /// Opens a regular file and records its length, read from the opened
    /// handle rather than the path.
    pub async fn open(path: impl AsRef<Path>) -> Result<SizedBody<File>, ServeError> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|e| ServeError::from_io(path, e))?;
        let metadata = file.metadata().await.map_err(|e| ServeError::from_io(path, e))?;
        if !metadata.is_file() {
            return Err(ServeError::NotAFile { path: path.to_owned() });
        }
        Ok(SizedBody { byte_size: metadata.len(), body: file })
    }
}

impl<B: AsyncRead + AsyncSeekStart> SizedBody<B> {
    /// Construct a [`SizedBody`] with a byte size supplied manually.
    pub fn sized(body: B, byte_size: u64) -> Self {
        SizedBody { byte_size, body }
    }
}

impl<B: AsyncRead + AsyncSeek + Unpin> SizedBody<B> {
    /// Uses `seek` to determine size by seeking to the end and getting stream position.
    pub async fn seek(mut body: B) -> io::Result<SizedBody<B>> {
        let byte_size = body.seek(io::SeekFrom::End(0)).await?;
        Ok(SizedBody { byte_size, body })
    }
}

impl<B: AsyncRead> AsyncRead for SizedBody<B> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().body.poll_read(cx, buf)
    }
}

impl<B: AsyncSeekStart> AsyncSeekStart for SizedBody<B> {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        self.project().body.start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().body.poll_complete(cx)
    }
}

impl<B: AsyncRead + AsyncSeekStart> RangeBody for SizedBody<B> {
    fn byte_size(&self) -> u64 {
        self.byte_size
    }
}
