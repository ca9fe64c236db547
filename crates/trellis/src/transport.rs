// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Framed byte transport for switch connections.
//!
//! [`FrameReader`] buffers partial reads so a frame interrupted by the read
//! deadline (or a cancelled `select!` branch) is resumed, not lost.
//! [`FrameWriter`] serializes whole-frame writes from several tasks.

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use trellis_openflow::{frame_length, CodecError, HEADER_LEN};

const READ_CHUNK: usize = 4096;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Transport error types.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed by peer")]
    Closed,

    #[error("connection closed mid-frame ({buffered} bytes buffered)")]
    UnexpectedEof { buffered: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("frame too large: {len} > {max}")]
    TooLarge { len: usize, max: usize },

    #[error("malformed frame: {0}")]
    Malformed(#[from] CodecError),
}

/// Reads complete OpenFlow frames.
pub struct FrameReader<R = BoxedReader> {
    inner: R,
    buf: Vec<u8>,
    max_message_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_message_size: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
            max_message_size,
        }
    }

    /// Read one frame, header included.
    ///
    /// Returns `Ok(None)` when `deadline` expires first; bytes already read
    /// stay buffered for the next call. A clean EOF between frames is
    /// [`TransportError::Closed`].
    pub async fn read_frame(
        &mut self,
        deadline: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let until = tokio::time::Instant::now() + deadline;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(Some(frame));
            }

            let n = match tokio::time::timeout_at(until, self.inner.read(&mut chunk)).await {
                Err(_) => return Ok(None),
                Ok(result) => result?,
            };
            if n == 0 {
                return Err(if self.buf.is_empty() {
                    TransportError::Closed
                } else {
                    TransportError::UnexpectedEof {
                        buffered: self.buf.len(),
                    }
                });
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn take_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(len) = frame_length(&self.buf) else {
            return Ok(None);
        };
        if len < HEADER_LEN {
            return Err(CodecError::Invalid(format!("declared length {len}")).into());
        }
        if len > self.max_message_size {
            return Err(TransportError::TooLarge {
                len,
                max: self.max_message_size,
            });
        }
        if self.buf.len() < len {
            return Ok(None);
        }
        let rest = self.buf.split_off(len);
        Ok(Some(std::mem::replace(&mut self.buf, rest)))
    }
}

/// Writes whole frames, one at a time, under a timeout.
pub struct FrameWriter<W = BoxedWriter> {
    inner: Mutex<W>,
    write_timeout: Duration,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, write_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(inner),
            write_timeout,
        }
    }

    pub async fn write_frame(&self, frame: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().await;
        let write = async {
            inner.write_all(frame).await?;
            inner.flush().await
        };
        tokio::time::timeout(self.write_timeout, write)
            .await
            .map_err(|_| TransportError::WriteTimeout(self.write_timeout))??;
        Ok(())
    }

    /// Shut down the write half.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().await;
        inner.shutdown().await?;
        Ok(())
    }
}
