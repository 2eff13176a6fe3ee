//! Line-delimited frame channel
//!
//! Every frame is `base64(payload) + "\n"`. The base64 alphabet never
//! contains the terminator, so a frame is exactly one line on the wire.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::trace;

use crate::{FRAME_TERMINATOR, MAX_FRAME_PAYLOAD, ProtocolError, ProtocolResult};

/// Length of the base64 text for a payload of `len` bytes
fn encoded_len(len: usize) -> usize {
    len.div_ceil(3) * 4
}

/// Encode a payload as one wire line, terminator included
pub fn encode_frame(payload: &[u8]) -> ProtocolResult<String> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_PAYLOAD,
        });
    }

    let mut line = BASE64.encode(payload);
    line.push(FRAME_TERMINATOR as char);
    Ok(line)
}

/// Decode one wire line; the line must end with exactly one terminator
pub fn decode_frame(line: &[u8]) -> ProtocolResult<Bytes> {
    let body = line.strip_suffix(&[FRAME_TERMINATOR]).ok_or_else(|| {
        ProtocolError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "frame terminator not observed",
        ))
    })?;

    Ok(Bytes::from(BASE64.decode(body)?))
}

/// Reading half of a [`LineChannel`]
pub struct FrameReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Read the next frame, blocking until its terminator arrives
    pub async fn receive_frame(&mut self) -> ProtocolResult<Bytes> {
        // Room for the largest legal frame plus one byte to detect overruns
        let limit = encoded_len(MAX_FRAME_PAYLOAD) + 2;

        let mut line = Vec::new();
        let read = (&mut self.inner)
            .take(limit as u64)
            .read_until(FRAME_TERMINATOR, &mut line)
            .await?;

        if read == 0 {
            return Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream closed",
            )));
        }

        if line.last() != Some(&FRAME_TERMINATOR) && line.len() >= limit {
            return Err(ProtocolError::FrameTooLarge {
                size: line.len() / 4 * 3,
                max: MAX_FRAME_PAYLOAD,
            });
        }

        let payload = decode_frame(&line)?;
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }

        trace!("Received frame: {} bytes", payload.len());
        Ok(payload)
    }
}

/// Writing half of a [`LineChannel`]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Encode, terminate, write and flush one frame
    pub async fn send_frame(&mut self, payload: &[u8]) -> ProtocolResult<()> {
        let line = encode_frame(payload)?;
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await?;

        trace!("Sent frame: {} bytes", payload.len());
        Ok(())
    }

    /// Flush and shut down the write direction of the stream
    pub async fn close(&mut self) -> ProtocolResult<()> {
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Buffered line-oriented channel over a split byte stream
pub struct LineChannel<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap the read and write halves of one stream
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
        }
    }

    pub async fn send_frame(&mut self, payload: &[u8]) -> ProtocolResult<()> {
        self.writer.send_frame(payload).await
    }

    pub async fn receive_frame(&mut self) -> ProtocolResult<Bytes> {
        self.reader.receive_frame().await
    }

    /// Borrow both halves at once, for sending and receiving concurrently
    pub fn halves_mut(&mut self) -> (&mut FrameReader<R>, &mut FrameWriter<W>) {
        (&mut self.reader, &mut self.writer)
    }

    /// Split into independently owned halves
    pub fn into_split(self) -> (FrameReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }
}
