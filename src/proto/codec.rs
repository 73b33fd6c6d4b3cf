// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Async framed reads and writes.
//!
//! The read side blocks indefinitely waiting for the next frame to begin
//! (idle connections are legal); once the first header byte arrives, the
//! remainder of the frame must complete within the I/O timeout. The write
//! side bounds the whole frame write by the same timeout. Partial-write
//! retries of the underlying transport are absorbed by `write_all`; a
//! timeout mid-frame poisons the stream and is therefore fatal.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::timeout,
};
use zerocopy::FromBytes as ZFromBytes;

use crate::{
    error::ServiceError,
    proto::{
        MAX_ARG_LENGTH, MAX_ARGS, MAX_MESSAGE_LENGTH, MAX_PRIORITY,
        frame::{Frame, FrameHeader},
        kind::MessageKind,
    },
};

/// Read one frame. `Ok(None)` means the peer closed the stream cleanly
/// between frames; EOF inside a frame is an error.
pub async fn read_frame<R>(r: &mut R, io_timeout: Duration) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; FrameHeader::SIZE];
    let mut filled = 0usize;
    while filled < header_buf.len() {
        // No deadline before the frame starts; bounded once it has.
        let n = if filled == 0 {
            r.read(&mut header_buf).await.context("read frame header")?
        } else {
            io_bounded("read frame header", r.read(&mut header_buf[filled..]), io_timeout).await?
        };
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ServiceError::NetworkClosed).context("EOF inside frame header");
        }
        filled += n;
    }

    let header = FrameHeader::read_from_bytes(&header_buf)
        .map_err(|_| anyhow!("frame header size mismatch"))?;

    let kind = MessageKind::try_from(header.kind.get())
        .map_err(|e| ServiceError::MessageBadKind(e.0))?;
    let priority = header.priority.get().min(MAX_PRIORITY);
    let arg_count = header.arg_count.get() as usize;
    if arg_count > MAX_ARGS {
        return Err(ServiceError::MessageTooLarge {
            field: "arg_count",
            len: arg_count,
        }
        .into());
    }

    let error_code = if kind == MessageKind::Error {
        Some(read_u32(r, io_timeout, "error_code").await?)
    } else {
        None
    };

    let mut args = Vec::with_capacity(arg_count);
    for _ in 0..arg_count {
        let len = read_u32(r, io_timeout, "arg length").await? as usize;
        if len >= MAX_ARG_LENGTH {
            return Err(ServiceError::MessageTooLarge {
                field: "arg",
                len,
            }
            .into());
        }
        let mut buf = vec![0u8; len];
        io_bounded("read arg", r.read_exact(&mut buf), io_timeout).await?;
        let arg = String::from_utf8(buf).map_err(|_| ServiceError::MessageBadUtf8)?;
        args.push(arg);
    }

    let data_len = read_u32(r, io_timeout, "data length").await? as usize;
    if data_len >= MAX_MESSAGE_LENGTH {
        return Err(ServiceError::MessageTooLarge {
            field: "data",
            len: data_len,
        }
        .into());
    }
    let mut data = vec![0u8; data_len];
    io_bounded("read data", r.read_exact(&mut data), io_timeout).await?;

    Ok(Some(Frame {
        kind,
        priority,
        error_code,
        args,
        data: data.into(),
    }))
}

/// Serialize and write one frame, bounded by the I/O timeout.
pub async fn write_frame<W>(w: &mut W, frame: &Frame, io_timeout: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = frame.encode()?;
    io_bounded("write frame", w.write_all(&encoded), io_timeout).await?;
    io_bounded("flush frame", w.flush(), io_timeout).await?;
    Ok(())
}

async fn read_u32<R>(r: &mut R, io_timeout: Duration, label: &'static str) -> Result<u32>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4];
    io_bounded(label, r.read_exact(&mut buf), io_timeout).await?;
    Ok(u32::from_be_bytes(buf))
}

async fn io_bounded<F, T>(label: &'static str, fut: F, io_timeout: Duration) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout(io_timeout, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(anyhow!(e).context(label)),
        Err(_) => Err(ServiceError::NetworkTimeout(label).into()),
    }
}
