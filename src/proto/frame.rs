// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Frame layout and buffer encoding.
//!
//! Every message is a sequence of big-endian `u32` fields:
//!
//! ```text
//! u32 kind
//! u32 priority                 -- 0..=MAX_PRIORITY, clipped on receive
//! u32 arg_count
//! [ u32 error_code ]           -- present only when kind == ERROR
//! arg_count x ( u32 len, len bytes )
//! u32 data_len
//! data_len bytes
//! ```
//!
//! Arguments are UTF-8 strings; `data` is an opaque payload (human-readable
//! detail on `ERROR` frames). Field lengths are bounded by
//! [`MAX_ARG_LENGTH`], [`MAX_ARGS`] and [`MAX_MESSAGE_LENGTH`]; a violation
//! fails the frame and the connection is dropped by the caller.

use bytes::{BufMut, Bytes, BytesMut};
use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32, Unaligned,
};

use crate::{
    error::ServiceError,
    proto::{MAX_ARG_LENGTH, MAX_ARGS, MAX_MESSAGE_LENGTH, MAX_PRIORITY, kind::MessageKind},
};

/// Fixed leading part of every frame.
#[repr(C)]
#[derive(Debug, Clone, ZFromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct FrameHeader {
    pub kind: U32<BigEndian>,
    pub priority: U32<BigEndian>,
    pub arg_count: U32<BigEndian>,
}

impl FrameHeader {
    pub const SIZE: usize = 12;
}

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageKind,
    pub priority: u32,
    /// Only meaningful on [`MessageKind::Error`] frames.
    pub error_code: Option<u32>,
    pub args: Vec<String>,
    pub data: Bytes,
}

impl Frame {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            priority: 0,
            error_code: None,
            args: Vec::new(),
            data: Bytes::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority.min(MAX_PRIORITY);
        self
    }

    /// An `ERROR` frame for a service rejection; the human-readable detail
    /// travels in the data segment.
    pub fn for_error(err: &ServiceError) -> Self {
        let mut frame = Self::new(MessageKind::Error).with_data(err.to_string().into_bytes());
        frame.error_code = Some(err.code());
        frame
    }

    #[inline]
    pub fn arg(&self, idx: usize) -> Option<&str> {
        self.args.get(idx).map(String::as_str)
    }

    /// Serialize into a contiguous buffer, enforcing the same bounds the
    /// read side enforces so a malformed frame is never emitted.
    pub fn encode(&self) -> Result<Bytes, ServiceError> {
        if self.args.len() > MAX_ARGS {
            return Err(ServiceError::MessageTooLarge {
                field: "arg_count",
                len: self.args.len(),
            });
        }
        if self.data.len() >= MAX_MESSAGE_LENGTH {
            return Err(ServiceError::MessageTooLarge {
                field: "data",
                len: self.data.len(),
            });
        }
        for arg in &self.args {
            if arg.len() >= MAX_ARG_LENGTH {
                return Err(ServiceError::MessageTooLarge {
                    field: "arg",
                    len: arg.len(),
                });
            }
        }

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        let header = FrameHeader {
            kind: U32::new(self.kind.as_u32()),
            priority: U32::new(self.priority.min(MAX_PRIORITY)),
            arg_count: U32::new(self.args.len() as u32),
        };
        buf.put_slice(header.as_bytes());
        if self.kind == MessageKind::Error {
            buf.put_u32(self.error_code.unwrap_or(0));
        }
        for arg in &self.args {
            buf.put_u32(arg.len() as u32);
            buf.put_slice(arg.as_bytes());
        }
        buf.put_u32(self.data.len() as u32);
        buf.put_slice(&self.data);
        Ok(buf.freeze())
    }

    fn encoded_len(&self) -> usize {
        let mut len = FrameHeader::SIZE + 4 + self.data.len();
        if self.kind == MessageKind::Error {
            len += 4;
        }
        for arg in &self.args {
            len += 4 + arg.len();
        }
        len
    }
}
