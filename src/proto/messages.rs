// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed views over raw frames.
//!
//! Incoming frames parse into [`ClientRequest`] with argument validation;
//! outgoing replies are typed values lowered back into frames through
//! [`IntoFrame`]. The dispatch loop never touches raw argument indices.

use enum_dispatch::enum_dispatch;

use crate::{
    error::ServiceError,
    proto::{frame::Frame, kind::MessageKind},
    registry::device::DeviceView,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginArgs {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveArgs {
    pub device_id: String,
    pub duration_secs: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelArgs {
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSyncArgs {
    pub client_t1: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingArgs {
    pub args: Vec<String>,
}

/// A client-originated request, shape-validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Login(LoginArgs),
    Logout,
    Reserve(ReserveArgs),
    Cancel(CancelArgs),
    Status,
    Ping(PingArgs),
    PingAck,
    TimeSync(TimeSyncArgs),
}

impl ClientRequest {
    pub fn parse(frame: &Frame) -> Result<Self, ServiceError> {
        match frame.kind {
            MessageKind::Login => Ok(Self::Login(LoginArgs {
                username: required(frame, 0, "username")?.to_string(),
                password: required(frame, 1, "password")?.to_string(),
            })),
            MessageKind::Logout => Ok(Self::Logout),
            MessageKind::ReserveRequest => {
                let device_id = required(frame, 0, "device id")?.to_string();
                let raw = required(frame, 1, "duration")?;
                let duration_secs = raw.parse::<i64>().map_err(|_| {
                    ServiceError::InvalidParameter(format!("duration {raw:?} is not a number"))
                })?;
                Ok(Self::Reserve(ReserveArgs {
                    device_id,
                    duration_secs,
                    reason: frame.arg(2).map(str::to_string),
                }))
            },
            MessageKind::CancelRequest => Ok(Self::Cancel(CancelArgs {
                device_id: required(frame, 0, "device id")?.to_string(),
            })),
            MessageKind::StatusRequest => Ok(Self::Status),
            MessageKind::Ping => Ok(Self::Ping(PingArgs {
                args: frame.args.clone(),
            })),
            MessageKind::PingResponse => Ok(Self::PingAck),
            MessageKind::TimeSyncRequest => Ok(Self::TimeSync(TimeSyncArgs {
                client_t1: required(frame, 0, "t1")?.to_string(),
            })),
            other => Err(ServiceError::InvalidParameter(format!(
                "{other} is not a client request"
            ))),
        }
    }
}

fn required<'f>(frame: &'f Frame, idx: usize, what: &str) -> Result<&'f str, ServiceError> {
    frame
        .arg(idx)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::InvalidParameter(format!("missing {what} argument")))
}

/// Lowers a typed reply into its wire frame.
#[enum_dispatch]
pub trait IntoFrame {
    fn into_frame(self) -> Frame;
}

#[derive(Debug, Clone)]
pub struct LoginOk {
    pub username: String,
}

impl IntoFrame for LoginOk {
    fn into_frame(self) -> Frame {
        Frame::new(MessageKind::Login).with_args(["success".to_string(), self.username])
    }
}

#[derive(Debug, Clone)]
pub struct LogoutOk;

impl IntoFrame for LogoutOk {
    fn into_frame(self) -> Frame {
        Frame::new(MessageKind::Logout).with_args(["success"])
    }
}

#[derive(Debug, Clone)]
pub struct ReserveOk {
    pub device_id: String,
    pub end_time: u64,
}

impl IntoFrame for ReserveOk {
    fn into_frame(self) -> Frame {
        Frame::new(MessageKind::ReserveResponse).with_args([
            "success".to_string(),
            self.device_id,
            self.end_time.to_string(),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct CancelOk {
    pub device_id: String,
}

impl IntoFrame for CancelOk {
    fn into_frame(self) -> Frame {
        Frame::new(MessageKind::CancelResponse).with_args(["success".to_string(), self.device_id])
    }
}

/// Fleet snapshot payload, shared by `STATUS_RESPONSE` (direct reply) and
/// `STATUS_UPDATE` (broadcast). One 6-tuple of arguments per device.
#[derive(Debug, Clone)]
pub struct FleetStatus {
    kind: MessageKind,
    pub devices: Vec<DeviceView>,
}

impl FleetStatus {
    pub fn response(devices: Vec<DeviceView>) -> Self {
        Self {
            kind: MessageKind::StatusResponse,
            devices,
        }
    }

    pub fn update(devices: Vec<DeviceView>) -> Self {
        Self {
            kind: MessageKind::StatusUpdate,
            devices,
        }
    }

    /// Decode side, used by clients and tests: regroup the flat argument
    /// list into 6-tuples.
    pub fn parse(frame: &Frame) -> Result<Vec<DeviceView>, ServiceError> {
        if frame.args.len() % 6 != 0 {
            return Err(ServiceError::InvalidParameter(
                "status payload is not a multiple of 6 arguments".to_string(),
            ));
        }
        frame
            .args
            .chunks_exact(6)
            .map(DeviceView::from_wire_tuple)
            .collect()
    }
}

impl IntoFrame for FleetStatus {
    fn into_frame(self) -> Frame {
        let mut args = Vec::with_capacity(self.devices.len() * 6);
        for d in &self.devices {
            args.extend(d.wire_tuple());
        }
        Frame::new(self.kind).with_args(args)
    }
}

#[derive(Debug, Clone)]
pub struct Pong {
    pub args: Vec<String>,
}

impl IntoFrame for Pong {
    fn into_frame(self) -> Frame {
        Frame::new(MessageKind::Pong).with_args(self.args)
    }
}

#[derive(Debug, Clone)]
pub struct TimeSyncOk {
    pub client_t1: String,
    pub server_t3: i64,
}

impl IntoFrame for TimeSyncOk {
    fn into_frame(self) -> Frame {
        Frame::new(MessageKind::TimeSyncResponse)
            .with_args([self.client_t1, self.server_t3.to_string()])
    }
}

#[derive(Debug, Clone)]
pub struct ErrorReply(pub ServiceError);

impl IntoFrame for ErrorReply {
    fn into_frame(self) -> Frame {
        Frame::for_error(&self.0)
    }
}

/// Everything the dispatch path can answer with.
#[enum_dispatch(IntoFrame)]
#[derive(Debug, Clone)]
pub enum Reply {
    LoginOk(LoginOk),
    LogoutOk(LogoutOk),
    ReserveOk(ReserveOk),
    CancelOk(CancelOk),
    FleetStatus(FleetStatus),
    Pong(Pong),
    TimeSyncOk(TimeSyncOk),
    ErrorReply(ErrorReply),
}
