// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wire protocol: message kinds, frame layout, async codec, typed messages.

pub mod codec;
pub mod frame;
pub mod kind;
pub mod messages;

/// Upper bound on the opaque data segment of a frame.
pub const MAX_MESSAGE_LENGTH: usize = 1024;
/// Upper bound on a single argument string.
pub const MAX_ARG_LENGTH: usize = 256;
/// Upper bound on the argument count. The status payload carries six
/// arguments per device, so this caps the fleet at fifty devices.
pub const MAX_ARGS: usize = 300;
/// Highest request priority class; higher wire values are clipped.
pub const MAX_PRIORITY: u32 = 10;
