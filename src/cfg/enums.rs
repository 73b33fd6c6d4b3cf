// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Device category, as seeded from configuration and carried in status
/// payloads. Unknown categories in config files deserialize to `Other`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Printer,
    Scanner,
    Projector,
    Display,
    Laptop,
    Camera,
    #[serde(other)]
    Other,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Printer => "printer",
            DeviceKind::Scanner => "scanner",
            DeviceKind::Projector => "projector",
            DeviceKind::Display => "display",
            DeviceKind::Laptop => "laptop",
            DeviceKind::Camera => "camera",
            DeviceKind::Other => "other",
        })
    }
}

impl FromStr for DeviceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "printer" => Self::Printer,
            "scanner" => Self::Scanner,
            "projector" => Self::Projector,
            "display" => Self::Display,
            "laptop" => Self::Laptop,
            "camera" => Self::Camera,
            _ => Self::Other,
        })
    }
}
