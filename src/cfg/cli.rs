// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Resolve a config file location: an environment variable override wins,
/// otherwise the fallback is taken relative to the working directory.
pub fn resolve_config_path(env_var: &str, fallback: &str) -> Result<PathBuf> {
    let rel = std::env::var(env_var).unwrap_or_else(|_| fallback.to_string());
    let p = Path::new(&rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}
