// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Read-only username/password table, loaded once at startup.
//!
//! The file is plain UTF-8 text, one `username:password` per line. Lines
//! that do not match that shape are skipped silently; the file is never
//! reloaded.

use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};

#[derive(Debug, Default)]
pub struct CredentialStore {
    users: HashMap<String, String>,
}

impl CredentialStore {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("failed to read credential file {:?}", path.as_ref())
        })?;
        Ok(Self::from_lines(&text))
    }

    pub fn from_lines(text: &str) -> Self {
        let mut users = HashMap::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            let Some((username, password)) = line.split_once(':') else {
                continue;
            };
            if username.is_empty() {
                continue;
            }
            users.insert(username.to_string(), password.to_string());
        }
        Self { users }
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.users.get(username).is_some_and(|p| p == password)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
