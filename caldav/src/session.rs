// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::OnceCell;

use crate::config::CalDavConfig;
use crate::http::HttpClient;
use crate::types::{Capabilities, Href};

/// One authenticated connection to a calendar collection.
///
/// Everything here is written once while connecting and read-only afterwards,
/// except the change-tag flag which can only be switched off.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) http: HttpClient,
    pub(crate) config: CalDavConfig,
    pub(crate) capabilities: Capabilities,
    pub(crate) collection: String,
    ctag_supported: AtomicBool,
    pub(crate) schedule_outbox: OnceCell<Option<Href>>,
}

impl Session {
    pub(crate) fn new(http: HttpClient, config: CalDavConfig, capabilities: Capabilities) -> Self {
        let collection = config.collection_path();
        Self {
            http,
            config,
            capabilities,
            collection,
            ctag_supported: AtomicBool::new(true),
            schedule_outbox: OnceCell::new(),
        }
    }

    pub(crate) fn ctag_supported(&self) -> bool {
        self.ctag_supported.load(Ordering::Acquire)
    }

    /// Stops using the change tag for the rest of this connection.
    pub(crate) fn disable_ctag(&self) {
        self.ctag_supported.store(false, Ordering::Release);
    }

    /// Address of the account used as the free/busy organizer.
    ///
    /// The configured address wins; otherwise the username is used when it
    /// already looks like an address, or completed for providers that derive
    /// the address from it.
    pub(crate) fn user_email(&self) -> Option<String> {
        if let Some(email) = self.config.email_address.as_deref().map(str::trim) {
            if !email.is_empty() {
                return Some(email.to_string());
            }
        }

        let username = self.config.auth.username()?;
        if self.capabilities.quirks.infers_email() && !username.contains('@') {
            return Some(format!("{username}@gmail.com"));
        }
        looks_like_address(username).then(|| username.to_string())
    }
}

fn looks_like_address(s: &str) -> bool {
    s.split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
}
