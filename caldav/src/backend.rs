// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Backend interface and its `CalDAV` implementation.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use tokio::sync::Mutex;

use crate::cache::ObjectCache;
use crate::cancel::Cancellable;
use crate::changes::{self, ChangeSet};
use crate::config::{CalDavConfig, ConnectionParams};
use crate::error::CalDavError;
use crate::fetch::{self, FetchOutcome};
use crate::freebusy;
use crate::http::HttpClient;
use crate::probe;
use crate::session::Session;
use crate::transfer::{self, LoadedObject, RemoveRequest, SaveOutcome, SaveRequest};
use crate::types::{Capabilities, Href, ObjectReference, SyncToken};

/// Result of [`CalendarBackend::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOutcome {
    /// Capabilities in effect for this connection.
    pub capabilities: Capabilities,
    /// Capabilities were discovered now rather than reused.
    pub probed: bool,
    /// Connection parameters differ from the previous connect; the stored
    /// token belongs to another collection and must be dropped.
    pub params_changed: bool,
}

/// Operations a calendar dispatcher needs from one account.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    /// Opens the connection, discovering capabilities unless they are known.
    async fn connect(&self, cancel: &Cancellable) -> Result<ConnectOutcome, CalDavError>;

    /// Drops the connection; the next operation reconnects.
    async fn disconnect(&self) -> Result<(), CalDavError>;

    /// Computes what changed on the server since `since`.
    async fn get_changes(
        &self,
        cache: &dyn ObjectCache,
        since: Option<&SyncToken>,
        is_repeat: bool,
        cancel: &Cancellable,
    ) -> Result<ChangeSet, CalDavError>;

    /// Lists every object of the collection with its UID and revision.
    async fn list_existing(&self, cancel: &Cancellable)
    -> Result<Vec<ObjectReference>, CalDavError>;

    /// Reads one object.
    async fn load_component(
        &self,
        uid: &str,
        hint: Option<&Href>,
        last_token: Option<&SyncToken>,
        cancel: &Cancellable,
    ) -> Result<LoadedObject, CalDavError>;

    /// Stores one object.
    async fn save_component(
        &self,
        request: SaveRequest,
        cancel: &Cancellable,
    ) -> Result<SaveOutcome, CalDavError>;

    /// Removes one object.
    async fn remove_component(
        &self,
        request: RemoveRequest,
        cancel: &Cancellable,
    ) -> Result<(), CalDavError>;

    /// Looks up free/busy data of other users.
    async fn get_free_busy(
        &self,
        users: &[String],
        start: Timestamp,
        end: Timestamp,
        cancel: &Cancellable,
    ) -> Result<Vec<String>, CalDavError>;
}

#[derive(Debug)]
struct State {
    config: CalDavConfig,
    session: Option<Arc<Session>>,
    last_probe: Option<Capabilities>,
    last_params: Option<ConnectionParams>,
}

/// [`CalendarBackend`] for one `CalDAV` calendar collection.
///
/// The session is created, replaced and dropped under a mutex; operations
/// clone it and run without holding the lock.
#[derive(Debug)]
pub struct CalDavBackend {
    state: Mutex<State>,
}

impl CalDavBackend {
    /// Creates a backend; nothing is sent before the first operation.
    #[must_use]
    pub fn new(config: CalDavConfig) -> Self {
        Self {
            state: Mutex::new(State {
                config,
                session: None,
                last_probe: None,
                last_params: None,
            }),
        }
    }

    /// Replaces the configuration and drops the current connection.
    pub async fn set_config(&self, config: CalDavConfig) {
        let mut state = self.state.lock().await;
        state.config = config;
        state.session = None;
    }

    /// Capabilities of the last successful probe, reused by the next connect.
    pub async fn last_probe(&self) -> Option<Capabilities> {
        self.state.lock().await.last_probe
    }

    /// Forgets the cached probe so the next connect rediscovers capabilities.
    pub async fn invalidate_probe(&self) {
        self.state.lock().await.last_probe = None;
    }

    /// Fills the bodies of listed references, as the refresh does for changed objects.
    ///
    /// # Errors
    ///
    /// Fails when a whole request fails; missing objects are returned as removed
    /// and unreachable ones as failed.
    #[tracing::instrument(skip_all, fields(count = refs.len()))]
    pub async fn fetch_bodies(
        &self,
        refs: &mut Vec<ObjectReference>,
        cancel: &Cancellable,
    ) -> Result<FetchOutcome, CalDavError> {
        let session = self.session(cancel).await?;
        let result = fetch::fetch_bodies(&session, refs, cancel).await;
        self.observe(result).await
    }

    async fn session(&self, cancel: &Cancellable) -> Result<Arc<Session>, CalDavError> {
        self.open(cancel).await.map(|(session, _)| session)
    }

    async fn open(
        &self,
        cancel: &Cancellable,
    ) -> Result<(Arc<Session>, ConnectOutcome), CalDavError> {
        cancel.check()?;
        let mut state = self.state.lock().await;
        if let Some(session) = &state.session {
            let outcome = ConnectOutcome {
                capabilities: session.capabilities,
                probed: false,
                params_changed: false,
            };
            return Ok((Arc::clone(session), outcome));
        }

        let params = state.config.connection_params();
        let params_changed = state.last_params.as_ref().is_some_and(|p| *p != params);
        if params_changed {
            tracing::info!("connection parameters changed, probing again");
            state.last_probe = None;
        }
        state.last_params = Some(params);

        let http = HttpClient::new(&state.config)?;
        let (capabilities, probed) = match state.last_probe {
            Some(capabilities) => (capabilities, false),
            None => match probe::probe(&http, &state.config, cancel).await {
                Ok(capabilities) => (capabilities, true),
                Err(e) => {
                    tracing::warn!(error = %e, "capability probe failed");
                    return Err(e);
                }
            },
        };
        cancel.check()?;

        let session = Arc::new(Session::new(http, state.config.clone(), capabilities));
        state.last_probe = Some(capabilities);
        state.session = Some(Arc::clone(&session));
        tracing::info!(
            writable = capabilities.writable,
            scheduling = capabilities.scheduling.scheduling,
            auto_scheduling = capabilities.scheduling.auto_scheduling,
            quirks = ?capabilities.quirks,
            probed,
            "connected"
        );

        Ok((
            session,
            ConnectOutcome {
                capabilities,
                probed,
                params_changed,
            },
        ))
    }

    /// Forgets the probe after an access failure so credentials are checked again.
    async fn observe<T>(&self, result: Result<T, CalDavError>) -> Result<T, CalDavError> {
        if let Err(e) = &result {
            if e.is_access_denied() {
                let mut state = self.state.lock().await;
                state.last_probe = None;
                state.session = None;
            }
        }
        result
    }
}

#[async_trait]
impl CalendarBackend for CalDavBackend {
    #[tracing::instrument(skip_all)]
    async fn connect(&self, cancel: &Cancellable) -> Result<ConnectOutcome, CalDavError> {
        self.open(cancel).await.map(|(_, outcome)| outcome)
    }

    async fn disconnect(&self) -> Result<(), CalDavError> {
        self.state.lock().await.session = None;
        tracing::debug!("disconnected");
        Ok(())
    }

    #[tracing::instrument(skip(self, cache, cancel))]
    async fn get_changes(
        &self,
        cache: &dyn ObjectCache,
        since: Option<&SyncToken>,
        is_repeat: bool,
        cancel: &Cancellable,
    ) -> Result<ChangeSet, CalDavError> {
        let session = self.session(cancel).await?;
        let result = changes::get_changes(&session, cache, since, is_repeat, cancel).await;
        self.observe(result).await
    }

    #[tracing::instrument(skip_all)]
    async fn list_existing(
        &self,
        cancel: &Cancellable,
    ) -> Result<Vec<ObjectReference>, CalDavError> {
        let session = self.session(cancel).await?;
        let result = changes::list_existing(&session, cancel).await;
        self.observe(result).await
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn load_component(
        &self,
        uid: &str,
        hint: Option<&Href>,
        last_token: Option<&SyncToken>,
        cancel: &Cancellable,
    ) -> Result<LoadedObject, CalDavError> {
        let session = self.session(cancel).await?;
        let result = transfer::load(&session, uid, hint, last_token, cancel).await;
        self.observe(result).await
    }

    #[tracing::instrument(skip_all, fields(locator = ?request.locator, resolution = ?request.conflict_resolution))]
    async fn save_component(
        &self,
        request: SaveRequest,
        cancel: &Cancellable,
    ) -> Result<SaveOutcome, CalDavError> {
        let session = self.session(cancel).await?;
        let result = transfer::save(&session, request, cancel).await;
        self.observe(result).await
    }

    #[tracing::instrument(skip_all, fields(uid = %request.uid))]
    async fn remove_component(
        &self,
        request: RemoveRequest,
        cancel: &Cancellable,
    ) -> Result<(), CalDavError> {
        let session = self.session(cancel).await?;
        let result = transfer::remove(&session, request, cancel).await;
        self.observe(result).await
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn get_free_busy(
        &self,
        users: &[String],
        start: Timestamp,
        end: Timestamp,
        cancel: &Cancellable,
    ) -> Result<Vec<String>, CalDavError> {
        let session = self.session(cancel).await?;
        let result = freebusy::free_busy(&session, users, start, end, cancel).await;
        self.observe(result).await
    }
}
