// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `CalDAV` synchronization engine (RFC 4791).
//!
//! [`CalDavBackend`] keeps one calendar collection in step with a local cache:
//! it probes server capabilities, detects changes through the collection
//! change tag and a diff of `ETag` listings, fetches bodies in batches,
//! performs conditional writes under a caller-chosen conflict policy and
//! looks up free/busy data of other users.

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::dbg_macro,
    clippy::indexing_slicing,
    clippy::pedantic
)]
// Allow certain clippy lints that are too restrictive for this crate
#![allow(
    clippy::option_option,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::match_bool
)]

mod backend;
mod cache;
mod cancel;
mod changes;
mod config;
mod error;
mod fetch;
mod freebusy;
mod http;
pub mod ical;
mod probe;
mod request;
mod response;
mod schedule;
mod session;
mod transfer;
mod types;
mod xml;

pub use crate::backend::{CalDavBackend, CalendarBackend, ConnectOutcome};
pub use crate::cache::{CacheSnapshot, CachedObject, MemoryCache, ObjectCache, ObjectId};
pub use crate::cancel::Cancellable;
pub use crate::changes::ChangeSet;
pub use crate::config::{AuthMethod, CalDavConfig, ConnectionParams};
pub use crate::error::CalDavError;
pub use crate::fetch::{FetchOutcome, MAX_MULTIGET};
pub use crate::http::{Depth, HttpClient, OptionsResponse, Precondition};
pub use crate::request::{
    CalendarMultiGetRequest, CalendarQueryRequest, FreeBusyQueryRequest,
    PrincipalPropertySearchRequest, Prop, PropFindRequest, QueryData, TimeRange,
};
pub use crate::response::{
    MultiStatusResponse, PropStat, Properties, ResponseItem, ScheduleResponseItem,
    parse_schedule_response,
};
pub use crate::transfer::{LoadedObject, RemoveRequest, SaveOutcome, SaveRequest, StoredObject};
pub use crate::types::{
    Capabilities, ChangeClassification, ComponentKind, ConflictResolution, ETag, Href,
    ObjectReference, OfflineState, SchedulingCapability, ServerQuirks, SyncToken,
};
