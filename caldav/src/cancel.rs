// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::CalDavError;

/// Cooperative cancellation flag shared between a caller and one operation.
#[derive(Debug, Clone, Default)]
pub struct Cancellable {
    cancelled: Arc<AtomicBool>,
}

impl Cancellable {
    /// Creates a flag that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`CalDavError::Cancelled`] once cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the flag is set.
    pub fn check(&self) -> Result<(), CalDavError> {
        if self.is_cancelled() {
            Err(CalDavError::Cancelled)
        } else {
            Ok(())
        }
    }
}
