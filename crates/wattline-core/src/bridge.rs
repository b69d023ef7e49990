// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Wattline.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use crate::errors::{ComponentError, ComponentResult};
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;

/// Runs an asynchronous read to completion from synchronous polling code.
///
/// Must not be called from inside the runtime's own worker threads.
#[derive(Debug, Clone)]
pub struct AsyncBridge {
    handle: Handle,
    timeout: Duration,
}

impl AsyncBridge {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(handle: Handle, timeout: Duration) -> Self {
        Self { handle, timeout }
    }

    /// Bridge onto the runtime the caller is running in, if any
    pub fn current(timeout: Duration) -> Option<Self> {
        Handle::try_current().ok().map(|handle| Self::new(handle, timeout))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Block until `future` finishes or the timeout expires
    pub fn run<F, T>(&self, future: F) -> ComponentResult<T>
    where
        F: Future<Output = ComponentResult<T>>,
    {
        let limit = self.timeout;
        self.handle
            .block_on(async move { tokio::time::timeout(limit, future).await })
            .unwrap_or(Err(ComponentError::Timeout(limit)))
    }
}
