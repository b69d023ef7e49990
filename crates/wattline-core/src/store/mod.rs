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

//! Value stores: where corrected states go once a component has been polled.
//!
//! Every store follows the same two-step protocol: [`ValueStore::set`] stages
//! a corrected state, [`ValueStore::update`] commits it to the backend. The
//! backend is picked once at startup from [`StorageConfig`] and stays fixed
//! for the life of the process.

mod bus;
mod local;
mod logging;
mod shared;

pub use bus::{BusMessage, BusPublisher, BusValueStore, PublishedValue, RetainedBus};
pub use local::LocalRecordStore;
pub use logging::LoggingValueStore;
pub use shared::{SharedStateMirror, SharedStateStore};

use crate::errors::StoreResult;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use wattline_types::{ComponentKey, CorrectedState, StorageConfig};

/// Two-step sink for one component's corrected state
pub trait ValueStore: Send + Sync {
    fn key(&self) -> ComponentKey;

    /// Stage a state for the next commit, replacing anything staged before
    fn set(&mut self, state: CorrectedState);

    /// Commit the staged state. Nothing staged is a no-op.
    fn update(&mut self) -> StoreResult<()>;

    fn staged(&self) -> Option<&CorrectedState>;
}

/// Storage capability chosen at startup
#[derive(Clone)]
pub enum StoreBackend {
    LocalRecords { root: PathBuf },
    Bus {
        prefix: String,
        publisher: Arc<dyn BusPublisher>,
    },
}

impl std::fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalRecords { root } => {
                f.debug_struct("LocalRecords").field("root", root).finish()
            }
            Self::Bus { prefix, .. } => f.debug_struct("Bus").field("prefix", prefix).finish(),
        }
    }
}

impl StoreBackend {
    pub fn from_config(config: &StorageConfig, publisher: Arc<dyn BusPublisher>) -> Self {
        if config.local_records {
            info!("💾 Using local records at {}", config.record_dir.display());
            Self::LocalRecords {
                root: config.record_dir.clone(),
            }
        } else {
            info!("📡 Publishing to message bus under {}", config.topic_prefix);
            Self::Bus {
                prefix: config.topic_prefix.clone(),
                publisher,
            }
        }
    }
}

/// Builds the store stack for each component: logging around a shared-state
/// mirror around the configured backend
#[derive(Debug, Clone)]
pub struct StoreFactory {
    backend: StoreBackend,
    shared: SharedStateStore,
}

impl StoreFactory {
    pub fn new(backend: StoreBackend, shared: SharedStateStore) -> Self {
        Self { backend, shared }
    }

    pub fn shared(&self) -> &SharedStateStore {
        &self.shared
    }

    pub fn build(&self, key: ComponentKey) -> Box<dyn ValueStore> {
        match &self.backend {
            StoreBackend::LocalRecords { root } => Box::new(LoggingValueStore::new(
                SharedStateMirror::new(LocalRecordStore::new(root, key), self.shared.clone()),
            )),
            StoreBackend::Bus { prefix, publisher } => Box::new(LoggingValueStore::new(
                SharedStateMirror::new(
                    BusValueStore::new(prefix, key, Arc::clone(publisher)),
                    self.shared.clone(),
                ),
            )),
        }
    }
}
