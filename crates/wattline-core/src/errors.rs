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

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use wattline_types::{ConfigError, FaultKind};

/// Failure of one component's read/correct/store step
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComponentError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ComponentError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Transport(_) | Self::Timeout(_) => FaultKind::Transport,
            Self::Protocol(_) => FaultKind::Protocol,
            Self::Configuration(_) => FaultKind::Configuration,
            Self::Internal(_) => FaultKind::Internal,
        }
    }
}

impl From<ConfigError> for ComponentError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<StoreError> for ComponentError {
    fn from(e: StoreError) -> Self {
        Self::Transport(e.to_string())
    }
}

pub type ComponentResult<T> = Result<T, ComponentError>;

/// Value-store commit failure
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write record {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to publish {topic}: {reason}")]
    Publish { topic: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_transport_fault() {
        assert_eq!(
            ComponentError::Timeout(Duration::from_secs(5)).kind(),
            FaultKind::Transport
        );
        assert_eq!(ComponentError::protocol("bad crc").kind(), FaultKind::Protocol);
    }

    #[test]
    fn test_store_error_becomes_transport_fault() {
        let err: ComponentError = StoreError::Publish {
            topic: "wattline/set/pv/1/get/power".to_owned(),
            reason: "broker offline".to_owned(),
        }
        .into();
        assert_eq!(err.kind(), FaultKind::Transport);
        assert!(err.to_string().contains("broker offline"));
    }
}
