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

use thiserror::Error;

use crate::device::ComponentKey;

/// Invalid static configuration. Surfaced at startup, never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown device class: '{0}'")]
    UnknownClass(String),

    #[error("Unknown vendor type: '{vendor}'. Supported types: {supported}")]
    UnknownVendor { vendor: String, supported: String },

    #[error("Component {0} is declared more than once")]
    DuplicateComponent(ComponentKey),

    #[error("Component {child} refers to unknown parent {parent}")]
    UnknownParent {
        child: ComponentKey,
        parent: ComponentKey,
    },

    #[error("Invalid value for '{path}': {reason}")]
    InvalidValue { path: String, reason: String },

    #[error("Invalid configuration for {what}: {reason}")]
    Invalid { what: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
