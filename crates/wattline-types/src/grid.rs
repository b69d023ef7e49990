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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Protective grid state. Mutated only by the grid-protection evaluator;
/// read by the charge-permission consumer before enabling current.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridProtectionState {
    #[serde(rename = "grid_protection_active")]
    pub active: bool,
    /// Randomized stagger delay (seconds)
    #[serde(rename = "grid_protection_random_stop")]
    pub stagger_secs: u32,
    #[serde(rename = "grid_protection_timestamp")]
    pub tripped_at: Option<DateTime<Utc>>,
}

impl GridProtectionState {
    pub fn is_tripped(&self) -> bool {
        self.active
    }
}
