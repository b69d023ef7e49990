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

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Energy totals integrated from power samples, for sources that report
/// power but no counters. Positive power accrues to `imported`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimCounter {
    last: Option<(DateTime<Utc>, f64)>,
    imported_wh: f64,
    exported_wh: f64,
}

impl SimCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from previously known totals
    pub fn with_totals(imported_wh: f64, exported_wh: f64) -> Self {
        Self {
            last: None,
            imported_wh,
            exported_wh,
        }
    }

    pub fn totals(&self) -> (f64, f64) {
        (self.imported_wh, self.exported_wh)
    }

    /// Feed one sample and return the updated `(imported, exported)` totals in Wh
    pub fn sample(&mut self, power_w: f64, at: DateTime<Utc>) -> (f64, f64) {
        if let Some((previous_at, previous_w)) = self.last {
            #[expect(clippy::cast_precision_loss, reason = "sample gaps are far below 2^52 ms")]
            let hours = (at - previous_at).num_milliseconds() as f64 / MS_PER_HOUR;
            if hours > 0.0 {
                self.integrate(previous_w, power_w, hours);
            }
        }
        self.last = Some((at, power_w));
        self.totals()
    }

    fn integrate(&mut self, from_w: f64, to_w: f64, hours: f64) {
        if from_w >= 0.0 && to_w >= 0.0 {
            self.imported_wh += (from_w + to_w) / 2.0 * hours;
        } else if from_w <= 0.0 && to_w <= 0.0 {
            self.exported_wh -= (from_w + to_w) / 2.0 * hours;
        } else {
            // Sign change: split the interval where the line crosses zero.
            let crossing = from_w / (from_w - to_w);
            let first = from_w / 2.0 * crossing * hours;
            let second = to_w / 2.0 * (1.0 - crossing) * hours;
            for area in [first, second] {
                if area >= 0.0 {
                    self.imported_wh += area;
                } else {
                    self.exported_wh -= area;
                }
            }
        }
    }
}
