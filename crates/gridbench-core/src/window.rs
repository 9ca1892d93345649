// SPDX-License-Identifier: MIT OR Apache-2.0
//! Axis-relative spatial slice windows.

use crate::chunk::{Region, Shape3};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Spatial sub-window expressed as fractions of the lat/lon axes
///
/// The default selects latitude `[0.25, 0.5)` and longitude `[0.25, 0.5)`,
/// i.e. indices `[45, 90)` × `[90, 180)` on a one-degree grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceWindow {
    /// Latitude fraction range
    pub lat: (f64, f64),
    /// Longitude fraction range
    pub lon: (f64, f64),
}

impl Default for SliceWindow {
    fn default() -> Self {
        Self {
            lat: (0.25, 0.5),
            lon: (0.25, 0.5),
        }
    }
}

impl SliceWindow {
    /// Index range of a fraction pair on an axis of length `len`.
    ///
    /// Always non-empty and inside `[0, len)` for `len > 0`.
    #[must_use]
    pub fn axis_range(fractions: (f64, f64), len: usize) -> Range<usize> {
        if len == 0 {
            return 0..0;
        }
        let index = |f: f64| ((f.clamp(0.0, 1.0) * len as f64).floor() as usize).min(len);
        let start = index(fractions.0).min(len - 1);
        let end = index(fractions.1).clamp(start + 1, len);
        start..end
    }

    /// Region covering every time step and the spatial window of `shape`.
    #[must_use]
    pub fn region(&self, shape: Shape3) -> Region {
        let lat = Self::axis_range(self.lat, shape[1]);
        let lon = Self::axis_range(self.lon, shape[2]);
        Region::new([0, lat.start, lon.start], [shape[0], lat.end, lon.end])
    }
}
