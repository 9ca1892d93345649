// SPDX-License-Identifier: MIT OR Apache-2.0
//! Grid description and the synthetic dataset generator.

use crate::chunk::Shape3;
use crate::error::{BenchError, Result};
use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Linearly spaced coordinate axis with inclusive endpoints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// Number of samples
    pub count: usize,
    /// First sample
    pub min: f64,
    /// Last sample
    pub max: f64,
}

impl Axis {
    /// Create an axis description.
    #[must_use]
    pub const fn new(count: usize, min: f64, max: f64) -> Self {
        Self { count, min, max }
    }

    /// Sample positions; a single-sample axis holds `min`.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        if self.count == 1 {
            return vec![self.min];
        }
        let step = (self.max - self.min) / (self.count - 1) as f64;
        (0..self.count)
            .map(|i| {
                if i + 1 == self.count {
                    self.max
                } else {
                    self.min + step * i as f64
                }
            })
            .collect()
    }

    fn validate(&self, name: &str, limit: f64) -> Result<()> {
        if self.count == 0 {
            return Err(BenchError::InvalidSpec(format!("{name} count must be positive")));
        }
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(BenchError::InvalidSpec(format!("{name} bounds must be finite")));
        }
        if self.min < -limit || self.max > limit {
            return Err(BenchError::InvalidSpec(format!(
                "{name} bounds [{}, {}] exceed ±{limit}",
                self.min, self.max
            )));
        }
        if self.count > 1 && self.min >= self.max {
            return Err(BenchError::InvalidSpec(format!(
                "{name} bounds must be increasing, got [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Immutable description of the synthetic dataset's shape and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    /// Number of daily time steps
    pub time_len: usize,
    /// Date of the first time step
    pub start: NaiveDate,
    /// Latitude axis
    pub lat: Axis,
    /// Longitude axis
    pub lon: Axis,
    /// Name of the field variable
    pub field: String,
    /// Units attribute of the field
    pub units: String,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            time_len: 365,
            start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            lat: Axis::new(180, -89.5, 89.5),
            lon: Axis::new(360, -179.5, 179.5),
            field: "temperature".to_string(),
            units: "celsius".to_string(),
        }
    }
}

impl GridSpec {
    /// Default bounds and metadata with the given axis lengths.
    #[must_use]
    pub fn with_shape(time_len: usize, lat: usize, lon: usize) -> Self {
        let mut spec = Self {
            time_len,
            ..Self::default()
        };
        spec.lat.count = lat;
        spec.lon.count = lon;
        spec
    }

    /// Field array shape `(time, lat, lon)`.
    #[must_use]
    pub const fn shape(&self) -> Shape3 {
        [self.time_len, self.lat.count, self.lon.count]
    }

    /// Check axis lengths and bounds.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::InvalidSpec`] for a zero-length axis, unusable
    /// bounds, or a grid too large to address.
    pub fn validate(&self) -> Result<()> {
        if self.time_len == 0 {
            return Err(BenchError::InvalidSpec("time length must be positive".to_string()));
        }
        self.lat.validate("lat", 90.0)?;
        self.lon.validate("lon", 180.0)?;
        if self.field.is_empty() {
            return Err(BenchError::InvalidSpec("field name must not be empty".to_string()));
        }
        let elements = self
            .shape()
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n));
        if elements.is_none_or(|n| n.checked_mul(size_of::<f32>()).is_none()) {
            return Err(BenchError::InvalidSpec(format!(
                "grid {:?} is too large",
                self.shape()
            )));
        }
        Ok(())
    }

    /// Daily calendar dates starting at [`GridSpec::start`].
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::InvalidSpec`] if the sequence runs past the
    /// representable calendar.
    pub fn time_axis(&self) -> Result<Vec<NaiveDate>> {
        let dates: Vec<NaiveDate> = self.start.iter_days().take(self.time_len).collect();
        if dates.len() != self.time_len {
            return Err(BenchError::InvalidSpec(format!(
                "{} days from {} overflow the calendar",
                self.time_len, self.start
            )));
        }
        Ok(dates)
    }
}

/// In-memory gridded dataset: one `f32` field over `(time, lat, lon)`
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    spec: GridSpec,
    time: Vec<NaiveDate>,
    lat: Vec<f64>,
    lon: Vec<f64>,
    values: Vec<f32>,
}

impl Dataset {
    /// Assemble a dataset from its coordinates and row-major values.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::InvalidSpec`] if a coordinate or the value
    /// buffer disagrees with the spec's shape.
    pub fn from_parts(
        spec: GridSpec,
        time: Vec<NaiveDate>,
        lat: Vec<f64>,
        lon: Vec<f64>,
        values: Vec<f32>,
    ) -> Result<Self> {
        spec.validate()?;
        let [t, y, x] = spec.shape();
        if time.len() != t || lat.len() != y || lon.len() != x {
            return Err(BenchError::InvalidSpec(format!(
                "coordinate lengths ({}, {}, {}) do not match shape {:?}",
                time.len(),
                lat.len(),
                lon.len(),
                spec.shape()
            )));
        }
        if values.len() != t * y * x {
            return Err(BenchError::InvalidSpec(format!(
                "{} values do not fill shape {:?}",
                values.len(),
                spec.shape()
            )));
        }
        Ok(Self {
            spec,
            time,
            lat,
            lon,
            values,
        })
    }

    /// The spec the dataset was built from.
    #[must_use]
    pub const fn spec(&self) -> &GridSpec {
        &self.spec
    }

    /// Field shape `(time, lat, lon)`.
    #[must_use]
    pub const fn shape(&self) -> Shape3 {
        self.spec.shape()
    }

    /// Time coordinate.
    #[must_use]
    pub fn time(&self) -> &[NaiveDate] {
        &self.time
    }

    /// Latitude coordinate.
    #[must_use]
    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    /// Longitude coordinate.
    #[must_use]
    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    /// Row-major field values.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Value at `(t, y, x)`.
    #[must_use]
    pub fn get(&self, t: usize, y: usize, x: usize) -> Option<f32> {
        let [nt, ny, nx] = self.shape();
        (t < nt && y < ny && x < nx).then(|| self.values[(t * ny + y) * nx + x])
    }
}

/// Build the canonical dataset for `spec`.
///
/// Coordinates are deterministic. Field values are standard-normal draws;
/// they are reproducible only when a `seed` is supplied.
///
/// # Errors
///
/// Returns [`BenchError::InvalidSpec`] if any axis length is zero or the
/// bounds are unusable.
pub fn synthesize(spec: &GridSpec, seed: Option<u64>) -> Result<Dataset> {
    spec.validate()?;
    let time = spec.time_axis()?;
    let lat = spec.lat.values();
    let lon = spec.lon.values();
    let len: usize = spec.shape().iter().product();

    let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let values: Vec<f32> = StandardNormal.sample_iter(&mut rng).take(len).collect();

    tracing::debug!(shape = ?spec.shape(), seeded = seed.is_some(), "synthesized dataset");
    Dataset::from_parts(spec.clone(), time, lat, lon, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec() {
        let spec = GridSpec::default();
        assert_eq!(spec.shape(), [365, 180, 360]);
        assert_eq!(spec.units, "celsius");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_synthesize_shape_and_axes() {
        let spec = GridSpec::with_shape(12, 18, 36);
        let ds = synthesize(&spec, Some(7)).unwrap();
        assert_eq!(ds.shape(), [12, 18, 36]);
        assert_eq!(ds.values().len(), 12 * 18 * 36);
        assert_eq!(ds.lat().first(), Some(&-89.5));
        assert_eq!(ds.lat().last(), Some(&89.5));
        assert_eq!(ds.lon().first(), Some(&-179.5));
        assert_eq!(ds.lon().last(), Some(&179.5));
        assert!(ds.lat().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ds.time()[0], spec.start);
        assert_eq!(ds.time()[11], NaiveDate::from_ymd_opt(2020, 1, 12).unwrap());
    }

    #[test]
    fn test_one_degree_grid_spacing() {
        let lat = GridSpec::default().lat.values();
        assert_eq!(lat.len(), 180);
        assert!((lat[1] - lat[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_seeded_synthesis_is_reproducible() {
        let spec = GridSpec::with_shape(3, 4, 5);
        let a = synthesize(&spec, Some(42)).unwrap();
        let b = synthesize(&spec, Some(42)).unwrap();
        assert_eq!(a, b);
        let c = synthesize(&spec, None).unwrap();
        assert_eq!(c.spec(), a.spec());
        assert_eq!(c.time(), a.time());
        assert_eq!(c.lat(), a.lat());
        assert_eq!(c.lon(), a.lon());
    }

    #[test]
    fn test_rejects_empty_axis() {
        for spec in [
            GridSpec::with_shape(0, 10, 10),
            GridSpec::with_shape(10, 0, 10),
            GridSpec::with_shape(10, 10, 0),
        ] {
            let err = synthesize(&spec, None).unwrap_err();
            assert!(matches!(err, BenchError::InvalidSpec(_)), "{err}");
        }
    }

    #[test]
    fn test_rejects_bad_bounds() {
        let mut spec = GridSpec::with_shape(2, 2, 2);
        spec.lat = Axis::new(2, 10.0, -10.0);
        assert!(spec.validate().is_err());
        spec.lat = Axis::new(2, -95.0, 10.0);
        assert!(spec.validate().is_err());
        spec.lat = Axis::new(1, 0.0, 0.0);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_from_parts_checks_lengths() {
        let spec = GridSpec::with_shape(1, 1, 2);
        let time = spec.time_axis().unwrap();
        let err = Dataset::from_parts(spec.clone(), time.clone(), vec![0.0], vec![0.0], vec![]);
        assert!(err.is_err());
        let ok = Dataset::from_parts(spec, time, vec![-89.5], vec![-179.5, 179.5], vec![1.0, 2.0])
            .unwrap();
        assert_eq!(ok.get(0, 0, 1), Some(2.0));
        assert_eq!(ok.get(0, 1, 0), None);
    }
}
