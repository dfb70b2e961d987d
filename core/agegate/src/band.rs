use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Coarse age category used for access-control decisions.
///
/// Variants are declared from most to least restrictive, so the derived
/// `Ord` orders bands by permissiveness: `Kid < Teen < Adult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBand {
    /// Maximally restrictive band and the fail-safe default.
    #[serde(alias = "kid")]
    Kid,
    /// Intermediate band.
    #[serde(alias = "teen")]
    Teen,
    /// Least restrictive band.
    #[serde(alias = "adult")]
    Adult,
}

impl AgeBand {
    /// The band every fallback resolves to.
    pub const MOST_RESTRICTIVE: AgeBand = AgeBand::Kid;

    /// Name used in serialized decisions.
    pub fn as_str(self) -> &'static str {
        match self {
            AgeBand::Kid => "Kid",
            AgeBand::Teen => "Teen",
            AgeBand::Adult => "Adult",
        }
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the band table: ages at or above `from_age` map to `band`
/// until the next cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandCutoff {
    /// Lower age bound in years (inclusive).
    pub from_age: f32,
    /// Band assigned from this bound upward.
    pub band: AgeBand,
}

impl BandCutoff {
    /// Shorthand constructor.
    pub const fn new(from_age: f32, band: AgeBand) -> Self {
        Self { from_age, band }
    }
}

/// Default cutoffs: under 13 is `Kid`, 13 to 17 is `Teen`, 18 and over is `Adult`.
pub const DEFAULT_CUTOFFS: [BandCutoff; 2] = [
    BandCutoff::new(13.0, AgeBand::Teen),
    BandCutoff::new(18.0, AgeBand::Adult),
];

/// Validated, ordered mapping from an age in years to an [`AgeBand`].
///
/// Ages below the first cutoff map to [`AgeBand::MOST_RESTRICTIVE`]. The
/// table is checked on construction so that mapping is monotonic: a larger
/// age never yields a more restrictive band.
#[derive(Debug, Clone, PartialEq)]
pub struct BandTable {
    cutoffs: Vec<BandCutoff>,
}

impl BandTable {
    /// Build a table from cutoffs sorted by ascending `from_age`.
    pub fn new(cutoffs: Vec<BandCutoff>) -> Result<Self, ConfigError> {
        if cutoffs.is_empty() {
            return Err(ConfigError::InvalidBandTable(
                "at least one permissive band is required".to_string(),
            ));
        }

        let mut previous_age = f32::NEG_INFINITY;
        let mut previous_band = AgeBand::MOST_RESTRICTIVE;
        for cutoff in &cutoffs {
            if !cutoff.from_age.is_finite() {
                return Err(ConfigError::InvalidBandTable(format!(
                    "cutoff age {} is not finite",
                    cutoff.from_age
                )));
            }
            if cutoff.from_age <= previous_age {
                return Err(ConfigError::InvalidBandTable(format!(
                    "cutoff ages must be strictly increasing ({} follows {previous_age})",
                    cutoff.from_age
                )));
            }
            if cutoff.band <= previous_band {
                return Err(ConfigError::InvalidBandTable(format!(
                    "band {} at age {} is not less restrictive than {previous_band}",
                    cutoff.band, cutoff.from_age
                )));
            }
            previous_age = cutoff.from_age;
            previous_band = cutoff.band;
        }

        Ok(Self { cutoffs })
    }

    /// Map an age in years to its band.
    ///
    /// Total over `f32`: negative ages fall into the restrictive band, ages
    /// past the last cutoff into the last band, and NaN is treated as
    /// restrictive.
    pub fn map(&self, years: f32) -> AgeBand {
        self.cutoffs
            .iter()
            .take_while(|cutoff| years >= cutoff.from_age)
            .last()
            .map_or(AgeBand::MOST_RESTRICTIVE, |cutoff| cutoff.band)
    }

    /// The least restrictive band this table can produce.
    pub fn most_permissive(&self) -> AgeBand {
        self.cutoffs
            .last()
            .map_or(AgeBand::MOST_RESTRICTIVE, |cutoff| cutoff.band)
    }

    /// The cutoffs in ascending order.
    pub fn cutoffs(&self) -> &[BandCutoff] {
        &self.cutoffs
    }
}

impl Default for BandTable {
    fn default() -> Self {
        Self {
            cutoffs: DEFAULT_CUTOFFS.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_thresholds() {
        let table = BandTable::default();
        assert_eq!(table.map(5.0), AgeBand::Kid);
        assert_eq!(table.map(12.99), AgeBand::Kid);
        assert_eq!(table.map(13.0), AgeBand::Teen);
        assert_eq!(table.map(17.9), AgeBand::Teen);
        assert_eq!(table.map(18.0), AgeBand::Adult);
        assert_eq!(table.map(64.0), AgeBand::Adult);
    }

    #[test]
    fn out_of_range_ages_clamp_to_end_bands() {
        let table = BandTable::default();
        assert_eq!(table.map(-3.0), AgeBand::Kid);
        assert_eq!(table.map(f32::NEG_INFINITY), AgeBand::Kid);
        assert_eq!(table.map(500.0), AgeBand::Adult);
        assert_eq!(table.map(f32::INFINITY), AgeBand::Adult);
    }

    #[test]
    fn nan_maps_to_restrictive_band() {
        assert_eq!(BandTable::default().map(f32::NAN), AgeBand::Kid);
    }

    #[test]
    fn mapping_is_monotonic_in_age() {
        let table = BandTable::default();
        let mut previous = table.map(-10.0);
        let mut age = -10.0_f32;
        while age <= 120.0 {
            let band = table.map(age);
            assert!(band >= previous, "{band} at {age} is below {previous}");
            previous = band;
            age += 0.25;
        }
    }

    #[test]
    fn two_band_table_skips_teen() {
        let table = BandTable::new(vec![BandCutoff::new(21.0, AgeBand::Adult)]).unwrap();
        assert_eq!(table.map(20.0), AgeBand::Kid);
        assert_eq!(table.map(21.0), AgeBand::Adult);
        assert_eq!(table.most_permissive(), AgeBand::Adult);
    }

    #[test]
    fn rejects_empty_table() {
        assert!(BandTable::new(vec![]).is_err());
    }

    #[test]
    fn rejects_unsorted_ages() {
        let result = BandTable::new(vec![
            BandCutoff::new(18.0, AgeBand::Teen),
            BandCutoff::new(13.0, AgeBand::Adult),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_restrictiveness_inversion() {
        let result = BandTable::new(vec![
            BandCutoff::new(13.0, AgeBand::Adult),
            BandCutoff::new(18.0, AgeBand::Teen),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_kid_as_permissive_band() {
        let result = BandTable::new(vec![BandCutoff::new(10.0, AgeBand::Kid)]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_non_finite_cutoff() {
        let result = BandTable::new(vec![BandCutoff::new(f32::NAN, AgeBand::Adult)]);
        assert!(result.is_err());
    }

    #[test]
    fn bands_order_by_permissiveness() {
        assert!(AgeBand::Kid < AgeBand::Teen);
        assert!(AgeBand::Teen < AgeBand::Adult);
        assert_eq!(AgeBand::MOST_RESTRICTIVE, AgeBand::Kid);
    }
}
