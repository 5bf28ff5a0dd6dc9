use serde_derive::{Deserialize, Serialize};
use std::convert::TryFrom;

pub const LUT_SIZE: usize = 256;

/// Maps a desired normalised brightness to the command level that produced
/// it during calibration.
///
/// Built by nearest match, so the table is not guaranteed to be monotonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct InverseLookupTable {
    table: Vec<u8>,
}

impl InverseLookupTable {
    /// Table where each brightness maps to the same command level.
    pub fn identity() -> InverseLookupTable {
        InverseLookupTable {
            table: (0..LUT_SIZE).map(|i| i as u8).collect(),
        }
    }

    /// Build the table from readings taken at command levels 0..=255.
    ///
    /// Readings are min-max normalised. For each desired brightness `d/255`
    /// the level with the closest normalised reading is chosen, the lowest
    /// level winning ties.
    pub fn from_readings(readings: &[f64; LUT_SIZE]) -> InverseLookupTable {
        let scaled = normalize(readings);
        let table = (0..LUT_SIZE)
            .map(|d| {
                let desired = d as f64 / 255.0;
                let mut best_diff = f64::INFINITY;
                let mut best = 0;
                for (i, s) in scaled.iter().enumerate() {
                    let diff = (s - desired).abs();
                    if diff < best_diff {
                        best_diff = diff;
                        best = i;
                    }
                }
                best as u8
            })
            .collect();
        InverseLookupTable { table }
    }

    pub fn entries(&self) -> &[u8] {
        &self.table
    }

    /// Command level for a desired brightness in [0,1], linearly
    /// interpolated between neighbouring entries.
    pub fn lookup(&self, desired: f64) -> f64 {
        let desired = if desired.is_nan() {
            0.0
        } else {
            desired.clamp(0.0, 1.0)
        };
        let scaled = desired * 255.0;
        let nearest = scaled.round();
        if (scaled - nearest).abs() < 1e-9 {
            return self.table[nearest as usize] as f64;
        }
        let lo = (scaled.floor() as usize).min(LUT_SIZE - 1);
        let hi = (lo + 1).min(LUT_SIZE - 1);
        let frac = scaled - lo as f64;
        let a = self.table[lo] as f64;
        let b = self.table[hi] as f64;
        a + (b - a) * frac
    }
}

impl Default for InverseLookupTable {
    fn default() -> Self {
        Self::identity()
    }
}

/// Min-max normalisation. A flat input is treated as having a range of 1.
pub fn normalize(readings: &[f64]) -> Vec<f64> {
    let min = readings.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = readings.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut range = max - min;
    if !(range >= 1e-9) {
        range = 1.0;
    }
    readings.iter().map(|r| (r - min) / range).collect()
}

impl TryFrom<Vec<u8>> for InverseLookupTable {
    type Error = String;
    fn try_from(table: Vec<u8>) -> Result<Self, Self::Error> {
        if table.len() != LUT_SIZE {
            return Err(format!(
                "Lookup table must have {} entries, got {}",
                LUT_SIZE,
                table.len()
            ));
        }
        Ok(InverseLookupTable { table })
    }
}

impl From<InverseLookupTable> for Vec<u8> {
    fn from(t: InverseLookupTable) -> Self {
        t.table
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn square_response() -> [f64; LUT_SIZE] {
        let mut r = [0.0; LUT_SIZE];
        for (i, v) in r.iter_mut().enumerate() {
            let x = i as f64 / 255.0;
            *v = 40.0 + 3000.0 * x * x;
        }
        r
    }

    #[test]
    fn linear_response_gives_identity() {
        let mut r = [0.0; LUT_SIZE];
        for (i, v) in r.iter_mut().enumerate() {
            *v = 12.0 + 2.0 * i as f64;
        }
        assert_eq!(InverseLookupTable::from_readings(&r), InverseLookupTable::identity());
    }

    #[test]
    fn square_response_inverts() {
        let lut = InverseLookupTable::from_readings(&square_response());
        assert_eq!(lut.entries()[0], 0);
        assert_eq!(lut.entries()[255], 255);
        // Half brightness needs about 1/sqrt(2) of full level
        let mid = lut.entries()[128] as f64;
        assert!((mid - 255.0 * (128.0f64 / 255.0).sqrt()).abs() <= 1.0);
    }

    #[test]
    fn flat_readings() {
        let lut = InverseLookupTable::from_readings(&[7.0; LUT_SIZE]);
        // Every level matches equally well, the first one wins
        assert!(lut.entries().iter().all(|&e| e == 0));
        assert!(normalize(&[7.0; 4]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn ties_pick_lowest_level() {
        let mut r = [0.0; LUT_SIZE];
        for (i, v) in r.iter_mut().enumerate() {
            // Two level plateaus
            *v = if i < 100 { 0.0 } else { 1.0 };
        }
        let lut = InverseLookupTable::from_readings(&r);
        assert_eq!(lut.entries()[0], 0);
        assert_eq!(lut.entries()[255], 100);
        assert_eq!(lut.entries()[200], 100);
        assert_eq!(lut.entries()[100], 0);
    }

    #[test]
    fn lookup_at_grid_points_is_exact() {
        let lut = InverseLookupTable::from_readings(&square_response());
        for d in 0..LUT_SIZE {
            assert_eq!(lut.lookup(d as f64 / 255.0), lut.entries()[d] as f64);
        }
    }

    #[test]
    fn lookup_interpolates() {
        let lut = InverseLookupTable::try_from(
            (0..LUT_SIZE).map(|i| (i as u8) & 0xfe).collect::<Vec<u8>>(),
        )
        .unwrap();
        // Entries 2 and 3 both hold 2, entries 3 and 4 hold 2 and 4
        assert_eq!(lut.lookup(2.5 / 255.0), 2.0);
        assert!((lut.lookup(3.5 / 255.0) - 3.0).abs() < 1e-9);
        assert_eq!(lut.lookup(-1.0), 0.0);
        assert_eq!(lut.lookup(2.0), 254.0);
    }

    #[test]
    fn table_size_is_checked() {
        assert!(InverseLookupTable::try_from(vec![0u8; 10]).is_err());
        let json = serde_json::to_string(&InverseLookupTable::identity()).unwrap();
        let back: InverseLookupTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, InverseLookupTable::identity());
        assert!(serde_json::from_str::<InverseLookupTable>("[1,2,3]").is_err());
    }
}
