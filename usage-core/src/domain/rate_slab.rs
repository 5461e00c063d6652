use crate::error::CoreError;

/// One tier of a tariff: every unit below `up_to` (and above the previous
/// tier's bound) is billed at `rate`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RateSlab {
    pub up_to: f64,
    pub rate: f64,
}

impl RateSlab {
    pub const fn new(up_to: f64, rate: f64) -> Self {
        Self { up_to, rate }
    }
}

/// A validated, ordered slab table.
///
/// Invariants, checked once in [`SlabTable::new`]:
/// - at least one slab;
/// - bounds are positive and strictly increasing;
/// - rates are finite and non-negative;
/// - the last bound is `+inf`, so the tiers cover `[0, inf)` without gaps.
///
/// The terminal infinite tier is required. Without it usage past the last
/// finite bound would silently go unbilled, so such tables are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct SlabTable {
    slabs: Vec<RateSlab>,
}

impl SlabTable {
    pub fn new(slabs: Vec<RateSlab>) -> Result<Self, CoreError> {
        let Some(last) = slabs.last() else {
            return Err(CoreError::InvalidConfiguration(
                "slab table must contain at least one slab".to_string(),
            ));
        };

        if last.up_to != f64::INFINITY {
            return Err(CoreError::InvalidConfiguration(format!(
                "last slab must be unbounded (up_to = inf), got {}",
                last.up_to
            )));
        }

        let mut previous = 0.0_f64;
        for (idx, slab) in slabs.iter().enumerate() {
            if slab.up_to.is_nan() || slab.up_to <= previous {
                return Err(CoreError::InvalidConfiguration(format!(
                    "slab {idx}: bound {} must be greater than {previous}",
                    slab.up_to
                )));
            }
            if !slab.rate.is_finite() || slab.rate < 0.0 {
                return Err(CoreError::InvalidConfiguration(format!(
                    "slab {idx}: rate {} must be a non-negative number",
                    slab.rate
                )));
            }
            previous = slab.up_to;
        }

        Ok(Self { slabs })
    }

    pub fn slabs(&self) -> &[RateSlab] {
        &self.slabs
    }

    /// Stable hex digest of the table's bounds and rates.
    pub fn fingerprint(&self) -> String {
        let mut h = blake3::Hasher::new();
        h.update(&(self.slabs.len() as u32).to_le_bytes());
        for slab in &self.slabs {
            h.update(&slab.up_to.to_bits().to_le_bytes());
            h.update(&slab.rate.to_bits().to_le_bytes());
        }
        h.finalize().to_hex().to_string()
    }
}

impl TryFrom<Vec<RateSlab>> for SlabTable {
    type Error = CoreError;

    fn try_from(slabs: Vec<RateSlab>) -> Result<Self, Self::Error> {
        Self::new(slabs)
    }
}
