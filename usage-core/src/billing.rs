//! Slab (tiered) billing.
//!
//! Tiers are half-open: usage landing exactly on a bound is billed entirely
//! by the lower tier, and the next fraction of a unit goes to the next tier.

use crate::{
    domain::SlabTable,
    error::BillingError,
    round_to,
};

/// Units and charge attributed to one tier of a bill.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TierCharge {
    pub tier: usize,
    pub units: f64,
    pub rate: f64,
    pub charge: f64,
}

/// Bill for a cumulative usage total, rounded to 2 decimal places.
///
/// Negative or non-finite totals are a caller bug and are rejected rather
/// than clamped.
pub fn compute_bill(total_usage: f64, slabs: &SlabTable) -> Result<f64, BillingError> {
    Ok(round_to(slab_charge(total_usage, slabs)?, 2))
}

/// Unrounded charge for `total_usage`.
pub fn slab_charge(total_usage: f64, slabs: &SlabTable) -> Result<f64, BillingError> {
    Ok(bill_breakdown(total_usage, slabs)?
        .iter()
        .map(|t| t.charge)
        .sum())
}

/// Per-tier split of a bill. Tiers that received no units are omitted.
pub fn bill_breakdown(total_usage: f64, slabs: &SlabTable) -> Result<Vec<TierCharge>, BillingError> {
    if !total_usage.is_finite() || total_usage < 0.0 {
        return Err(BillingError::InvalidInput(total_usage));
    }

    let mut tiers = Vec::new();
    let mut remaining = total_usage;
    let mut previous_bound = 0.0;

    for (tier, slab) in slabs.slabs().iter().enumerate() {
        if remaining <= 0.0 {
            break;
        }

        let units = remaining.min(slab.up_to - previous_bound);
        tiers.push(TierCharge {
            tier,
            units,
            rate: slab.rate,
            charge: units * slab.rate,
        });

        remaining -= units;
        previous_bound = slab.up_to;
    }

    Ok(tiers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RateSlab;
    use proptest::prelude::*;

    fn slabs() -> SlabTable {
        SlabTable::new(vec![
            RateSlab::new(3.0, 5.0),
            RateSlab::new(6.0, 7.0),
            RateSlab::new(f64::INFINITY, 9.0),
        ])
        .unwrap()
    }

    #[test]
    fn zero_usage_bills_nothing() {
        assert_eq!(compute_bill(0.0, &slabs()).unwrap(), 0.0);
        assert!(bill_breakdown(0.0, &slabs()).unwrap().is_empty());
    }

    #[test]
    fn worked_example_spans_all_tiers() {
        // 3 @ 5 + 3 @ 7 + 4 @ 9
        assert_eq!(compute_bill(10.0, &slabs()).unwrap(), 72.0);

        let tiers = bill_breakdown(10.0, &slabs()).unwrap();
        let charges: Vec<f64> = tiers.iter().map(|t| t.charge).collect();
        assert_eq!(charges, vec![15.0, 21.0, 36.0]);
    }

    #[test]
    fn boundary_units_belong_to_lower_tier() {
        assert_eq!(compute_bill(3.0, &slabs()).unwrap(), 15.0);
        assert_eq!(bill_breakdown(3.0, &slabs()).unwrap().len(), 1);

        let just_over = slab_charge(3.0001, &slabs()).unwrap();
        assert!((just_over - 15.0007).abs() < 1e-9, "got {just_over}");
        assert_eq!(compute_bill(3.0001, &slabs()).unwrap(), 15.0);
    }

    #[test]
    fn usage_far_past_last_finite_bound_is_billed() {
        assert_eq!(compute_bill(1000.0, &slabs()).unwrap(), 15.0 + 21.0 + 994.0 * 9.0);
    }

    #[test]
    fn rounds_to_cents() {
        // 0.333 * 5 = 1.665
        let bill = compute_bill(0.333, &slabs()).unwrap();
        assert!((bill - 1.67).abs() < 1e-9 || (bill - 1.66).abs() < 1e-9);
        assert_eq!(bill, round_to(bill, 2));
    }

    #[test]
    fn negative_total_is_rejected() {
        assert_eq!(
            compute_bill(-0.5, &slabs()),
            Err(BillingError::InvalidInput(-0.5))
        );
        assert!(compute_bill(f64::NAN, &slabs()).is_err());
    }

    #[test]
    fn infinite_total_is_rejected() {
        assert_eq!(
            compute_bill(f64::INFINITY, &slabs()),
            Err(BillingError::InvalidInput(f64::INFINITY))
        );

        let free_tail = SlabTable::new(vec![RateSlab::new(3.0, 5.0), RateSlab::new(f64::INFINITY, 0.0)]).unwrap();
        assert!(bill_breakdown(f64::INFINITY, &free_tail).is_err());
    }

    proptest! {
        #[test]
        fn bill_is_monotonic_in_usage(a in 0.0f64..10_000.0, b in 0.0f64..10_000.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let table = slabs();
            prop_assert!(compute_bill(lo, &table).unwrap() <= compute_bill(hi, &table).unwrap());
            prop_assert!(slab_charge(lo, &table).unwrap() <= slab_charge(hi, &table).unwrap());
        }
    }
}
