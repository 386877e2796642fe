//! Ticket number allocation.
//!
//! Picks `quantity` distinct numbers from `[1, total_numbers]` that are not in
//! the excluded (already sold) set. Sampling is uniform and without
//! replacement: a random index of the shrinking available list is
//! swap-removed into the result on every draw.
//!
//! The available list is materialised, so cost is O(total_numbers) per call.
//! Raffle pools are hundreds to low thousands of numbers.

use std::collections::HashSet;

use rand::Rng;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("quantity and pool size must be positive")]
    InvalidQuantity,

    #[error("not enough numbers available: requested {requested}, available {available}")]
    Insufficient { requested: i64, available: i64 },
}

/// Draw `quantity` unsold numbers. The result is sorted ascending.
///
/// Fails without a partial result when fewer than `quantity` numbers remain.
/// Excluded values outside the pool range are ignored.
pub fn allocate<R: Rng + ?Sized>(
    rng: &mut R,
    quantity: i64,
    total_numbers: i64,
    excluded: &HashSet<i64>,
) -> Result<Vec<i64>, AllocationError> {
    if quantity <= 0 || total_numbers <= 0 {
        return Err(AllocationError::InvalidQuantity);
    }

    let mut available: Vec<i64> = (1..=total_numbers)
        .filter(|n| !excluded.contains(n))
        .collect();

    let remaining = available.len() as i64;
    if remaining < quantity {
        return Err(AllocationError::Insufficient {
            requested: quantity,
            available: remaining,
        });
    }

    let mut picked = Vec::with_capacity(quantity as usize);
    for _ in 0..quantity {
        let idx = rng.gen_range(0..available.len());
        picked.push(available.swap_remove(idx));
    }

    picked.sort_unstable();
    Ok(picked)
}
