//! Combines the storage parts linked to a structure into one energy store

use crate::{
    part::Part,
    scan::{Environment, EnvironmentMut},
    BlockPosition,
};

use serde::{Deserialize, Serialize};

/// The combined figures of every storage part linked to an anchor. Rebuilt when the structure
/// changes, so it can be stale in between
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedView {
    capacity: u64,
    stored: u64,
    transfer_limit: u64,
}

impl AggregatedView {
    /// The total capacity
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// The total amount stored
    pub fn stored(&self) -> u64 {
        self.stored
    }

    /// The most energy a single insert or extract may move
    pub fn transfer_limit(&self) -> u64 {
        self.transfer_limit
    }
}

/// Sum the storage parts at `storage`. A position that no longer holds a loaded storage part
/// contributes nothing. The transfer limit is the capacity divided by `transfer_rate_divisor`,
/// a divisor of 0 means no limit
pub fn aggregate(
    storage: &[BlockPosition],
    env: &impl Environment,
    transfer_rate_divisor: u64,
) -> AggregatedView {
    let (capacity, stored) = storage
        .iter()
        .filter_map(|pos| env.part(*pos)?.as_storage())
        .fold((0u64, 0u64), |(capacity, stored), cell| {
            (
                capacity.saturating_add(cell.capacity()),
                stored.saturating_add(cell.stored()),
            )
        });

    AggregatedView {
        capacity,
        stored,
        transfer_limit: capacity.checked_div(transfer_rate_divisor).unwrap_or(capacity),
    }
}

/// Store up to `amount` energy, at most `limit`, filling the storage parts in order. Returns how
/// much was stored
pub fn insert_energy(
    env: &mut impl EnvironmentMut,
    storage: &[BlockPosition],
    amount: u64,
    limit: u64,
) -> u64 {
    let wanted = amount.min(limit);
    let mut remaining = wanted;
    for pos in storage {
        if remaining == 0 {
            break;
        }
        if let Some(cell) = env.part_mut(*pos).and_then(Part::as_storage_mut) {
            remaining -= cell.insert(remaining);
        }
    }
    wanted - remaining
}

/// Take up to `amount` energy, at most `limit`, draining the storage parts in order. Returns how
/// much was taken
pub fn extract_energy(
    env: &mut impl EnvironmentMut,
    storage: &[BlockPosition],
    amount: u64,
    limit: u64,
) -> u64 {
    let wanted = amount.min(limit);
    let mut remaining = wanted;
    for pos in storage {
        if remaining == 0 {
            break;
        }
        if let Some(cell) = env.part_mut(*pos).and_then(Part::as_storage_mut) {
            remaining -= cell.extract(remaining);
        }
    }
    wanted - remaining
}

#[cfg(test)]
use crate::{grid::CellGrid, part::StoragePart};

#[cfg(test)]
fn bank(cells: &[(u64, u64)]) -> (CellGrid, Vec<BlockPosition>) {
    let mut grid = CellGrid::default();
    let positions: Vec<_> = (0..cells.len() as i32)
        .map(|x| BlockPosition::new(x, 0, 0))
        .collect();
    for (pos, (capacity, stored)) in positions.iter().zip(cells) {
        grid.place_part(*pos, StoragePart::new(*capacity).with_stored(*stored));
    }
    (grid, positions)
}

#[test]
fn test_aggregate_sums_every_cell() {
    let (grid, positions) = bank(&[(1000, 10), (250, 250), (4000, 0)]);
    let view = aggregate(&positions, &grid, 10);
    assert_eq!(5250, view.capacity());
    assert_eq!(260, view.stored());
    assert_eq!(525, view.transfer_limit());
}

#[test]
fn test_aggregate_nothing() {
    let grid = CellGrid::default();
    assert_eq!(AggregatedView::default(), aggregate(&[], &grid, 10));
}

#[test]
fn test_aggregate_saturates() {
    let (grid, positions) = bank(&[(u64::MAX, u64::MAX), (u64::MAX, 1)]);
    let view = aggregate(&positions, &grid, 0);
    assert_eq!(u64::MAX, view.capacity());
    assert_eq!(u64::MAX, view.stored());
    assert_eq!(u64::MAX, view.transfer_limit());
}

#[test]
fn test_missing_cells_count_as_zero() {
    let (mut grid, positions) = bank(&[(1000, 10), (250, 250)]);
    grid.remove(positions[0]);
    let view = aggregate(&positions, &grid, 0);
    assert_eq!(250, view.capacity());
    assert_eq!(250, view.stored());
    assert_eq!(250, view.transfer_limit());

    grid.unload_chunk(positions[1].chunk());
    assert_eq!(0, aggregate(&positions, &grid, 10).capacity());
}

#[test]
fn test_insert_fills_in_order() {
    let (mut grid, positions) = bank(&[(100, 90), (100, 0), (100, 0)]);
    assert_eq!(60, insert_energy(&mut grid, &positions, 500, 60));

    let view = aggregate(&positions, &grid, 10);
    assert_eq!(150, view.stored());
    let second = grid.part(positions[1]).and_then(Part::as_storage).unwrap();
    assert_eq!(50, second.stored());

    assert_eq!(150, insert_energy(&mut grid, &positions, 1000, 1000));
    assert_eq!(300, aggregate(&positions, &grid, 10).stored());
}

#[test]
fn test_extract_drains_in_order() {
    let (mut grid, positions) = bank(&[(100, 30), (100, 100)]);
    assert_eq!(80, extract_energy(&mut grid, &positions, 80, 1000));
    let first = grid.part(positions[0]).and_then(Part::as_storage).unwrap();
    assert_eq!(0, first.stored());
    assert_eq!(50, aggregate(&positions, &grid, 10).stored());
    assert_eq!(50, extract_energy(&mut grid, &positions, 80, 1000));
}
