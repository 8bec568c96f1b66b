//! Upgrade totems are vertical stacks of upgrade modules placed on an upgrade base. A totem is
//! read bottom up: level 1 directly above the base, then level 2, then level 3, all of the same
//! category. The tier of the enclosing structure limits how many levels count

use crate::{
    cell::{Block, Tier},
    part::{PartRole, UpgradeCategory, UpgradeModule},
    scan::Environment,
    BlockPosition,
};

use smallvec::SmallVec;

/// A stack of 1 to 3 upgrade modules of a single category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeTotem {
    category: UpgradeCategory,
    positions: SmallVec<[BlockPosition; 3]>,
}

impl UpgradeTotem {
    /// The category of every module in the totem
    pub fn category(&self) -> UpgradeCategory {
        self.category
    }

    /// The tier of the totem, equal to the number of levels
    pub fn tier(&self) -> u8 {
        self.positions.len() as u8
    }

    /// The positions of the modules, bottom up
    pub fn positions(&self) -> &[BlockPosition] {
        &self.positions
    }
}

fn module_at(env: &impl Environment, pos: BlockPosition) -> Option<UpgradeModule> {
    match env.loaded_block(pos)? {
        Block::Part(PartRole::Upgrade(module)) => Some(module),
        _ => None,
    }
}

/// Read the totem standing on the upgrade base at `base`. Returns `None` when there is no level 1
/// module directly above the base. A gap or a mismatch higher up ends the totem at the last
/// valid level
pub fn scan_totem(
    env: &impl Environment,
    base: BlockPosition,
    enclosing: Tier,
) -> Option<UpgradeTotem> {
    let first = module_at(env, base.up(1))?;
    if first.level() != 1 {
        return None;
    }

    let mut positions = SmallVec::new();
    positions.push(base.up(1));
    for level in 2..=enclosing.totem_slots() {
        let pos = base.up(level as i32);
        match module_at(env, pos) {
            Some(module) if module.category() == first.category() && module.level() == level => {
                positions.push(pos)
            }
            _ => break,
        }
    }

    Some(UpgradeTotem {
        category: first.category(),
        positions,
    })
}

#[cfg(test)]
use crate::{grid::CellGrid, part::UpgradePart};

#[cfg(test)]
fn stack(modules: &[Option<UpgradeModule>]) -> (CellGrid, BlockPosition) {
    let base = BlockPosition::new(-3, 10, 5);
    let mut grid = CellGrid::default();
    grid.set_block(base, Block::Cell(crate::cell::CellKind::UpgradeBase));
    for (i, module) in modules.iter().enumerate() {
        if let Some(module) = module {
            grid.place_part(base.up(i as i32 + 1), UpgradePart::new(*module));
        }
    }
    (grid, base)
}

#[test]
fn test_full_totem() {
    use UpgradeCategory::Parallel;
    let (grid, base) = stack(&[
        Some(UpgradeModule::new(Parallel, 1)),
        Some(UpgradeModule::new(Parallel, 2)),
        Some(UpgradeModule::new(Parallel, 3)),
    ]);

    let totem = scan_totem(&grid, base, Tier::IV).unwrap();
    assert_eq!(Parallel, totem.category());
    assert_eq!(3, totem.tier());
    assert_eq!(&[base.up(1), base.up(2), base.up(3)], totem.positions());
}

#[test]
fn test_truncated_totem() {
    use UpgradeCategory::{Capacity, Speed};
    let (grid, base) = stack(&[
        Some(UpgradeModule::new(Speed, 1)),
        Some(UpgradeModule::new(Speed, 2)),
        None,
    ]);
    let totem = scan_totem(&grid, base, Tier::III).unwrap();
    assert_eq!(2, totem.tier());
    assert_eq!(2, totem.positions().len());

    let (grid, base) = stack(&[
        Some(UpgradeModule::new(Speed, 1)),
        Some(UpgradeModule::new(Speed, 2)),
        Some(UpgradeModule::new(Capacity, 3)),
    ]);
    assert_eq!(2, scan_totem(&grid, base, Tier::III).unwrap().tier());

    let (grid, base) = stack(&[
        Some(UpgradeModule::new(Speed, 1)),
        None,
        Some(UpgradeModule::new(Speed, 3)),
    ]);
    assert_eq!(1, scan_totem(&grid, base, Tier::III).unwrap().tier());
}

#[test]
fn test_levels_must_be_sequential() {
    use UpgradeCategory::Stability;
    let (grid, base) = stack(&[
        Some(UpgradeModule::new(Stability, 1)),
        Some(UpgradeModule::new(Stability, 3)),
    ]);
    assert_eq!(1, scan_totem(&grid, base, Tier::IV).unwrap().tier());

    let (grid, base) = stack(&[
        Some(UpgradeModule::new(Stability, 2)),
        Some(UpgradeModule::new(Stability, 3)),
    ]);
    assert_eq!(None, scan_totem(&grid, base, Tier::IV));

    let (grid, base) = stack(&[]);
    assert_eq!(None, scan_totem(&grid, base, Tier::IV));
}

#[test]
fn test_enclosing_tier_caps_the_totem() {
    use UpgradeCategory::Yield;
    let (grid, base) = stack(&[
        Some(UpgradeModule::new(Yield, 1)),
        Some(UpgradeModule::new(Yield, 2)),
        Some(UpgradeModule::new(Yield, 3)),
    ]);
    assert_eq!(1, scan_totem(&grid, base, Tier::I).unwrap().tier());
    assert_eq!(2, scan_totem(&grid, base, Tier::II).unwrap().tier());
    assert_eq!(3, scan_totem(&grid, base, Tier::III).unwrap().tier());
}
