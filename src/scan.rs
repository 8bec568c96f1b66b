//! Structure detection. A scan tests the template of every tier against the environment around
//! an anchor, from the highest tier down, and returns a [Snapshot] of the first tier that matches

use crate::{
    cell::{Block, CellKind, Tier},
    config::UpkeepConfig,
    part::{Part, PartRole, Program, UpgradeCategory},
    template::{Template, TemplateRegistry},
    totem::{scan_totem, UpgradeTotem},
    BlockPosition,
};

use bevy::{prelude::*, utils::HashSet};

/// How far below the anchor the auxiliary column reaches
pub(crate) const AUXILIARY_DEPTH: i32 = 4;

const GAP: i32 = -1;
const STORAGE: i32 = -2;
const INPUT: i32 = -3;
const OUTPUT: i32 = -AUXILIARY_DEPTH;

/// Read access to the world a structure lives in
pub trait Environment {
    /// The block at a position
    fn block_at(&self, pos: BlockPosition) -> Block;
    /// Whether the position is loaded. Unloaded positions never match anything
    fn is_loaded(&self, pos: BlockPosition) -> bool;
    /// The runtime data of the part at a position
    fn part(&self, pos: BlockPosition) -> Option<&Part>;

    /// The cell kind at a position, if it holds a structural cell
    fn cell_kind_at(&self, pos: BlockPosition) -> Option<CellKind> {
        self.block_at(pos).cell_kind()
    }

    /// The block at a position, or `None` if it is not loaded
    fn loaded_block(&self, pos: BlockPosition) -> Option<Block> {
        self.is_loaded(pos).then(|| self.block_at(pos))
    }
}

/// Write access to the parts of the world, used to update back-references and stored energy
pub trait EnvironmentMut: Environment {
    /// Mutable runtime data of the part at a position
    fn part_mut(&mut self, pos: BlockPosition) -> Option<&mut Part>;
}

/// The result of a successful scan. Built fresh on every scan and never modified afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    anchor: BlockPosition,
    tier: Tier,
    storage: Vec<BlockPosition>,
    input: BlockPosition,
    output: BlockPosition,
    programmers: Vec<BlockPosition>,
    totems: Vec<UpgradeTotem>,
    program: Option<Program>,
}

impl Snapshot {
    /// The anchor the structure was found around
    pub fn anchor(&self) -> BlockPosition {
        self.anchor
    }

    /// The matched tier
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Every storage part of the structure. The one below the anchor comes first
    pub fn storage(&self) -> &[BlockPosition] {
        &self.storage
    }

    /// The input buffer
    pub fn input(&self) -> BlockPosition {
        self.input
    }

    /// The output buffer
    pub fn output(&self) -> BlockPosition {
        self.output
    }

    /// Every programmer found inside the structure's bounds
    pub fn programmers(&self) -> &[BlockPosition] {
        &self.programmers
    }

    /// The upgrade totems standing on the structure's upgrade bases
    pub fn totems(&self) -> &[UpgradeTotem] {
        &self.totems
    }

    /// The program of the first configured programmer
    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// Every position linked to the anchor while this snapshot is current
    pub fn linked_positions(&self) -> impl Iterator<Item = BlockPosition> + '_ {
        self.storage
            .iter()
            .copied()
            .chain([self.input, self.output])
            .chain(self.programmers.iter().copied())
            .chain(
                self.totems
                    .iter()
                    .flat_map(|totem| totem.positions().iter().copied()),
            )
    }

    /// Whether both snapshots link exactly the same positions
    pub fn same_links(&self, other: &Snapshot) -> bool {
        let ours: HashSet<_> = self.linked_positions().collect();
        let theirs: HashSet<_> = other.linked_positions().collect();
        ours == theirs
    }

    /// The highest totem tier of a category, 0 if there is no such totem
    pub fn upgrade_level(&self, category: UpgradeCategory) -> u8 {
        self.totems
            .iter()
            .filter(|totem| totem.category() == category)
            .map(UpgradeTotem::tier)
            .max()
            .unwrap_or(0)
    }

    /// The energy consumed per cycle: the tier's base cost, raised by speed upgrades and
    /// lowered by efficiency upgrades
    pub fn energy_per_cycle(&self, upkeep: &UpkeepConfig) -> u64 {
        let speed = self.upgrade_level(UpgradeCategory::Speed) as u64;
        let efficiency = self.upgrade_level(UpgradeCategory::Efficiency) as u64;
        let raised = self.tier.base_cost() * (100 + speed * upkeep.speed_cost_percent as u64) / 100;
        let saving = (efficiency * upkeep.efficiency_saving_percent as u64).min(100);
        raised * (100 - saving) / 100
    }
}

/// Matches templates against an [Environment]
#[derive(Debug, Clone, Copy)]
pub struct StructureScanner<'a> {
    registry: &'a TemplateRegistry,
    strict_caps: bool,
}

impl<'a> StructureScanner<'a> {
    /// Construct a scanner that uses the templates in `registry`
    pub fn new(registry: &'a TemplateRegistry) -> Self {
        Self {
            registry,
            strict_caps: false,
        }
    }

    /// Require tier caps to be exactly the kind the template names
    pub fn strict_caps(mut self, strict: bool) -> Self {
        self.strict_caps = strict;
        self
    }

    /// Find the highest tier structure anchored at `anchor`. A miss is a normal outcome and
    /// returns `None`
    pub fn scan(&self, env: &impl Environment, anchor: BlockPosition) -> Option<Snapshot> {
        if env.loaded_block(anchor) != Some(Block::Controller) {
            return None;
        }
        self.registry
            .descending()
            .find_map(|(tier, template)| self.match_tier(env, anchor, tier, template))
    }

    fn match_tier(
        &self,
        env: &impl Environment,
        anchor: BlockPosition,
        tier: Tier,
        template: &Template,
    ) -> Option<Snapshot> {
        for (offset, expected) in template.modules() {
            let pos = anchor + *offset;
            let actual = env.loaded_block(pos)?.cell_kind()?;
            if !expected.accepts(actual, self.strict_caps) {
                trace!("Tier {:?} at {} mismatched at {}", tier, anchor, pos);
                return None;
            }
        }

        if env.loaded_block(anchor.up(GAP))? != Block::Air {
            return None;
        }
        let storage = expect_part(env, anchor.up(STORAGE), PartRole::Storage)?;
        let input = expect_part(env, anchor.up(INPUT), PartRole::Input)?;
        let output = expect_part(env, anchor.up(OUTPUT), PartRole::Output)?;

        let mut storage = vec![storage];
        let mut programmers = Vec::new();
        for offset in template.volume() {
            let pos = anchor + offset;
            match env.loaded_block(pos) {
                Some(Block::Part(PartRole::Programmer)) => programmers.push(pos),
                // the fixed storage is already first in line
                Some(Block::Part(PartRole::Storage)) if pos != storage[0] => storage.push(pos),
                _ => {}
            }
        }
        if programmers.is_empty() {
            return None;
        }

        let program = programmers
            .iter()
            .filter_map(|pos| env.part(*pos)?.as_programmer())
            .find(|programmer| programmer.is_configured())
            .and_then(|programmer| programmer.program().cloned());

        let totems = template
            .upgrade_bases()
            .filter_map(|offset| scan_totem(env, anchor + offset, tier))
            .collect();

        Some(Snapshot {
            anchor,
            tier,
            storage,
            input,
            output,
            programmers,
            totems,
            program,
        })
    }
}

fn expect_part(
    env: &impl Environment,
    pos: BlockPosition,
    role: PartRole,
) -> Option<BlockPosition> {
    (env.loaded_block(pos)? == Block::Part(role)).then_some(pos)
}

#[cfg(test)]
use crate::{
    grid::formed_grid,
    part::{ProgrammerPart, StoragePart, UpgradeModule, UpgradePart},
};

#[cfg(test)]
const ANCHOR: BlockPosition = BlockPosition::new(8, 40, -12);

#[test]
fn test_missing_programmer() {
    let registry = TemplateRegistry::builtin();
    let scanner = StructureScanner::new(&registry);
    let mut grid = formed_grid(registry.get(Tier::I).unwrap(), ANCHOR);
    grid.remove(ANCHOR + IVec3::X);
    assert_eq!(None, scanner.scan(&grid, ANCHOR));

    let programmer = ANCHOR + IVec3::new(-1, 1, 1);
    grid.place_part(programmer, ProgrammerPart::default());
    let snapshot = scanner.scan(&grid, ANCHOR).unwrap();
    assert_eq!(Tier::I, snapshot.tier());
    assert_eq!(&[programmer], snapshot.programmers());
    assert_eq!(None, snapshot.program());
}

#[test]
fn test_every_builtin_tier_is_detected() {
    let registry = TemplateRegistry::builtin();
    let scanner = StructureScanner::new(&registry);
    for tier in Tier::ALL {
        let grid = formed_grid(registry.get(tier).unwrap(), ANCHOR);
        let snapshot = scanner.scan(&grid, ANCHOR).unwrap();
        assert_eq!(tier, snapshot.tier());
        assert_eq!(ANCHOR, snapshot.anchor());
        assert_eq!(&[ANCHOR.up(-2)], snapshot.storage());
        assert_eq!(ANCHOR.up(-3), snapshot.input());
        assert_eq!(ANCHOR.up(-4), snapshot.output());
        assert_eq!(Some(&Program::new("smelt")), snapshot.program());
        assert!(snapshot.totems().is_empty());
    }
}

#[test]
fn test_higher_tier_takes_precedence() {
    let mut registry = TemplateRegistry::default();
    registry.load(Tier::I, &[&["C @ C"]]).unwrap();
    registry.load(Tier::II, &[&["C @ C"], &["CCCCC"]]).unwrap();
    let scanner = StructureScanner::new(&registry);

    let mut grid = formed_grid(registry.get(Tier::II).unwrap(), ANCHOR);
    grid.remove(ANCHOR + IVec3::X);
    grid.place_part(ANCHOR + IVec3::NEG_X, ProgrammerPart::default());
    assert_eq!(Tier::II, scanner.scan(&grid, ANCHOR).unwrap().tier());

    // the smaller footprint is still complete on its own
    grid.remove(ANCHOR + IVec3::new(2, 1, 0));
    assert_eq!(Tier::I, scanner.scan(&grid, ANCHOR).unwrap().tier());
}

#[test]
fn test_builtin_tiers_nest() {
    let registry = TemplateRegistry::builtin();
    let scanner = StructureScanner::new(&registry);
    let mut grid = formed_grid(registry.get(Tier::IV).unwrap(), ANCHOR);
    // tier I fits in the hollow of tier IV
    grid.build_structure(registry.get(Tier::I).unwrap(), ANCHOR);
    assert_eq!(Tier::IV, scanner.scan(&grid, ANCHOR).unwrap().tier());

    grid.remove(ANCHOR + IVec3::new(5, 0, 5));
    assert_eq!(Tier::I, scanner.scan(&grid, ANCHOR).unwrap().tier());
}

#[test]
fn test_storage_below_the_anchor_is_counted_once() {
    let mut registry = TemplateRegistry::default();
    // the bounds reach two layers below the anchor
    registry
        .load(Tier::I, &[&["     "], &["     "], &["C @ C"]])
        .unwrap();
    let scanner = StructureScanner::new(&registry);
    let grid = formed_grid(registry.get(Tier::I).unwrap(), ANCHOR);

    let snapshot = scanner.scan(&grid, ANCHOR).unwrap();
    assert_eq!(&[ANCHOR.up(-2)], snapshot.storage());
    let view = crate::aggregate(snapshot.storage(), &grid, 10);
    assert_eq!(1000, view.capacity());
    assert_eq!(250, view.stored());
}

#[test]
fn test_single_mismatch_fails_the_tier() {
    let registry = TemplateRegistry::builtin();
    let scanner = StructureScanner::new(&registry);
    let template = registry.get(Tier::II).unwrap();
    for (offset, kind) in template.modules().iter().step_by(7) {
        let mut grid = formed_grid(template, ANCHOR);
        let wrong = if *kind == CellKind::Vent {
            CellKind::Pipe
        } else {
            CellKind::Vent
        };
        grid.set_block(ANCHOR + *offset, Block::Cell(wrong));
        assert_eq!(None, scanner.scan(&grid, ANCHOR));
    }
}

#[test]
fn test_caps_can_be_swapped() {
    let registry = TemplateRegistry::builtin();
    let template = registry.get(Tier::III).unwrap();
    let mut grid = formed_grid(template, ANCHOR);
    grid.set_block(ANCHOR + IVec3::new(0, 4, 0), Block::Cell(CellKind::Cap(Tier::I)));

    let lenient = StructureScanner::new(&registry);
    assert_eq!(Tier::III, lenient.scan(&grid, ANCHOR).unwrap().tier());
    let strict = StructureScanner::new(&registry).strict_caps(true);
    assert_eq!(None, strict.scan(&grid, ANCHOR));
}

#[test]
fn test_auxiliary_column() {
    let registry = TemplateRegistry::builtin();
    let scanner = StructureScanner::new(&registry);
    let template = registry.get(Tier::I).unwrap();

    let mut grid = formed_grid(template, ANCHOR);
    grid.set_block(ANCHOR.up(-1), Block::Cell(CellKind::Casing));
    assert_eq!(None, scanner.scan(&grid, ANCHOR));

    let mut grid = formed_grid(template, ANCHOR);
    grid.remove(ANCHOR.up(-4));
    assert_eq!(None, scanner.scan(&grid, ANCHOR));

    let mut grid = formed_grid(template, ANCHOR);
    grid.place_part(ANCHOR.up(-3), StoragePart::new(5));
    assert_eq!(None, scanner.scan(&grid, ANCHOR));
}

#[test]
fn test_anchor_must_be_a_loaded_controller() {
    let registry = TemplateRegistry::builtin();
    let scanner = StructureScanner::new(&registry);
    let mut grid = formed_grid(registry.get(Tier::I).unwrap(), ANCHOR);

    grid.unload_chunk((ANCHOR + IVec3::new(2, 2, 2)).chunk());
    assert_eq!(None, scanner.scan(&grid, ANCHOR));
    grid.load_chunk((ANCHOR + IVec3::new(2, 2, 2)).chunk());
    assert!(scanner.scan(&grid, ANCHOR).is_some());

    grid.remove(ANCHOR);
    assert_eq!(None, scanner.scan(&grid, ANCHOR));
}

#[test]
fn test_program_comes_from_a_configured_programmer() {
    let registry = TemplateRegistry::builtin();
    let scanner = StructureScanner::new(&registry);
    let mut grid = formed_grid(registry.get(Tier::II).unwrap(), ANCHOR);
    grid.place_part(ANCHOR + IVec3::X, ProgrammerPart::default());
    grid.place_part(
        ANCHOR + IVec3::new(-2, 1, 2),
        ProgrammerPart::with_program(Program::new("assemble")),
    );

    let snapshot = scanner.scan(&grid, ANCHOR).unwrap();
    assert_eq!(2, snapshot.programmers().len());
    assert_eq!(Some(&Program::new("assemble")), snapshot.program());
}

#[test]
fn test_storage_inside_bounds_is_collected() {
    let registry = TemplateRegistry::builtin();
    let scanner = StructureScanner::new(&registry);
    let mut grid = formed_grid(registry.get(Tier::II).unwrap(), ANCHOR);
    let extra = ANCHOR + IVec3::new(1, 2, -1);
    grid.place_part(extra, StoragePart::new(50));

    let snapshot = scanner.scan(&grid, ANCHOR).unwrap();
    assert_eq!(&[ANCHOR.up(-2), extra], snapshot.storage());
    assert_eq!(5, snapshot.linked_positions().count());
}

#[test]
fn test_totems_modify_upkeep() {
    let registry = TemplateRegistry::builtin();
    let scanner = StructureScanner::new(&registry);
    let template = registry.get(Tier::III).unwrap();
    let mut grid = formed_grid(template, ANCHOR);

    let bases: Vec<_> = template.upgrade_bases().collect();
    for level in 1..=2 {
        grid.place_part(
            ANCHOR + bases[0] + IVec3::Y * level as i32,
            UpgradePart::new(UpgradeModule::new(UpgradeCategory::Speed, level)),
        );
    }
    grid.place_part(
        ANCHOR + bases[1] + IVec3::Y,
        UpgradePart::new(UpgradeModule::new(UpgradeCategory::Efficiency, 1)),
    );

    let snapshot = scanner.scan(&grid, ANCHOR).unwrap();
    assert_eq!(2, snapshot.totems().len());
    assert_eq!(2, snapshot.upgrade_level(UpgradeCategory::Speed));
    assert_eq!(1, snapshot.upgrade_level(UpgradeCategory::Efficiency));
    assert_eq!(0, snapshot.upgrade_level(UpgradeCategory::Yield));
    assert_eq!(7, snapshot.linked_positions().count());

    let upkeep = UpkeepConfig {
        speed_cost_percent: 50,
        efficiency_saving_percent: 25,
    };
    // 64 * 200% * 75%
    assert_eq!(96, snapshot.energy_per_cycle(&upkeep));
}

#[test]
fn test_same_links_ignores_order() {
    let registry = TemplateRegistry::builtin();
    let scanner = StructureScanner::new(&registry);
    let mut grid = formed_grid(registry.get(Tier::I).unwrap(), ANCHOR);
    let a = scanner.scan(&grid, ANCHOR).unwrap();

    grid.place_part(ANCHOR + IVec3::NEG_X, ProgrammerPart::default());
    let b = scanner.scan(&grid, ANCHOR).unwrap();
    assert!(!a.same_links(&b));
    assert!(b.same_links(&b.clone()));

    let mut c = b.clone();
    c.programmers.reverse();
    assert!(b.same_links(&c));
}
