//! The lifecycle of a single structure. A [StructureLifecycle] owns the current snapshot of one
//! anchor and is the only writer of the back-references of the parts it links.
//!
//! Re-validation is event driven: nothing is scanned unless the lifecycle was marked dirty, and
//! the flag is cleared after every attempt whatever its outcome. Whoever changes the world is
//! responsible for calling [StructureLifecycle::set_dirty] on every structure in reach

use crate::{
    aggregate::{aggregate, extract_energy, insert_energy, AggregatedView},
    part::Linked,
    scan::{Environment, EnvironmentMut, Snapshot, StructureScanner},
    template::TemplateRegistry,
    BlockPosition, MultiblockConfig,
};

use bevy::prelude::*;

/// Whether a structure is currently formed
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StructureState {
    /// No valid structure around the anchor
    #[default]
    Unformed,
    /// A valid structure, described by the snapshot
    Formed(Snapshot),
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The lifecycle was not dirty, nothing was scanned
    Idle,
    /// The scan agreed with the current state
    Unchanged,
    /// A structure formed where there was none
    Formed,
    /// The structure links the same parts but its tier, program or totems changed
    Updated,
    /// The structure now links a different set of parts
    Reformed,
    /// The structure fell apart
    Unformed,
}

/// Counts of the back-references written during the last transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// Parts that were linked to the anchor
    pub linked: usize,
    /// Parts that were unlinked from the anchor
    pub unlinked: usize,
    /// Parts that were taken over from a different anchor
    pub conflicts: usize,
}

/// Tracks the structure anchored at a single position
#[derive(Component, Debug, Clone)]
pub struct StructureLifecycle {
    anchor: BlockPosition,
    state: StructureState,
    view: AggregatedView,
    dirty: bool,
    changed: bool,
    report: LinkReport,
}

impl StructureLifecycle {
    /// Construct an unformed lifecycle. It starts dirty so the first tick scans
    pub fn new(anchor: BlockPosition) -> Self {
        Self {
            anchor,
            state: StructureState::Unformed,
            view: AggregatedView::default(),
            dirty: true,
            changed: false,
            report: LinkReport::default(),
        }
    }

    /// The anchor of the structure
    pub fn anchor(&self) -> BlockPosition {
        self.anchor
    }

    /// The current state
    pub fn state(&self) -> &StructureState {
        &self.state
    }

    /// Whether a structure is formed
    pub fn is_formed(&self) -> bool {
        matches!(self.state, StructureState::Formed(_))
    }

    /// The snapshot of the formed structure
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match &self.state {
            StructureState::Formed(snapshot) => Some(snapshot),
            StructureState::Unformed => None,
        }
    }

    /// The combined storage of the structure, as of the last rebuild
    pub fn view(&self) -> AggregatedView {
        self.view
    }

    /// Request a scan on the next tick
    pub fn set_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether a scan is pending
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether a transition happened since [StructureLifecycle::clear_changed] was last called
    pub fn has_changed(&self) -> bool {
        self.changed
    }

    /// Acknowledge the last transition
    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    /// The back-references written by the last transition
    pub fn last_report(&self) -> LinkReport {
        self.report
    }

    /// Re-validate the structure if it is dirty, and link or unlink parts on a transition
    pub fn tick(
        &mut self,
        env: &mut impl EnvironmentMut,
        registry: &TemplateRegistry,
        config: &MultiblockConfig,
    ) -> Transition {
        if !self.dirty {
            return Transition::Idle;
        }
        self.dirty = false;

        let scanned = StructureScanner::new(registry)
            .strict_caps(config.strict_caps)
            .scan(&*env, self.anchor);
        let anchor = self.anchor;
        let mut report = LinkReport::default();

        let (state, transition) = match (std::mem::take(&mut self.state), scanned) {
            (StructureState::Unformed, None) => (StructureState::Unformed, Transition::Unchanged),
            (StructureState::Unformed, Some(new)) => {
                link(env, anchor, &new, &mut report);
                info!("Structure at {} formed at tier {:?}", anchor, new.tier());
                (StructureState::Formed(new), Transition::Formed)
            }
            (StructureState::Formed(old), None) => {
                unlink(env, anchor, &old, &mut report);
                info!("Structure at {} is no longer formed", anchor);
                (StructureState::Unformed, Transition::Unformed)
            }
            (StructureState::Formed(old), Some(new)) if old == new => {
                // a part replaced by one of the same role still needs its back-reference
                link(env, anchor, &old, &mut report);
                (StructureState::Formed(old), Transition::Unchanged)
            }
            (StructureState::Formed(old), Some(new)) if old.same_links(&new) => {
                // replaced parts come back without a back-reference
                link(env, anchor, &new, &mut report);
                debug!("Structure at {} updated in place", anchor);
                (StructureState::Formed(new), Transition::Updated)
            }
            (StructureState::Formed(old), Some(new)) => {
                unlink(env, anchor, &old, &mut report);
                link(env, anchor, &new, &mut report);
                debug!(
                    "Structure at {} reformed at tier {:?} with {} linked parts",
                    anchor,
                    new.tier(),
                    report.linked
                );
                (StructureState::Formed(new), Transition::Reformed)
            }
        };
        self.state = state;

        if transition != Transition::Unchanged {
            self.changed = true;
            self.report = report;
        }
        self.refresh_view(&*env, config);
        transition
    }

    /// Unlink every part and drop the snapshot without scanning. Used when the anchor itself is
    /// removed
    pub fn full_disconnect(&mut self, env: &mut impl EnvironmentMut) {
        self.report = match std::mem::take(&mut self.state) {
            StructureState::Formed(old) => {
                self.changed = true;
                release(env, &old)
            }
            StructureState::Unformed => LinkReport::default(),
        };
        self.view = AggregatedView::default();
    }

    /// Rebuild the aggregated view from the current snapshot
    pub fn refresh_view(&mut self, env: &impl Environment, config: &MultiblockConfig) {
        self.view = match &self.state {
            StructureState::Formed(snapshot) => {
                aggregate(snapshot.storage(), env, config.transfer_rate_divisor)
            }
            StructureState::Unformed => AggregatedView::default(),
        };
    }

    /// Store energy in the structure, limited by the transfer limit. Returns how much was stored
    pub fn insert_energy(
        &mut self,
        env: &mut impl EnvironmentMut,
        amount: u64,
        config: &MultiblockConfig,
    ) -> u64 {
        let Some(snapshot) = self.snapshot() else {
            return 0;
        };
        let stored = insert_energy(env, snapshot.storage(), amount, self.view.transfer_limit());
        self.refresh_view(&*env, config);
        stored
    }

    /// Take energy from the structure, limited by the transfer limit. Returns how much was taken
    pub fn extract_energy(
        &mut self,
        env: &mut impl EnvironmentMut,
        amount: u64,
        config: &MultiblockConfig,
    ) -> u64 {
        let Some(snapshot) = self.snapshot() else {
            return 0;
        };
        let taken = extract_energy(env, snapshot.storage(), amount, self.view.transfer_limit());
        self.refresh_view(&*env, config);
        taken
    }
}

/// Clear the back-references the parts of `snapshot` hold to its anchor. For structures whose
/// lifecycle is gone
pub fn release(env: &mut impl EnvironmentMut, snapshot: &Snapshot) -> LinkReport {
    let mut report = LinkReport::default();
    unlink(env, snapshot.anchor(), snapshot, &mut report);
    debug!("Structure at {} disconnected", snapshot.anchor());
    report
}

fn link(
    env: &mut impl EnvironmentMut,
    anchor: BlockPosition,
    snapshot: &Snapshot,
    report: &mut LinkReport,
) {
    for pos in snapshot.linked_positions() {
        let Some(part) = env.part_mut(pos) else {
            continue;
        };
        match part.anchor() {
            Some(current) if current == anchor => continue,
            Some(other) => {
                warn!(
                    "Part at {} was linked to {} and is now claimed by {}",
                    pos, other, anchor
                );
                report.conflicts += 1;
            }
            None => {}
        }
        part.set_anchor(Some(anchor));
        report.linked += 1;
    }
}

fn unlink(
    env: &mut impl EnvironmentMut,
    anchor: BlockPosition,
    snapshot: &Snapshot,
    report: &mut LinkReport,
) {
    for pos in snapshot.linked_positions() {
        let Some(part) = env.part_mut(pos) else {
            continue;
        };
        // parts claimed by another anchor since are left alone
        if part.anchor() == Some(anchor) {
            part.set_anchor(None);
            report.unlinked += 1;
        }
    }
}

#[cfg(test)]
use crate::{
    cell::{Block, CellKind, Tier},
    grid::{formed_grid, CellGrid},
    part::{Program, ProgrammerPart, StoragePart},
};

#[cfg(test)]
const ANCHOR: BlockPosition = BlockPosition::new(-30, 5, 17);

#[cfg(test)]
fn formed(tier: Tier) -> (CellGrid, TemplateRegistry, StructureLifecycle) {
    let registry = TemplateRegistry::builtin();
    let grid = formed_grid(registry.get(tier).unwrap(), ANCHOR);
    (grid, registry, StructureLifecycle::new(ANCHOR))
}

#[cfg(test)]
fn anchor_of(grid: &CellGrid, pos: BlockPosition) -> Option<BlockPosition> {
    grid.part(pos).and_then(Linked::anchor)
}

#[test]
fn test_nothing_to_form() {
    let registry = TemplateRegistry::builtin();
    let config = MultiblockConfig::default();
    let mut grid = CellGrid::default();
    let mut lifecycle = StructureLifecycle::new(ANCHOR);

    assert!(lifecycle.is_dirty());
    assert_eq!(Transition::Unchanged, lifecycle.tick(&mut grid, &registry, &config));
    assert!(!lifecycle.is_dirty());
    assert!(!lifecycle.is_formed());
    assert!(!lifecycle.has_changed());
    assert_eq!(Transition::Idle, lifecycle.tick(&mut grid, &registry, &config));
}

#[test]
fn test_forming_links_every_part() {
    let (mut grid, registry, mut lifecycle) = formed(Tier::II);
    let config = MultiblockConfig::default();

    assert_eq!(Transition::Formed, lifecycle.tick(&mut grid, &registry, &config));
    assert!(lifecycle.is_formed());
    assert!(lifecycle.has_changed());
    let snapshot = lifecycle.snapshot().unwrap();
    assert_eq!(Tier::II, snapshot.tier());
    for pos in snapshot.linked_positions() {
        assert_eq!(Some(ANCHOR), anchor_of(&grid, pos));
    }
    assert_eq!(4, lifecycle.last_report().linked);

    let view = lifecycle.view();
    assert_eq!(1000, view.capacity());
    assert_eq!(250, view.stored());
    assert_eq!(100, view.transfer_limit());
}

#[test]
fn test_stable_structure_is_left_alone() {
    let (mut grid, registry, mut lifecycle) = formed(Tier::I);
    let config = MultiblockConfig::default();
    lifecycle.tick(&mut grid, &registry, &config);
    let snapshot = lifecycle.snapshot().cloned();
    lifecycle.clear_changed();

    assert_eq!(Transition::Idle, lifecycle.tick(&mut grid, &registry, &config));
    assert_eq!(snapshot.as_ref(), lifecycle.snapshot());
    assert!(!lifecycle.has_changed());

    // a rescan that finds the same structure only restores missing back-references
    grid.part_mut(ANCHOR.up(-3)).unwrap().set_anchor(None);
    lifecycle.set_dirty();
    assert_eq!(Transition::Unchanged, lifecycle.tick(&mut grid, &registry, &config));
    assert_eq!(Some(ANCHOR), anchor_of(&grid, ANCHOR.up(-3)));
    assert_eq!(snapshot.as_ref(), lifecycle.snapshot());
    assert!(!lifecycle.has_changed());
}

#[test]
fn test_replaced_storage_is_linked_and_counted() {
    let (mut grid, registry, mut lifecycle) = formed(Tier::I);
    let config = MultiblockConfig::default();
    lifecycle.tick(&mut grid, &registry, &config);
    lifecycle.clear_changed();

    grid.place_part(ANCHOR.up(-2), StoragePart::new(5000));
    lifecycle.set_dirty();
    assert_eq!(Transition::Unchanged, lifecycle.tick(&mut grid, &registry, &config));
    assert!(!lifecycle.has_changed());
    assert_eq!(Some(ANCHOR), anchor_of(&grid, ANCHOR.up(-2)));
    assert_eq!(5000, lifecycle.view().capacity());
    assert_eq!(0, lifecycle.view().stored());
}

#[test]
fn test_changed_flag_survives_ticks() {
    let (mut grid, registry, mut lifecycle) = formed(Tier::I);
    let config = MultiblockConfig::default();
    lifecycle.tick(&mut grid, &registry, &config);
    lifecycle.set_dirty();
    lifecycle.tick(&mut grid, &registry, &config);
    lifecycle.tick(&mut grid, &registry, &config);
    assert!(lifecycle.has_changed());
    lifecycle.clear_changed();
    assert!(!lifecycle.has_changed());
}

#[test]
fn test_breaking_unlinks_every_part() {
    let (mut grid, registry, mut lifecycle) = formed(Tier::III);
    let config = MultiblockConfig::default();
    lifecycle.tick(&mut grid, &registry, &config);
    let linked: Vec<_> = lifecycle.snapshot().unwrap().linked_positions().collect();
    lifecycle.clear_changed();

    grid.set_block(ANCHOR + IVec3::new(4, 0, 4), Block::Cell(CellKind::Glass));
    // not dirty yet, so the break goes unnoticed
    assert_eq!(Transition::Idle, lifecycle.tick(&mut grid, &registry, &config));
    assert!(lifecycle.is_formed());

    lifecycle.set_dirty();
    assert_eq!(Transition::Unformed, lifecycle.tick(&mut grid, &registry, &config));
    assert!(lifecycle.has_changed());
    assert!(lifecycle.snapshot().is_none());
    for pos in linked {
        assert_eq!(None, anchor_of(&grid, pos));
    }
    assert_eq!(4, lifecycle.last_report().unlinked);
    assert_eq!(AggregatedView::default(), lifecycle.view());
}

#[test]
fn test_new_part_relinks() {
    let (mut grid, registry, mut lifecycle) = formed(Tier::I);
    let config = MultiblockConfig::default();
    lifecycle.tick(&mut grid, &registry, &config);
    lifecycle.clear_changed();

    let extra = ANCHOR + IVec3::new(0, 1, 1);
    grid.place_part(extra, ProgrammerPart::default());
    lifecycle.set_dirty();
    assert_eq!(Transition::Reformed, lifecycle.tick(&mut grid, &registry, &config));
    assert!(lifecycle.has_changed());
    assert_eq!(2, lifecycle.snapshot().unwrap().programmers().len());
    assert_eq!(Some(ANCHOR), anchor_of(&grid, extra));
    assert_eq!(Some(ANCHOR), anchor_of(&grid, ANCHOR + IVec3::X));
    assert_eq!(4, lifecycle.last_report().unlinked);
    assert_eq!(5, lifecycle.last_report().linked);

    grid.remove(extra);
    lifecycle.set_dirty();
    assert_eq!(Transition::Reformed, lifecycle.tick(&mut grid, &registry, &config));
    assert_eq!(1, lifecycle.snapshot().unwrap().programmers().len());
}

#[test]
fn test_program_change_updates_in_place() {
    let (mut grid, registry, mut lifecycle) = formed(Tier::I);
    let config = MultiblockConfig::default();
    lifecycle.tick(&mut grid, &registry, &config);
    lifecycle.clear_changed();

    grid.place_part(
        ANCHOR + IVec3::X,
        ProgrammerPart::with_program(Program::new("press")),
    );
    lifecycle.set_dirty();
    assert_eq!(Transition::Updated, lifecycle.tick(&mut grid, &registry, &config));
    assert!(lifecycle.has_changed());
    assert_eq!(1, lifecycle.last_report().linked);
    assert_eq!(0, lifecycle.last_report().unlinked);
    assert_eq!(Some(ANCHOR), anchor_of(&grid, ANCHOR + IVec3::X));
    assert_eq!(
        Some(&Program::new("press")),
        lifecycle.snapshot().unwrap().program()
    );
}

#[test]
fn test_full_disconnect() {
    let (mut grid, registry, mut lifecycle) = formed(Tier::IV);
    let config = MultiblockConfig::default();
    lifecycle.tick(&mut grid, &registry, &config);
    lifecycle.clear_changed();

    lifecycle.full_disconnect(&mut grid);
    assert!(!lifecycle.is_formed());
    assert!(lifecycle.has_changed());
    assert_eq!(None, anchor_of(&grid, ANCHOR.up(-2)));
    assert_eq!(None, anchor_of(&grid, ANCHOR + IVec3::X));
    assert_eq!(0, lifecycle.view().capacity());

    lifecycle.clear_changed();
    lifecycle.full_disconnect(&mut grid);
    assert!(!lifecycle.has_changed());
}

#[test]
fn test_claim_conflicts() {
    let (mut grid, registry, mut lifecycle) = formed(Tier::I);
    let config = MultiblockConfig::default();
    let other = BlockPosition::new(0, 0, 0);
    grid.part_mut(ANCHOR.up(-2))
        .unwrap()
        .set_anchor(Some(other));

    lifecycle.tick(&mut grid, &registry, &config);
    assert_eq!(1, lifecycle.last_report().conflicts);
    assert_eq!(Some(ANCHOR), anchor_of(&grid, ANCHOR.up(-2)));

    // a part claimed by someone else afterwards keeps that claim
    grid.part_mut(ANCHOR.up(-2))
        .unwrap()
        .set_anchor(Some(other));
    lifecycle.full_disconnect(&mut grid);
    assert_eq!(Some(other), anchor_of(&grid, ANCHOR.up(-2)));
    assert_eq!(None, anchor_of(&grid, ANCHOR.up(-3)));
}

#[test]
fn test_energy_goes_through_linked_storage() {
    let (mut grid, registry, mut lifecycle) = formed(Tier::I);
    let config = MultiblockConfig::default();
    assert_eq!(0, lifecycle.insert_energy(&mut grid, 10, &config));

    lifecycle.tick(&mut grid, &registry, &config);
    assert_eq!(100, lifecycle.insert_energy(&mut grid, 500, &config));
    assert_eq!(350, lifecycle.view().stored());
    assert_eq!(100, lifecycle.extract_energy(&mut grid, 1000, &config));
    assert_eq!(40, lifecycle.extract_energy(&mut grid, 40, &config));
    assert_eq!(210, lifecycle.view().stored());
}
