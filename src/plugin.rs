//! Bevy integration. [MultiblockPlugin] ticks every [StructureLifecycle] in the world and marks
//! lifecycles dirty when a [CellChanged] event lands within reach of their anchor

use crate::{
    grid::CellGrid,
    lifecycle::{release, StructureLifecycle, Transition},
    scan::Snapshot,
    template::TemplateRegistry,
    BlockPosition, MultiblockConfig,
};

use bevy::{prelude::*, utils::HashMap};

/// Sent whenever a block is placed or removed
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellChanged(pub BlockPosition);

/// The snapshot of every formed structure by the entity of its lifecycle, kept so the parts of a
/// despawned lifecycle can still be released
#[derive(Resource, Debug, Default, Deref)]
pub struct FormedStructures(HashMap<Entity, Snapshot>);

/// Adds the template registry, the config, the [CellGrid] and the systems that keep structures
/// up to date
#[derive(Default)]
pub struct MultiblockPlugin {
    /// The configuration to use, the built-in one if `None`
    pub config: Option<MultiblockConfig>,
}

impl Plugin for MultiblockPlugin {
    fn build(&self, app: &mut App) {
        let config = self.config.clone().unwrap_or_else(MultiblockConfig::builtin);
        let registry = TemplateRegistry::from_config(&config);
        app.insert_resource(registry)
            .insert_resource(config)
            .init_resource::<CellGrid>()
            .init_resource::<FormedStructures>()
            .add_event::<CellChanged>()
            .add_systems(
                Update,
                (release_removed, mark_dirty, tick_structures).chain(),
            );
    }
}

/// Release the parts of structures whose lifecycle was removed or despawned
pub fn release_removed(
    mut removed: RemovedComponents<StructureLifecycle>,
    mut formed: ResMut<FormedStructures>,
    mut grid: ResMut<CellGrid>,
) {
    for entity in removed.read() {
        if let Some(snapshot) = formed.0.remove(&entity) {
            release(&mut *grid, &snapshot);
        }
    }
}

/// Mark every lifecycle dirty that has a changed cell within reach
pub fn mark_dirty(
    mut changes: EventReader<CellChanged>,
    registry: Res<TemplateRegistry>,
    mut lifecycles: Query<&mut StructureLifecycle>,
) {
    let reach = registry.reach();
    for CellChanged(pos) in changes.read() {
        for mut lifecycle in lifecycles.iter_mut() {
            if !lifecycle.is_dirty() && reach.contains(lifecycle.anchor(), *pos) {
                lifecycle.set_dirty();
            }
        }
    }
}

/// Tick every lifecycle against the [CellGrid]
pub fn tick_structures(
    mut grid: ResMut<CellGrid>,
    registry: Res<TemplateRegistry>,
    config: Res<MultiblockConfig>,
    mut formed: ResMut<FormedStructures>,
    mut lifecycles: Query<(Entity, &mut StructureLifecycle)>,
) {
    for (entity, mut lifecycle) in lifecycles.iter_mut() {
        if !lifecycle.is_dirty() {
            continue;
        }
        match lifecycle.tick(&mut *grid, &registry, &config) {
            Transition::Idle | Transition::Unchanged => {}
            _ => match lifecycle.snapshot() {
                Some(snapshot) => {
                    formed.0.insert(entity, snapshot.clone());
                }
                None => {
                    formed.0.remove(&entity);
                }
            },
        }
    }
}

#[cfg(test)]
use crate::{cell::Tier, grid::formed_grid, lifecycle::StructureState};

#[cfg(test)]
fn app_with_structure(tier: Tier, anchor: BlockPosition) -> (App, Entity) {
    let mut app = App::new();
    app.add_plugins(MultiblockPlugin::default());
    let grid = {
        let registry = app.world.resource::<TemplateRegistry>();
        formed_grid(registry.get(tier).unwrap(), anchor)
    };
    app.insert_resource(grid);
    let entity = app.world.spawn(StructureLifecycle::new(anchor)).id();
    (app, entity)
}

#[cfg(test)]
fn send(app: &mut App, pos: BlockPosition) {
    app.world
        .resource_mut::<Events<CellChanged>>()
        .send(CellChanged(pos));
}

#[test]
fn test_first_update_forms_the_structure() {
    let anchor = BlockPosition::new(100, 12, 100);
    let (mut app, entity) = app_with_structure(Tier::II, anchor);
    app.update();

    let lifecycle = app.world.get::<StructureLifecycle>(entity).unwrap();
    assert!(lifecycle.is_formed());
    assert_eq!(Tier::II, lifecycle.snapshot().unwrap().tier());
    assert!(!lifecycle.is_dirty());
}

#[test]
fn test_changes_in_reach_trigger_a_scan() {
    let anchor = BlockPosition::new(0, 64, 0);
    let (mut app, entity) = app_with_structure(Tier::I, anchor);
    app.update();

    // out of reach, the structure breaks unnoticed
    let far = anchor + IVec3::new(40, 0, 0);
    app.world
        .resource_mut::<CellGrid>()
        .remove(anchor + IVec3::new(2, 0, 2));
    send(&mut app, far);
    app.update();
    assert!(app.world.get::<StructureLifecycle>(entity).unwrap().is_formed());

    send(&mut app, anchor + IVec3::new(2, 0, 2));
    app.update();
    let lifecycle = app.world.get::<StructureLifecycle>(entity).unwrap();
    assert_eq!(&StructureState::Unformed, lifecycle.state());
    assert!(lifecycle.has_changed());
}

#[test]
fn test_removing_the_controller_unforms() {
    let anchor = BlockPosition::new(-7, 3, 9);
    let (mut app, entity) = app_with_structure(Tier::I, anchor);
    app.update();

    let storage = anchor.up(-2);
    app.world.resource_mut::<CellGrid>().remove(anchor);
    send(&mut app, anchor);
    app.update();

    assert!(!app.world.get::<StructureLifecycle>(entity).unwrap().is_formed());
    let grid = app.world.resource::<CellGrid>();
    assert_eq!(
        None,
        crate::Environment::part(grid, storage).and_then(crate::part::Linked::anchor)
    );
}

#[test]
fn test_despawned_lifecycle_releases_its_parts() {
    let anchor = BlockPosition::new(12, 20, -4);
    let (mut app, entity) = app_with_structure(Tier::I, anchor);
    app.update();
    assert!(app.world.resource::<FormedStructures>().contains_key(&entity));

    app.world.despawn(entity);
    app.update();

    assert!(app.world.resource::<FormedStructures>().is_empty());
    let grid = app.world.resource::<CellGrid>();
    for pos in [anchor.up(-2), anchor.up(-3), anchor.up(-4), anchor + IVec3::X] {
        assert_eq!(
            None,
            crate::Environment::part(grid, pos).and_then(crate::part::Linked::anchor)
        );
    }
}
