//! This crate detects and maintains multiblock structures on a voxel grid.
//! A structure is a set of cells around an anchor that matches the template of one of four tiers.
//!
//! The pieces, from the bottom up:
//! - The [TemplateRegistry] holds the pattern of every tier, authored as layers of text rows
//! - The [StructureScanner] matches those patterns against an [Environment], highest tier first
//! - [scan_totem] reads stacks of upgrade modules placed on the structure's upgrade bases
//! - A [StructureLifecycle] tracks one anchor, rescans it when marked dirty and links or unlinks
//!   the parts of the structure
//! - [aggregate()] combines the linked storage parts into a single energy store

#![warn(missing_docs)]

mod position;
pub use position::{BlockPosition, ChunkPosition};

pub mod cell;
pub use cell::{Block, CellKind, Tier};

pub mod part;
pub use part::{Linked, Part};

pub mod template;
pub use template::{Template, TemplateError, TemplateRegistry};

pub mod scan;
pub use scan::{Environment, EnvironmentMut, Snapshot, StructureScanner};

pub mod totem;
pub use totem::{scan_totem, UpgradeTotem};

pub mod lifecycle;
pub use lifecycle::{release, LinkReport, StructureLifecycle, StructureState, Transition};

pub mod aggregate;
pub use aggregate::{aggregate, AggregatedView};

mod grid;
pub use grid::CellGrid;

pub mod config;
pub use config::{ConfigError, MultiblockConfig};

pub mod plugin;
pub use plugin::{CellChanged, FormedStructures, MultiblockPlugin};

/// The number of cells per side of a chunk
pub const CHUNK_SIDES: usize = 16;
