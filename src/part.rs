//! Components that join a structure without being part of its shape. Parts keep runtime data of
//! their own, most importantly a back-reference to the anchor they are linked to

use crate::BlockPosition;

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

/// The categories an upgrade module can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradeCategory {
    /// Faster cycles at a higher energy cost
    Speed,
    /// Lower energy cost per cycle
    Efficiency,
    /// More jobs per cycle
    Parallel,
    /// Larger internal buffers
    Capacity,
    /// Fewer failed cycles
    Stability,
    /// More output per job
    Yield,
}

impl UpgradeCategory {
    /// All upgrade categories
    pub const ALL: [UpgradeCategory; 6] = [
        UpgradeCategory::Speed,
        UpgradeCategory::Efficiency,
        UpgradeCategory::Parallel,
        UpgradeCategory::Capacity,
        UpgradeCategory::Stability,
        UpgradeCategory::Yield,
    ];
}

/// The identity of an upgrade module, fixed when the module is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpgradeModule {
    category: UpgradeCategory,
    level: u8,
}

impl UpgradeModule {
    /// The highest level an upgrade module can have
    pub const MAX_LEVEL: u8 = 3;

    /// Construct an upgrade module of the given category and level
    pub const fn new(category: UpgradeCategory, level: u8) -> Self {
        if level == 0 || level > Self::MAX_LEVEL {
            panic!("Invalid upgrade level");
        }
        Self { category, level }
    }

    /// The category of this module
    pub fn category(&self) -> UpgradeCategory {
        self.category
    }

    /// The level of this module, between 1 and 3
    pub fn level(&self) -> u8 {
        self.level
    }
}

/// The role a part plays for the structure it joins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartRole {
    /// Stores energy
    Storage,
    /// Buffers incoming materials
    Input,
    /// Buffers produced materials
    Output,
    /// Holds the program the structure runs
    Programmer,
    /// One level of an upgrade totem
    Upgrade(UpgradeModule),
}

/// A program a programmer part can be configured with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Program {
    /// The name of the program
    pub name: String,
}

impl Program {
    /// Construct a program with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Shared behaviour of every part.
///
/// The anchor returned by [Linked::anchor] is advisory. The anchor may have been removed or may
/// no longer claim this part, so readers must check the anchor's own state before trusting it
#[enum_dispatch]
pub trait Linked {
    /// The anchor this part is currently linked to
    fn anchor(&self) -> Option<BlockPosition>;
    /// Link this part to an anchor, or unlink it with `None`
    fn set_anchor(&mut self, anchor: Option<BlockPosition>);
    /// The role of this part
    fn role(&self) -> PartRole;
}

/// An enum with all part variants, used to store parts without Box or dynamic dispatch
#[derive(Debug, Clone, PartialEq)]
#[enum_dispatch(Linked)]
pub enum Part {
    /// An energy cell
    Storage(StoragePart),
    /// An input buffer
    Input(InputBuffer),
    /// An output buffer
    Output(OutputBuffer),
    /// A programmer
    Programmer(ProgrammerPart),
    /// An upgrade module
    Upgrade(UpgradePart),
}

impl Part {
    /// Get the storage data if this is a storage part
    pub fn as_storage(&self) -> Option<&StoragePart> {
        match self {
            Part::Storage(storage) => Some(storage),
            _ => None,
        }
    }

    /// Get mutable storage data if this is a storage part
    pub fn as_storage_mut(&mut self) -> Option<&mut StoragePart> {
        match self {
            Part::Storage(storage) => Some(storage),
            _ => None,
        }
    }

    /// Get the programmer data if this is a programmer
    pub fn as_programmer(&self) -> Option<&ProgrammerPart> {
        match self {
            Part::Programmer(programmer) => Some(programmer),
            _ => None,
        }
    }
}

/// An energy cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoragePart {
    capacity: u64,
    stored: u64,
    anchor: Option<BlockPosition>,
}

impl StoragePart {
    /// Construct an empty energy cell with the given capacity
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Set the amount of stored energy, clamped to the capacity
    pub fn with_stored(mut self, stored: u64) -> Self {
        self.stored = stored.min(self.capacity);
        self
    }

    /// The amount of energy this cell can hold
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// The amount of energy currently stored
    pub fn stored(&self) -> u64 {
        self.stored
    }

    /// Store up to `amount` energy, returns how much was accepted
    pub fn insert(&mut self, amount: u64) -> u64 {
        let accepted = amount.min(self.capacity - self.stored);
        self.stored += accepted;
        accepted
    }

    /// Take up to `amount` energy, returns how much was taken
    pub fn extract(&mut self, amount: u64) -> u64 {
        let taken = amount.min(self.stored);
        self.stored -= taken;
        taken
    }
}

impl Linked for StoragePart {
    fn anchor(&self) -> Option<BlockPosition> {
        self.anchor
    }

    fn set_anchor(&mut self, anchor: Option<BlockPosition>) {
        self.anchor = anchor;
    }

    fn role(&self) -> PartRole {
        PartRole::Storage
    }
}

/// A buffer that materials are fed into
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputBuffer {
    anchor: Option<BlockPosition>,
}

impl Linked for InputBuffer {
    fn anchor(&self) -> Option<BlockPosition> {
        self.anchor
    }

    fn set_anchor(&mut self, anchor: Option<BlockPosition>) {
        self.anchor = anchor;
    }

    fn role(&self) -> PartRole {
        PartRole::Input
    }
}

/// A buffer that products are pushed into
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputBuffer {
    anchor: Option<BlockPosition>,
}

impl Linked for OutputBuffer {
    fn anchor(&self) -> Option<BlockPosition> {
        self.anchor
    }

    fn set_anchor(&mut self, anchor: Option<BlockPosition>) {
        self.anchor = anchor;
    }

    fn role(&self) -> PartRole {
        PartRole::Output
    }
}

/// A part that holds the program a structure runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgrammerPart {
    program: Option<Program>,
    anchor: Option<BlockPosition>,
}

impl ProgrammerPart {
    /// Construct a programmer with the given program
    pub fn with_program(program: Program) -> Self {
        Self {
            program: Some(program),
            anchor: None,
        }
    }

    /// Whether a program has been configured
    pub fn is_configured(&self) -> bool {
        self.program.is_some()
    }

    /// The configured program
    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// Replace the configured program
    pub fn set_program(&mut self, program: Option<Program>) {
        self.program = program;
    }
}

impl Linked for ProgrammerPart {
    fn anchor(&self) -> Option<BlockPosition> {
        self.anchor
    }

    fn set_anchor(&mut self, anchor: Option<BlockPosition>) {
        self.anchor = anchor;
    }

    fn role(&self) -> PartRole {
        PartRole::Programmer
    }
}

/// A single level of an upgrade totem
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradePart {
    module: UpgradeModule,
    anchor: Option<BlockPosition>,
}

impl UpgradePart {
    /// Construct an unlinked upgrade part
    pub fn new(module: UpgradeModule) -> Self {
        Self {
            module,
            anchor: None,
        }
    }

    /// The module this part was created as
    pub fn module(&self) -> UpgradeModule {
        self.module
    }
}

impl Linked for UpgradePart {
    fn anchor(&self) -> Option<BlockPosition> {
        self.anchor
    }

    fn set_anchor(&mut self, anchor: Option<BlockPosition>) {
        self.anchor = anchor;
    }

    fn role(&self) -> PartRole {
        PartRole::Upgrade(self.module)
    }
}

#[test]
fn test_storage_insert_and_extract() {
    let mut cell = StoragePart::new(100).with_stored(90);
    assert_eq!(10, cell.insert(25));
    assert_eq!(100, cell.stored());
    assert_eq!(100, cell.extract(150));
    assert_eq!(0, cell.stored());
    assert_eq!(100, StoragePart::new(100).with_stored(300).stored());
}

#[test]
fn test_part_dispatch() {
    let mut part = Part::from(UpgradePart::new(UpgradeModule::new(UpgradeCategory::Yield, 2)));
    assert_eq!(
        PartRole::Upgrade(UpgradeModule::new(UpgradeCategory::Yield, 2)),
        part.role()
    );
    assert_eq!(None, part.anchor());
    part.set_anchor(Some(BlockPosition::new(1, 2, 3)));
    assert_eq!(Some(BlockPosition::new(1, 2, 3)), part.anchor());
    assert!(part.as_storage().is_none());
}
