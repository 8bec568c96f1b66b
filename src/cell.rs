use crate::part::PartRole;

use serde::{Deserialize, Serialize};

/// The tier of a structure. Every tier is physically larger than the one below it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// The smallest structure
    I,
    /// Second tier, unlocks a second totem slot
    II,
    /// Third tier, unlocks the third totem slot
    III,
    /// The largest structure
    IV,
}

impl Tier {
    /// All tiers, from lowest to highest
    pub const ALL: [Tier; 4] = [Tier::I, Tier::II, Tier::III, Tier::IV];

    /// The numeric level of the tier, starting at 1
    pub const fn level(self) -> u8 {
        match self {
            Tier::I => 1,
            Tier::II => 2,
            Tier::III => 3,
            Tier::IV => 4,
        }
    }

    /// Get the tier for a numeric level
    pub const fn from_level(level: u8) -> Option<Tier> {
        match level {
            1 => Some(Tier::I),
            2 => Some(Tier::II),
            3 => Some(Tier::III),
            4 => Some(Tier::IV),
            _ => None,
        }
    }

    /// The most energy a structure of this tier is rated to hold
    pub const fn max_energy(self) -> u64 {
        match self {
            Tier::I => 100_000,
            Tier::II => 400_000,
            Tier::III => 1_600_000,
            Tier::IV => 6_400_000,
        }
    }

    /// The energy a structure of this tier consumes per cycle before upgrades
    pub const fn base_cost(self) -> u64 {
        match self {
            Tier::I => 16,
            Tier::II => 32,
            Tier::III => 64,
            Tier::IV => 128,
        }
    }

    /// The number of totem levels this tier allows, at most 3
    pub const fn totem_slots(self) -> u8 {
        match self {
            Tier::I => 1,
            Tier::II => 2,
            Tier::III | Tier::IV => 3,
        }
    }

    pub(crate) const fn index(self) -> usize {
        self.level() as usize - 1
    }
}

/// The structural role a single cell plays inside a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    /// Load bearing edges and corners
    Frame,
    /// Plain walls
    Casing,
    /// Transparent walls
    Glass,
    /// Internal piping
    Pipe,
    /// Heat vents
    Vent,
    /// The base a stack of upgrade modules is placed on
    UpgradeBase,
    /// A cap marked with a tier
    Cap(Tier),
}

/// What a single character in an authored template grid stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// The cell is not part of the pattern and is never checked
    Empty,
    /// The anchor of the structure, every offset is relative to this cell
    Origin,
    /// The cell must be of this kind
    Kind(CellKind),
}

impl Symbol {
    /// Resolve an authoring character
    pub const fn from_char(c: char) -> Option<Symbol> {
        Some(match c {
            ' ' => Symbol::Empty,
            '@' => Symbol::Origin,
            'F' => Symbol::Kind(CellKind::Frame),
            'C' => Symbol::Kind(CellKind::Casing),
            'G' => Symbol::Kind(CellKind::Glass),
            'P' => Symbol::Kind(CellKind::Pipe),
            'V' => Symbol::Kind(CellKind::Vent),
            'U' => Symbol::Kind(CellKind::UpgradeBase),
            '1' => Symbol::Kind(CellKind::Cap(Tier::I)),
            '2' => Symbol::Kind(CellKind::Cap(Tier::II)),
            '3' => Symbol::Kind(CellKind::Cap(Tier::III)),
            '4' => Symbol::Kind(CellKind::Cap(Tier::IV)),
            _ => return None,
        })
    }

    /// The authoring character for this symbol
    pub const fn as_char(self) -> char {
        match self {
            Symbol::Empty => ' ',
            Symbol::Origin => '@',
            Symbol::Kind(kind) => kind.symbol(),
        }
    }
}

impl CellKind {
    /// The character used for this kind in authored templates
    pub const fn symbol(self) -> char {
        match self {
            CellKind::Frame => 'F',
            CellKind::Casing => 'C',
            CellKind::Glass => 'G',
            CellKind::Pipe => 'P',
            CellKind::Vent => 'V',
            CellKind::UpgradeBase => 'U',
            CellKind::Cap(Tier::I) => '1',
            CellKind::Cap(Tier::II) => '2',
            CellKind::Cap(Tier::III) => '3',
            CellKind::Cap(Tier::IV) => '4',
        }
    }

    /// Whether a cell of kind `actual` satisfies a template position expecting `self`.
    /// Unless `strict_caps` is set, any tier cap may stand in for any other
    pub fn accepts(self, actual: CellKind, strict_caps: bool) -> bool {
        match (self, actual) {
            (CellKind::Cap(_), CellKind::Cap(_)) if !strict_caps => true,
            (expected, actual) => expected == actual,
        }
    }
}

/// Everything that can occupy a position in the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Block {
    /// Nothing is there
    #[default]
    Air,
    /// The controller block a structure is anchored on
    Controller,
    /// A structural cell
    Cell(CellKind),
    /// A component with runtime data of its own
    Part(PartRole),
    /// Any block this crate does not care about
    Foreign,
}

impl Block {
    /// The cell kind of this block, if it is a structural cell
    pub fn cell_kind(&self) -> Option<CellKind> {
        match self {
            Block::Cell(kind) => Some(*kind),
            _ => None,
        }
    }

    /// The part role of this block, if it is a part
    pub fn part_role(&self) -> Option<PartRole> {
        match self {
            Block::Part(role) => Some(*role),
            _ => None,
        }
    }
}

#[test]
fn test_symbol_mapping_is_bidirectional() {
    for c in " @FCGPVU1234".chars() {
        let symbol = Symbol::from_char(c).unwrap();
        assert_eq!(c, symbol.as_char());
    }
    assert_eq!(None, Symbol::from_char('x'));
    assert_eq!(None, Symbol::from_char('.'));
}

#[test]
fn test_caps_are_interchangeable_unless_strict() {
    let cap = CellKind::Cap(Tier::III);
    assert!(cap.accepts(CellKind::Cap(Tier::I), false));
    assert!(!cap.accepts(CellKind::Cap(Tier::I), true));
    assert!(cap.accepts(CellKind::Cap(Tier::III), true));
    assert!(!cap.accepts(CellKind::Casing, false));
    assert!(!CellKind::Casing.accepts(CellKind::Glass, false));
}

#[test]
fn test_tier_levels() {
    for tier in Tier::ALL {
        assert_eq!(Some(tier), Tier::from_level(tier.level()));
    }
    assert!(Tier::IV > Tier::I);
    assert_eq!(None, Tier::from_level(0));
    assert_eq!(3, Tier::IV.totem_slots());
}
