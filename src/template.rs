//! The template repository. Each tier has one template, authored as layers of text rows from the
//! bottom layer up. Every character of a row is a [Symbol], and the single origin marker is the
//! anchor every offset is measured from

use crate::{
    cell::{CellKind, Symbol, Tier},
    part::UpgradeModule,
    scan::AUXILIARY_DEPTH,
    BlockPosition, MultiblockConfig,
};

use bevy::{prelude::*, utils::HashMap};
use fast_surface_nets::ndshape::{RuntimeShape, Shape};
use thiserror::Error;

/// An error found while loading a template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The grid is empty somewhere, or the rows of a layer differ in length
    #[error("malformed template at layer {layer}: {reason}")]
    Malformed {
        /// The layer the problem was found in
        layer: usize,
        /// What is wrong with it
        reason: &'static str,
    },
    /// A character that does not map to a [Symbol]
    #[error("unknown symbol {symbol:?} at layer {layer}, row {row}, column {column}")]
    UnknownSymbol {
        /// The offending character
        symbol: char,
        /// The layer of the character
        layer: usize,
        /// The row of the character
        row: usize,
        /// The column of the character
        column: usize,
    },
    /// The grid does not contain exactly one origin marker
    #[error("template needs exactly one origin marker, found {found}")]
    MissingOrigin {
        /// The number of origin markers in the grid
        found: usize,
    },
}

/// The immutable pattern for a single tier
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    modules: Vec<(IVec3, CellKind)>,
    counts: HashMap<CellKind, usize>,
    min: IVec3,
    max: IVec3,
}

impl Template {
    /// Parse a layered character grid. Layers go from the bottom up, rows run along z and columns
    /// along x
    pub fn parse<L, R>(layers: &[L]) -> Result<Self, TemplateError>
    where
        L: AsRef<[R]>,
        R: AsRef<str>,
    {
        if layers.is_empty() {
            return Err(TemplateError::Malformed {
                layer: 0,
                reason: "template has no layers",
            });
        }

        let mut cells = Vec::new();
        let mut origins = Vec::new();
        let mut width = 0;
        let mut depth = 0;
        for (layer, rows) in layers.iter().enumerate() {
            let rows = rows.as_ref();
            let Some(first) = rows.first() else {
                return Err(TemplateError::Malformed {
                    layer,
                    reason: "layer has no rows",
                });
            };
            let row_len = first.as_ref().chars().count();
            if row_len == 0 {
                return Err(TemplateError::Malformed {
                    layer,
                    reason: "layer has empty rows",
                });
            }
            width = width.max(row_len);
            depth = depth.max(rows.len());

            for (row, line) in rows.iter().enumerate() {
                let line = line.as_ref();
                if line.chars().count() != row_len {
                    return Err(TemplateError::Malformed {
                        layer,
                        reason: "rows differ in length",
                    });
                }
                for (column, c) in line.chars().enumerate() {
                    let pos = IVec3::new(column as i32, layer as i32, row as i32);
                    match Symbol::from_char(c) {
                        Some(Symbol::Empty) => {}
                        Some(Symbol::Origin) => origins.push(pos),
                        Some(Symbol::Kind(kind)) => cells.push((pos, kind)),
                        None => {
                            return Err(TemplateError::UnknownSymbol {
                                symbol: c,
                                layer,
                                row,
                                column,
                            })
                        }
                    }
                }
            }
        }

        let &[origin] = origins.as_slice() else {
            return Err(TemplateError::MissingOrigin {
                found: origins.len(),
            });
        };

        let mut counts = HashMap::default();
        let modules: Vec<_> = cells
            .into_iter()
            .map(|(pos, kind)| {
                *counts.entry(kind).or_insert(0) += 1;
                (pos - origin, kind)
            })
            .collect();

        let size = IVec3::new(width as i32, layers.len() as i32, depth as i32);
        Ok(Self {
            modules,
            counts,
            min: -origin,
            max: size - IVec3::ONE - origin,
        })
    }

    /// Every cell of the pattern as an offset from the anchor together with its kind
    pub fn modules(&self) -> &[(IVec3, CellKind)] {
        &self.modules
    }

    /// The number of cells of the given kind in the pattern
    pub fn count_of(&self, kind: CellKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// The smallest and largest offset of the grid's bounding box, both inclusive
    pub fn bounds(&self) -> (IVec3, IVec3) {
        (self.min, self.max)
    }

    /// Every offset inside the bounding box, in a fixed order
    pub fn volume(&self) -> impl Iterator<Item = IVec3> + '_ {
        let size = (self.max - self.min + IVec3::ONE).as_uvec3();
        let shape = RuntimeShape::<u32, 3>::new(size.to_array());
        (0..shape.size()).map(move |i| self.min + UVec3::from_array(shape.delinearize(i)).as_ivec3())
    }

    /// The offsets of the upgrade bases in the pattern
    pub fn upgrade_bases(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.modules
            .iter()
            .filter(|(_, kind)| *kind == CellKind::UpgradeBase)
            .map(|(offset, _)| *offset)
    }
}

/// The volume around an anchor in which a changed cell can affect the structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reach {
    /// The smallest offset from the anchor, inclusive
    pub min: IVec3,
    /// The largest offset from the anchor, inclusive
    pub max: IVec3,
}

impl Reach {
    /// Whether a change at `pos` can affect a structure anchored at `anchor`
    pub fn contains(&self, anchor: BlockPosition, pos: BlockPosition) -> bool {
        let offset = pos - anchor;
        offset.cmpge(self.min).all() && offset.cmple(self.max).all()
    }
}

/// The resource holding the template of every tier. Populated once at startup
#[derive(Resource, Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: [Option<Template>; 4],
}

impl TemplateRegistry {
    /// A registry with the built-in template of every tier
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for (tier, layers) in BUILTIN_TEMPLATES {
            // failures are logged by load and leave the tier out
            let _ = registry.load(tier, layers);
        }
        registry
    }

    /// The built-in templates, with any template the config overrides replaced
    pub fn from_config(config: &MultiblockConfig) -> Self {
        let mut registry = Self::builtin();
        for (tier, layers) in config.templates.iter() {
            let _ = registry.load(*tier, layers.as_slice());
        }
        registry
    }

    /// Parse and store the template for a tier. If the grid is invalid the tier is left without
    /// a template, so it can never be matched
    pub fn load<L, R>(&mut self, tier: Tier, layers: &[L]) -> Result<&Template, TemplateError>
    where
        L: AsRef<[R]>,
        R: AsRef<str>,
    {
        let slot = &mut self.templates[tier.index()];
        match Template::parse(layers) {
            Ok(template) => {
                debug!(
                    "Loaded tier {:?} template with {} modules",
                    tier,
                    template.modules.len()
                );
                Ok(&*slot.insert(template))
            }
            Err(err) => {
                warn!("Tier {:?} template is unavailable: {}", tier, err);
                *slot = None;
                Err(err)
            }
        }
    }

    /// Get the template for a tier
    pub fn get(&self, tier: Tier) -> Option<&Template> {
        self.templates[tier.index()].as_ref()
    }

    /// The modules of a tier, empty if the tier has no template
    pub fn modules(&self, tier: Tier) -> &[(IVec3, CellKind)] {
        self.get(tier).map(Template::modules).unwrap_or(&[])
    }

    /// The number of cells of a kind in a tier's template
    pub fn count_of(&self, tier: Tier, kind: CellKind) -> usize {
        self.get(tier).map_or(0, |template| template.count_of(kind))
    }

    /// Every loaded template, from the highest tier to the lowest
    pub fn descending(&self) -> impl Iterator<Item = (Tier, &Template)> {
        Tier::ALL
            .into_iter()
            .rev()
            .filter_map(|tier| self.get(tier).map(|template| (tier, template)))
    }

    /// The union of all template bounds, extended down by the auxiliary column and up by the
    /// tallest possible totem
    pub fn reach(&self) -> Reach {
        let (min, max) = self
            .descending()
            .map(|(_, template)| template.bounds())
            .fold((IVec3::ZERO, IVec3::ZERO), |(min, max), (lo, hi)| {
                (min.min(lo), max.max(hi))
            });
        Reach {
            min: IVec3::new(min.x, min.y.min(-AUXILIARY_DEPTH), min.z),
            max: IVec3::new(max.x, max.y + UpgradeModule::MAX_LEVEL as i32, max.z),
        }
    }
}

const BUILTIN_TEMPLATES: [(Tier, &[&[&str]]); 4] = [
    (Tier::I, TIER_I),
    (Tier::II, TIER_II),
    (Tier::III, TIER_III),
    (Tier::IV, TIER_IV),
];

const TIER_I: &[&[&str]] = &[
    &[
        "FCCCF",
        "C   C",
        "C @ C",
        "C   C",
        "FCCCF",
    ],
    &[
        "F   F",
        "     ",
        "     ",
        "     ",
        "F   F",
    ],
    &[
        "UCCCU",
        "CGGGC",
        "CG1GC",
        "CGGGC",
        "UCCCU",
    ],
];

const TIER_II: &[&[&str]] = &[
    &[
        "FCCCCCF",
        "C     C",
        "C     C",
        "C  @  C",
        "C     C",
        "C     C",
        "FCCCCCF",
    ],
    &[
        "F     F",
        "       ",
        "       ",
        "       ",
        "       ",
        "       ",
        "F     F",
    ],
    &[
        "F     F",
        "       ",
        "       ",
        "       ",
        "       ",
        "       ",
        "F     F",
    ],
    &[
        "UCCCCCU",
        "CGGGGGC",
        "CGPPPGC",
        "CGP2PGC",
        "CGPPPGC",
        "CGGGGGC",
        "UCCCCCU",
    ],
];

const TIER_III: &[&[&str]] = &[
    &[
        "FCCCCCCCF",
        "C       C",
        "C       C",
        "C       C",
        "C   @   C",
        "C       C",
        "C       C",
        "C       C",
        "FCCCCCCCF",
    ],
    &[
        "F   V   F",
        "         ",
        "         ",
        "         ",
        "V       V",
        "         ",
        "         ",
        "         ",
        "F   V   F",
    ],
    &[
        "F   V   F",
        "         ",
        "         ",
        "         ",
        "V       V",
        "         ",
        "         ",
        "         ",
        "F   V   F",
    ],
    &[
        "F   V   F",
        "         ",
        "         ",
        "         ",
        "V       V",
        "         ",
        "         ",
        "         ",
        "F   V   F",
    ],
    &[
        "UCCCCCCCU",
        "CGGGGGGGC",
        "CGPPPPPGC",
        "CGPVVVPGC",
        "CGPV3VPGC",
        "CGPVVVPGC",
        "CGPPPPPGC",
        "CGGGGGGGC",
        "UCCCCCCCU",
    ],
];

const TIER_IV: &[&[&str]] = &[
    &[
        "FCCCCCCCCCF",
        "C         C",
        "C         C",
        "C         C",
        "C         C",
        "C    @    C",
        "C         C",
        "C         C",
        "C         C",
        "C         C",
        "FCCCCCCCCCF",
    ],
    &[
        "F    V    F",
        "           ",
        "           ",
        "           ",
        "           ",
        "V         V",
        "           ",
        "           ",
        "           ",
        "           ",
        "F    V    F",
    ],
    &[
        "F    V    F",
        "           ",
        "           ",
        "           ",
        "           ",
        "V         V",
        "           ",
        "           ",
        "           ",
        "           ",
        "F    V    F",
    ],
    &[
        "F    V    F",
        "           ",
        "           ",
        "           ",
        "           ",
        "V         V",
        "           ",
        "           ",
        "           ",
        "           ",
        "F    V    F",
    ],
    &[
        "F    V    F",
        "           ",
        "           ",
        "           ",
        "           ",
        "V         V",
        "           ",
        "           ",
        "           ",
        "           ",
        "F    V    F",
    ],
    &[
        "UCCCCCCCCCU",
        "CGGGGGGGGGC",
        "CGPPPPPPPGC",
        "CGPVVVVVPGC",
        "CGPVPPPVPGC",
        "CGPVP4PVPGC",
        "CGPVPPPVPGC",
        "CGPVVVVVPGC",
        "CGPPPPPPPGC",
        "CGGGGGGGGGC",
        "UCCCCCCCCCU",
    ],
];

#[test]
fn test_builtin_templates_load() {
    let registry = TemplateRegistry::builtin();
    for tier in Tier::ALL {
        let template = registry.get(tier).unwrap();
        assert_eq!(1, template.count_of(CellKind::Cap(tier)));
        assert_eq!(4, template.count_of(CellKind::UpgradeBase));
        assert_eq!(4, template.upgrade_bases().count());
    }

    assert_eq!(8, registry.count_of(Tier::I, CellKind::Frame));
    assert_eq!(24, registry.count_of(Tier::I, CellKind::Casing));
    assert_eq!(8, registry.count_of(Tier::I, CellKind::Glass));
    assert_eq!(0, registry.count_of(Tier::I, CellKind::Pipe));
    assert_eq!(45, registry.modules(Tier::I).len());
}

#[test]
fn test_offsets_are_relative_to_origin() {
    let template = Template::parse(TIER_I).unwrap();
    let modules = template.modules();
    assert!(modules.contains(&(IVec3::new(-2, 0, -2), CellKind::Frame)));
    assert!(modules.contains(&(IVec3::new(0, 2, 0), CellKind::Cap(Tier::I))));
    assert!(modules.contains(&(IVec3::new(2, 2, -2), CellKind::UpgradeBase)));
    assert!(!modules.iter().any(|(offset, _)| *offset == IVec3::ZERO));
    assert_eq!((IVec3::new(-2, 0, -2), IVec3::new(2, 2, 2)), template.bounds());
    assert_eq!(75, template.volume().count());
    assert!(template.volume().any(|offset| offset == IVec3::new(2, 2, 2)));
}

#[test]
fn test_load_is_deterministic() {
    let a = Template::parse(TIER_III).unwrap();
    let b = Template::parse(TIER_III).unwrap();
    assert_eq!(a.modules(), b.modules());
    assert_eq!(a, b);
}

#[test]
fn test_malformed_templates() {
    let empty: &[&[&str]] = &[];
    assert!(matches!(
        Template::parse(empty),
        Err(TemplateError::Malformed { layer: 0, .. })
    ));
    assert!(matches!(
        Template::parse(&[&["@"][..], &[][..]]),
        Err(TemplateError::Malformed { layer: 1, .. })
    ));
    assert!(matches!(
        Template::parse(&[&["", ""]]),
        Err(TemplateError::Malformed { layer: 0, .. })
    ));
    assert!(matches!(
        Template::parse(&[&["CCC", "C@", "CCC"]]),
        Err(TemplateError::Malformed { layer: 0, .. })
    ));
}

#[test]
fn test_unknown_symbol() {
    assert_eq!(
        Err(TemplateError::UnknownSymbol {
            symbol: 'x',
            layer: 1,
            row: 0,
            column: 2,
        }),
        Template::parse(&[&[" @ "], &["CCx"]])
    );
}

#[test]
fn test_origin_count() {
    assert_eq!(
        Err(TemplateError::MissingOrigin { found: 0 }),
        Template::parse(&[&["CCC"]])
    );
    assert_eq!(
        Err(TemplateError::MissingOrigin { found: 2 }),
        Template::parse(&[&["@C@"]])
    );
}

#[test]
fn test_failed_load_removes_tier() {
    let mut registry = TemplateRegistry::builtin();
    assert!(registry.load(Tier::II, &[&["CCC"]]).is_err());
    assert!(registry.get(Tier::II).is_none());
    assert!(registry.modules(Tier::II).is_empty());
    assert_eq!(
        vec![Tier::IV, Tier::III, Tier::I],
        registry.descending().map(|(tier, _)| tier).collect::<Vec<_>>()
    );
}

#[test]
fn test_reach() {
    let reach = TemplateRegistry::builtin().reach();
    assert_eq!(IVec3::new(-5, -AUXILIARY_DEPTH, -5), reach.min);
    assert_eq!(IVec3::new(5, 8, 5), reach.max);

    let anchor = BlockPosition::new(10, 64, -3);
    assert!(reach.contains(anchor, BlockPosition::new(15, 60, 2)));
    assert!(!reach.contains(anchor, BlockPosition::new(16, 64, -3)));
    assert!(!reach.contains(anchor, BlockPosition::new(10, 59, -3)));
}
