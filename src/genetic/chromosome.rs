//! Chromosome and gene data model
//!
//! A chromosome is a rooted tree of genes with a binary activation state on
//! its leaves. The tree topology is fixed for the lifetime of a chromosome;
//! only leaf values and the two per-chromosome scalars (quality, fitness)
//! change. Genes own their children; up-traversal, where needed, is done
//! with lookups built at construction time rather than parent pointers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of targeting attribute types a leaf gene can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetingKind {
    Behaviors,
    Interests,
    LifeEvents,
    FamilyStatuses,
    Industries,
}

impl TargetingKind {
    /// Every kind, in the order the platform lists them.
    pub const ALL: [TargetingKind; 5] = [
        TargetingKind::Behaviors,
        TargetingKind::Interests,
        TargetingKind::LifeEvents,
        TargetingKind::FamilyStatuses,
        TargetingKind::Industries,
    ];

    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetingKind::Behaviors => "behaviors",
            TargetingKind::Interests => "interests",
            TargetingKind::LifeEvents => "life_events",
            TargetingKind::FamilyStatuses => "family_statuses",
            TargetingKind::Industries => "industries",
        }
    }
}

impl fmt::Display for TargetingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetingKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "behaviors" => Ok(TargetingKind::Behaviors),
            "interests" => Ok(TargetingKind::Interests),
            "life_events" => Ok(TargetingKind::LifeEvents),
            "family_statuses" => Ok(TargetingKind::FamilyStatuses),
            "industries" => Ok(TargetingKind::Industries),
            _ => Err(()),
        }
    }
}

/// A node in the targeting tree.
///
/// Interior (category) nodes have an empty `id` and no `kind`; leaves have a
/// non-empty `id`, a `kind` from the closed set, and a binary `value`
/// (0 = inactive, 1 = active).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gene {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TargetingKind>,
    #[serde(default)]
    pub value: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Gene>,
}

impl Gene {
    /// A leaf carries a non-empty id; category nodes never do.
    pub fn is_leaf(&self) -> bool {
        !self.id.is_empty()
    }

    /// Whether this leaf is currently part of the expressed targeting.
    pub fn is_active(&self) -> bool {
        self.value == 1
    }

    /// Flip the binary activation state.
    pub fn flip(&mut self) {
        self.value ^= 1;
    }
}

/// A candidate targeting configuration: a gene tree plus the scalars the
/// genetic algorithm tracks for it.
///
/// `id` is the id of the remote ad-set this chromosome currently backs; it is
/// empty until the orchestrator binds the chromosome to a created ad-set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chromosome {
    #[serde(default)]
    pub id: String,
    pub root: Gene,
    #[serde(default)]
    pub fitness: f64,
    #[serde(default)]
    pub quality: f64,
}

impl Chromosome {
    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        fn count(gene: &Gene) -> usize {
            let own = usize::from(gene.is_leaf());
            own + gene.children.iter().map(count).sum::<usize>()
        }
        count(&self.root)
    }
}
