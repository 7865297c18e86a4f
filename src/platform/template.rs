//! # Targeting template and chromosome construction
//!
//! ## Responsibility
//! Parse the targeting-tree template file into a prototype gene tree, stamp
//! fresh chromosomes from it, and build a chromosome for an existing remote
//! ad-set by overlaying that ad-set's current targeting onto a fresh clone.
//!
//! ## Guarantees
//! - The template is parsed and validated once; stamping a chromosome is a
//!   pure clone with no I/O
//! - Leaf activation is addressed by child-index paths recorded at parse
//!   time, so clones never share nodes with the prototype
//! - Overlaying ids that the template does not know is a no-op, never an
//!   error
//!
//! ## NOT Responsible For
//! - Mutating or scoring chromosomes (see `genetic`)
//! - Creating remote objects (see `platform::campaign`)

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::genetic::{Chromosome, Gene, TargetingKind};
use crate::platform::client::{ClientError, GraphClient};

/// Errors raised while parsing the template or constructing a chromosome.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template file could not be read.
    #[error("unable to read targeting template {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The template file was not the expected JSON shape.
    #[error("unable to decode targeting template: {0}")]
    Decode(#[from] serde_json::Error),

    /// The template carried no records at all.
    #[error("targeting template has no records")]
    Empty,

    /// A record names an ancestor no earlier record declared.
    #[error("template record {name:?} references unknown ancestor {ancestor:?}")]
    UnknownAncestor {
        /// Offending record name.
        name: String,
        /// The ancestor it asked for.
        ancestor: String,
    },

    /// A leaf record carries a targeting type outside the closed set.
    #[error("template leaf {id} carries unknown targeting type {kind:?}")]
    UnknownKind {
        /// Offending leaf id.
        id: String,
        /// The type tag received.
        kind: String,
    },

    /// Fetching the remote ad-set's targeting failed.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// One flat record of the template file.
#[derive(Debug, Default, Deserialize)]
struct TemplateRecord {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    path: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    data: Vec<TemplateRecord>,
}

/// The parsed targeting tree: a prototype every chromosome is cloned from,
/// plus the leaf-id lookup used to activate leaves on a clone.
///
/// Record 0 of the file is the synthetic root. Records with an empty `path`
/// attach to the root and become addressable as ancestors by name; they are
/// never indexed for activation. Records with a non-empty `path` hang off
/// the node named by their terminal path entry: an empty `id` makes an
/// interior node (addressable as an ancestor), a non-empty `id` makes a
/// leaf indexed for activation.
#[derive(Debug, Clone)]
pub struct TargetingTemplate {
    prototype: Gene,
    // Leaf id -> child-index path from the root. Index paths stay valid on
    // every clone of the prototype, unlike node references.
    leaves: HashMap<String, Vec<usize>>,
}

impl TargetingTemplate {
    /// Read and parse the template file at `path`.
    ///
    /// # Errors
    ///
    /// [`TemplateError::Io`] when the file cannot be read, otherwise the
    /// same surface as [`TargetingTemplate::from_json`].
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TemplateError::Io {
                path: path.display().to_string(),
                source,
            })?;

        Self::from_json(&raw)
    }

    /// Parse a template from its JSON text.
    ///
    /// # Errors
    ///
    /// - [`TemplateError::Decode`] on malformed JSON
    /// - [`TemplateError::Empty`] when `data` has no records
    /// - [`TemplateError::UnknownAncestor`] when a record's terminal path
    ///   name was never declared
    /// - [`TemplateError::UnknownKind`] when a leaf's type tag is outside
    ///   the closed set
    pub fn from_json(raw: &str) -> Result<Self, TemplateError> {
        let file: TemplateFile = serde_json::from_str(raw)?;
        Self::from_records(file.data)
    }

    fn from_records(records: Vec<TemplateRecord>) -> Result<Self, TemplateError> {
        let mut records = records.into_iter();
        let root_record = records.next().ok_or(TemplateError::Empty)?;

        let mut prototype = Gene {
            name: root_record.name,
            ..Gene::default()
        };
        let mut leaves: HashMap<String, Vec<usize>> = HashMap::new();
        // Interior-node name -> child-index path, for ancestor resolution.
        let mut ancestors: HashMap<String, Vec<usize>> = HashMap::new();
        ancestors.insert(prototype.name.clone(), Vec::new());

        for record in records {
            let kind = if record.id.is_empty() {
                None
            } else {
                Some(record.kind.parse::<TargetingKind>().map_err(|_| {
                    TemplateError::UnknownKind {
                        id: record.id.clone(),
                        kind: record.kind.clone(),
                    }
                })?)
            };

            match record.path.last() {
                // An empty path attaches to the root and registers the node
                // as an ancestor by name. Such records are never indexed for
                // activation, whether or not they carry an id.
                None => {
                    prototype.children.push(Gene {
                        id: record.id,
                        name: record.name.clone(),
                        kind,
                        ..Gene::default()
                    });
                    ancestors.insert(record.name, vec![prototype.children.len() - 1]);
                }
                Some(ancestor) => {
                    let parent_path = ancestors
                        .get(ancestor)
                        .cloned()
                        .ok_or_else(|| TemplateError::UnknownAncestor {
                            name: record.name.clone(),
                            ancestor: ancestor.clone(),
                        })?;

                    let parent = node_at_mut(&mut prototype, &parent_path);
                    parent.children.push(Gene {
                        id: record.id.clone(),
                        name: record.name.clone(),
                        kind,
                        ..Gene::default()
                    });

                    let mut child_path = parent_path;
                    child_path.push(parent.children.len() - 1);
                    if record.id.is_empty() {
                        ancestors.insert(record.name, child_path);
                    } else {
                        leaves.insert(record.id, child_path);
                    }
                }
            }
        }

        Ok(Self { prototype, leaves })
    }

    /// Stamp a fresh, fully inactive chromosome from the prototype.
    pub fn chromosome(&self) -> Chromosome {
        Chromosome {
            root: self.prototype.clone(),
            ..Chromosome::default()
        }
    }

    /// Activate the leaf with `leaf_id` on a chromosome stamped from this
    /// template. Unknown ids, or a chromosome whose tree does not match the
    /// template shape, leave the chromosome untouched.
    ///
    /// Returns whether a leaf was activated.
    pub fn activate(&self, chromosome: &mut Chromosome, leaf_id: &str) -> bool {
        let Some(path) = self.leaves.get(leaf_id) else {
            return false;
        };

        let mut node = &mut chromosome.root;
        for &index in path {
            match node.children.get_mut(index) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.value = 1;
        true
    }

    /// Number of activation-indexed leaves the template declares. Root-level
    /// records are not counted; they are never activation targets.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }
}

/// Navigate a child-index path. Paths come from template construction and
/// are in bounds by construction.
fn node_at_mut<'a>(root: &'a mut Gene, path: &[usize]) -> &'a mut Gene {
    let mut node = root;
    for &index in path {
        node = &mut node.children[index];
    }
    node
}

#[derive(Debug, Default, Deserialize)]
struct TargetingResponse {
    #[serde(default)]
    targeting: Option<AdSetTargeting>,
}

/// The five typed id arrays of a remote ad-set's current targeting.
#[derive(Debug, Default, Deserialize)]
struct AdSetTargeting {
    #[serde(default)]
    behaviors: Vec<TargetingRef>,
    #[serde(default)]
    interests: Vec<TargetingRef>,
    #[serde(default)]
    life_events: Vec<TargetingRef>,
    #[serde(default)]
    family_statuses: Vec<TargetingRef>,
    #[serde(default)]
    industries: Vec<TargetingRef>,
}

#[derive(Debug, Default, Deserialize)]
struct TargetingRef {
    #[serde(default)]
    id: String,
}

/// Builds chromosomes for existing remote ad-sets.
pub struct ChromosomeBuilder {
    client: GraphClient,
    template: Arc<TargetingTemplate>,
}

impl ChromosomeBuilder {
    /// Create a builder over a parsed template.
    pub fn new(client: GraphClient, template: Arc<TargetingTemplate>) -> Self {
        Self { client, template }
    }

    /// Build a chromosome reflecting the current targeting of `ad_set_id`.
    ///
    /// Fetches the ad-set's targeting, clones the template tree, activates
    /// every known leaf id found in the five typed arrays, and binds the
    /// chromosome to the ad-set. Ids the template does not know are skipped.
    ///
    /// # Errors
    ///
    /// [`TemplateError::Client`] when the targeting fetch fails.
    pub async fn generate_chromosome(
        &self,
        ad_set_id: &str,
        access_token: &str,
    ) -> Result<Chromosome, TemplateError> {
        let mut chromosome = self.template.chromosome();
        chromosome.id = ad_set_id.to_string();

        let response: TargetingResponse = self
            .client
            .get(
                ad_set_id,
                &[("access_token", access_token), ("fields", "targeting")],
            )
            .await?;
        let targeting = response.targeting.unwrap_or_default();

        for group in [
            &targeting.behaviors,
            &targeting.interests,
            &targeting.life_events,
            &targeting.family_statuses,
            &targeting.industries,
        ] {
            for entry in group {
                self.template.activate(&mut chromosome, &entry.id);
            }
        }

        Ok(chromosome)
    }
}
