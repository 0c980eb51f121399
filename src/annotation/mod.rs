//! Annotation documents: user-drawn blocks and the links between them
//!
//! An [`Annotation`] is loaded from a list of block documents, validated, and
//! then initialized once. Initialization applies user links, assigns property
//! and unit blocks to the data and qualifier blocks they describe, and links
//! the main subject to the data block. The derived `link`/`links` fields are
//! rewritten when the annotation is saved.

pub mod assign;
pub mod block;
pub mod error;

pub use assign::{alignment_cost, assign, hungarian, Assignment};
pub use block::{Alignment, Block, BlockDocument, Rect, Role, Selection};
pub use error::AnnotationError;

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GenerationConfig;
use crate::provider::PropertyType;

/// Result of [`Annotation::initialize`], as indices into the block list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Initialized {
    pub data: Option<usize>,
    pub subject: Option<usize>,
    pub qualifiers: Vec<usize>,
    /// Assignment ambiguities, attached as comments to generated output
    pub notes: Vec<String>,
}

/// A validated set of blocks
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    blocks: Vec<Block>,
    state: Option<Initialized>,
}

impl Annotation {
    /// Parse a JSON list of block documents
    pub fn from_json(text: &str) -> Result<Self, AnnotationError> {
        let documents: Vec<BlockDocument> =
            serde_json::from_str(text).map_err(|e| AnnotationError::Json(e.to_string()))?;
        Self::from_documents(documents)
    }

    /// Validate documents into blocks
    ///
    /// Missing ids get a fresh UUID, as does a block repeating an earlier id.
    /// User links pointing at unknown ids are dropped.
    pub fn from_documents(documents: Vec<BlockDocument>) -> Result<Self, AnnotationError> {
        let mut blocks = Vec::with_capacity(documents.len());
        let mut ids = HashSet::new();
        for (index, doc) in documents.into_iter().enumerate() {
            let mut block = validate_block(index, doc)?;
            if !ids.insert(block.id.clone()) {
                let fresh = Uuid::new_v4().to_string();
                warn!(index, id = %block.id, replacement = %fresh, "duplicate block id");
                block.id = fresh.clone();
                ids.insert(fresh);
            }
            blocks.push(block);
        }

        for (i, a) in blocks.iter().enumerate() {
            for b in &blocks[i + 1..] {
                if a.rect.overlaps(&b.rect) {
                    return Err(AnnotationError::Overlap {
                        first: a.id.clone(),
                        first_range: a.rect.label(),
                        second: b.id.clone(),
                        second_range: b.rect.label(),
                    });
                }
            }
        }

        for block in &mut blocks {
            if let Some(target) = &block.userlink {
                if !ids.contains(target) {
                    debug!(block = %block.id, userlink = %target, "dropping dangling user link");
                    block.userlink = None;
                }
            }
        }

        Ok(Self {
            blocks,
            state: None,
        })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn by_role(&self, role: Role) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(move |b| b.role == role)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Block linked to `target` for `role`
    pub fn linked(&self, target: &Block, role: Role) -> Option<&Block> {
        target.matches.get(&role).and_then(|id| self.block(id))
    }

    /// Link blocks; runs once, later calls return the first result
    pub fn initialize(&mut self, config: &GenerationConfig) -> &Initialized {
        if self.state.is_none() {
            let state = self.link_blocks(config);
            info!(
                blocks = self.blocks.len(),
                qualifiers = state.qualifiers.len(),
                notes = state.notes.len(),
                "annotation initialized"
            );
            self.state = Some(state);
        }
        self.state.get_or_insert_with(Initialized::default)
    }

    fn link_blocks(&mut self, config: &GenerationConfig) -> Initialized {
        for block in &mut self.blocks {
            block.link = None;
            block.matches.clear();
        }
        self.apply_user_links();

        let data = self.blocks.iter().position(|b| b.role == Role::DependentVar);
        let qualifiers: Vec<usize> = self
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.role == Role::Qualifier)
            .map(|(i, _)| i)
            .collect();
        let targets: Vec<usize> = data.into_iter().chain(qualifiers.iter().copied()).collect();

        let mut notes = Vec::new();
        for role in [Role::Property, Role::Unit] {
            let candidates: Vec<usize> = self
                .blocks
                .iter()
                .enumerate()
                .filter(|(_, b)| b.role == role && b.link.is_none())
                .map(|(i, _)| i)
                .collect();
            let open: Vec<usize> = targets
                .iter()
                .copied()
                .filter(|&t| {
                    let target = &self.blocks[t];
                    !target.matches.contains_key(&role)
                        && !target.has_constant(role)
                        && (role != Role::Unit || target.is_quantity())
                })
                .collect();

            let result = {
                let candidate_refs: Vec<&Block> = candidates.iter().map(|&i| &self.blocks[i]).collect();
                let target_refs: Vec<&Block> = open.iter().map(|&i| &self.blocks[i]).collect();
                assign(role.name(), &candidate_refs, &target_refs, config)
            };
            for (c, t) in result.pairs {
                self.connect(candidates[c], open[t]);
            }
            notes.extend(result.notes);
        }

        let subject = self.link_subject(data);
        Initialized {
            data,
            subject,
            qualifiers,
            notes,
        }
    }

    /// Honor `userlink` declared on either end of a link
    fn apply_user_links(&mut self) {
        let requests: Vec<(usize, String)> = self
            .blocks
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.userlink.clone().map(|target| (i, target)))
            .collect();
        for (from, to_id) in requests {
            let Some(to) = self.blocks.iter().position(|b| b.id == to_id) else {
                continue;
            };
            let (a, b) = (self.blocks[from].role, self.blocks[to].role);
            let (candidate, target) = if a.is_candidate() && b.is_target() {
                (from, to)
            } else if b.is_candidate() && a.is_target() {
                (to, from)
            } else {
                debug!(from = %self.blocks[from].id, to = %to_id, "user link between incompatible roles ignored");
                continue;
            };
            let role = self.blocks[candidate].role;
            if self.blocks[candidate].link.is_some() || self.blocks[target].matches.contains_key(&role) {
                debug!(from = %self.blocks[from].id, to = %to_id, "conflicting user link ignored");
                continue;
            }
            self.connect(candidate, target);
        }
    }

    fn link_subject(&mut self, data: Option<usize>) -> Option<usize> {
        let data = data?;
        if let Some(id) = self.blocks[data].matches.get(&Role::MainSubject) {
            return self.blocks.iter().position(|b| &b.id == id);
        }
        if self.blocks[data].has_constant(Role::MainSubject) {
            return None;
        }
        let subject = self
            .blocks
            .iter()
            .position(|b| b.role == Role::MainSubject && b.link.is_none())?;
        self.connect(subject, data);
        Some(subject)
    }

    fn connect(&mut self, candidate: usize, target: usize) {
        let role = self.blocks[candidate].role;
        let target_id = self.blocks[target].id.clone();
        let candidate_id = self.blocks[candidate].id.clone();
        debug!(role = %role, candidate = %candidate_id, target = %target_id, "linked blocks");
        self.blocks[candidate].link = Some(target_id);
        self.blocks[target].matches.insert(role, candidate_id);
    }

    pub fn data_block(&self) -> Option<&Block> {
        match &self.state {
            Some(state) => state.data.map(|i| &self.blocks[i]),
            None => self.by_role(Role::DependentVar).next(),
        }
    }

    pub fn subject_block(&self) -> Option<&Block> {
        self.state
            .as_ref()
            .and_then(|s| s.subject)
            .map(|i| &self.blocks[i])
    }

    pub fn qualifier_blocks(&self) -> Vec<&Block> {
        self.by_role(Role::Qualifier).collect()
    }

    /// Ambiguity notes from the last initialization
    pub fn notes(&self) -> &[String] {
        self.state.as_ref().map(|s| s.notes.as_slice()).unwrap_or(&[])
    }

    pub fn to_documents(&self) -> Vec<BlockDocument> {
        self.blocks.iter().map(Block::to_document).collect()
    }

    /// Initialize if needed and serialize to pretty JSON
    pub fn save(&mut self, config: &GenerationConfig) -> Result<String, AnnotationError> {
        self.initialize(config);
        serde_json::to_string_pretty(&self.to_documents()).map_err(|e| AnnotationError::Json(e.to_string()))
    }
}

fn validate_block(index: usize, doc: BlockDocument) -> Result<Block, AnnotationError> {
    let role_name = doc.role.ok_or(AnnotationError::MissingRole { index })?;
    let role: Role = role_name
        .parse()
        .map_err(|role| AnnotationError::InvalidRole { index, role })?;

    let value_type = match doc.value_type.as_deref() {
        Some(raw) => Some(
            raw.parse::<PropertyType>()
                .map_err(|e| AnnotationError::InvalidType {
                    index,
                    reason: e.to_string(),
                })?,
        ),
        None if role.requires_type() => {
            return Err(AnnotationError::MissingType {
                index,
                role: role.name().to_string(),
            })
        }
        None => None,
    };

    let selection = doc
        .selection
        .or_else(|| doc.selections.as_ref().and_then(|s| s.first().copied()))
        .ok_or(AnnotationError::MissingSelection { index })?;
    let rect = selection
        .to_rect()
        .map_err(|reason| AnnotationError::InvalidSelection { index, reason })?;

    Ok(Block {
        id: doc.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        role,
        rect,
        value_type,
        property: doc.property,
        title: doc.title,
        changed: doc.changed,
        userlink: doc.userlink,
        link: None,
        matches: IndexMap::new(),
        extra: doc.extra,
    })
}
