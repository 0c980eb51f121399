//! Annotation blocks and their geometry
//!
//! Selections are 1-indexed and inclusive. For distances each cell is treated
//! as a unit square, so the blocks `A1:A1` and `B1:B1` touch.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::provider::PropertyType;
use crate::sheet::{range_label, Coordinate};

/// What a block contributes to the generated template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "dependentVar")]
    DependentVar,
    #[serde(rename = "mainSubject")]
    MainSubject,
    #[serde(rename = "qualifier")]
    Qualifier,
    #[serde(rename = "property")]
    Property,
    #[serde(rename = "unit")]
    Unit,
    #[serde(rename = "metadata")]
    Metadata,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::DependentVar => "dependentVar",
            Role::MainSubject => "mainSubject",
            Role::Qualifier => "qualifier",
            Role::Property => "property",
            Role::Unit => "unit",
            Role::Metadata => "metadata",
        }
    }

    /// Roles that must declare a value type
    pub fn requires_type(&self) -> bool {
        matches!(self, Role::DependentVar | Role::Qualifier)
    }

    /// Roles whose blocks annotate other blocks
    pub fn is_candidate(&self) -> bool {
        matches!(self, Role::Property | Role::Unit | Role::MainSubject)
    }

    /// Roles whose blocks receive annotations
    pub fn is_target(&self) -> bool {
        matches!(self, Role::DependentVar | Role::Qualifier)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "dependentVar" => Role::DependentVar,
            "mainSubject" => Role::MainSubject,
            "qualifier" => Role::Qualifier,
            "property" => Role::Property,
            "unit" => Role::Unit,
            "metadata" => Role::Metadata,
            _ => return Err(s.to_string()),
        })
    }
}

/// 1-indexed inclusive rectangle, as drawn by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

/// How two blocks line up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Identical row span
    Row,
    /// Identical column span
    Column,
    /// Neither span matches exactly
    Misaligned,
}

impl Rect {
    pub fn new(x1: usize, y1: usize, x2: usize, y2: usize) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Corners swapped into `x1 <= x2`, `y1 <= y2`
    pub fn normalize(&self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    pub fn width(&self) -> usize {
        self.x2 - self.x1 + 1
    }

    pub fn height(&self) -> usize {
        self.y2 - self.y1 + 1
    }

    pub fn is_single_cell(&self) -> bool {
        self.x1 == self.x2 && self.y1 == self.y2
    }

    pub fn top_left(&self) -> Coordinate {
        Coordinate::new(self.x1, self.y1)
    }

    /// `A1:C9` label (`A1` for a single cell)
    pub fn label(&self) -> String {
        if self.is_single_cell() {
            self.top_left().label()
        } else {
            range_label(self.top_left(), Coordinate::new(self.x2, self.y2))
        }
    }

    /// Whether the rectangles share at least one cell
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x1 <= other.x2 && other.x1 <= self.x2 && self.y1 <= other.y2 && other.y1 <= self.y2
    }

    /// Distance between the nearest edges; 0 when touching or intersecting
    ///
    /// Diagonal separation uses the Euclidean distance between the nearest corners.
    pub fn gap_distance(&self, other: &Rect) -> f64 {
        // Cell n spans [n - 1, n] on its axis
        let gap = |a1: usize, a2: usize, b1: usize, b2: usize| -> f64 {
            let (a_lo, a_hi) = (a1 as f64 - 1.0, a2 as f64);
            let (b_lo, b_hi) = (b1 as f64 - 1.0, b2 as f64);
            (b_lo - a_hi).max(a_lo - b_hi).max(0.0)
        };
        let dx = gap(self.x1, self.x2, other.x1, other.x2);
        let dy = gap(self.y1, self.y2, other.y1, other.y2);
        if dx > 0.0 && dy > 0.0 {
            dx.hypot(dy)
        } else {
            dx + dy
        }
    }

    /// Exact-span alignment test
    pub fn alignment(&self, other: &Rect) -> Alignment {
        // TODO: partial alignment (overlapping but unequal spans) is not scored
        if self.y1 == other.y1 && self.y2 == other.y2 {
            Alignment::Row
        } else if self.x1 == other.x1 && self.x2 == other.x2 {
            Alignment::Column
        } else {
            Alignment::Misaligned
        }
    }
}

/// Selection as stored in documents; coordinates may arrive unordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl Selection {
    pub fn to_rect(&self) -> Result<Rect, String> {
        for (name, v) in [("x1", self.x1), ("y1", self.y1), ("x2", self.x2), ("y2", self.y2)] {
            if v < 1 {
                return Err(format!("{} must be at least 1, got {}", name, v));
            }
        }
        Ok(Rect::new(self.x1 as usize, self.y1 as usize, self.x2 as usize, self.y2 as usize).normalize())
    }
}

impl From<Rect> for Selection {
    fn from(rect: Rect) -> Self {
        Self {
            x1: rect.x1 as i64,
            y1: rect.y1 as i64,
            x2: rect.x2 as i64,
            y2: rect.y2 as i64,
        }
    }
}

/// One block as it appears in an annotation document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
    /// Older documents carry a list; its first entry is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selections: Option<Vec<Selection>>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userlink: Option<String>,
    /// Derived: the target this block was assigned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Derived: role -> id of the block assigned to this one
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub links: IndexMap<String, String>,
    /// Everything else, passed through to the generated template
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

/// A validated block
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: String,
    pub role: Role,
    pub rect: Rect,
    pub value_type: Option<PropertyType>,
    pub property: Option<String>,
    pub title: Option<String>,
    pub changed: Option<serde_json::Value>,
    pub userlink: Option<String>,
    /// Candidate side of a link: the target id
    pub link: Option<String>,
    /// Target side of a link: role -> candidate id
    pub matches: IndexMap<Role, String>,
    pub extra: IndexMap<String, serde_json::Value>,
}

impl Block {
    /// Whether a value for `role` is baked into the block itself
    pub fn has_constant(&self, role: Role) -> bool {
        match role {
            Role::Property => self.property.is_some(),
            Role::Unit => self.extra.contains_key("unit"),
            Role::MainSubject => self.extra.contains_key("subject"),
            _ => false,
        }
    }

    pub fn is_quantity(&self) -> bool {
        self.value_type == Some(PropertyType::Quantity)
    }

    /// Document form, including the derived `link`/`links` fields
    pub fn to_document(&self) -> BlockDocument {
        BlockDocument {
            id: Some(self.id.clone()),
            role: Some(self.role.name().to_string()),
            selection: Some(self.rect.into()),
            selections: None,
            value_type: self.value_type.map(|t| t.name().to_string()),
            property: self.property.clone(),
            title: self.title.clone(),
            changed: self.changed.clone(),
            userlink: self.userlink.clone(),
            link: self.link.clone(),
            links: self
                .matches
                .iter()
                .map(|(role, id)| (role.name().to_string(), id.clone()))
                .collect(),
            extra: self.extra.clone(),
        }
    }
}
