// Master-data dimensions and records
//
// A dimension is one of the four fixed lookup categories a card references.
// Master rows are created lazily the first time a label is submitted, and
// are never deleted as part of card lifecycle.

use serde::{Deserialize, Serialize};

// ============================================================================
// DIMENSION
// ============================================================================

/// The four lookup dimensions backing a business card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Category,
    Region,
    Organization,
    Representative,
}

impl Dimension {
    /// All dimensions, in the order the card schema references them.
    pub const ALL: [Dimension; 4] = [
        Dimension::Category,
        Dimension::Region,
        Dimension::Organization,
        Dimension::Representative,
    ];

    /// Backing table name for this dimension.
    pub fn table(&self) -> &'static str {
        match self {
            Dimension::Category => "category",
            Dimension::Region => "region",
            Dimension::Organization => "organization",
            Dimension::Representative => "representative",
        }
    }

    /// Form-field name for this dimension (also used in API payloads).
    pub fn field(&self) -> &'static str {
        self.table()
    }

    pub fn from_str(s: &str) -> Option<Dimension> {
        match s {
            "category" => Some(Dimension::Category),
            "region" => Some(Dimension::Region),
            "organization" => Some(Dimension::Organization),
            "representative" => Some(Dimension::Representative),
            _ => None,
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

// ============================================================================
// MASTER RECORD
// ============================================================================

/// One row of a master table: a stable identifier plus its unique label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub id: i64,
    pub name: String,
}
