// Business-card records
//
// Two shapes of the same entity:
// - CardForm: what a form or API payload submits (labels + scalars)
// - CardRow:  a listing row already joined with its four master labels
// The write-side shape (resolved foreign keys + scalars) lives with the
// store as CardWrite.

use serde::{Deserialize, Serialize};

// ============================================================================
// SUBMITTED FORM
// ============================================================================

/// A submitted registration/edit form. Dimension fields are free-text labels,
/// not identifiers; the composer resolves them to master ids before writing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardForm {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub representative: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub fax: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub notes: String,
}

impl CardForm {
    /// Label for one of the four dimension fields.
    pub fn label(&self, dimension: crate::entities::Dimension) -> &str {
        use crate::entities::Dimension;
        match dimension {
            Dimension::Category => &self.category,
            Dimension::Region => &self.region,
            Dimension::Organization => &self.organization,
            Dimension::Representative => &self.representative,
        }
    }
}

// ============================================================================
// JOINED LISTING ROW
// ============================================================================

/// A denormalized listing row: the card joined with its four master labels.
/// This is what list screens fetch in bulk and what the search filter runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRow {
    pub id: i64,
    pub category: String,
    pub region: String,
    pub organization: String,
    pub representative: String,
    pub phone: String,
    pub mobile: String,
    pub fax: String,
    pub email: String,
    pub address: String,
    pub notes: String,
    pub image_ref: Option<String>,
}

impl CardRow {
    /// Rebuild the submitted-form shape from a joined row (edit path:
    /// forms are re-populated from the row being edited).
    pub fn to_form(&self) -> CardForm {
        CardForm {
            category: self.category.clone(),
            region: self.region.clone(),
            organization: self.organization.clone(),
            representative: self.representative.clone(),
            phone: self.phone.clone(),
            mobile: self.mobile.clone(),
            fax: self.fax.clone(),
            email: self.email.clone(),
            address: self.address.clone(),
            notes: self.notes.clone(),
        }
    }
}
