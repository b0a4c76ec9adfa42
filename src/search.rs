// Search/filter over joined card rows
//
// Pure, case-insensitive substring matching; never re-fetches data. List
// screens fetch once with joins and narrow in memory.

use serde::{Deserialize, Serialize};

use crate::entities::CardRow;

/// Which field(s) a search term is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    All,
    Category,
    Region,
    Organization,
    Representative,
    Phone,
    Mobile,
    Email,
}

impl SearchField {
    pub fn from_str(s: &str) -> Option<SearchField> {
        match s {
            "all" => Some(SearchField::All),
            "category" => Some(SearchField::Category),
            "region" => Some(SearchField::Region),
            "organization" => Some(SearchField::Organization),
            "representative" => Some(SearchField::Representative),
            "phone" => Some(SearchField::Phone),
            "mobile" => Some(SearchField::Mobile),
            "email" => Some(SearchField::Email),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchField::All => "all",
            SearchField::Category => "category",
            SearchField::Region => "region",
            SearchField::Organization => "organization",
            SearchField::Representative => "representative",
            SearchField::Phone => "phone",
            SearchField::Mobile => "mobile",
            SearchField::Email => "email",
        }
    }
}

impl Default for SearchField {
    fn default() -> Self {
        SearchField::All
    }
}

/// Narrow `rows` to those matching `term` in the selected field.
/// An empty term (after trim) matches everything.
pub fn filter_cards(rows: &[CardRow], term: &str, field: SearchField) -> Vec<CardRow> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return rows.to_vec();
    }

    rows.iter()
        .filter(|row| matches_row(row, &term, field))
        .cloned()
        .collect()
}

fn matches_row(row: &CardRow, lowered_term: &str, field: SearchField) -> bool {
    let hit = |value: &str| value.to_lowercase().contains(lowered_term);

    match field {
        SearchField::All => {
            hit(&row.category)
                || hit(&row.region)
                || hit(&row.organization)
                || hit(&row.representative)
                || hit(&row.phone)
                || hit(&row.mobile)
                || hit(&row.email)
        }
        SearchField::Category => hit(&row.category),
        SearchField::Region => hit(&row.region),
        SearchField::Organization => hit(&row.organization),
        SearchField::Representative => hit(&row.representative),
        SearchField::Phone => hit(&row.phone),
        SearchField::Mobile => hit(&row.mobile),
        SearchField::Email => hit(&row.email),
    }
}

// ============================================================================
// TESTS
// ============================================================================
