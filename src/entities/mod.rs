// Entity models for the card register
//
// Master data (category, region, organization, representative) backs a
// business card via foreign key; cards carry the scalar contact fields.

pub mod card;
pub mod master;

pub use card::{CardForm, CardRow};
pub use master::{Dimension, MasterRecord};
