// Cardbox - Business-Card Register
// Exposes all modules for use in the CLI, the API server, and tests

pub mod auth;
pub mod composer;
pub mod entities;
pub mod error;
pub mod resolver;
pub mod search;
pub mod storage;
pub mod store;
pub mod transfer;

// Re-export commonly used types
pub use auth::{current_session, sign_in, sign_out, sign_up};
pub use composer::{delete, submit, validate_form};
pub use entities::{CardForm, CardRow, Dimension, MasterRecord};
pub use error::{AuthError, CardError, FieldError};
pub use resolver::resolve;
pub use search::{filter_cards, SearchField};
pub use storage::{attach, view_url, FsObjectStore, ObjectStore, UploadFile};
pub use store::{
    setup_database, AuthStore, CardStore, CardWrite, SessionRecord, SqliteStore, StoreError,
    UserRecord,
};
pub use transfer::{export_csv, import_csv, ImportSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
