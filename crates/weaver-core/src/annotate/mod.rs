//! Document annotation
//!
//! Plans insert-only edits (relationship markers and keyword links) and
//! applies them to documents with a byte-exact backup and an atomic replace.

pub mod backup;
mod plan;
mod rewriter;

pub use backup::{backup_path, restore_backup};
pub use plan::{AnnotationPlan, Edit};
pub use rewriter::{Annotator, ApplyOutcome, apply_edits};
