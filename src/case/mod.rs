//! Case creation support
//!
//! The guided, prompt-driven flow that assembles a Case record, and the
//! rendering of Case metadata for callers choosing values themselves.

pub mod flow;
pub mod metadata;

pub use flow::{CaseDraft, CaseFlow};
pub use metadata::render_case_metadata;
