//! Deployment error classification.
//!
//! `classify` maps a raw platform error (envelope message plus per-component
//! sub-errors) onto a closed taxonomy, in priority order, first match wins.
//! The result bundles the category, a severity, extracted identifiers, and
//! an ordered list of concrete remediation directives that downstream
//! consumers fold into the next generation attempt.
//!
//! Classification is a pure function: identical input always yields
//! identical output, and every input yields some category (`general` is the
//! fallback).

mod rules;
mod types;

pub use rules::classify;
pub use types::{ErrorAnalysis, ErrorCategory, Severity};
