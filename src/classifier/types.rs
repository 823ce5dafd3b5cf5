//! Taxonomy types for deployment error classification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed taxonomy of deployment error categories.
///
/// Variants are listed in match-priority order: when a message matches more
/// than one category's patterns, the earlier variant wins. `General` never
/// matches explicitly; it is the fallback when nothing else does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// A value was rejected against an expected primitive/type slot
    TypeValidation,
    /// A named element is referenced but does not exist or is mis-qualified
    InvalidReference,
    /// A computed/formula expression is malformed or references invalid elements
    InvalidExpression,
    /// A multi-valued variable used where a single-valued slot is required
    CollectionMisuse,
    /// Identifiers violate platform naming rules
    NamingConvention,
    /// Two elements share an identity that must be unique
    DuplicateElement,
    /// The artifact's serialized form itself is malformed
    StructuralSyntax,
    /// None of the above matched
    General,
}

impl ErrorCategory {
    /// Kebab-case name used in rendered context and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::TypeValidation => "type-validation",
            ErrorCategory::InvalidReference => "invalid-reference",
            ErrorCategory::InvalidExpression => "invalid-expression",
            ErrorCategory::CollectionMisuse => "collection-misuse",
            ErrorCategory::NamingConvention => "naming-convention",
            ErrorCategory::DuplicateElement => "duplicate-element",
            ErrorCategory::StructuralSyntax => "structural-syntax",
            ErrorCategory::General => "general",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How severe a classified error is for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cosmetic or convention-level; the artifact is otherwise sound
    Warning,
    /// The artifact is wrong but its structure is intact
    Error,
    /// The serialized artifact itself is unusable
    Critical,
}

/// One classified error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub category: ErrorCategory,
    pub severity: Severity,
    /// Identifiers extracted by the matched pattern (BTreeMap so rendering
    /// is deterministic)
    pub extracted_identifiers: BTreeMap<String, String>,
    /// Ordered imperative remediation directives, most targeted first
    pub remediation_directives: Vec<String>,
    /// The combined raw error text the classification was made from
    pub raw_message: String,
}

impl ErrorAnalysis {
    /// The leading (most targeted) remediation directive.
    pub fn leading_directive(&self) -> Option<&str> {
        self.remediation_directives.first().map(String::as_str)
    }

    /// One-line summary for logs and memory rendering.
    pub fn summary(&self) -> String {
        match self.leading_directive() {
            Some(directive) => format!("{}: {}", self.category, directive),
            None => self.category.to_string(),
        }
    }
}
