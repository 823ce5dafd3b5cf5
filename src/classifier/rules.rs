//! Ordered rule table and the `classify` entry point.
//!
//! Each taxonomy category owns a small set of regex patterns, compiled once
//! via `LazyLock`. Rules are checked in the order of `ErrorCategory`
//! priority; within a rule, component sub-errors are scanned before the
//! envelope message because they carry the more specific text. Adding a
//! category is one new entry in `build_rules`, not a new branch chain.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::types::{ErrorAnalysis, ErrorCategory, Severity};
use crate::collaborators::ComponentError;

struct Pattern {
    regex: Regex,
    /// Key under which the first capture group is recorded, if the pattern
    /// captures anything
    capture_key: Option<&'static str>,
}

impl Pattern {
    fn new(pattern: &str, capture_key: Option<&'static str>) -> Self {
        Self {
            // Patterns are static literals; a failure here is a programming
            // error caught by the rule-table tests.
            regex: Regex::new(pattern).unwrap(),
            capture_key,
        }
    }
}

struct Rule {
    category: ErrorCategory,
    patterns: Vec<Pattern>,
}

impl Rule {
    /// Match this rule against one text source, returning extracted
    /// identifiers on the first pattern hit.
    fn try_match(&self, text: &str) -> Option<BTreeMap<String, String>> {
        for pattern in &self.patterns {
            if let Some(caps) = pattern.regex.captures(text) {
                let mut identifiers = BTreeMap::new();
                if let Some(key) = pattern.capture_key
                    && let Some(value) = caps.get(1)
                    && !value.as_str().trim().is_empty()
                {
                    identifiers.insert(key.to_string(), value.as_str().trim().to_string());
                }
                return Some(identifiers);
            }
        }
        None
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(build_rules);

fn build_rules() -> Vec<Rule> {
    vec![
        Rule {
            category: ErrorCategory::TypeValidation,
            patterns: vec![
                Pattern::new(
                    r#"(?i)expected\s+(?:an?\s+)?(number|integer|text|string|boolean|date|datetime|currency)\b"#,
                    Some("expected_type"),
                ),
                Pattern::new(
                    r#"(?i)invalid (?:value|data type) for (?:field\s+)?"?([\w.]+)"?"#,
                    Some("field"),
                ),
                Pattern::new(
                    r#"(?i)cannot be (?:converted|assigned) to (?:type )?"?(\w+)"?"#,
                    Some("expected_type"),
                ),
            ],
        },
        Rule {
            category: ErrorCategory::InvalidReference,
            patterns: vec![
                Pattern::new(r#"(?i)invalid reference to "([^"]+)""#, Some("reference")),
                Pattern::new(
                    r#"(?i)reference[sd]? "?([\w.]+)"?,? which (?:does not|doesn't) exist"#,
                    Some("reference"),
                ),
                Pattern::new(r#"(?i)unknown element "?([\w.]+)"?"#, Some("reference")),
                Pattern::new(
                    r#"(?i)"([\w.]+)" is not a valid (?:reference|merge field)"#,
                    Some("reference"),
                ),
            ],
        },
        Rule {
            category: ErrorCategory::InvalidExpression,
            patterns: vec![
                Pattern::new(
                    r#"(?i)(?:formula|expression) "?([^"]+)"? is (?:malformed|invalid)"#,
                    Some("expression"),
                ),
                Pattern::new(r#"(?i)invalid (?:formula|expression)"#, None),
                Pattern::new(r#"(?i)syntax error in (?:formula|expression)"#, None),
                Pattern::new(
                    r#"(?i)(?:formula|expression) could not be parsed"#,
                    None,
                ),
            ],
        },
        Rule {
            category: ErrorCategory::CollectionMisuse,
            patterns: vec![
                Pattern::new(
                    r#"(?i)collection variable "?([\w.]+)"? (?:was|is) used where a single"#,
                    Some("variable"),
                ),
                Pattern::new(r#"(?i)multi-?valued .* single-?valued"#, None),
                Pattern::new(r#"(?i)cannot use a collection"#, None),
            ],
        },
        Rule {
            category: ErrorCategory::NamingConvention,
            patterns: vec![
                Pattern::new(
                    r#"(?i)(?:name|identifier) "?([\w -]+?)"? must (?:begin|start) with a letter"#,
                    Some("identifier"),
                ),
                Pattern::new(r#"(?i)contains? invalid characters"#, None),
                Pattern::new(r#"(?i)must be alphanumeric"#, None),
                Pattern::new(r#"(?i)(?:name|identifier) cannot contain spaces"#, None),
            ],
        },
        Rule {
            category: ErrorCategory::DuplicateElement,
            patterns: vec![
                Pattern::new(
                    r#"(?i)duplicate (?:element|name|identifier|value)(?:\s+"?([\w.]+)"?)?"#,
                    Some("element"),
                ),
                Pattern::new(r#"(?i)"?([\w.]+)"? already exists"#, Some("element")),
                Pattern::new(r#"(?i)is not unique"#, None),
            ],
        },
        Rule {
            category: ErrorCategory::StructuralSyntax,
            patterns: vec![
                Pattern::new(r#"(?i)unexpected end of (?:file|input|document)"#, None),
                Pattern::new(r#"(?i)unbalanced|missing closing"#, None),
                Pattern::new(r#"(?i)malformed (?:xml|json|document|structure)"#, None),
                Pattern::new(r#"(?i)premature end"#, None),
            ],
        },
    ]
}

/// Classify a deployment error into the taxonomy.
///
/// Pure and total: identical input always yields identical output, and some
/// category is always returned (`General` when nothing matches).
pub fn classify(message: &str, component_errors: &[ComponentError]) -> ErrorAnalysis {
    let raw_message = combine_raw(message, component_errors);

    for rule in RULES.iter() {
        for ce in component_errors {
            if let Some(mut identifiers) = rule.try_match(&ce.problem) {
                identifiers.insert("component_name".to_string(), ce.component_name.clone());
                identifiers.insert("component_type".to_string(), ce.component_type.clone());
                return build_analysis(rule.category, identifiers, raw_message);
            }
        }
        if let Some(identifiers) = rule.try_match(message) {
            return build_analysis(rule.category, identifiers, raw_message);
        }
    }

    build_analysis(ErrorCategory::General, BTreeMap::new(), raw_message)
}

fn combine_raw(message: &str, component_errors: &[ComponentError]) -> String {
    let mut raw = message.trim().to_string();
    for ce in component_errors {
        if !raw.is_empty() {
            raw.push('\n');
        }
        raw.push_str(&format!(
            "{} ({}): {}",
            ce.component_name, ce.component_type, ce.problem
        ));
    }
    raw
}

fn build_analysis(
    category: ErrorCategory,
    identifiers: BTreeMap<String, String>,
    raw_message: String,
) -> ErrorAnalysis {
    ErrorAnalysis {
        category,
        severity: severity_for(category),
        remediation_directives: directives_for(category, &identifiers),
        extracted_identifiers: identifiers,
        raw_message,
    }
}

fn severity_for(category: ErrorCategory) -> Severity {
    match category {
        ErrorCategory::StructuralSyntax => Severity::Critical,
        ErrorCategory::NamingConvention => Severity::Warning,
        _ => Severity::Error,
    }
}

/// Concrete remediation directives per category: imperative sentences, most
/// targeted first when an identifier was extracted.
fn directives_for(category: ErrorCategory, identifiers: &BTreeMap<String, String>) -> Vec<String> {
    let mut directives: Vec<String> = Vec::new();

    match category {
        ErrorCategory::TypeValidation => {
            if let Some(expected) = identifiers.get("expected_type") {
                directives.push(format!(
                    "Convert the rejected value to {} explicitly before assigning it.",
                    expected
                ));
            }
            directives.extend([
                "Check the declared data type of every variable and field the artifact assigns to.".to_string(),
                "Use an explicit conversion element instead of relying on implicit coercion.".to_string(),
                "Verify picklist and boolean slots receive one of their allowed literal values.".to_string(),
                "Align each input assignment's type with the target field's definition.".to_string(),
            ]);
        }
        ErrorCategory::InvalidReference => {
            if let Some(reference) = identifiers.get("reference") {
                if let Some((base, suffix)) = reference.rsplit_once('.') {
                    directives.push(format!(
                        "Remove the \".{}\" suffix from \"{}\" and reference \"{}\" directly; \"{}\" has no derived property named \"{}\".",
                        suffix, reference, base, base, suffix
                    ));
                } else {
                    directives.push(format!(
                        "Define \"{}\" before referencing it, or delete the reference.",
                        reference
                    ));
                }
            }
            directives.extend([
                "Reference only elements that are defined earlier in the artifact.".to_string(),
                "Check the spelling and capitalization of every reference against the element's API name.".to_string(),
                "Qualify references with the owning element's API name, not its display label.".to_string(),
                "Delete references to elements that were removed in a previous attempt.".to_string(),
            ]);
        }
        ErrorCategory::InvalidExpression => {
            directives.extend([
                "Rebuild the formula using only operators and functions the platform supports.".to_string(),
                "Balance every parenthesis and quote inside the expression.".to_string(),
                "Replace references to undefined variables inside the formula with defined ones.".to_string(),
                "Split complex expressions into intermediate assignments so each step validates on its own.".to_string(),
            ]);
        }
        ErrorCategory::CollectionMisuse => {
            if let Some(variable) = identifiers.get("variable") {
                directives.push(format!(
                    "Iterate \"{}\" with a loop element instead of assigning the whole collection to a single-value slot.",
                    variable
                ));
            }
            directives.extend([
                "Assign a single record variable where the slot expects one value.".to_string(),
                "Mark the target variable as a collection if it must hold multiple values.".to_string(),
                "Check every assignment for a collection on the right-hand side of a single-value slot.".to_string(),
            ]);
        }
        ErrorCategory::NamingConvention => {
            directives.extend([
                "Rename the identifier to start with a letter.".to_string(),
                "Use only letters, digits, and underscores in API names; keep free-form text in display labels.".to_string(),
                "Remove spaces and special characters from every element name.".to_string(),
                "Avoid consecutive or trailing underscores in API names.".to_string(),
            ]);
        }
        ErrorCategory::DuplicateElement => {
            if let Some(element) = identifiers.get("element") {
                directives.push(format!(
                    "Rename or remove one definition of \"{}\" so the name appears exactly once.",
                    element
                ));
            }
            directives.extend([
                "Make every element's API name unique within the artifact.".to_string(),
                "Search the artifact for repeated blocks introduced by a previous retry and delete them.".to_string(),
                "Do not re-create elements that already exist in the deployed artifact.".to_string(),
            ]);
        }
        ErrorCategory::StructuralSyntax => {
            directives.extend([
                "Regenerate the artifact body; its serialized structure is malformed.".to_string(),
                "Close every opened tag or block before the document ends.".to_string(),
                "Validate the serialized artifact against the platform schema before deploying.".to_string(),
                "Check for truncated output and raise the generation token limit if the artifact was cut off.".to_string(),
            ]);
        }
        ErrorCategory::General => {
            directives.extend([
                "Read the raw error message and locate the element it names.".to_string(),
                "Simplify the artifact to the smallest version that satisfies the tests, then add detail back incrementally.".to_string(),
                "Verify the deployment session is still valid and deploy again once.".to_string(),
                "Compare this attempt with the last successful attempt and revert unrelated changes.".to_string(),
            ]);
        }
    }

    directives
}
