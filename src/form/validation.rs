use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use regex::Regex;

use super::controller::{FormError, FormResult};
use super::value::{FieldKey, FieldValue, FormValues};

pub type CustomPredicate = Rc<dyn Fn(&FormValues) -> bool>;

#[derive(Clone)]
pub enum RuleCheck {
    Required,
    Min(f64),
    Max(f64),
    MaxFileSize(u64),
    MinLength(usize),
    /// Fails when the bound is greater than the value's length.
    MaxLength(usize),
    Pattern(Regex),
    Custom(CustomPredicate),
}

impl Debug for RuleCheck {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required => f.write_str("Required"),
            Self::Min(value) => f.debug_tuple("Min").field(value).finish(),
            Self::Max(value) => f.debug_tuple("Max").field(value).finish(),
            Self::MaxFileSize(value) => f.debug_tuple("MaxFileSize").field(value).finish(),
            Self::MinLength(value) => f.debug_tuple("MinLength").field(value).finish(),
            Self::MaxLength(value) => f.debug_tuple("MaxLength").field(value).finish(),
            Self::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ValidationRule {
    pub check: RuleCheck,
    pub error: String,
}

impl ValidationRule {
    pub fn new(check: RuleCheck, error: impl Into<String>) -> Self {
        Self {
            check,
            error: error.into(),
        }
    }

    pub fn required(error: impl Into<String>) -> Self {
        Self::new(RuleCheck::Required, error)
    }

    pub fn min(threshold: f64, error: impl Into<String>) -> Self {
        Self::new(RuleCheck::Min(threshold), error)
    }

    pub fn max(threshold: f64, error: impl Into<String>) -> Self {
        Self::new(RuleCheck::Max(threshold), error)
    }

    pub fn max_file_size(bytes: u64, error: impl Into<String>) -> Self {
        Self::new(RuleCheck::MaxFileSize(bytes), error)
    }

    pub fn min_length(length: usize, error: impl Into<String>) -> Self {
        Self::new(RuleCheck::MinLength(length), error)
    }

    pub fn max_length(length: usize, error: impl Into<String>) -> Self {
        Self::new(RuleCheck::MaxLength(length), error)
    }

    pub fn pattern(pattern: &str, error: impl Into<String>) -> FormResult<Self> {
        let regex = Regex::new(pattern).map_err(|source| FormError::InvalidPattern {
            pattern: pattern.to_owned(),
            reason: source.to_string(),
        })?;
        Ok(Self::new(RuleCheck::Pattern(regex), error))
    }

    pub fn regex(regex: Regex, error: impl Into<String>) -> Self {
        Self::new(RuleCheck::Pattern(regex), error)
    }

    pub fn custom(
        predicate: impl Fn(&FormValues) -> bool + 'static,
        error: impl Into<String>,
    ) -> Self {
        Self::new(RuleCheck::Custom(Rc::new(predicate)), error)
    }
}

/// Returns `true` when `value` fails `rule`.
pub fn evaluate(value: &FieldValue, rule: &ValidationRule, values: &FormValues) -> bool {
    match &rule.check {
        RuleCheck::Required => value.is_empty(),
        RuleCheck::Min(threshold) => *threshold > value.to_number(),
        RuleCheck::Max(threshold) => *threshold < value.to_number(),
        RuleCheck::MaxFileSize(bytes) => value
            .as_files()
            .is_some_and(|files| files.iter().any(|file| file.size() > *bytes)),
        RuleCheck::MinLength(length) | RuleCheck::MaxLength(length) => *length > value.length(),
        RuleCheck::Pattern(regex) => !regex.is_match(&value.display_string()),
        RuleCheck::Custom(predicate) => !predicate(values),
    }
}

/// Message of the first failing rule in declaration order, or `""`. Rules after the first
/// failure are not evaluated.
pub fn evaluate_field<'a>(
    value: &FieldValue,
    rules: &'a [ValidationRule],
    values: &FormValues,
) -> &'a str {
    rules
        .iter()
        .find(|rule| evaluate(value, rule, values))
        .map_or("", |rule| rule.error.as_str())
}

/// Evaluates every field that declares at least one rule.
pub fn evaluate_form<'a, I>(fields: I, values: &FormValues) -> BTreeMap<FieldKey, String>
where
    I: IntoIterator<Item = (&'a FieldKey, &'a [ValidationRule])>,
{
    fields
        .into_iter()
        .filter(|(_, rules)| !rules.is_empty())
        .filter_map(|(key, rules)| {
            let value = values.get(key.as_str())?;
            Some((key.clone(), evaluate_field(value, rules, values).to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::form::value::FileHandle;

    fn no_values() -> FormValues {
        FormValues::default()
    }

    fn fails(value: impl Into<FieldValue>, rule: &ValidationRule) -> bool {
        evaluate(&value.into(), rule, &no_values())
    }

    #[test]
    fn required_rejects_falsy_values() {
        let rule = ValidationRule::required("required");
        assert!(fails("", &rule));
        assert!(fails(0.0, &rule));
        assert!(fails(f64::NAN, &rule));
        assert!(fails(false, &rule));
        assert!(fails(Vec::<FileHandle>::new(), &rule));
        assert!(!fails("x", &rule));
        assert!(!fails(-1.0, &rule));
        assert!(!fails(true, &rule));
        assert!(!fails(vec![FileHandle::new("a", 1)], &rule));
    }

    #[test]
    fn numeric_bounds_are_inclusive() {
        let min = ValidationRule::min(0.0, "too small");
        let max = ValidationRule::max(100.0, "too large");
        assert!(fails(-1.0, &min));
        assert!(!fails(0.0, &min));
        assert!(fails(100.5, &max));
        assert!(!fails(100.0, &max));
        assert!(!fails(f64::NAN, &min));
        assert!(!fails(f64::NAN, &max));
        assert!(fails("-3", &min));
    }

    #[test]
    fn max_file_size_checks_every_file() {
        let rule = ValidationRule::max_file_size(100, "too large");
        let small = FileHandle::new("small", 100);
        let big = FileHandle::new("big", 101);
        assert!(!fails(vec![small.clone()], &rule));
        assert!(fails(vec![small, big], &rule));
        assert!(!fails("not files", &rule));
    }

    #[test]
    fn length_rules_use_item_count_or_string_length() {
        let min = ValidationRule::min_length(3, "too short");
        assert!(fails("ab", &min));
        assert!(!fails("abc", &min));
        assert!(fails(12.0, &min));
        assert!(!fails(123.0, &min));
        assert!(fails(vec![FileHandle::new("a", 1)], &min));
    }

    #[test]
    fn max_length_keeps_literal_comparison() {
        let rule = ValidationRule::max_length(3, "length");
        assert!(fails("ab", &rule));
        assert!(!fails("abc", &rule));
        assert!(!fails("abcdef", &rule));
    }

    #[test]
    fn pattern_matches_string_form() {
        let rule = ValidationRule::pattern(r"^\d+$", "digits only").expect("valid pattern");
        assert!(!fails("123", &rule));
        assert!(fails("12a", &rule));
        assert!(!fails(42.0, &rule));

        let error = ValidationRule::pattern("(", "broken").expect_err("invalid pattern");
        assert!(matches!(error, FormError::InvalidPattern { .. }));
    }

    #[test]
    fn precompiled_regex_behaves_like_pattern() {
        let rule = ValidationRule::regex(Regex::new(r"^\d+$").expect("regex"), "digits only");
        assert!(!fails("123", &rule));
        assert!(fails("12a", &rule));
        assert_eq!(rule.error, "digits only");
    }

    #[test]
    fn extreme_numbers_are_checked_in_exponent_form() {
        let digits = ValidationRule::pattern(r"^\d+$", "digits only").expect("valid pattern");
        assert!(fails(1e21, &digits));
        assert!(!fails(1e20, &digits));

        let min = ValidationRule::min_length(5, "too short");
        assert!(fails(1e-7, &min));
        assert!(!fails(0.000001, &min));
    }

    #[test]
    fn string_length_counts_utf16_units() {
        let min = ValidationRule::min_length(2, "too short");
        assert!(!fails("\u{1F600}", &min));
        assert!(fails("é", &min));
    }

    #[test]
    fn custom_predicate_sees_whole_form() {
        let values = FormValues(
            [
                (FieldKey::new("password"), FieldValue::text("secret")),
                (FieldKey::new("confirm"), FieldValue::text("other")),
            ]
            .into_iter()
            .collect(),
        );
        let rule = ValidationRule::custom(
            |values| values.text("password") == values.text("confirm"),
            "mismatch",
        );
        assert!(evaluate(&FieldValue::text("other"), &rule, &values));
    }

    #[test]
    fn first_failing_rule_wins_and_short_circuits() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let rules = vec![
            ValidationRule::required("R"),
            ValidationRule::min_length(3, "L"),
            ValidationRule::custom(
                move |_| {
                    counter.set(counter.get() + 1);
                    true
                },
                "C",
            ),
        ];

        assert_eq!(evaluate_field(&FieldValue::text(""), &rules, &no_values()), "R");
        assert_eq!(evaluate_field(&FieldValue::text("ab"), &rules, &no_values()), "L");
        assert_eq!(calls.get(), 0);
        assert_eq!(evaluate_field(&FieldValue::text("abc"), &rules, &no_values()), "");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn form_evaluation_skips_fields_without_rules() {
        let values = FormValues(
            [
                (FieldKey::new("email"), FieldValue::text("")),
                (FieldKey::new("notes"), FieldValue::text("")),
            ]
            .into_iter()
            .collect(),
        );
        let email_rules = vec![ValidationRule::required("Email is required")];
        let email = FieldKey::new("email");
        let notes = FieldKey::new("notes");
        let result = evaluate_form(
            [(&email, email_rules.as_slice()), (&notes, &[][..])],
            &values,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("email").map(String::as_str), Some("Email is required"));
    }
}
