use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use super::controller::{FormError, FormResult};

static FILE_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(Rc<str>);

impl FieldKey {
    pub fn new(value: impl Into<Rc<str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for FieldKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FieldKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Serialize for FieldKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FileId(pub u64);

impl FileId {
    pub fn next() -> Self {
        Self(FILE_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

/// A file picked by the user. Two handles are equal only if they are the same pick,
/// regardless of name or size.
#[derive(Clone, Debug)]
pub struct FileHandle {
    id: FileId,
    name: Rc<str>,
    size: u64,
    mime: Option<Rc<str>>,
}

impl FileHandle {
    pub fn new(name: impl Into<Rc<str>>, size: u64) -> Self {
        Self {
            id: FileId::next(),
            name: name.into(),
            size,
            mime: None,
        }
    }

    pub fn mime(mut self, value: impl Into<Rc<str>>) -> Self {
        self.mime = Some(value.into());
        self
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime.as_deref()
    }
}

impl PartialEq for FileHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FileHandle {}

impl Serialize for FileHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut file = serializer.serialize_struct("FileHandle", 3)?;
        file.serialize_field("name", self.name())?;
        file.serialize_field("size", &self.size)?;
        file.serialize_field("mime", &self.mime_type())?;
        file.end()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Files(Vec<FileHandle>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn files() -> Self {
        Self::Files(Vec::new())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_files(&self) -> Option<&[FileHandle]> {
        match self {
            Self::Files(files) => Some(files),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Bool(_) => "boolean",
            Self::Files(_) => "file list",
        }
    }

    /// Falsy scalars and empty file lists.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(value) => value.is_empty(),
            Self::Number(value) => *value == 0.0 || value.is_nan(),
            Self::Bool(value) => !value,
            Self::Files(files) => files.is_empty(),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Self::Number(value) => *value,
            Self::Text(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Self::Bool(value) => f64::from(u8::from(*value)),
            Self::Files(files) if files.is_empty() => 0.0,
            Self::Files(_) => f64::NAN,
        }
    }

    pub fn display_string(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Number(value) => format_number(*value),
            Self::Bool(value) => value.to_string(),
            Self::Files(files) => files
                .iter()
                .map(FileHandle::name)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Item count for file lists, UTF-16 code unit count of the string form otherwise.
    pub fn length(&self) -> usize {
        match self {
            Self::Files(files) => files.len(),
            other => other.display_string().encode_utf16().count(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<FileHandle>> for FieldValue {
    fn from(value: Vec<FileHandle>) -> Self {
        Self::Files(value)
    }
}

fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if value == 0.0 {
        return "0".to_owned();
    }
    let magnitude = value.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        return exponent_form(value);
    }
    if value.fract() == 0.0 {
        return format!("{value:.0}");
    }
    value.to_string()
}

/// Shortest mantissa with an explicitly signed exponent, e.g. `1e+21` or `1.5e-7`.
fn exponent_form(value: f64) -> String {
    let formatted = format!("{value:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FieldKind {
    Text,
    Numeric,
    Boolean,
    ExclusiveChoice,
    FileList,
}

impl FieldKind {
    pub fn infer(value: &FieldValue) -> Self {
        match value {
            FieldValue::Text(_) => Self::Text,
            FieldValue::Number(_) => Self::Numeric,
            FieldValue::Bool(_) => Self::Boolean,
            FieldValue::Files(_) => Self::FileList,
        }
    }

    pub fn accepts(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (Self::Text | Self::ExclusiveChoice, FieldValue::Text(_))
                | (Self::Numeric, FieldValue::Number(_))
                | (Self::Boolean, FieldValue::Bool(_))
                | (Self::FileList, FieldValue::Files(_))
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
            Self::ExclusiveChoice => "exclusive choice",
            Self::FileList => "file list",
        }
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an input element reports when it changes. Only the attribute matching the
/// field's kind is read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSignal {
    pub value: Option<String>,
    pub value_as_number: Option<f64>,
    pub checked: Option<bool>,
    pub files: Option<Vec<FileHandle>>,
}

impl ChangeSignal {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn number(value: f64) -> Self {
        Self {
            value: Some(format_number(value)),
            value_as_number: Some(value),
            ..Self::default()
        }
    }

    pub fn checked(checked: bool) -> Self {
        Self {
            checked: Some(checked),
            ..Self::default()
        }
    }

    pub fn option(value: impl Into<String>, checked: bool) -> Self {
        Self {
            value: Some(value.into()),
            checked: Some(checked),
            ..Self::default()
        }
    }

    pub fn files(files: impl IntoIterator<Item = FileHandle>) -> Self {
        Self {
            files: Some(files.into_iter().collect()),
            ..Self::default()
        }
    }
}

/// Computes the next value of a field from a change signal. `Ok(None)` means the signal
/// leaves the field untouched.
pub fn coerce(
    key: &FieldKey,
    kind: FieldKind,
    current: &FieldValue,
    signal: &ChangeSignal,
) -> FormResult<Option<FieldValue>> {
    let missing = |expected: &'static str| FormError::MissingSignal {
        field: key.clone(),
        expected,
    };
    match kind {
        FieldKind::Boolean => signal
            .checked
            .map(|checked| Some(FieldValue::Bool(checked)))
            .ok_or_else(|| missing("checked")),
        FieldKind::FileList => {
            let Some(added) = signal.files.as_ref().filter(|files| !files.is_empty()) else {
                return Ok(None);
            };
            let mut files = current.as_files().map(<[_]>::to_vec).unwrap_or_default();
            files.extend(added.iter().cloned());
            Ok(Some(FieldValue::Files(files)))
        }
        FieldKind::Numeric => {
            if let Some(number) = signal.value_as_number {
                return Ok(Some(FieldValue::Number(number)));
            }
            let raw = signal.value.as_deref().ok_or_else(|| missing("value"))?;
            let trimmed = raw.trim();
            let number = if trimmed.is_empty() {
                f64::NAN
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            };
            Ok(Some(FieldValue::Number(number)))
        }
        FieldKind::ExclusiveChoice if signal.checked == Some(false) => Ok(None),
        FieldKind::Text | FieldKind::ExclusiveChoice => signal
            .value
            .clone()
            .map(|value| Some(FieldValue::Text(value)))
            .ok_or_else(|| missing("value")),
    }
}

/// Read-only view of every field's current value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormValues(pub(super) BTreeMap<FieldKey, FieldValue>);

impl FormValues {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &FieldValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_text)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FieldValue::as_number)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(FieldValue::as_bool)
    }

    pub fn files(&self, key: &str) -> Option<&[FileHandle]> {
        self.get(key).and_then(FieldValue::as_files)
    }

    pub fn into_inner(self) -> BTreeMap<FieldKey, FieldValue> {
        self.0
    }
}

impl Serialize for FormValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> FieldKey {
        FieldKey::new("field")
    }

    #[test]
    fn boolean_signal_replaces_value() {
        let next = coerce(
            &key(),
            FieldKind::Boolean,
            &FieldValue::Bool(false),
            &ChangeSignal::checked(true),
        )
        .expect("coerce checkbox");
        assert_eq!(next, Some(FieldValue::Bool(true)));
    }

    #[test]
    fn file_signal_appends_and_empty_signal_is_noop() {
        let first = FileHandle::new("a.txt", 10);
        let second = FileHandle::new("b.txt", 20);
        let current = FieldValue::Files(vec![first.clone()]);

        let next = coerce(
            &key(),
            FieldKind::FileList,
            &current,
            &ChangeSignal::files([second.clone()]),
        )
        .expect("coerce files");
        assert_eq!(next, Some(FieldValue::Files(vec![first, second])));

        let unchanged = coerce(&key(), FieldKind::FileList, &current, &ChangeSignal::default())
            .expect("coerce without files");
        assert_eq!(unchanged, None);
    }

    #[test]
    fn numeric_signal_falls_back_to_nan() {
        let next = coerce(
            &key(),
            FieldKind::Numeric,
            &FieldValue::Number(1.0),
            &ChangeSignal::text("twelve"),
        )
        .expect("coerce number")
        .and_then(|value| value.as_number())
        .expect("numeric value");
        assert!(next.is_nan());

        let parsed = coerce(
            &key(),
            FieldKind::Numeric,
            &FieldValue::Number(1.0),
            &ChangeSignal::text(" 42.5 "),
        )
        .expect("coerce number");
        assert_eq!(parsed, Some(FieldValue::Number(42.5)));
    }

    #[test]
    fn unchecked_choice_option_is_ignored() {
        let next = coerce(
            &key(),
            FieldKind::ExclusiveChoice,
            &FieldValue::text("x"),
            &ChangeSignal::option("y", false),
        )
        .expect("coerce choice");
        assert_eq!(next, None);
    }

    #[test]
    fn missing_attribute_is_reported() {
        let error = coerce(
            &key(),
            FieldKind::Text,
            &FieldValue::text(""),
            &ChangeSignal::checked(true),
        )
        .expect_err("text needs a value");
        assert_eq!(
            error,
            FormError::MissingSignal {
                field: key(),
                expected: "value"
            }
        );
    }

    #[test]
    fn file_handles_compare_by_identity() {
        let first = FileHandle::new("same.txt", 1);
        let second = FileHandle::new("same.txt", 1);
        assert_ne!(first, second);
        assert_eq!(first, first.clone());
    }

    #[test]
    fn numbers_render_like_script_values() {
        assert_eq!(FieldValue::Number(6.0).display_string(), "6");
        assert_eq!(FieldValue::Number(0.5).display_string(), "0.5");
        assert_eq!(FieldValue::Number(-0.0).display_string(), "0");
        assert_eq!(FieldValue::Number(f64::NAN).display_string(), "NaN");
        assert_eq!(FieldValue::Number(f64::INFINITY).display_string(), "Infinity");
        assert_eq!(FieldValue::Number(1e21).display_string(), "1e+21");
        assert_eq!(FieldValue::Number(-2.5e22).display_string(), "-2.5e+22");
        assert_eq!(FieldValue::Number(1e-7).display_string(), "1e-7");
        assert_eq!(FieldValue::Number(0.000001).display_string(), "0.000001");
        assert_eq!(FieldValue::Number(123456789.0).display_string(), "123456789");
    }
}
