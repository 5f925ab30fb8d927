use super::controller::{FormError, FormResult};
use super::value::{FieldKey, FieldKind, FieldValue, FileHandle, FormValues};

/// Rust types a form field can be read into.
pub trait FormValue: Sized {
    const KIND: FieldKind;

    fn from_field_value(value: &FieldValue) -> Option<Self>;
    fn into_field_value(self) -> FieldValue;
}

impl FormValue for String {
    const KIND: FieldKind = FieldKind::Text;

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_text().map(str::to_owned)
    }

    fn into_field_value(self) -> FieldValue {
        FieldValue::Text(self)
    }
}

impl FormValue for f64 {
    const KIND: FieldKind = FieldKind::Numeric;

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_number()
    }

    fn into_field_value(self) -> FieldValue {
        FieldValue::Number(self)
    }
}

impl FormValue for bool {
    const KIND: FieldKind = FieldKind::Boolean;

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_bool()
    }

    fn into_field_value(self) -> FieldValue {
        FieldValue::Bool(self)
    }
}

impl FormValue for Vec<FileHandle> {
    const KIND: FieldKind = FieldKind::FileList;

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        value.as_files().map(<[_]>::to_vec)
    }

    fn into_field_value(self) -> FieldValue {
        FieldValue::Files(self)
    }
}

pub trait FormModel: Sized {
    type Fields;

    const FIELDS: &'static [&'static str];

    fn fields() -> Self::Fields;
    fn from_values(values: &FormValues) -> FormResult<Self>;
    fn into_values(self) -> Vec<(FieldKey, FieldValue)>;
}

impl FormValues {
    pub fn extract<T: FormValue>(&self, key: &str) -> FormResult<T> {
        let value = self
            .get(key)
            .ok_or_else(|| FormError::UnknownField(FieldKey::new(key)))?;
        T::from_field_value(value).ok_or_else(|| FormError::KindMismatch {
            field: FieldKey::new(key),
            expected: T::KIND,
            found: value.type_name(),
        })
    }
}
