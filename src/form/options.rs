use serde::Deserialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Field edits only revalidate once the form has been submitted.
    OnSubmit,
    OnChange,
}

/// Which fields a post-submit edit revalidates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevalidateScope {
    Form,
    Field,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormOptions {
    pub validate_mode: ValidationMode,
    pub revalidate_scope: RevalidateScope,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_mode: ValidationMode::OnSubmit,
            revalidate_scope: RevalidateScope::Form,
        }
    }
}
