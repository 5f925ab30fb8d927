use std::collections::BTreeMap;

use super::controller::{FormController, FormResult};
use super::value::{ChangeSignal, FieldKey, FieldKind, FieldValue, FileHandle};

/// What a rendering layer attaches to the input element(s) of one field.
#[derive(Clone)]
pub enum FieldBinding {
    Input(InputBinding),
    Toggle(ToggleBinding),
    Choice(ChoiceBinding),
    Files(FileListBinding),
}

impl FieldBinding {
    pub fn key(&self) -> &FieldKey {
        match self {
            Self::Input(binding) => &binding.key,
            Self::Toggle(binding) => &binding.key,
            Self::Choice(binding) => &binding.key,
            Self::Files(binding) => &binding.key,
        }
    }

    pub fn as_input(&self) -> Option<&InputBinding> {
        match self {
            Self::Input(binding) => Some(binding),
            _ => None,
        }
    }

    pub fn as_toggle(&self) -> Option<&ToggleBinding> {
        match self {
            Self::Toggle(binding) => Some(binding),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<&ChoiceBinding> {
        match self {
            Self::Choice(binding) => Some(binding),
            _ => None,
        }
    }

    pub fn as_files(&self) -> Option<&FileListBinding> {
        match self {
            Self::Files(binding) => Some(binding),
            _ => None,
        }
    }
}

/// Text and numeric inputs.
#[derive(Clone)]
pub struct InputBinding {
    controller: FormController,
    key: FieldKey,
    value: FieldValue,
}

impl InputBinding {
    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn on_input(&self, signal: &ChangeSignal) -> FormResult<()> {
        self.controller.update_field(self.key.as_str(), signal)
    }
}

#[derive(Clone)]
pub struct ToggleBinding {
    controller: FormController,
    key: FieldKey,
    checked: bool,
}

impl ToggleBinding {
    pub fn checked(&self) -> bool {
        self.checked
    }

    pub fn on_toggle(&self, signal: &ChangeSignal) -> FormResult<()> {
        self.controller.update_field(self.key.as_str(), signal)
    }
}

#[derive(Clone)]
pub struct FileListBinding {
    controller: FormController,
    key: FieldKey,
    files: Vec<FileHandle>,
}

impl FileListBinding {
    pub fn files(&self) -> &[FileHandle] {
        &self.files
    }

    pub fn on_files_added(&self, signal: &ChangeSignal) -> FormResult<()> {
        self.controller.update_field(self.key.as_str(), signal)
    }

    pub fn remove_item(&self, file: &FileHandle) -> FormResult<()> {
        self.controller.remove_file(self.key.as_str(), file)
    }
}

/// Factory for the option elements of one exclusive-choice field.
#[derive(Clone)]
pub struct ChoiceBinding {
    controller: FormController,
    key: FieldKey,
    current: String,
}

impl ChoiceBinding {
    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn option(&self, value: impl Into<String>) -> ChoiceOption {
        let value = value.into();
        ChoiceOption {
            controller: self.controller.clone(),
            checked: value == self.current,
            name: self.key.clone(),
            value,
        }
    }
}

#[derive(Clone)]
pub struct ChoiceOption {
    controller: FormController,
    name: FieldKey,
    value: String,
    checked: bool,
}

impl ChoiceOption {
    pub fn name(&self) -> &FieldKey {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn checked(&self) -> bool {
        self.checked
    }

    /// The option's own value is written; the signal only decides whether the option
    /// became checked.
    pub fn on_select(&self, signal: &ChangeSignal) -> FormResult<()> {
        let checked = signal.checked.unwrap_or(true);
        self.controller.update_field(
            self.name.as_str(),
            &ChangeSignal::option(self.value.clone(), checked),
        )
    }

    pub fn select(&self) -> FormResult<()> {
        self.on_select(&ChangeSignal::checked(true))
    }
}

impl FormController {
    pub fn field(&self, key: &str) -> FormResult<FieldBinding> {
        let (key, slot) = self.slot(key)?;
        let controller = self.clone();
        let key = key.clone();
        let binding = match (slot.kind, self.value(key.as_str())?) {
            (FieldKind::Boolean, FieldValue::Bool(checked)) => FieldBinding::Toggle(ToggleBinding {
                controller,
                key,
                checked,
            }),
            (FieldKind::FileList, FieldValue::Files(files)) => {
                FieldBinding::Files(FileListBinding {
                    controller,
                    key,
                    files,
                })
            }
            (FieldKind::ExclusiveChoice, FieldValue::Text(current)) => {
                FieldBinding::Choice(ChoiceBinding {
                    controller,
                    key,
                    current,
                })
            }
            (_, value) => FieldBinding::Input(InputBinding {
                controller,
                key,
                value,
            }),
        };
        Ok(binding)
    }

    pub fn fields(&self) -> FormResult<BTreeMap<FieldKey, FieldBinding>> {
        self.fields
            .keys()
            .map(|key| -> FormResult<(FieldKey, FieldBinding)> {
                Ok((key.clone(), self.field(key.as_str())?))
            })
            .collect()
    }
}
