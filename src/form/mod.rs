mod binding;
mod controller;
mod model;
mod options;
mod store;
mod validation;
mod value;


pub use binding::{
    ChoiceBinding, ChoiceOption, FieldBinding, FileListBinding, InputBinding, ToggleBinding,
};
pub use calmform_derive::FormModel;
pub use controller::{
    FieldDefinition, FormBuilder, FormController, FormError, FormObserver, FormPhase,
    FormResult, FormSnapshot, SubmitContext, SubmitEvent, SubmitHandler, SubmitOutcome,
    SubscriptionId,
};
pub use model::{FormModel, FormValue};
pub use options::{FormOptions, RevalidateScope, ValidationMode};
pub use store::{ErrorStore, FieldStore, FormErrors};
pub use validation::{
    CustomPredicate, RuleCheck, ValidationRule, evaluate, evaluate_field, evaluate_form,
};
pub use value::{
    ChangeSignal, FieldKey, FieldKind, FieldValue, FileHandle, FileId, FormValues, coerce,
};
