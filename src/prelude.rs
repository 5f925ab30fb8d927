pub use crate::form::{
    ChangeSignal, FieldBinding, FieldDefinition, FieldKind, FieldValue, FileHandle, FormBuilder,
    FormController, FormError, FormModel, FormOptions, FormPhase, FormResult, FormValues,
    RevalidateScope, SubmitContext, SubmitEvent, SubmitOutcome, ValidationMode, ValidationRule,
};
