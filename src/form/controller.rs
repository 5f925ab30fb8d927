use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, trace};

use super::model::FormModel;
use super::options::{FormOptions, RevalidateScope, ValidationMode};
use super::store::{ErrorStore, FieldStore, FormErrors};
use super::validation::{ValidationRule, evaluate_form};
use super::value::{ChangeSignal, FieldKey, FieldKind, FieldValue, FileHandle, FormValues, coerce};

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("a form needs at least one field")]
    EmptyDefinition,
    #[error("unknown field `{0}`")]
    UnknownField(FieldKey),
    #[error("field `{field}` is {expected} but got a {found} value")]
    KindMismatch {
        field: FieldKey,
        expected: FieldKind,
        found: &'static str,
    },
    #[error("exclusive choice field `{0}` must start with a text value")]
    InvalidChoiceField(FieldKey),
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("change for field `{field}` carries no `{expected}` attribute")]
    MissingSignal {
        field: FieldKey,
        expected: &'static str,
    },
    #[error("store key set mismatch (missing: {missing:?}, unexpected: {unexpected:?})")]
    KeySetMismatch {
        missing: Vec<FieldKey>,
        unexpected: Vec<FieldKey>,
    },
    #[error("form state is already borrowed while {0}")]
    StateBorrowed(&'static str),
    #[error("invalid form phase transition: {from:?} -> {to:?}")]
    InvalidPhaseTransition { from: FormPhase, to: FormPhase },
}

pub type FormResult<T> = Result<T, FormError>;

/// Lifecycle of one form instance. `Invalid` and `Valid` are only reachable after the
/// first submit attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FormPhase {
    Pristine,
    Invalid,
    Valid,
    Submitted,
}

#[derive(Clone, Debug)]
pub struct FieldDefinition {
    initial_value: FieldValue,
    kind: Option<FieldKind>,
    rules: Vec<ValidationRule>,
}

impl FieldDefinition {
    pub fn new(initial_value: impl Into<FieldValue>) -> Self {
        Self {
            initial_value: initial_value.into(),
            kind: None,
            rules: Vec::new(),
        }
    }

    pub fn text(initial_value: impl Into<String>) -> Self {
        Self::new(FieldValue::Text(initial_value.into()))
    }

    pub fn number(initial_value: f64) -> Self {
        Self::new(FieldValue::Number(initial_value))
    }

    pub fn boolean(initial_value: bool) -> Self {
        Self::new(FieldValue::Bool(initial_value))
    }

    pub fn files() -> Self {
        Self::new(FieldValue::files())
    }

    pub fn choice(initial_value: impl Into<String>) -> Self {
        Self::text(initial_value).exclusive_choice()
    }

    pub fn exclusive_choice(self) -> Self {
        self.kind(FieldKind::ExclusiveChoice)
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = ValidationRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn initial_value(&self) -> &FieldValue {
        &self.initial_value
    }

    pub fn validation_rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    fn resolve_kind(&self, key: &FieldKey) -> FormResult<FieldKind> {
        match self.kind {
            None => Ok(FieldKind::infer(&self.initial_value)),
            Some(FieldKind::ExclusiveChoice) if self.initial_value.as_text().is_none() => {
                Err(FormError::InvalidChoiceField(key.clone()))
            }
            Some(kind) if kind.accepts(&self.initial_value) => Ok(kind),
            Some(kind) => Err(FormError::KindMismatch {
                field: key.clone(),
                expected: kind,
                found: self.initial_value.type_name(),
            }),
        }
    }
}

pub(super) struct FieldSlot {
    pub(super) kind: FieldKind,
    pub(super) definition: FieldDefinition,
}

pub(super) struct FormState {
    pub(super) values: FieldStore<FieldValue>,
    pub(super) errors: ErrorStore,
    pub(super) submitted: bool,
    pub(super) submit_count: u32,
    pub(super) phase: FormPhase,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormSnapshot {
    pub values: FormValues,
    pub errors: FormErrors,
    pub submitted: bool,
    pub submit_count: u32,
    pub phase: FormPhase,
    pub is_valid: bool,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SubmitEvent {
    default_prevented: bool,
}

impl SubmitEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    Blocked(FormErrors),
    Completed,
}

impl SubmitOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(pub u64);

pub type SubmitHandler = Rc<dyn Fn(&FormValues, &SubmitContext)>;
pub type FormObserver = Rc<dyn Fn(&FormSnapshot)>;

/// Capabilities handed to the completion callback.
pub struct SubmitContext {
    controller: FormController,
}

impl SubmitContext {
    pub fn values(&self) -> FormResult<FormValues> {
        self.controller.values()
    }

    pub fn set_error(&self, key: &str, message: impl Into<String>) -> FormResult<()> {
        self.controller.set_errors([(key, message.into())])
    }

    pub fn set_errors<K, M>(&self, errors: impl IntoIterator<Item = (K, M)>) -> FormResult<()>
    where
        K: AsRef<str>,
        M: Into<String>,
    {
        self.controller.set_errors(errors)
    }

    pub fn reset(&self) -> FormResult<()> {
        self.controller.reset()
    }
}

#[derive(Default)]
pub struct FormBuilder {
    fields: BTreeMap<FieldKey, FieldDefinition>,
    orphan_rules: Vec<FieldKey>,
    options: FormOptions,
    on_submit: Option<SubmitHandler>,
}

impl FormBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_model<T: FormModel>(model: T) -> Self {
        model
            .into_values()
            .into_iter()
            .fold(Self::new(), |builder, (key, value)| {
                builder.field(key, FieldDefinition::new(value))
            })
    }

    pub fn field(mut self, key: impl Into<FieldKey>, definition: FieldDefinition) -> Self {
        self.fields.insert(key.into(), definition);
        self
    }

    pub fn rule(self, key: &str, rule: ValidationRule) -> Self {
        self.rules(key, [rule])
    }

    pub fn rules(mut self, key: &str, rules: impl IntoIterator<Item = ValidationRule>) -> Self {
        match self.fields.get_mut(key) {
            Some(definition) => definition.rules.extend(rules),
            None => self.orphan_rules.push(FieldKey::new(key)),
        }
        self
    }

    pub fn exclusive_choice(mut self, key: &str) -> Self {
        match self.fields.remove_entry(key) {
            Some((key, definition)) => {
                self.fields.insert(key, definition.exclusive_choice());
            }
            None => self.orphan_rules.push(FieldKey::new(key)),
        }
        self
    }

    pub fn options(mut self, options: FormOptions) -> Self {
        self.options = options;
        self
    }

    pub fn on_submit(mut self, handler: impl Fn(&FormValues, &SubmitContext) + 'static) -> Self {
        self.on_submit = Some(Rc::new(handler));
        self
    }

    pub fn build(self) -> FormResult<FormController> {
        if let Some(key) = self.orphan_rules.into_iter().next() {
            return Err(FormError::UnknownField(key));
        }
        FormController::with_options(self.fields, self.options, self.on_submit)
    }
}

#[derive(Clone)]
pub struct FormController {
    pub(super) options: FormOptions,
    pub(super) fields: Rc<BTreeMap<FieldKey, FieldSlot>>,
    pub(super) state: Rc<RefCell<FormState>>,
    pub(super) on_submit: Option<SubmitHandler>,
    pub(super) observers: Rc<RefCell<BTreeMap<SubscriptionId, FormObserver>>>,
    pub(super) next_subscription: Rc<Cell<u64>>,
}

impl Debug for FormController {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormController")
            .field("options", &self.options)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl FormController {
    pub fn new<K>(fields: impl IntoIterator<Item = (K, FieldDefinition)>) -> FormResult<Self>
    where
        K: Into<FieldKey>,
    {
        let fields = fields
            .into_iter()
            .map(|(key, definition)| (key.into(), definition))
            .collect();
        Self::with_options(fields, FormOptions::default(), None)
    }

    pub fn builder() -> FormBuilder {
        FormBuilder::new()
    }

    fn with_options(
        definitions: BTreeMap<FieldKey, FieldDefinition>,
        options: FormOptions,
        on_submit: Option<SubmitHandler>,
    ) -> FormResult<Self> {
        if definitions.is_empty() {
            return Err(FormError::EmptyDefinition);
        }

        let mut fields = BTreeMap::new();
        for (key, definition) in definitions {
            let kind = definition.resolve_kind(&key)?;
            fields.insert(key, FieldSlot { kind, definition });
        }

        let state = FormState {
            values: FieldStore::new(initial_values(&fields)),
            errors: ErrorStore::new(empty_errors(&fields)),
            submitted: false,
            submit_count: 0,
            phase: FormPhase::Pristine,
        };
        debug!(fields = fields.len(), "form created");

        Ok(Self {
            options,
            fields: Rc::new(fields),
            state: Rc::new(RefCell::new(state)),
            on_submit,
            observers: Rc::new(RefCell::new(BTreeMap::new())),
            next_subscription: Rc::new(Cell::new(1)),
        })
    }

    pub fn options(&self) -> FormOptions {
        self.options
    }

    pub fn kind(&self, key: &str) -> FormResult<FieldKind> {
        Ok(self.slot(key)?.1.kind)
    }

    pub fn definition(&self, key: &str) -> FormResult<&FieldDefinition> {
        Ok(&self.slot(key)?.1.definition)
    }

    pub fn values(&self) -> FormResult<FormValues> {
        Ok(FormValues(
            read_state(&self.state, "reading values")?.values.to_map(),
        ))
    }

    pub fn errors(&self) -> FormResult<FormErrors> {
        Ok(FormErrors(
            read_state(&self.state, "reading errors")?.errors.to_map(),
        ))
    }

    pub fn value(&self, key: &str) -> FormResult<FieldValue> {
        read_state(&self.state, "reading field value")?
            .values
            .get(key)
            .cloned()
            .ok_or_else(|| FormError::UnknownField(FieldKey::new(key)))
    }

    pub fn error(&self, key: &str) -> FormResult<String> {
        read_state(&self.state, "reading field error")?
            .errors
            .get(key)
            .cloned()
            .ok_or_else(|| FormError::UnknownField(FieldKey::new(key)))
    }

    pub fn is_submitted(&self) -> FormResult<bool> {
        Ok(read_state(&self.state, "reading submitted flag")?.submitted)
    }

    pub fn phase(&self) -> FormResult<FormPhase> {
        Ok(read_state(&self.state, "reading form phase")?.phase)
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let state = read_state(&self.state, "creating form snapshot")?;
        Ok(FormSnapshot {
            values: FormValues(state.values.to_map()),
            errors: FormErrors(state.errors.to_map()),
            submitted: state.submitted,
            submit_count: state.submit_count,
            phase: state.phase,
            is_valid: !state.errors.has_errors(),
        })
    }

    pub fn model<T: FormModel>(&self) -> FormResult<T> {
        T::from_values(&self.values()?)
    }

    /// Applies an input change to `key` through the field's coercion rule.
    pub fn update_field(&self, key: &str, signal: &ChangeSignal) -> FormResult<()> {
        let (key, slot) = self.slot(key)?;
        let current = self.value(key.as_str())?;
        let Some(next) = coerce(key, slot.kind, &current, signal)? else {
            return Ok(());
        };
        self.write_value(key.as_str(), next)
    }

    pub fn set_value(&self, key: &str, value: impl Into<FieldValue>) -> FormResult<()> {
        let value = value.into();
        let (key, slot) = self.slot(key)?;
        if !slot.kind.accepts(&value) {
            return Err(FormError::KindMismatch {
                field: key.clone(),
                expected: slot.kind,
                found: value.type_name(),
            });
        }
        self.write_value(key.as_str(), value)
    }

    pub fn remove_file(&self, key: &str, file: &FileHandle) -> FormResult<()> {
        let (key, _) = self.slot(key)?;
        let current = self.value(key.as_str())?;
        let FieldValue::Files(files) = current else {
            return Err(FormError::KindMismatch {
                field: key.clone(),
                expected: FieldKind::FileList,
                found: current.type_name(),
            });
        };
        let remaining = files
            .into_iter()
            .filter(|candidate| candidate != file)
            .collect::<Vec<_>>();
        self.write_value(key.as_str(), FieldValue::Files(remaining))
    }

    /// Recomputes every field's error without touching the submitted flag. Returns
    /// whether the form is free of errors.
    pub fn validate_form(&self) -> FormResult<bool> {
        let values = self.values()?;
        let results = evaluate_form(self.rule_sets(), &values);
        let is_valid = {
            let mut state = write_state(&self.state, "applying form validation")?;
            apply_errors(&mut state.errors, results)?;
            settle_phase(&mut state)?;
            !state.errors.has_errors()
        };
        self.notify()?;
        Ok(is_valid)
    }

    pub fn submit(&self, event: Option<&mut SubmitEvent>) -> FormResult<SubmitOutcome> {
        if let Some(event) = event {
            event.prevent_default();
        }

        let values = self.values()?;
        let results = evaluate_form(self.rule_sets(), &values);
        let blocked = {
            let mut state = write_state(&self.state, "applying submit validation")?;
            apply_errors(&mut state.errors, results)?;
            state.submitted = true;
            state.submit_count = state.submit_count.saturating_add(1);
            if state.errors.has_errors() {
                transition_phase(&mut state, FormPhase::Invalid)?;
                Some(FormErrors(state.errors.to_map()))
            } else {
                transition_phase(&mut state, FormPhase::Submitted)?;
                None
            }
        };
        self.notify()?;

        if let Some(errors) = blocked {
            debug!(
                failing = errors.failing_count(),
                first = ?errors.first_error().map(FieldKey::as_str),
                "submit blocked by validation errors"
            );
            return Ok(SubmitOutcome::Blocked(errors));
        }

        debug!(fields = values.len(), "submit completed");
        if let Some(handler) = self.on_submit.clone() {
            let context = SubmitContext {
                controller: self.clone(),
            };
            handler(&values, &context);
        }
        Ok(SubmitOutcome::Completed)
    }

    pub fn reset(&self) -> FormResult<()> {
        {
            let mut state = write_state(&self.state, "resetting form")?;
            state.values.replace_all(initial_values(&self.fields))?;
            state.errors.replace_all(empty_errors(&self.fields))?;
            state.submitted = false;
            state.submit_count = 0;
            transition_phase(&mut state, FormPhase::Pristine)?;
        }
        debug!("form reset");
        self.notify()
    }

    /// Writes errors computed outside the engine, e.g. by a server. All keys must exist;
    /// nothing is written otherwise.
    pub fn set_errors<K, M>(&self, errors: impl IntoIterator<Item = (K, M)>) -> FormResult<()>
    where
        K: AsRef<str>,
        M: Into<String>,
    {
        let errors = errors
            .into_iter()
            .map(|(key, message)| -> FormResult<(FieldKey, String)> {
                Ok((self.slot(key.as_ref())?.0.clone(), message.into()))
            })
            .collect::<FormResult<BTreeMap<_, _>>>()?;
        {
            let mut state = write_state(&self.state, "writing external errors")?;
            apply_errors(&mut state.errors, errors)?;
            settle_phase(&mut state)?;
        }
        self.notify()
    }

    /// Registers an observer called once after every committed update.
    pub fn subscribe(
        &self,
        observer: impl Fn(&FormSnapshot) + 'static,
    ) -> FormResult<SubscriptionId> {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);
        write_state(&self.observers, "registering observer")?.insert(id, Rc::new(observer));
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> FormResult<bool> {
        Ok(write_state(&self.observers, "removing observer")?
            .remove(&id)
            .is_some())
    }

    pub(super) fn slot(&self, key: &str) -> FormResult<(&FieldKey, &FieldSlot)> {
        self.fields
            .get_key_value(key)
            .ok_or_else(|| FormError::UnknownField(FieldKey::new(key)))
    }

    fn rule_sets(&self) -> impl Iterator<Item = (&FieldKey, &[ValidationRule])> {
        self.fields
            .iter()
            .map(|(key, slot)| (key, slot.definition.rules.as_slice()))
    }

    fn write_value(&self, key: &str, value: FieldValue) -> FormResult<()> {
        let revalidate = {
            let mut state = write_state(&self.state, "writing field value")?;
            state.values.set(key, value)?;
            state.submitted || self.options.validate_mode == ValidationMode::OnChange
        };
        trace!(field = key, revalidate, "field value written");
        if revalidate {
            self.revalidate(key)?;
        }
        self.notify()
    }

    fn revalidate(&self, changed: &str) -> FormResult<()> {
        let values = self.values()?;
        let results = match self.options.revalidate_scope {
            RevalidateScope::Form => evaluate_form(self.rule_sets(), &values),
            RevalidateScope::Field => evaluate_form(
                self.rule_sets().filter(|(key, _)| key.as_str() == changed),
                &values,
            ),
        };
        let mut state = write_state(&self.state, "applying revalidation")?;
        apply_errors(&mut state.errors, results)?;
        settle_phase(&mut state)
    }

    fn notify(&self) -> FormResult<()> {
        let observers = read_state(&self.observers, "collecting observers")?
            .values()
            .cloned()
            .collect::<Vec<_>>();
        if observers.is_empty() {
            return Ok(());
        }
        let snapshot = self.snapshot()?;
        for observer in observers {
            observer(&snapshot);
        }
        Ok(())
    }
}

fn initial_values(fields: &BTreeMap<FieldKey, FieldSlot>) -> BTreeMap<FieldKey, FieldValue> {
    fields
        .iter()
        .map(|(key, slot)| (key.clone(), slot.definition.initial_value.clone()))
        .collect()
}

fn empty_errors(fields: &BTreeMap<FieldKey, FieldSlot>) -> BTreeMap<FieldKey, String> {
    fields
        .keys()
        .map(|key| (key.clone(), String::new()))
        .collect()
}

fn apply_errors(errors: &mut ErrorStore, results: BTreeMap<FieldKey, String>) -> FormResult<()> {
    for (key, message) in results {
        errors.set(key.as_str(), message)?;
    }
    Ok(())
}

fn settle_phase(state: &mut FormState) -> FormResult<()> {
    if !state.submitted {
        return Ok(());
    }
    if state.errors.has_errors() {
        transition_phase(state, FormPhase::Invalid)
    } else if state.phase == FormPhase::Invalid {
        transition_phase(state, FormPhase::Valid)
    } else {
        Ok(())
    }
}

pub(super) fn transition_phase(state: &mut FormState, next: FormPhase) -> FormResult<()> {
    let current = state.phase;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (FormPhase::Pristine, FormPhase::Invalid)
            | (FormPhase::Pristine, FormPhase::Submitted)
            | (FormPhase::Invalid, FormPhase::Valid)
            | (FormPhase::Invalid, FormPhase::Submitted)
            | (FormPhase::Valid, FormPhase::Invalid)
            | (FormPhase::Valid, FormPhase::Submitted)
            | (FormPhase::Submitted, FormPhase::Invalid)
            | (_, FormPhase::Pristine)
    );
    if !allowed {
        return Err(FormError::InvalidPhaseTransition {
            from: current,
            to: next,
        });
    }
    state.phase = next;
    Ok(())
}

pub(super) fn read_state<'a, T>(
    cell: &'a RefCell<T>,
    context: &'static str,
) -> FormResult<Ref<'a, T>> {
    cell.try_borrow()
        .map_err(|_| FormError::StateBorrowed(context))
}

pub(super) fn write_state<'a, T>(
    cell: &'a RefCell<T>,
    context: &'static str,
) -> FormResult<RefMut<'a, T>> {
    cell.try_borrow_mut()
        .map_err(|_| FormError::StateBorrowed(context))
}
