use crate::form::FormModel as _;

#[test]
fn prelude_smoke_builds_a_form() {
    use crate::prelude::*;

    let form = FormBuilder::new()
        .field(
            "email",
            FieldDefinition::text("").rule(ValidationRule::required("Email is required")),
        )
        .field("plan", FieldDefinition::choice("free"))
        .field("agree", FieldDefinition::boolean(false))
        .field("avatar", FieldDefinition::files())
        .options(FormOptions::default())
        .build()
        .expect("prelude form builds");

    let mut event = SubmitEvent::new();
    let outcome = form.submit(Some(&mut event)).expect("submit");
    assert!(!outcome.is_completed());
    assert_eq!(form.phase().expect("phase"), FormPhase::Invalid);
    assert!(matches!(
        form.field("plan").expect("binding"),
        FieldBinding::Choice(_)
    ));
}

#[test]
fn form_facade_exports_core_types() {
    let _ = crate::form::FormOptions::default();
    let _ = crate::form::ValidationMode::OnSubmit;
    let _ = crate::form::RevalidateScope::Form;
    let _ = crate::form::FieldKind::ExclusiveChoice;
    let _ = crate::form::ChangeSignal::default();
    let _ = crate::form::SubmitEvent::new();
    let _ = crate::FormBuilder::new();
}

#[derive(Clone, crate::form::FormModel)]
struct ApiSmokeForm {
    title: String,
    enabled: bool,
    amount: f64,
}

#[test]
fn derive_exposes_field_keys() {
    let fields = ApiSmokeForm::fields();
    assert_eq!(fields.title(), "title");
    assert_eq!(fields.amount(), "amount");
    assert_eq!(ApiSmokeForm::FIELDS.len(), 3);

    let values = ApiSmokeForm {
        title: "Quarterly report".into(),
        enabled: true,
        amount: 12.5,
    }
    .into_values();
    assert_eq!(values.len(), 3);
}
