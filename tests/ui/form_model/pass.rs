use calmform::form::{ChangeSignal, FormBuilder, FormModel, ValidationRule};

#[derive(Clone, calmform::form::FormModel)]
struct DemoForm {
    email: String,
    subscribed: bool,
}

fn main() {
    let fields = DemoForm::fields();
    let form = FormBuilder::from_model(DemoForm {
        email: "a@calm.ui".to_string(),
        subscribed: false,
    })
    .rule(fields.email(), ValidationRule::required("required"))
    .build()
    .expect("form builds");

    form.update_field(fields.email(), &ChangeSignal::text("b@calm.ui"))
        .expect("update email");
    let model = form.model::<DemoForm>().expect("typed model");
    assert_eq!(model.email, "b@calm.ui");
    assert!(!model.subscribed);
    assert_eq!(DemoForm::FIELDS, &["email", "subscribed"]);
}
