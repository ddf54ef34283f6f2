//! Template rendering tests.

use std::collections::BTreeMap;
use std::time::Duration;

use autolog::context;
use autolog::template::{render, FieldMap, Phase, RenderInput};
use autolog::{Templates, Value};

fn no_extras() -> BTreeMap<String, String> {
    BTreeMap::new()
}

#[test]
fn default_entry_template() {
    let input = RenderInput {
        method: "DemoService.processData",
        args: "test",
        ..Default::default()
    };
    let out = render(Phase::Entry, &Templates::default().entry, &input, &no_extras());
    assert_eq!(out, "[ENTER] DemoService.processData args=test");
}

#[test]
fn default_exit_template_with_duration_in_ms() {
    let returned = Value::from("ok");
    let input = RenderInput {
        method: "Svc.run",
        return_value: Some(&returned),
        duration: Some(Duration::from_micros(12_900)),
        ..Default::default()
    };
    let out = render(Phase::Exit, &Templates::default().exit, &input, &no_extras());
    assert_eq!(out, "[EXIT] Svc.run returned=ok duration=12ms");
}

#[test]
fn absent_return_renders_null() {
    let input = RenderInput {
        method: "Svc.run",
        duration: Some(Duration::ZERO),
        ..Default::default()
    };
    let out = render(Phase::Exit, &Templates::default().exit, &input, &no_extras());
    assert_eq!(out, "[EXIT] Svc.run returned=null duration=0ms");
}

#[test]
fn step_templates() {
    let templates = Templates::default();
    let input = RenderInput {
        method: "Svc.validate",
        args: "hello",
        exception: Some("Data cannot be blank"),
        description: Some("Validating input data"),
        ..Default::default()
    };
    assert_eq!(
        render(Phase::StepEntry, &templates.step_entry, &input, &no_extras()),
        "[STEP] Svc.validate - Validating input data (args=[hello])"
    );
    assert_eq!(
        render(Phase::StepError, &templates.step_error, &input, &no_extras()),
        "[STEP ERROR] Svc.validate - Validating input data: Data cannot be blank"
    );
}

#[test]
fn template_without_known_placeholders_is_unchanged() {
    let input = RenderInput {
        method: "Svc.run",
        ..Default::default()
    };
    for template in ["plain text", "{{nope}} and {{ alsoNope }}", "{{", "}}{{method"] {
        assert_eq!(render(Phase::Entry, template, &input, &no_extras()), template);
    }
}

#[test]
fn request_id_comes_from_input_or_context() {
    let input = RenderInput {
        method: "Svc.run",
        request_id: Some("given"),
        ..Default::default()
    };
    assert_eq!(render(Phase::Entry, "{{requestId}}", &input, &no_extras()), "given");

    let lazy = RenderInput {
        method: "Svc.run",
        ..Default::default()
    };
    context::with_correlation_id(Some("ambient"), || {
        assert_eq!(render(Phase::Entry, "{{requestId}}", &lazy, &no_extras()), "ambient");
    });
}

#[test]
fn developer_defaults_to_unknown() {
    let input = RenderInput {
        method: "Svc.run",
        ..Default::default()
    };
    assert_eq!(render(Phase::Exit, "by {{developer}}", &input, &no_extras()), "by unknown");
    let owned = RenderInput {
        owner: Some("Akobir"),
        ..input
    };
    assert_eq!(render(Phase::Exit, "by {{developer}}", &owned, &no_extras()), "by Akobir");
}

#[test]
fn context_keys_fill_extra_placeholders() {
    let input = RenderInput {
        method: "Svc.run",
        ..Default::default()
    };
    let mut extras = BTreeMap::new();
    extras.insert("userId".to_string(), "user-123".to_string());
    assert_eq!(
        render(Phase::Entry, "{{method}} for {{userId}}", &input, &extras),
        "Svc.run for user-123"
    );
}

#[test]
fn field_map_serializes_structured_fields() {
    let returned = Value::from(5);
    let input = RenderInput {
        method: "Svc.calc",
        args: "2, 3",
        return_value: Some(&returned),
        duration: Some(Duration::from_millis(7)),
        owner: Some("Akobir"),
        request_id: Some("rid-1"),
        ..Default::default()
    };
    let fields = FieldMap::from_input(Phase::Exit, &input);
    let json: serde_json::Value = serde_json::from_str(&fields.to_json()).unwrap();
    assert_eq!(json["phase"], "exit");
    assert_eq!(json["method"], "Svc.calc");
    assert_eq!(json["return"], 5);
    assert_eq!(json["duration_ms"], 7);
    assert_eq!(json["requestId"], "rid-1");
    assert_eq!(json["developer"], "Akobir");
    assert!(json.get("exception").is_none());
}
