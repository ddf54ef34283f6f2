//! Fuzz target for message templates.

#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use autolog::template::{render, Phase, RenderInput};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    template: &'a str,
    args: &'a str,
    exception: Option<&'a str>,
    extra_key: &'a str,
    extra_value: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    let mut extras = BTreeMap::new();
    extras.insert(input.extra_key.to_string(), input.extra_value.to_string());
    let render_input = RenderInput {
        method: "Fuzz.run",
        args: input.args,
        exception: input.exception,
        request_id: Some("fuzz"),
        ..Default::default()
    };
    for phase in [Phase::Entry, Phase::Exit, Phase::Error, Phase::Step] {
        let _ = render(phase, input.template, &render_input, &extras);
    }
});
