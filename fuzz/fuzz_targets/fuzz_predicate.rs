//! Fuzz target for condition expressions.
//!
//! Arbitrary source text must either parse or return a positioned error,
//! and evaluation must never panic.

#![no_main]

use autolog::{evaluate, Args, Predicate};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|source: &str| {
    let args = Args::new()
        .arg("debug", true)
        .arg("n", 7)
        .arg("name", "widget")
        .redacted("secret");

    match Predicate::parse(source) {
        Ok(predicate) => {
            let _ = predicate.try_eval(&args);
        }
        Err(err) => {
            let _ = err.to_string();
        }
    }
    let _ = evaluate(source, &args);
});
