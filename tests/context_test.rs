//! Context propagation tests.

use autolog::context::{self, ScopeGuard, Snapshot, CORRELATION_ID_HEADER, CORRELATION_ID_KEY};

// =============================================================================
// Correlation id
// =============================================================================

#[test]
fn correlation_id_generated_once_then_stable() {
    let first = context::correlation_id();
    let second = context::correlation_id();
    assert_eq!(first, second);
    assert_eq!(first.len(), 36);
    assert_eq!(context::get(CORRELATION_ID_KEY), Some(first));
}

#[test]
fn header_and_key_names() {
    assert_eq!(CORRELATION_ID_KEY, "requestId");
    assert_eq!(CORRELATION_ID_HEADER, "X-Request-Id");
}

#[test]
fn inbound_correlation_id_is_used_and_restored() {
    context::put(CORRELATION_ID_KEY, "outer");
    let seen = context::with_correlation_id(Some("  abc-123 "), context::correlation_id);
    assert_eq!(seen, "abc-123");
    assert_eq!(context::get(CORRELATION_ID_KEY).as_deref(), Some("outer"));
    context::remove(CORRELATION_ID_KEY);
}

#[test]
fn blank_inbound_id_gets_fresh_one() {
    let seen = context::with_correlation_id(Some("   "), context::correlation_id);
    assert!(!seen.trim().is_empty());
    let other = context::with_correlation_id(None, context::correlation_id);
    assert_ne!(seen, other);
    assert!(context::get(CORRELATION_ID_KEY).is_none());
}

// =============================================================================
// Scope discipline
// =============================================================================

#[test]
fn nested_scopes_restore_outer_values() {
    context::with_scope([("user", "alice"), ("tenant", "acme")], || {
        context::with_scope([("user", "bob"), ("op", "calc")], || {
            assert_eq!(context::get("user").as_deref(), Some("bob"));
            assert_eq!(context::get("tenant").as_deref(), Some("acme"));
            assert_eq!(context::get("op").as_deref(), Some("calc"));
        });
        assert_eq!(context::get("user").as_deref(), Some("alice"));
        assert!(context::get("op").is_none());
    });
    assert!(context::get("user").is_none());
    assert!(context::get("tenant").is_none());
}

#[test]
fn scope_restores_after_error_return() {
    fn failing() -> Result<(), String> {
        let _guard = ScopeGuard::push([("step", "parse")]);
        "not a number".parse::<i32>().map_err(|e| e.to_string())?;
        Ok(())
    }
    assert!(failing().is_err());
    assert!(context::get("step").is_none());
}

#[test]
fn scope_restores_after_panic() {
    context::put("user", "alice");
    let result = std::panic::catch_unwind(|| {
        context::with_scope([("user", "mallory")], || panic!("body failed"));
    });
    assert!(result.is_err());
    assert_eq!(context::get("user").as_deref(), Some("alice"));
    context::remove("user");
}

#[test]
fn entries_are_sorted_copy() {
    context::with_scope([("b", "2"), ("a", "1")], || {
        let entries = context::entries();
        let keys: Vec<_> = entries.keys().cloned().collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(entries.get("a").map(String::as_str), Some("1"));
    });
}

// =============================================================================
// Cross-thread carry
// =============================================================================

#[test]
fn snapshot_does_not_leak_into_thread() {
    let snapshot = context::with_scope([("tenant", "acme")], Snapshot::capture);
    let handle = std::thread::spawn(move || {
        context::put("tenant", "local");
        let inside = snapshot.attach(|| context::get("tenant"));
        (inside, context::get("tenant"))
    });
    let (inside, after) = handle.join().unwrap();
    assert_eq!(inside.as_deref(), Some("acme"));
    assert_eq!(after.as_deref(), Some("local"));
}

#[test]
fn threads_start_empty() {
    context::put("tenant", "acme");
    let seen = std::thread::spawn(|| context::get("tenant")).join().unwrap();
    assert!(seen.is_none());
    context::remove("tenant");
}
