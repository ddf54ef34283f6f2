//! Async guards and context propagation across tasks.

use std::sync::Arc;
use std::time::Duration;

use autolog::context::{self, Snapshot, CORRELATION_ID_KEY};
use autolog::engine::CANCELLED;
use autolog::metrics::{METHOD_DURATION, STEP_DURATION};
use autolog::template::Phase;
use autolog::{Args, AutoLogAttrs, AutoLogConfig, CallSite, Interceptor, MemorySink, MetricsStore, StepSpec};

fn setup() -> (Arc<Interceptor>, Arc<MemorySink>, Arc<MetricsStore>) {
    let sink = Arc::new(MemorySink::new());
    let store = Arc::new(MetricsStore::new());
    let interceptor = Interceptor::builder(AutoLogConfig {
        metrics_enabled: true,
        ..Default::default()
    })
    .sink(sink.clone())
    .metrics_sink(store.clone())
    .build();
    (Arc::new(interceptor), sink, store)
}

fn site(method: &str) -> CallSite {
    CallSite::new("app::jobs", "Worker", method).type_attrs(AutoLogAttrs::new())
}

#[tokio::test]
async fn guard_async_emits_entry_and_exit() {
    let (interceptor, sink, store) = setup();
    let spec = interceptor.resolve(&site("run"));

    let out: Result<u32, String> = interceptor
        .guard_async(&spec, &Args::new().arg("job", "sync"), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(9)
        })
        .await;

    assert_eq!(out, Ok(9));
    let phases: Vec<Phase> = sink.records().iter().map(|r| r.phase).collect();
    assert_eq!(phases, vec![Phase::Entry, Phase::Exit]);
    assert!(store.samples_for(METHOD_DURATION)[0].duration >= Duration::from_millis(5));
}

#[tokio::test]
async fn guard_async_passes_error_through() {
    let (interceptor, sink, store) = setup();
    let spec = interceptor.resolve(&site("run"));

    let out: Result<(), String> = interceptor
        .guard_async(&spec, &Args::new(), async { Err("queue closed".to_string()) })
        .await;

    assert_eq!(out, Err("queue closed".to_string()));
    assert_eq!(sink.phase(Phase::Error)[0].message, "[ERROR] Worker.run exception=queue closed");
    assert!(!store.samples_for(METHOD_DURATION)[0].success);
}

#[tokio::test]
async fn async_steps_nest_inside_async_call() {
    let (interceptor, sink, store) = setup();
    let spec = interceptor.resolve(&site("run"));
    let fetch = StepSpec::new("Worker.fetch", "Fetching batch").log_args(true);

    let out: Result<usize, String> = interceptor
        .guard_async(&spec, &Args::new(), async {
            let batch = interceptor
                .step_async(&fetch, &Args::new().arg("size", 3), async {
                    tokio::task::yield_now().await;
                    Ok::<_, String>(vec![1, 2, 3])
                })
                .await?;
            Ok::<_, String>(batch.len())
        })
        .await;

    assert_eq!(out, Ok(3));
    let phases: Vec<Phase> = sink.records().iter().map(|r| r.phase).collect();
    assert_eq!(phases, vec![Phase::Entry, Phase::StepEntry, Phase::Step, Phase::Exit]);
    assert_eq!(store.samples_for(STEP_DURATION).len(), 1);
}

#[tokio::test]
async fn closed_gate_silences_async_steps() {
    let (interceptor, sink, _) = setup();
    let spec = interceptor.resolve(&site("run").method_attrs(AutoLogAttrs::new().condition("#verbose == true")));
    let step = StepSpec::new("Worker.fetch", "Fetching batch");

    let out: Result<i32, String> = interceptor
        .guard_async(&spec, &Args::new().arg("verbose", false), async {
            interceptor.step_async(&step, &Args::new(), async { Ok(1) }).await
        })
        .await;

    assert_eq!(out, Ok(1));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn dropped_call_is_reported_cancelled() {
    let (interceptor, sink, store) = setup();
    let spec = interceptor.resolve(&site("slow"));

    let args = Args::new();
    let slow = interceptor.guard_async(&spec, &args, async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok::<_, String>(())
    });
    let timed_out = tokio::time::timeout(Duration::from_millis(10), slow).await;

    assert!(timed_out.is_err());
    let errors = sink.phase(Phase::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.ends_with(CANCELLED));
    assert!(!store.samples_for(METHOD_DURATION)[0].success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawned_tasks_keep_their_own_correlation_id() {
    let (interceptor, sink, _) = setup();
    let spec = Arc::new(interceptor.resolve(&site("handle")));

    let mut handles = Vec::new();
    for i in 0..8 {
        let interceptor = interceptor.clone();
        let spec = spec.clone();
        let id = format!("req-{}", i);
        let snapshot = context::with_correlation_id(Some(id.as_str()), Snapshot::capture);
        handles.push(tokio::spawn(snapshot.scope(async move {
            let _: Result<(), String> = interceptor
                .guard_async(&spec, &Args::new(), async {
                    tokio::task::yield_now().await;
                    Ok(())
                })
                .await;
            context::get(CORRELATION_ID_KEY)
        })));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), Some(format!("req-{}", i)));
    }

    let records = sink.records();
    assert_eq!(records.len(), 16);
    for i in 0..8 {
        let id = format!("req-{}", i);
        let phases: Vec<Phase> = records.iter().filter(|r| r.request_id == id).map(|r| r.phase).collect();
        assert_eq!(phases, vec![Phase::Entry, Phase::Exit]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn bare_tasks_do_not_share_a_correlation_id() {
    let (interceptor, sink, _) = setup();
    let spec = Arc::new(interceptor.resolve(&site("handle")));

    let mut leftovers = Vec::new();
    for _ in 0..2 {
        let interceptor = interceptor.clone();
        let spec = spec.clone();
        let leftover = tokio::spawn(async move {
            let _: Result<(), String> = interceptor.guard_async(&spec, &Args::new(), async { Ok(()) }).await;
            context::get(CORRELATION_ID_KEY)
        })
        .await
        .unwrap();
        leftovers.push(leftover);
    }

    assert_eq!(leftovers, vec![None, None]);
    let entries = sink.phase(Phase::Entry);
    let exits = sink.phase(Phase::Exit);
    assert_eq!(entries.len(), 2);
    assert_ne!(entries[0].request_id, entries[1].request_id);
    assert_eq!(exits[0].request_id, entries[0].request_id);
    assert_eq!(exits[1].request_id, entries[1].request_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn bare_step_leaves_no_id_on_the_worker() {
    let (interceptor, sink, _) = setup();
    let step = StepSpec::new("Worker.warm", "Warming cache").log_args(true);

    let leftover = tokio::spawn({
        let interceptor = interceptor.clone();
        async move {
            let _: Result<(), String> = interceptor.step_async(&step, &Args::new(), async { Ok(()) }).await;
            context::get(CORRELATION_ID_KEY)
        }
    })
    .await
    .unwrap();

    assert!(leftover.is_none());
    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].request_id, records[1].request_id);
}

#[tokio::test]
async fn calls_in_one_instrumented_task_share_the_generated_id() {
    let (interceptor, sink, _) = setup();
    let spec = interceptor.resolve(&site("handle"));

    let seen = context::instrument(async {
        for _ in 0..2 {
            let _: Result<(), String> = interceptor.guard_async(&spec, &Args::new(), async { Ok(()) }).await;
        }
        context::get(CORRELATION_ID_KEY)
    })
    .await;

    let entries = sink.phase(Phase::Entry);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].request_id, entries[1].request_id);
    assert_eq!(seen.as_deref(), Some(entries[0].request_id.as_str()));
    assert!(context::get(CORRELATION_ID_KEY).is_none());
}

#[tokio::test]
async fn skipped_call_keeps_context_writes() {
    let (interceptor, sink, _) = setup();
    let spec = interceptor.resolve(&site("run").method_attrs(AutoLogAttrs::new().condition("#verbose == true")));

    let out: Result<(), String> = interceptor
        .guard_async(&spec, &Args::new().arg("verbose", false), async {
            context::put("tenant", "acme");
            Ok(())
        })
        .await;

    assert_eq!(out, Ok(()));
    assert_eq!(context::get("tenant").as_deref(), Some("acme"));
    assert!(sink.is_empty());
    context::remove("tenant");
}

#[tokio::test]
async fn instrument_keeps_writes_off_the_worker_thread() {
    context::remove("tenant");
    let fut = context::instrument(async {
        context::put("tenant", "acme");
        tokio::task::yield_now().await;
        context::get("tenant")
    });
    assert_eq!(fut.await.as_deref(), Some("acme"));
    assert!(context::get("tenant").is_none());
}
