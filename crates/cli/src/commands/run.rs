//! `run` command implementation.
//!
//! Builds every configured sink for `u64` values, attaches unbounded
//! subscribers, then emits from several producer threads at once. Safe sinks
//! reject contended calls with `FAIL_NON_SERIALIZED`; those show up in the
//! per-sink tallies next to the delivered count.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use contracts::{Attr, EmitResult, FnSubscriber, Many, Scannable, Subscription};
use observability::{
    record_emission, record_emit_latency_us, record_subscriber_count, EmissionAggregator,
};
use tracing::{debug, info, instrument, warn};

use super::load_blueprint;
use crate::cli::RunArgs;
use crate::error::CliError;

/// What one sink saw during a run
#[derive(Debug, Default)]
struct SinkRun {
    delivered: u64,
    completed: u64,
    errored: u64,
    guard_rejections: Option<usize>,
    complete_result: Option<EmitResult>,
}

/// Execute the `run` command
pub fn run_sinks(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");
    let blueprint = load_blueprint(&args.config)?;

    let mut report = EmissionAggregator::new();
    let mut runs = Vec::with_capacity(blueprint.sinks.len());

    for config in &blueprint.sinks {
        let sink = dispatcher::build_from_config::<u64>(config)
            .map_err(|e| CliError::sink_build(&config.name, e))?;
        let run = drive_sink(&config.name, &sink, args, &mut report)?;
        runs.push((config.name.clone(), run));
    }

    print!("{}", report.summary());
    for (name, run) in &runs {
        println!(
            "{}: delivered={} completed={} errored={} complete={} guard_rejections={}",
            name,
            run.delivered,
            run.completed,
            run.errored,
            run.complete_result.map_or("-", EmitResult::as_str),
            run.guard_rejections
                .map_or_else(|| "n/a".to_string(), |n| n.to_string()),
        );
    }

    Ok(())
}

#[instrument(
    name = "sinkctl_drive_sink",
    skip(sink, args, report),
    fields(producers = args.producers, values = args.values)
)]
fn drive_sink(
    name: &str,
    sink: &Many<u64>,
    args: &RunArgs,
    report: &mut EmissionAggregator,
) -> Result<SinkRun, CliError> {
    let delivered = Arc::new(AtomicU64::new(0));
    let completed = Arc::new(AtomicU64::new(0));
    let errored = Arc::new(AtomicU64::new(0));

    let subscriptions: Vec<Subscription> = (0..args.subscribers)
        .map(|_| {
            let (d, c, e) = (
                Arc::clone(&delivered),
                Arc::clone(&completed),
                Arc::clone(&errored),
            );
            let subscriber = FnSubscriber::new(move |_: u64| {
                d.fetch_add(1, Ordering::Relaxed);
            })
            .on_complete(move || {
                c.fetch_add(1, Ordering::Relaxed);
            })
            .on_error(move |_| {
                e.fetch_add(1, Ordering::Relaxed);
            })
            .shared();
            sink.as_stream().subscribe_unbounded(subscriber)
        })
        .collect();
    record_subscriber_count(name, sink.current_subscriber_count());
    debug!(
        subscribers = sink.current_subscriber_count(),
        "subscribers attached"
    );

    let per_thread = std::thread::scope(|s| {
        let handles: Vec<_> = (0..args.producers)
            .map(|index| s.spawn(move || produce(name, sink, index as u64, args.values)))
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| {
                handle
                    .join()
                    .map_err(|_| CliError::producer_panicked(name, index))
            })
            .collect::<Result<Vec<_>, _>>()
    })?;

    for local in &per_thread {
        if let Some(tally) = local.tally(name) {
            report.merge(name, tally);
        }
    }

    let complete_result = sink.try_emit_complete();
    record_emission(name, complete_result);
    if complete_result.is_failure() {
        warn!(sink = name, result = %complete_result, "completion not accepted");
    }

    let run = SinkRun {
        delivered: delivered.load(Ordering::Relaxed),
        completed: completed.load(Ordering::Relaxed),
        errored: errored.load(Ordering::Relaxed),
        guard_rejections: sink.scan_usize(Attr::Rejected),
        complete_result: Some(complete_result),
    };
    for subscription in &subscriptions {
        subscription.cancel();
    }
    Ok(run)
}

/// One producer thread: emit `values` values and tally every result
fn produce(name: &str, sink: &Many<u64>, index: u64, values: u64) -> EmissionAggregator {
    let mut local = EmissionAggregator::new();
    let base = index * values;

    for offset in 0..values {
        let started = Instant::now();
        let result = sink.try_emit_next(base + offset);
        let latency_us = started.elapsed().as_secs_f64() * 1_000_000.0;

        record_emission(name, result);
        record_emit_latency_us(name, latency_us);
        local.update(name, result, Some(latency_us));
    }

    local
}
