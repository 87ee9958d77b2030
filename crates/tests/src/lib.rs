//! # Integration Tests
//!
//! 跨 crate 的行为测试。
//!
//! 负责：
//! - serialization guard 的互斥、重入与顺序
//! - 各 flavor 的 EmitResult 约定
//! - 重试策略
//! - 配置 → 构建 → 发射 的端到端流程

/// 测试辅助：记录收到的信号
#[cfg(test)]
mod support {
    use std::sync::{Arc, Mutex};

    use contracts::{FnSubscriber, Subscriber};

    pub struct Seen<T> {
        pub values: Mutex<Vec<T>>,
        pub completed: Mutex<u32>,
        pub errored: Mutex<u32>,
    }

    impl<T: Clone + Send + Sync + 'static> Seen<T> {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                values: Mutex::new(Vec::new()),
                completed: Mutex::new(0),
                errored: Mutex::new(0),
            })
        }

        pub fn subscriber(self: &Arc<Self>) -> Arc<dyn Subscriber<T>> {
            let (v, c, e) = (Arc::clone(self), Arc::clone(self), Arc::clone(self));
            FnSubscriber::new(move |value: T| v.values.lock().unwrap().push(value))
                .on_complete(move || *c.completed.lock().unwrap() += 1)
                .on_error(move |_| *e.errored.lock().unwrap() += 1)
                .shared()
        }

        pub fn values(&self) -> Vec<T> {
            self.values.lock().unwrap().clone()
        }

        pub fn completed(&self) -> u32 {
            *self.completed.lock().unwrap()
        }

        pub fn errored(&self) -> u32 {
            *self.errored.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod guard_tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::time::Duration;

    use contracts::{
        Attr, AttrValue, Backoff, BusyLooping, ContractError, EmissionError, EmitResult, FailFast,
        HotStream, Many, ManySink, Scannable, SignalError, Subscribe, Subscriber, Subscription,
    };
    use dispatcher::{SerializedSink, Sinks};

    use crate::support::Seen;

    struct NoSource;

    impl Subscribe<u64> for NoSource {
        fn subscribe(&self, _subscriber: Arc<dyn Subscriber<u64>>) -> Subscription {
            Subscription::detached()
        }
    }

    /// Delegate that holds every call for `delay` and tracks overlap
    struct SlowSink {
        delay: Duration,
        inside: AtomicUsize,
        max_inside: AtomicUsize,
        entered: AtomicBool,
        applied: Mutex<Vec<u64>>,
    }

    impl SlowSink {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                inside: AtomicUsize::new(0),
                max_inside: AtomicUsize::new(0),
                entered: AtomicBool::new(false),
                applied: Mutex::new(Vec::new()),
            })
        }
    }

    impl Scannable for SlowSink {
        fn scan(&self, attr: Attr) -> Option<AttrValue> {
            match attr {
                Attr::Name => Some(AttrValue::Str("slow".to_string())),
                _ => None,
            }
        }
    }

    impl ManySink<u64> for SlowSink {
        fn try_emit_next(&self, value: u64) -> EmitResult {
            let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_inside.fetch_max(now, Ordering::SeqCst);
            self.entered.store(true, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.applied.lock().unwrap().push(value);
            self.inside.fetch_sub(1, Ordering::SeqCst);
            EmitResult::Ok
        }

        fn try_emit_complete(&self) -> EmitResult {
            EmitResult::Ok
        }

        fn try_emit_error(&self, _error: SignalError) -> EmitResult {
            EmitResult::Ok
        }

        fn current_subscriber_count(&self) -> usize {
            0
        }

        fn as_stream(&self) -> HotStream<u64> {
            HotStream::new(Arc::new(NoSource))
        }
    }

    #[test]
    fn test_concurrent_callers_are_mutually_excluded() {
        const PRODUCERS: usize = 4;
        const ATTEMPTS: u64 = 20;

        let slow = SlowSink::new(Duration::from_millis(2));
        let sink = Arc::new(SerializedSink::new(Arc::clone(&slow) as Many<u64>));
        let barrier = Arc::new(Barrier::new(PRODUCERS));

        let handles: Vec<_> = (0..PRODUCERS as u64)
            .map(|p| {
                let (sink, barrier) = (Arc::clone(&sink), Arc::clone(&barrier));
                std::thread::spawn(move || {
                    barrier.wait();
                    (0..ATTEMPTS)
                        .map(|i| sink.try_emit_next(p * 100 + i))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<EmitResult> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(slow.max_inside.load(Ordering::SeqCst), 1);
        let ok = results.iter().filter(|r| **r == EmitResult::Ok).count();
        let rejected = results
            .iter()
            .filter(|r| **r == EmitResult::FailNonSerialized)
            .count();
        assert_eq!(ok + rejected, PRODUCERS * ATTEMPTS as usize);
        assert!(rejected > 0);
        assert_eq!(slow.applied.lock().unwrap().len(), ok);
        assert_eq!(sink.guard_metrics().rejected, rejected as u64);
    }

    #[test]
    fn test_reentrant_emit_from_subscriber() {
        let sink = Sinks::many().multicast().direct_best_effort::<u32>();
        let seen = Seen::new();
        sink.as_stream().subscribe_unbounded(seen.subscriber());

        let inner_result = Arc::new(Mutex::new(None));
        let (s, r) = (Arc::clone(&sink), Arc::clone(&inner_result));
        let reemitter = contracts::FnSubscriber::new(move |v: u32| {
            if v == 1 {
                *r.lock().unwrap() = Some(s.try_emit_next(10));
            }
        })
        .shared();
        sink.as_stream().subscribe_unbounded(reemitter);

        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        assert_eq!(*inner_result.lock().unwrap(), Some(EmitResult::Ok));
        assert_eq!(seen.values(), vec![1, 10]);
    }

    /// Delegate that logs each admitted value, then forwards it
    struct AdmissionLog {
        admitted: Mutex<Vec<u64>>,
        delegate: Many<u64>,
    }

    impl Scannable for AdmissionLog {
        fn scan(&self, attr: Attr) -> Option<AttrValue> {
            self.delegate.scan(attr)
        }
    }

    impl ManySink<u64> for AdmissionLog {
        fn try_emit_next(&self, value: u64) -> EmitResult {
            self.admitted.lock().unwrap().push(value);
            std::thread::yield_now();
            self.delegate.try_emit_next(value)
        }

        fn try_emit_complete(&self) -> EmitResult {
            self.delegate.try_emit_complete()
        }

        fn try_emit_error(&self, error: SignalError) -> EmitResult {
            self.delegate.try_emit_error(error)
        }

        fn current_subscriber_count(&self) -> usize {
            self.delegate.current_subscriber_count()
        }

        fn as_stream(&self) -> HotStream<u64> {
            self.delegate.as_stream()
        }
    }

    #[test]
    fn test_application_order_matches_admission_order() {
        const PRODUCERS: u64 = 4;
        const ATTEMPTS: u64 = 250;

        let buffer = Sinks::many().unsafe_().replay().all::<u64>();
        let log = Arc::new(AdmissionLog {
            admitted: Mutex::new(Vec::new()),
            delegate: Arc::clone(&buffer),
        });
        let sink = Arc::new(SerializedSink::new(Arc::clone(&log) as Many<u64>));
        let barrier = Arc::new(Barrier::new(PRODUCERS as usize));

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let (sink, barrier) = (Arc::clone(&sink), Arc::clone(&barrier));
                std::thread::spawn(move || {
                    barrier.wait();
                    let spin = BusyLooping::new(Duration::from_secs(5));
                    for i in 0..ATTEMPTS {
                        sink.emit_next(p * 1_000 + i, &spin).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let seen = Seen::new();
        buffer.as_stream().subscribe_unbounded(seen.subscriber());
        let admitted = log.admitted.lock().unwrap().clone();

        assert_eq!(admitted.len(), (PRODUCERS * ATTEMPTS) as usize);
        assert_eq!(seen.values(), admitted);
    }

    #[test]
    fn test_busy_looping_retries_until_admitted() {
        let slow = SlowSink::new(Duration::from_millis(50));
        let sink = Arc::new(SerializedSink::new(Arc::clone(&slow) as Many<u64>));

        let holder = {
            let sink = Arc::clone(&sink);
            std::thread::spawn(move || sink.try_emit_next(1))
        };
        while !slow.entered.load(Ordering::SeqCst) {
            std::hint::spin_loop();
        }

        let outcome = sink.emit_next(2, &BusyLooping::new(Duration::from_secs(5)));
        assert!(outcome.is_ok());
        assert_eq!(holder.join().unwrap(), EmitResult::Ok);
        assert_eq!(*slow.applied.lock().unwrap(), vec![1, 2]);
        assert!(sink.scan_usize(Attr::Rejected).unwrap() >= 1);
    }

    /// Spawn a call that stays inside the guard for `slow.delay`
    fn hold_guard(
        slow: &Arc<SlowSink>,
        sink: &Arc<SerializedSink<u64>>,
    ) -> std::thread::JoinHandle<EmitResult> {
        let holder = {
            let sink = Arc::clone(sink);
            std::thread::spawn(move || sink.try_emit_next(1))
        };
        while !slow.entered.load(Ordering::SeqCst) {
            std::hint::spin_loop();
        }
        holder
    }

    #[test]
    fn test_backoff_sleeps_until_admitted() {
        let slow = SlowSink::new(Duration::from_millis(50));
        let sink = Arc::new(SerializedSink::new(Arc::clone(&slow) as Many<u64>));
        let holder = hold_guard(&slow, &sink);

        let backoff = Backoff {
            first: Duration::from_millis(1),
            max: Duration::from_millis(5),
            factor: 2.0,
            max_attempts: 1_000,
        };
        assert!(sink.emit_next(2, &backoff).is_ok());
        assert_eq!(holder.join().unwrap(), EmitResult::Ok);
        assert_eq!(*slow.applied.lock().unwrap(), vec![1, 2]);
        assert!(sink.scan_usize(Attr::Rejected).unwrap() >= 1);
    }

    #[test]
    fn test_fail_fast_surfaces_contention() {
        let slow = SlowSink::new(Duration::from_millis(200));
        let sink = Arc::new(SerializedSink::new(Arc::clone(&slow) as Many<u64>));
        let holder = hold_guard(&slow, &sink);

        let err = sink.emit_next(2, &FailFast).unwrap_err();
        assert_eq!(err, EmissionError::new(EmitResult::FailNonSerialized, 1));

        let boom = ContractError::Other("boom".into()).into_signal();
        let err = sink.emit_error(Arc::clone(&boom), &FailFast).unwrap_err();
        assert_eq!(err.result, EmitResult::FailNonSerialized);

        assert_eq!(holder.join().unwrap(), EmitResult::Ok);
        assert_eq!(*slow.applied.lock().unwrap(), vec![1]);

        // guard released: the same error now goes through
        assert!(sink.emit_error(boom, &Backoff::default()).is_ok());
        assert_eq!(sink.scan_usize(Attr::Rejected), Some(2));
    }
}

#[cfg(test)]
mod flavor_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{
        Attr, ContractError, EmissionError, EmitResult, FailFast, Many, ManySink, ManualClock,
        Scannable,
    };
    use dispatcher::{QueueDiscipline, Sinks};

    use crate::support::Seen;

    #[test]
    fn test_replay_limit_late_subscriber_sees_last_two() {
        let sink = Sinks::many().replay().limit::<&str>(2);
        for v in ["A", "B", "C"] {
            assert_eq!(sink.try_emit_next(v), EmitResult::Ok);
        }

        let late = Seen::new();
        sink.as_stream().subscribe_unbounded(late.subscriber());
        assert_eq!(late.values(), vec!["B", "C"]);
    }

    #[test]
    fn test_all_or_nothing_with_one_idle_subscriber() {
        let sink = Sinks::many().multicast().direct_all_or_nothing::<u32>();
        let ready = Seen::new();
        let idle = Seen::new();
        sink.as_stream().subscribe_unbounded(ready.subscriber());
        sink.as_stream().subscribe(idle.subscriber());

        assert_eq!(sink.try_emit_next(1), EmitResult::FailOverflow);
        assert!(ready.values().is_empty());
        assert!(idle.values().is_empty());
    }

    #[test]
    fn test_best_effort_with_one_idle_subscriber() {
        let sink = Sinks::many().multicast().direct_best_effort::<u32>();
        let ready = Seen::new();
        let idle = Seen::new();
        sink.as_stream().subscribe_unbounded(ready.subscriber());
        let idle_subscription = sink.as_stream().subscribe(idle.subscriber());

        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        assert_eq!(ready.values(), vec![1]);

        // no buffering: later demand does not resurrect the dropped value
        idle_subscription.request(1);
        assert!(idle.values().is_empty());
    }

    #[test]
    fn test_terminated_sink_has_no_side_effects() {
        let sink = Sinks::many().replay().limit::<u32>(4);
        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        assert_eq!(sink.try_emit_complete(), EmitResult::Ok);

        assert_eq!(sink.try_emit_next(2), EmitResult::FailTerminated);
        let error = ContractError::Other("replay".into()).into_signal();
        assert_eq!(sink.try_emit_error(error), EmitResult::FailTerminated);
        assert_eq!(sink.try_emit_complete(), EmitResult::FailTerminated);

        let late = Seen::new();
        sink.as_stream().subscribe_unbounded(late.subscriber());
        assert_eq!(late.values(), vec![1]);
        assert_eq!(late.completed(), 1);
        assert_eq!(late.errored(), 0);
    }

    /// Emit script shared by the safe and unsafe runs
    fn script(sink: &Many<u32>) -> (Vec<EmitResult>, Vec<u32>, u32) {
        let mut results = vec![
            sink.try_emit_next(1),
            sink.try_emit_next(2),
            sink.try_emit_next(3),
        ];
        let seen = Seen::new();
        sink.as_stream().subscribe_unbounded(seen.subscriber());
        results.push(sink.try_emit_next(4));
        results.push(sink.try_emit_complete());
        results.push(sink.try_emit_next(5));
        (results, seen.values(), seen.completed())
    }

    #[test]
    fn test_unsafe_matches_safe_on_one_thread() {
        let safe = Sinks::many().multicast().on_backpressure_buffer_sized::<u32>(2);
        let unsafe_ = Sinks::many()
            .unsafe_()
            .multicast()
            .on_backpressure_buffer_sized::<u32>(2);

        let expected = (
            vec![
                EmitResult::Ok,
                EmitResult::Ok,
                EmitResult::FailOverflow,
                EmitResult::Ok,
                EmitResult::Ok,
                EmitResult::FailTerminated,
            ],
            vec![1, 2, 4],
            1,
        );
        assert_eq!(script(&safe), expected);
        assert_eq!(script(&unsafe_), expected);
        assert_eq!(safe.scan_usize(Attr::Rejected), Some(0));
        assert_eq!(unsafe_.scan_usize(Attr::Rejected), None);
    }

    #[test]
    fn test_unicast_bounded_overflow_and_end_callback() {
        let ended = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ended);
        let sink = Sinks::many().unicast().on_backpressure_buffer_with_callback::<u32>(
            QueueDiscipline::Bounded(2),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(2), EmitResult::Ok);
        assert_eq!(sink.try_emit_next(3), EmitResult::FailOverflow);
        assert_eq!(sink.try_emit_complete(), EmitResult::Ok);
        assert_eq!(ended.load(Ordering::SeqCst), 0);

        let seen = Seen::new();
        sink.as_stream().subscribe_unbounded(seen.subscriber());
        assert_eq!(seen.values(), vec![1, 2]);
        assert_eq!(seen.completed(), 1);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unicast_no_backpressure_results() {
        let sink = Sinks::many().unicast().on_backpressure_error::<u32>();
        assert_eq!(sink.try_emit_next(1), EmitResult::FailZeroSubscriber);

        let seen = Seen::new();
        let subscription = sink.as_stream().subscribe(seen.subscriber());
        assert_eq!(sink.try_emit_next(2), EmitResult::FailOverflow);

        subscription.request(1);
        assert_eq!(sink.try_emit_next(3), EmitResult::Ok);
        assert_eq!(seen.values(), vec![3]);
    }

    #[test]
    fn test_multicast_auto_cancel_after_last_subscriber() {
        let sink = Sinks::many().multicast().on_backpressure_buffer_sized::<u32>(2);
        let seen = Seen::new();
        let subscription = sink.as_stream().subscribe_unbounded(seen.subscriber());
        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);

        subscription.cancel();
        assert_eq!(sink.try_emit_next(2), EmitResult::FailCancelled);
        assert_eq!(sink.scan(Attr::Cancelled).map(|v| v.to_string()), Some("true".to_string()));
    }

    #[test]
    fn test_replay_age_eviction_with_manual_clock() {
        let clock = ManualClock::new();
        let sink = Sinks::many().replay().limit_age_with::<u32>(
            Duration::from_secs(1),
            clock.clone(),
            None,
        );
        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        clock.advance(Duration::from_millis(600));
        assert_eq!(sink.try_emit_next(2), EmitResult::Ok);
        clock.advance(Duration::from_millis(600));

        let late = Seen::new();
        sink.as_stream().subscribe_unbounded(late.subscriber());
        assert_eq!(late.values(), vec![2]);
    }

    #[test]
    fn test_latest_or_default_before_first_emission() {
        let sink = Sinks::many().replay().latest_or_default::<u32>(0);
        let early = Seen::new();
        sink.as_stream().subscribe_unbounded(early.subscriber());
        assert_eq!(early.values(), vec![0]);

        assert_eq!(sink.try_emit_next(5), EmitResult::Ok);
        let late = Seen::new();
        sink.as_stream().subscribe_unbounded(late.subscriber());
        assert_eq!(late.values(), vec![5]);
        assert_eq!(early.values(), vec![0, 5]);
    }

    #[test]
    fn test_fail_fast_surfaces_failure() {
        let sink = Sinks::many().unicast().on_backpressure_error::<u32>();
        let err = sink.emit_next(1, &FailFast).unwrap_err();
        assert_eq!(err, EmissionError::new(EmitResult::FailZeroSubscriber, 1));
    }
}

#[cfg(test)]
mod config_e2e_tests {
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{Attr, EmitResult, ManySink, Scannable};
    use observability::EmissionAggregator;

    use crate::support::Seen;

    const SINKS_TOML: &str = r#"
[[sinks]]
name = "history"
flavor = "replay_limit"
history_size = 2

[[sinks]]
name = "fanout"
mode = "unsafe"
flavor = "direct_all_or_nothing"
"#;

    #[test]
    fn test_toml_to_emission() {
        let blueprint = ConfigLoader::load_from_str(SINKS_TOML, ConfigFormat::Toml).unwrap();
        let sinks = dispatcher::build_all::<String>(&blueprint).unwrap();
        assert_eq!(sinks.len(), 2);

        let (name, history) = &sinks[0];
        assert_eq!(name, "history");
        let mut aggregator = EmissionAggregator::new();
        for v in ["a", "b", "c"] {
            aggregator.update(name, history.try_emit_next(v.to_string()), None);
        }
        let late = Seen::new();
        history.as_stream().subscribe_unbounded(late.subscriber());
        assert_eq!(late.values(), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(aggregator.tally(name).unwrap().count(EmitResult::Ok), 3);
        assert_eq!(history.scan_usize(Attr::Rejected), Some(0));

        let (_, fanout) = &sinks[1];
        assert_eq!(
            fanout.try_emit_next("x".to_string()),
            EmitResult::FailZeroSubscriber
        );
        assert_eq!(fanout.scan_usize(Attr::Rejected), None);
    }

    #[test]
    fn test_json_latest_default_value() {
        let blueprint = ConfigLoader::load_from_str(
            r#"{ "sinks": [ { "name": "level", "flavor": "replay_latest", "default_value": 3 } ] }"#,
            ConfigFormat::Json,
        )
        .unwrap();
        let sink = dispatcher::build_from_config::<u8>(&blueprint.sinks[0]).unwrap();

        let seen = Seen::new();
        sink.as_stream().subscribe_unbounded(seen.subscriber());
        assert_eq!(seen.values(), vec![3]);
    }

    #[test]
    fn test_invalid_config_never_builds() {
        let result = ConfigLoader::load_from_str(
            r#"
[[sinks]]
name = "events"
flavor = "multicast"
buffer_size = 0
"#,
            ConfigFormat::Toml,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_scheduled_eviction_from_config() {
        let blueprint = ConfigLoader::load_from_str(
            r#"
[[sinks]]
name = "recent"
flavor = "replay_limit"
max_age_ms = 20
scheduled_eviction = true
"#,
            ConfigFormat::Toml,
        )
        .unwrap();
        let sink = dispatcher::build_from_config::<u32>(&blueprint.sinks[0]).unwrap();

        assert_eq!(sink.try_emit_next(1), EmitResult::Ok);
        assert_eq!(sink.scan_usize(Attr::Buffered), Some(1));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.scan_usize(Attr::Buffered), Some(0));
    }

    #[test]
    fn test_scheduled_eviction_outside_runtime_is_rejected() {
        let blueprint = ConfigLoader::load_from_str(
            r#"
[[sinks]]
name = "recent"
flavor = "replay_limit"
max_age_ms = 20
scheduled_eviction = true
"#,
            ConfigFormat::Toml,
        )
        .unwrap();
        let err = dispatcher::build_from_config::<u32>(&blueprint.sinks[0])
            .err()
            .unwrap();
        assert!(matches!(err, dispatcher::DispatcherError::NoScheduler { .. }));
    }
}
