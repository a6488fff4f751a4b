//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - store + controller + ingestion 的模拟 e2e 测试（无需真实设备）
//! - 重启后状态保持

#[cfg(test)]
mod contract_tests {
    use contracts::{Grid, Source, GRID_COLS, GRID_ROWS};

    #[test]
    fn test_grid_wire_format() {
        let mut rows = [[0u8; GRID_COLS]; GRID_ROWS];
        rows[5][21] = 71;
        let grid = Grid::from_rows(rows).unwrap();

        let json = serde_json::to_value(grid).unwrap();
        let decoded: Vec<Vec<i64>> = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(decoded.len(), 6);
        assert!(decoded.iter().all(|row| row.len() == 22));
        assert_eq!(decoded[5][21], 71);

        assert!(serde_json::from_str::<Grid>("[[72]]").is_err());
    }

    #[test]
    fn test_source_labels_are_stable() {
        let labels: Vec<_> = Source::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(labels, ["webhook", "custom", "hello", "bluesky"]);
        assert_eq!(serde_json::to_value(Source::Bluesky).unwrap(), "bluesky");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use contracts::{
        DeliveryError, DeliveryTransport, DispatchConfig, FormatError, Grid, ManualClock, MessageId,
        PayloadFormatter, Source, StoreConfig, VbmlMessage,
    };
    use dispatcher::{DispatchController, TickOutcome};
    use ingestion::{AcceptAll, IngestionPipeline};
    use observability::InMemoryMetrics;
    use queue_store::PersistentQueueStore;
    use tokio::sync::watch;

    /// Fails every grid whose first cell is in `failing_codes`
    #[derive(Default)]
    struct BoardMock {
        delivered: Mutex<Vec<u8>>,
        history: Mutex<Vec<((u8, u8), Instant)>>,
        calls: AtomicU32,
        failing_codes: HashSet<u8>,
    }

    impl BoardMock {
        fn failing(codes: &[u8]) -> Self {
            Self {
                failing_codes: codes.iter().copied().collect(),
                ..Self::default()
            }
        }

        fn delivered(&self) -> Vec<u8> {
            self.delivered.lock().unwrap().clone()
        }

        /// First two cells and arrival time of every delivered grid
        fn history(&self) -> Vec<((u8, u8), Instant)> {
            self.history.lock().unwrap().clone()
        }
    }

    impl DeliveryTransport for BoardMock {
        fn name(&self) -> &str {
            "board-mock"
        }

        async fn deliver(&self, grid: &Grid) -> Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let code = grid.cell(0, 0).unwrap_or_default();
            if self.failing_codes.contains(&code) {
                return Err(DeliveryError::transient("board offline"));
            }
            self.delivered.lock().unwrap().push(code);
            let second = grid.cell(0, 1).unwrap_or_default();
            self.history.lock().unwrap().push(((code, second), Instant::now()));
            Ok(())
        }
    }

    /// Puts the text length in the first cell
    #[derive(Default)]
    struct LengthFormatter {
        calls: AtomicU32,
    }

    impl PayloadFormatter for LengthFormatter {
        async fn format(&self, message: &VbmlMessage) -> Result<Grid, FormatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(grid_with(message.text().chars().count() as u8))
        }
    }

    fn grid_with(code: u8) -> Grid {
        grid_pair(code, 0)
    }

    fn grid_pair(first: u8, second: u8) -> Grid {
        let mut rows = [[0u8; 22]; 6];
        rows[0][0] = first;
        rows[0][1] = second;
        Grid::from_rows(rows).unwrap()
    }

    fn dispatch_config(tick_interval_ms: u64) -> DispatchConfig {
        DispatchConfig {
            tick_interval_ms,
            rate_limit_ms: 0,
            inline_retries: 1,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }

    struct Harness {
        clock: Arc<ManualClock>,
        metrics: Arc<InMemoryMetrics>,
        store: Arc<PersistentQueueStore>,
        transport: Arc<BoardMock>,
        controller: Arc<DispatchController<BoardMock>>,
    }

    impl Harness {
        fn in_memory(max_attempts: u32, transport: BoardMock) -> Self {
            let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
            let metrics = Arc::new(InMemoryMetrics::new());
            let store = Arc::new(
                PersistentQueueStore::open_in_memory(max_attempts, clock.clone(), metrics.clone()).unwrap(),
            );
            Self::with_store(clock, metrics, store, transport, 20)
        }

        fn with_store(
            clock: Arc<ManualClock>,
            metrics: Arc<InMemoryMetrics>,
            store: Arc<PersistentQueueStore>,
            transport: BoardMock,
            tick_interval_ms: u64,
        ) -> Self {
            let transport = Arc::new(transport);
            let controller = Arc::new(DispatchController::new(
                Arc::clone(&store),
                Arc::clone(&transport),
                &dispatch_config(tick_interval_ms),
                metrics.clone(),
            ));
            Self {
                clock,
                metrics,
                store,
                transport,
                controller,
            }
        }

        fn enqueue(&self, code: u8, source: Source) -> MessageId {
            self.clock.advance(chrono::Duration::seconds(1));
            self.store.enqueue(grid_with(code), source, None).unwrap().id
        }
    }

    /// Producer -> store -> controller -> device, with metrics
    #[tokio::test]
    async fn test_e2e_ingest_and_dispatch() {
        let h = Harness::in_memory(3, BoardMock::default());
        let pipeline = IngestionPipeline::new(
            Arc::clone(&h.store),
            LengthFormatter::default(),
            AcceptAll,
            h.metrics.clone(),
        );

        for (text, source) in [("A", Source::Webhook), ("BB", Source::Custom), ("CCC", Source::Bluesky)] {
            h.clock.advance(chrono::Duration::seconds(1));
            pipeline.submit_text(text, source, None).await.unwrap();
        }
        assert_eq!(h.store.stats().unwrap().unsent, 3);

        for _ in 0..3 {
            assert!(matches!(h.controller.tick().await.unwrap(), TickOutcome::Sent { .. }));
        }
        assert_eq!(h.controller.tick().await.unwrap(), TickOutcome::Idle);
        assert_eq!(h.transport.delivered(), vec![1, 2, 3]);

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.enqueued, 3);
        assert_eq!(snapshot.sent, 3);
        assert_eq!(snapshot.filter_accepted, 3);
        assert_eq!(snapshot.stats.unsent, 0);
        assert_eq!(snapshot.stats.total, 3);
        assert_eq!(h.metrics.sent(Source::Webhook), 1);
    }

    /// A fails until evicted, then B and C go out in order
    #[tokio::test]
    async fn test_e2e_failing_head_is_evicted() {
        let h = Harness::in_memory(2, BoardMock::failing(&[1]));
        let a = h.enqueue(1, Source::Webhook);
        let b = h.enqueue(2, Source::Webhook);
        let c = h.enqueue(3, Source::Custom);

        assert_eq!(
            h.controller.tick().await.unwrap(),
            TickOutcome::Failed { id: a.clone(), attempts: 1 }
        );
        assert_eq!(
            h.controller.tick().await.unwrap(),
            TickOutcome::Evicted { id: a.clone(), attempts: 2 }
        );
        assert_eq!(h.controller.tick().await.unwrap(), TickOutcome::Sent { id: b });
        assert_eq!(h.controller.tick().await.unwrap(), TickOutcome::Sent { id: c });

        let record = h.store.get_by_id(&a).unwrap().unwrap();
        assert!(record.sent && record.evicted);
        assert_eq!(h.transport.delivered(), vec![2, 3]);

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.send_failures, 2);
        assert_eq!(snapshot.evicted, 1);
        assert_eq!(snapshot.stats.evicted, 1);
        assert_eq!(snapshot.api_errors.get("send"), Some(&2));
    }

    /// Lock refuses automated producers only, pause stops dispatch only
    #[tokio::test]
    async fn test_e2e_control_plane() {
        let h = Harness::in_memory(3, BoardMock::default());
        let formatter = LengthFormatter::default();
        let pipeline = IngestionPipeline::new(Arc::clone(&h.store), formatter, AcceptAll, h.metrics.clone());

        h.store.lock(Some("live demo".into())).unwrap();
        let err = pipeline.submit_text("HELLO", Source::Webhook, None).await.unwrap_err();
        assert!(err.is_locked());
        pipeline.submit_text("HELLO", Source::Hello, None).await.unwrap();
        assert_eq!(h.metrics.snapshot().lockouts, 1);

        h.store.pause_queue().unwrap();
        assert_eq!(h.controller.tick().await.unwrap(), TickOutcome::Paused);
        // 暂停时入队不受影响
        pipeline.submit_text("WORLD", Source::Custom, None).await.unwrap();
        assert_eq!(h.store.stats().unwrap().unsent, 2);

        h.store.unlock().unwrap();
        h.store.resume_queue().unwrap();
        pipeline.submit_text("LATER", Source::Bluesky, None).await.unwrap();

        for _ in 0..3 {
            assert!(matches!(h.controller.tick().await.unwrap(), TickOutcome::Sent { .. }));
        }
        assert!(h.transport.delivered().iter().all(|&code| code == 5));
        assert_eq!(h.metrics.snapshot().pauses, 1);
    }

    #[tokio::test]
    async fn test_e2e_reprioritized_record_goes_next() {
        let h = Harness::in_memory(3, BoardMock::default());
        h.enqueue(1, Source::Webhook);
        h.enqueue(2, Source::Webhook);
        let urgent = h.enqueue(3, Source::Custom);

        h.store.reprioritize(&urgent).unwrap();
        assert_eq!(h.controller.tick().await.unwrap(), TickOutcome::Sent { id: urgent });

        h.controller.tick().await.unwrap();
        h.controller.tick().await.unwrap();
        assert_eq!(h.transport.delivered(), vec![3, 1, 2]);
    }

    /// Queue contents and control flags persist across a restart
    #[tokio::test]
    async fn test_e2e_restart_survival() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: dir.path().join("queue.db"),
            ..StoreConfig::default()
        };
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));

        let (first, second) = {
            let h = Harness::with_store(
                clock.clone(),
                Arc::new(InMemoryMetrics::new()),
                Arc::new(PersistentQueueStore::open(&config, clock.clone(), Arc::new(InMemoryMetrics::new())).unwrap()),
                BoardMock::failing(&[1]),
                20,
            );
            let first = h.enqueue(1, Source::Webhook);
            let second = h.enqueue(2, Source::Custom);

            // 先失败一次，再暂停并加锁
            let outcome = h.controller.tick().await.unwrap();
            assert_eq!(outcome, TickOutcome::Failed { id: first.clone(), attempts: 1 });
            h.store.pause_queue().unwrap();
            h.store.lock(Some("maintenance".into())).unwrap();
            h.store.flush().unwrap();
            (first, second)
        };

        let metrics = Arc::new(InMemoryMetrics::new());
        let store = Arc::new(PersistentQueueStore::open(&config, clock.clone(), metrics.clone()).unwrap());
        let h = Harness::with_store(clock, metrics, store, BoardMock::default(), 20);

        let state = h.store.get_state().unwrap();
        assert!(state.control.locked);
        assert_eq!(state.control.lock_reason.as_deref(), Some("maintenance"));
        assert!(state.control.queue_paused);
        assert_eq!(state.stats.unsent, 2);
        assert_eq!(h.store.get_by_id(&first).unwrap().unwrap().attempts, 1);

        assert_eq!(h.controller.tick().await.unwrap(), TickOutcome::Paused);
        h.store.resume_queue().unwrap();
        assert_eq!(h.controller.tick().await.unwrap(), TickOutcome::Sent { id: first });
        assert_eq!(h.controller.tick().await.unwrap(), TickOutcome::Sent { id: second });
    }

    /// The run loop drains the queue on its own and stops on shutdown
    #[tokio::test]
    async fn test_e2e_run_loop_drains_queue() {
        let h = Harness::in_memory(3, BoardMock::default());
        for code in 1..=3 {
            h.enqueue(code, Source::Webhook);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Arc::clone(&h.controller).spawn(shutdown_rx);

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while h.store.stats().unwrap().unsent > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(drained.is_ok(), "queue was not drained");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("controller did not stop")
            .unwrap()
            .unwrap();

        assert_eq!(h.transport.delivered(), vec![1, 2, 3]);
        assert_eq!(h.controller.metrics().sent_count(), 3);
    }

    /// An immediate send never touches queued records
    #[tokio::test]
    async fn test_e2e_send_immediate_leaves_queue_alone() {
        let h = Harness::in_memory(3, BoardMock::default());
        let queued = h.enqueue(1, Source::Webhook);

        let calls = h.controller.send_immediate(&grid_with(9)).await.unwrap();
        assert_eq!(calls, 1);
        assert_eq!(h.transport.delivered(), vec![9]);

        let record = h.store.get_by_id(&queued).unwrap().unwrap();
        assert!(!record.sent);
        assert_eq!(record.attempts, 0);
        assert_eq!(h.store.get_next_unsent().unwrap().unwrap().id, queued);
    }

    /// A queued operator send and the next tick share the device spacing
    #[tokio::test]
    async fn test_e2e_operator_send_respects_rate_limit() {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let metrics = Arc::new(InMemoryMetrics::new());
        let store = Arc::new(PersistentQueueStore::open_in_memory(3, clock.clone(), metrics.clone()).unwrap());
        let transport = Arc::new(BoardMock::default());
        let interval = Duration::from_millis(40);
        let controller = DispatchController::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            &DispatchConfig {
                rate_limit_ms: 40,
                ..dispatch_config(20)
            },
            metrics,
        );

        let queued = store.enqueue(grid_with(1), Source::Webhook, None).unwrap().id;
        clock.advance(chrono::Duration::seconds(1));
        let operator = store
            .enqueue_next(grid_with(7), Source::Custom, Some(serde_json::json!({"immediate": true})))
            .unwrap()
            .id;

        assert_eq!(controller.tick().await.unwrap(), TickOutcome::Sent { id: operator });
        assert_eq!(controller.tick().await.unwrap(), TickOutcome::Sent { id: queued });
        controller.send_immediate(&grid_with(9)).await.unwrap();

        let history = transport.history();
        let codes: Vec<u8> = history.iter().map(|((code, _), _)| *code).collect();
        assert_eq!(codes, vec![7, 1, 9]);
        for pair in history.windows(2) {
            // 到达时间略晚于取得令牌的时间
            let gap = pair[1].1.duration_since(pair[0].1);
            assert!(gap + Duration::from_millis(2) >= interval, "deliveries only {gap:?} apart");
        }
    }

    /// Producers enqueue while the run loop is live; each record goes out once
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_e2e_concurrent_producers_with_live_dispatch() {
        const PRODUCERS: u8 = 4;
        const PER_PRODUCER: u8 = 5;
        let total = PRODUCERS as usize * PER_PRODUCER as usize;

        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let metrics = Arc::new(InMemoryMetrics::new());
        let store = Arc::new(PersistentQueueStore::open_in_memory(3, clock.clone(), metrics.clone()).unwrap());
        let h = Harness::with_store(clock, metrics, store, BoardMock::default(), 5);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Arc::clone(&h.controller).spawn(shutdown_rx);

        let mut producers = tokio::task::JoinSet::new();
        for producer in 1..=PRODUCERS {
            let store = Arc::clone(&h.store);
            let clock = Arc::clone(&h.clock);
            let source = if producer % 2 == 0 { Source::Webhook } else { Source::Custom };
            producers.spawn(async move {
                let mut ids = Vec::new();
                for index in 1..=PER_PRODUCER {
                    clock.advance(chrono::Duration::milliseconds(1));
                    ids.push(store.enqueue(grid_pair(producer, index), source, None).unwrap().id);
                    tokio::time::sleep(Duration::from_millis(3)).await;
                }
                ids
            });
        }

        let mut ids = HashSet::new();
        while let Some(joined) = producers.join_next().await {
            ids.extend(joined.unwrap());
        }
        assert_eq!(ids.len(), total);

        let drained = tokio::time::timeout(Duration::from_secs(10), async {
            while h.controller.metrics().sent_count() < total as u64 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(drained.is_ok(), "queue was not drained");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("controller did not stop")
            .unwrap()
            .unwrap();

        let delivered: Vec<(u8, u8)> = h.transport.history().into_iter().map(|(cells, _)| cells).collect();
        let distinct: HashSet<(u8, u8)> = delivered.iter().copied().collect();
        assert_eq!(delivered.len(), total);
        assert_eq!(distinct.len(), total);
        for producer in 1..=PRODUCERS {
            for index in 1..=PER_PRODUCER {
                assert!(distinct.contains(&(producer, index)));
            }
        }
        assert!(ids.iter().all(|id| h.store.get_by_id(id).unwrap().unwrap().sent));
        assert_eq!(h.store.stats().unwrap().unsent, 0);
        assert_eq!(h.controller.metrics().sent_count(), total as u64);
        assert_eq!(h.metrics.sent(Source::Webhook) + h.metrics.sent(Source::Custom), total as u64);
    }

    /// File config drives store bound and dispatch timing
    #[test]
    fn test_config_file_drives_components() {
        let config = config_loader::ConfigLoader::load_from_str(
            "[store]\npath = \":memory:\"\nmax_attempts = 4\n[dispatch]\nrate_limit_ms = 250\n",
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let store =
            PersistentQueueStore::open(&config.store, Arc::new(ManualClock::at_millis(0)), Arc::new(InMemoryMetrics::new()))
                .unwrap();
        assert_eq!(store.get_state().unwrap().max_attempts, 4);

        let controller = DispatchController::new(
            Arc::new(store),
            Arc::new(BoardMock::default()),
            &config.dispatch,
            Arc::new(InMemoryMetrics::new()),
        );
        assert_eq!(controller.limiter().min_interval(), Duration::from_millis(250));
    }
}
