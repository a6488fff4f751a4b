//! PersistentQueueStore implementation
//!
//! A single `Mutex<Connection>` serializes every operation. Each public method
//! holds the guard for its whole read-modify-write, so no operation observes a
//! partially applied mutation and crash recovery is whatever SQLite committed.
//!
//! Every method is synchronous and may block on an fsync. Async callers on a
//! hot path run them through `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use contracts::{
    AttemptOutcome, Clock, ControlState, Grid, MessageId, MessageRecord, QueueError,
    QueueMetrics, QueueStats, Source, StateSnapshot, StoreConfig,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, instrument, warn};

use crate::schema::{self, db_err, MEMORY_PATH, RECORD_COLUMNS};

/// Durable queue and control plane
pub struct PersistentQueueStore {
    connection: Mutex<Connection>,
    max_attempts: u32,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn QueueMetrics>,
}

impl std::fmt::Debug for PersistentQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentQueueStore")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl PersistentQueueStore {
    /// Open (or create) the store described by `config`
    pub fn open(
        config: &StoreConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn QueueMetrics>,
    ) -> Result<Self, QueueError> {
        Self::open_path(&config.path, config.max_attempts, config.busy_timeout(), clock, metrics)
    }

    /// Ephemeral store, used by tests and dry runs
    pub fn open_in_memory(
        max_attempts: u32,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn QueueMetrics>,
    ) -> Result<Self, QueueError> {
        Self::open_path(
            Path::new(MEMORY_PATH),
            max_attempts,
            Duration::from_millis(1_000),
            clock,
            metrics,
        )
    }

    fn open_path(
        path: &Path,
        max_attempts: u32,
        busy_timeout: Duration,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn QueueMetrics>,
    ) -> Result<Self, QueueError> {
        if max_attempts == 0 {
            return Err(QueueError::storage_message("max_attempts must be at least 1"));
        }

        let mut connection = schema::open_connection(path, busy_timeout)?;
        schema::initialize(&mut connection)?;

        let store = Self {
            connection: Mutex::new(connection),
            max_attempts,
            clock,
            metrics,
        };

        {
            let conn = store.conn()?;
            // attempts 已超过当前上限的记录 (上限被调低) 直接淘汰
            let swept = conn
                .execute(
                    "UPDATE messages SET sent = 1, evicted = 1 WHERE sent = 0 AND attempts >= ?1",
                    params![max_attempts],
                )
                .map_err(db_err("evict exhausted records"))?;
            if swept > 0 {
                warn!(count = swept, max_attempts, "Evicted records that exceed the attempt bound");
            }
            let stats = store.publish_stats(&conn);
            info!(
                path = %path.display(),
                max_attempts,
                total = stats.map(|s| s.total).unwrap_or_default(),
                unsent = stats.map(|s| s.unsent).unwrap_or_default(),
                "Queue store opened"
            );
        }

        Ok(store)
    }

    /// Attempt bound enforced by this store
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Persist a new pending record
    ///
    /// Automated sources are refused while the control plane is locked.
    #[instrument(name = "store_enqueue", skip(self, payload, metadata), fields(source = %source))]
    pub fn enqueue(
        &self,
        payload: Grid,
        source: Source,
        metadata: Option<serde_json::Value>,
    ) -> Result<MessageRecord, QueueError> {
        self.insert(payload, source, metadata, false)
    }

    /// Persist a record ahead of every pending one
    ///
    /// Manual "send now" requests go through here so the owning dispatch
    /// process delivers them on its next tick, under its own rate limiter.
    #[instrument(name = "store_enqueue_next", skip(self, payload, metadata), fields(source = %source))]
    pub fn enqueue_next(
        &self,
        payload: Grid,
        source: Source,
        metadata: Option<serde_json::Value>,
    ) -> Result<MessageRecord, QueueError> {
        self.insert(payload, source, metadata, true)
    }

    fn insert(
        &self,
        payload: Grid,
        source: Source,
        metadata: Option<serde_json::Value>,
        front: bool,
    ) -> Result<MessageRecord, QueueError> {
        let mut conn = self.conn()?;
        let now = self.clock.now();

        let control = self.current_control(&conn, now)?;
        if control.locked && source.is_automated() {
            self.metrics.enqueue_locked_out(source);
            debug!(reason = ?control.lock_reason, "Enqueue refused, store is locked");
            return Err(QueueError::Locked {
                reason: control.lock_reason,
            });
        }

        let mut record = MessageRecord {
            id: MessageId::generate(),
            payload,
            created_at: now,
            source,
            metadata,
            sent: false,
            attempts: 0,
            priority: 0,
            evicted: false,
        };

        let payload_json = serde_json::to_string(&record.payload)
            .map_err(|e| QueueError::storage("serialize payload", e))?;
        let metadata_json = record
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| QueueError::storage("serialize metadata", e))?;

        let tx = conn.transaction().map_err(db_err("begin enqueue"))?;
        if front {
            let top: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(priority), 0) FROM messages WHERE sent = 0",
                    params![],
                    |row| row.get(0),
                )
                .map_err(db_err("read top priority"))?;
            record.priority = top.saturating_add(1);
        }
        tx.execute(
            "INSERT INTO messages (id, payload, created_at, source, metadata, sent, attempts, priority, evicted)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6, 0)",
            params![
                record.id.as_str(),
                payload_json,
                now.timestamp_millis(),
                source.as_str(),
                metadata_json,
                record.priority
            ],
        )
        .map_err(db_err("insert message"))?;
        tx.commit().map_err(db_err("commit enqueue"))?;

        self.metrics.message_enqueued(source);
        self.publish_stats(&conn);
        debug!(id = %record.id, "Message enqueued");
        Ok(record)
    }

    /// Validate raw rows and persist them
    pub fn enqueue_rows(
        &self,
        rows: Vec<Vec<i64>>,
        source: Source,
        metadata: Option<serde_json::Value>,
    ) -> Result<MessageRecord, QueueError> {
        let payload = Grid::try_from(rows)?;
        self.enqueue(payload, source, metadata)
    }

    /// Highest-priority, oldest pending record that still has attempts left
    pub fn get_next_unsent(&self) -> Result<Option<MessageRecord>, QueueError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM messages
             WHERE sent = 0 AND attempts < ?1
             ORDER BY priority DESC, created_at ASC, seq ASC
             LIMIT 1"
        );
        conn.query_row(&sql, params![self.max_attempts], RawRecord::from_row)
            .optional()
            .map_err(db_err("select next unsent"))?
            .map(RawRecord::into_record)
            .transpose()
    }

    /// Mark a record delivered
    ///
    /// Returns `false` when the record was already terminal.
    #[instrument(name = "store_mark_sent", skip(self), fields(id = %id))]
    pub fn mark_sent(&self, id: &MessageId) -> Result<bool, QueueError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err("begin mark_sent"))?;

        let (sent, _, source) = lookup_status(&tx, id)?;
        if sent {
            return Ok(false);
        }

        tx.execute(
            "UPDATE messages SET sent = 1 WHERE id = ?1",
            params![id.as_str()],
        )
        .map_err(db_err("mark sent"))?;
        tx.commit().map_err(db_err("commit mark_sent"))?;

        self.metrics.message_sent(source);
        self.publish_stats(&conn);
        Ok(true)
    }

    /// Count one failed attempt, evicting the record when the bound is reached
    #[instrument(name = "store_mark_attempt", skip(self), fields(id = %id))]
    pub fn mark_attempt(&self, id: &MessageId) -> Result<AttemptOutcome, QueueError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err("begin mark_attempt"))?;

        let (sent, attempts, source) = lookup_status(&tx, id)?;
        if sent {
            return Ok(AttemptOutcome::AlreadyTerminal);
        }

        let attempts = attempts.saturating_add(1);
        let outcome = if attempts >= self.max_attempts {
            tx.execute(
                "UPDATE messages SET attempts = ?2, sent = 1, evicted = 1 WHERE id = ?1",
                params![id.as_str(), attempts],
            )
            .map_err(db_err("evict message"))?;
            AttemptOutcome::Evicted { attempts }
        } else {
            tx.execute(
                "UPDATE messages SET attempts = ?2 WHERE id = ?1",
                params![id.as_str(), attempts],
            )
            .map_err(db_err("increment attempts"))?;
            AttemptOutcome::Retry { attempts }
        };
        tx.commit().map_err(db_err("commit mark_attempt"))?;

        if let AttemptOutcome::Evicted { attempts } = outcome {
            self.metrics.message_evicted(source);
            warn!(attempts, source = %source, "Message evicted after exhausting attempts");
        }
        self.publish_stats(&conn);
        Ok(outcome)
    }

    /// Move a pending record to the front of the dispatch order
    #[instrument(name = "store_reprioritize", skip(self), fields(id = %id))]
    pub fn reprioritize(&self, id: &MessageId) -> Result<MessageRecord, QueueError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err("begin reprioritize"))?;

        let (sent, _, _) = lookup_status(&tx, id)?;
        if sent {
            return Err(QueueError::Terminal { id: id.clone() });
        }

        let top: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(priority), 0) FROM messages WHERE sent = 0",
                params![],
                |row| row.get(0),
            )
            .map_err(db_err("read top priority"))?;
        tx.execute(
            "UPDATE messages SET priority = ?2 WHERE id = ?1",
            params![id.as_str(), top.saturating_add(1)],
        )
        .map_err(db_err("update priority"))?;

        let sql = format!("SELECT {RECORD_COLUMNS} FROM messages WHERE id = ?1");
        let raw = tx
            .query_row(&sql, params![id.as_str()], RawRecord::from_row)
            .map_err(db_err("reload message"))?;
        tx.commit().map_err(db_err("commit reprioritize"))?;

        let record = raw.into_record()?;
        info!(priority = record.priority, "Message moved to front of queue");
        Ok(record)
    }

    /// Lookup by id
    pub fn get_by_id(&self, id: &MessageId) -> Result<Option<MessageRecord>, QueueError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {RECORD_COLUMNS} FROM messages WHERE id = ?1");
        conn.query_row(&sql, params![id.as_str()], RawRecord::from_row)
            .optional()
            .map_err(db_err("select message"))?
            .map(RawRecord::into_record)
            .transpose()
    }

    /// Latest records, newest first, regardless of state
    pub fn get_recent(&self, limit: usize) -> Result<Vec<MessageRecord>, QueueError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM messages ORDER BY created_at DESC, seq DESC LIMIT ?1"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(&sql).map_err(db_err("prepare recent"))?;
        let rows = stmt
            .query_map(params![limit], RawRecord::from_row)
            .map_err(db_err("query recent"))?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(raw.map_err(db_err("read recent row"))?.into_record()?);
        }
        Ok(records)
    }

    // ========================================================================
    // Control plane
    // ========================================================================

    /// Refuse automated ingestion until `unlock`
    pub fn lock(&self, reason: Option<String>) -> Result<ControlState, QueueError> {
        self.set_lock(reason, None)
    }

    /// Refuse automated ingestion for `ttl`
    pub fn lock_for(
        &self,
        reason: Option<String>,
        ttl: chrono::Duration,
    ) -> Result<ControlState, QueueError> {
        let until = self.clock.now() + ttl;
        self.set_lock(reason, Some(until))
    }

    fn set_lock(
        &self,
        reason: Option<String>,
        until: Option<DateTime<Utc>>,
    ) -> Result<ControlState, QueueError> {
        self.update_control(|state| {
            state.locked = true;
            state.lock_reason = reason;
            state.locked_until = until;
            info!(reason = ?state.lock_reason, until = ?state.locked_until, "Store locked");
        })
    }

    /// Accept all ingestion again
    pub fn unlock(&self) -> Result<ControlState, QueueError> {
        self.update_control(|state| {
            state.clear_lock();
            info!("Store unlocked");
        })
    }

    /// Stop dispatch; the record in flight (if any) completes
    pub fn pause_queue(&self) -> Result<ControlState, QueueError> {
        let metrics = Arc::clone(&self.metrics);
        self.update_control(move |state| {
            if !state.queue_paused {
                metrics.queue_paused();
                info!("Queue paused");
            }
            state.queue_paused = true;
        })
    }

    /// Resume dispatch on the next tick
    pub fn resume_queue(&self) -> Result<ControlState, QueueError> {
        self.update_control(|state| {
            if state.queue_paused {
                info!("Queue resumed");
            }
            state.queue_paused = false;
        })
    }

    /// Control flags and derived counters from one critical section
    pub fn get_state(&self) -> Result<StateSnapshot, QueueError> {
        let conn = self.conn()?;
        let now = self.clock.now();
        let control = self.current_control(&conn, now)?;
        let stats = compute_stats(&conn, self.max_attempts, now)?;
        Ok(StateSnapshot {
            control,
            stats,
            max_attempts: self.max_attempts,
        })
    }

    /// Derived counters only
    pub fn stats(&self) -> Result<QueueStats, QueueError> {
        let conn = self.conn()?;
        compute_stats(&conn, self.max_attempts, self.clock.now())
    }

    /// Fold the write-ahead log into the main database file
    pub fn flush(&self) -> Result<(), QueueError> {
        let conn = self.conn()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", params![], |_| Ok(()))
            .map_err(db_err("checkpoint wal"))?;
        debug!("Queue store flushed");
        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.connection
            .lock()
            .map_err(|_| QueueError::storage_message("store connection mutex poisoned"))
    }

    /// Control state with an expired lock cleared and persisted
    fn current_control(
        &self,
        conn: &Connection,
        now: DateTime<Utc>,
    ) -> Result<ControlState, QueueError> {
        let mut state = load_control(conn)?;
        if state.lock_expired(now) {
            info!(until = ?state.locked_until, "Store lock expired");
            state.clear_lock();
            save_control(conn, &state)?;
        }
        Ok(state)
    }

    fn update_control(
        &self,
        apply: impl FnOnce(&mut ControlState),
    ) -> Result<ControlState, QueueError> {
        let conn = self.conn()?;
        let mut state = self.current_control(&conn, self.clock.now())?;
        apply(&mut state);
        save_control(&conn, &state)?;
        Ok(state)
    }

    /// Recompute counters and push them to the metrics sink
    fn publish_stats(&self, conn: &Connection) -> Option<QueueStats> {
        match compute_stats(conn, self.max_attempts, self.clock.now()) {
            Ok(stats) => {
                self.metrics.queue_stats(&stats);
                Some(stats)
            }
            Err(err) => {
                warn!(error = %err, "Failed to refresh queue statistics");
                None
            }
        }
    }
}

/// (sent, attempts, source) for an existing record
fn lookup_status(conn: &Connection, id: &MessageId) -> Result<(bool, u32, Source), QueueError> {
    let row: Option<(bool, i64, String)> = conn
        .query_row(
            "SELECT sent, attempts, source FROM messages WHERE id = ?1",
            params![id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(db_err("lookup message"))?;

    let (sent, attempts, source) = row.ok_or_else(|| QueueError::NotFound { id: id.clone() })?;
    Ok((sent, to_u32(attempts)?, parse_source(&source)?))
}

fn load_control(conn: &Connection) -> Result<ControlState, QueueError> {
    let json: Option<String> = conn
        .query_row(
            "SELECT state_json FROM control_plane WHERE id = 1",
            params![],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err("read control plane"))?;

    match json {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| QueueError::storage("decode control state", e)),
        None => Ok(ControlState::default()),
    }
}

fn save_control(conn: &Connection, state: &ControlState) -> Result<(), QueueError> {
    let json = serde_json::to_string(state)
        .map_err(|e| QueueError::storage("serialize control state", e))?;
    conn.execute(
        "INSERT INTO control_plane (id, state_json) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET state_json = excluded.state_json",
        params![json],
    )
    .map_err(db_err("write control plane"))?;
    Ok(())
}

fn compute_stats(
    conn: &Connection,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<QueueStats, QueueError> {
    let (total, unsent, evicted, oldest): (i64, Option<i64>, Option<i64>, Option<i64>) = conn
        .query_row(
            "SELECT COUNT(*),
                    SUM(CASE WHEN sent = 0 AND attempts < ?1 THEN 1 ELSE 0 END),
                    SUM(evicted),
                    MIN(CASE WHEN sent = 0 AND attempts < ?1 THEN created_at END)
             FROM messages",
            params![max_attempts],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .map_err(db_err("compute stats"))?;

    let oldest_unsent_age_secs =
        oldest.map(|created| (now.timestamp_millis() - created).max(0) as f64 / 1_000.0);

    Ok(QueueStats {
        total: total.max(0) as u64,
        unsent: unsent.unwrap_or(0).max(0) as u64,
        evicted: evicted.unwrap_or(0).max(0) as u64,
        oldest_unsent_age_secs,
    })
}

fn to_u32(value: i64) -> Result<u32, QueueError> {
    u32::try_from(value)
        .map_err(|_| QueueError::storage_message(format!("attempt counter out of range: {value}")))
}

fn parse_source(value: &str) -> Result<Source, QueueError> {
    value.parse().map_err(QueueError::storage_message)
}

/// Row as stored, before decoding
struct RawRecord {
    id: String,
    payload: String,
    created_at: i64,
    source: String,
    metadata: Option<String>,
    sent: bool,
    attempts: i64,
    priority: i64,
    evicted: bool,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            payload: row.get(1)?,
            created_at: row.get(2)?,
            source: row.get(3)?,
            metadata: row.get(4)?,
            sent: row.get(5)?,
            attempts: row.get(6)?,
            priority: row.get(7)?,
            evicted: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<MessageRecord, QueueError> {
        let payload: Grid = serde_json::from_str(&self.payload)
            .map_err(|e| QueueError::storage(format!("corrupt payload for {}", self.id), e))?;
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| QueueError::storage(format!("corrupt metadata for {}", self.id), e))?;
        let created_at = DateTime::from_timestamp_millis(self.created_at).ok_or_else(|| {
            QueueError::storage_message(format!("invalid timestamp {}", self.created_at))
        })?;

        Ok(MessageRecord {
            id: MessageId::from(self.id),
            payload,
            created_at,
            source: parse_source(&self.source)?,
            metadata,
            sent: self.sent,
            attempts: to_u32(self.attempts)?,
            priority: self.priority,
            evicted: self.evicted,
        })
    }
}
