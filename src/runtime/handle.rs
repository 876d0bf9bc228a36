use std::sync::{Arc, PoisonError};

use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};
use tracing::{debug, warn};

use crate::{
    exchange::{
        matcher::{ExchangeError, ExchangeMatcher},
        parsed::ParsedExchange,
        template::TemplateProvider,
    },
    field::registry::SharedRegistry,
    guess::cache::GuessCache,
    observation::{CacheSnapshotV1, StoredObservation},
    persist::{GuessSink, PersistError, sqlite::now_ms},
    types::{FieldName, Mode, ObsSeq},
};

use super::events::ExchangeEvent;

/// Failure returned by an [`ExchangeHandle`] call.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The exchange could not be matched.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    /// The journal rejected a write.
    #[error("persistence failed: {0}")]
    Persist(#[from] PersistError),
    /// The runtime task has stopped.
    #[error("exchange runtime is not running")]
    ChannelClosed,
    /// No exchange template covers this country and mode.
    #[error("no exchange template for {country} on {mode}")]
    UnknownTemplate {
        /// Country prefix.
        country: String,
        /// Operating mode.
        mode: Mode,
    },
}

/// Tuning for [`spawn_exchange_runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Flush the journal after every logged exchange.
    pub flush_on_log: bool,
    /// Observations buffered before a forced write.
    pub batch_max_ops: usize,
    /// Longest a buffered observation waits before being written.
    pub batch_max_latency_ms: u64,
    /// Capacity of the persistence queue.
    pub persist_queue_bound: usize,
    /// Observations between automatic snapshots; 0 disables them.
    pub snapshot_every_ops: usize,
    /// Drop journal rows covered by a new snapshot.
    pub compact_after_snapshot: bool,
    /// Add every logged mult value to its field's canonical set.
    pub learn_mult_values: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_on_log: true,
            batch_max_ops: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            snapshot_every_ops: 2000,
            compact_after_snapshot: false,
            learn_mult_values: true,
        }
    }
}

/// Cloneable handle to the exchange runtime.
///
/// Parsing, logging and registry changes are serialized on one task; guesses
/// go straight to the shared [`GuessCache`].
#[derive(Clone)]
pub struct ExchangeHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<ExchangeEvent>,
    cache: Arc<GuessCache>,
}

enum Command {
    Parse {
        text: String,
        country: String,
        mode: Mode,
        resp: oneshot::Sender<Result<ParsedExchange, RuntimeError>>,
    },
    Log {
        call: String,
        exchange: ParsedExchange,
        resp: oneshot::Sender<Result<ObsSeq, RuntimeError>>,
    },
    LearnValue {
        field: FieldName,
        value: String,
        resp: oneshot::Sender<bool>,
    },
    SetMult {
        field: FieldName,
        is_mult: bool,
        resp: oneshot::Sender<bool>,
    },
    Flush {
        resp: oneshot::Sender<Result<ObsSeq, RuntimeError>>,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

enum JournalMsg {
    Append(Vec<StoredObservation>),
    Sync {
        resp: oneshot::Sender<Result<ObsSeq, PersistError>>,
    },
    Checkpoint {
        snapshot: CacheSnapshotV1,
        compact: bool,
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
    Close {
        resp: oneshot::Sender<()>,
    },
}

struct RuntimeState {
    registry: SharedRegistry,
    templates: Box<dyn TemplateProvider>,
    cache: Arc<GuessCache>,
    last_seq: ObsSeq,
    obs_since_snapshot: usize,
}

/// Starts the runtime task (and a journal writer when `sink` is given).
///
/// `cache` should already hold any replayed journal state; new observations
/// are numbered after the sink's latest sequence.
pub fn spawn_exchange_runtime(
    registry: SharedRegistry,
    templates: Box<dyn TemplateProvider>,
    cache: Arc<GuessCache>,
    sink: Option<Box<dyn GuessSink>>,
    config: RuntimeConfig,
) -> ExchangeHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<ExchangeEvent>(1024);

    let mut last_seq = 0;
    let (journal_tx_opt, mut durable_rx) = if let Some(sink) = sink {
        last_seq = sink.latest_seq().unwrap_or_else(|err| {
            warn!(error = %err, "journal sequence unavailable, starting at 0");
            0
        });
        let (journal_tx, journal_rx) = mpsc::channel::<JournalMsg>(config.persist_queue_bound);
        let (durable_tx, durable_rx) = mpsc::unbounded_channel::<Result<ObsSeq, PersistError>>();
        spawn_journal_writer(sink, journal_rx, durable_tx, config.clone(), last_seq);
        (Some(journal_tx), Some(durable_rx))
    } else {
        (None, None)
    };

    let events_tx_loop = events_tx.clone();
    let mut state = RuntimeState {
        registry,
        templates,
        cache: Arc::clone(&cache),
        last_seq,
        obs_since_snapshot: 0,
    };

    tokio::spawn(async move {
        loop {
            if let Some(rx) = durable_rx.as_mut() {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        let done = handle_command(
                            cmd,
                            &mut state,
                            &events_tx_loop,
                            journal_tx_opt.as_ref(),
                            &config,
                        ).await;
                        if done {
                            break;
                        }
                    }
                    durable = rx.recv() => {
                        match durable {
                            Some(Ok(obs_seq)) => {
                                let _ = events_tx_loop.send(ExchangeEvent::DurableUpTo { obs_seq });
                            }
                            Some(Err(err)) => warn!(error = %err, "journal write failed"),
                            None => {}
                        }
                    }
                }
            } else {
                let Some(cmd) = cmd_rx.recv().await else { break; };
                let done = handle_command(
                    cmd,
                    &mut state,
                    &events_tx_loop,
                    journal_tx_opt.as_ref(),
                    &config,
                )
                .await;
                if done {
                    break;
                }
            }
        }
        debug!("exchange runtime stopped");
    });

    ExchangeHandle {
        cmd_tx,
        events_tx,
        cache,
    }
}

impl ExchangeHandle {
    /// Subscribes to runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent> {
        self.events_tx.subscribe()
    }

    /// Shared guess cache.
    pub fn cache(&self) -> &Arc<GuessCache> {
        &self.cache
    }

    /// Expected value of `field` for `call`; empty when nothing is known.
    pub fn guess(&self, call: &str, field: &str) -> String {
        self.cache.guess_value(call, field)
    }

    /// Parses `text` against the template for `country` and `mode`.
    ///
    /// Invalid parses are returned as `Ok` with `is_valid() == false`; only
    /// a field-count mismatch or a missing template is an error.
    pub async fn parse(
        &self,
        text: impl Into<String>,
        country: impl Into<String>,
        mode: Mode,
    ) -> Result<ParsedExchange, RuntimeError> {
        let (text, country) = (text.into(), country.into());
        self.request(|resp| Command::Parse {
            text,
            country,
            mode,
            resp,
        })
        .await?
    }

    /// Records a logged exchange for `call`. Returns the last observation
    /// sequence assigned.
    ///
    /// When the journal queue is full the log is rejected with
    /// [`RuntimeError::Persist`] and nothing is recorded.
    pub async fn log(&self, call: impl Into<String>, exchange: ParsedExchange) -> Result<ObsSeq, RuntimeError> {
        let call = call.into();
        self.request(|resp| Command::Log {
            call,
            exchange,
            resp,
        })
        .await?
    }

    /// Adds a canonical value to `field`. Returns true when it was new.
    pub async fn learn_value(
        &self,
        field: impl Into<FieldName>,
        value: impl Into<String>,
    ) -> Result<bool, RuntimeError> {
        let (field, value) = (field.into(), value.into());
        self.request(|resp| Command::LearnValue { field, value, resp }).await
    }

    /// Changes a field's mult status. Returns false for unknown fields.
    pub async fn set_mult(&self, field: impl Into<FieldName>, is_mult: bool) -> Result<bool, RuntimeError> {
        let field = field.into();
        self.request(|resp| Command::SetMult { field, is_mult, resp }).await
    }

    /// Writes buffered observations. Returns the highest durable sequence.
    pub async fn flush(&self) -> Result<ObsSeq, RuntimeError> {
        self.request(|resp| Command::Flush { resp }).await?
    }

    /// Snapshots observed cache entries to the journal.
    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Checkpoint { resp }).await?
    }

    /// Flushes and stops the runtime.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await?
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(command(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

async fn handle_command(
    cmd: Command,
    state: &mut RuntimeState,
    events_tx: &broadcast::Sender<ExchangeEvent>,
    journal_tx: Option<&mpsc::Sender<JournalMsg>>,
    config: &RuntimeConfig,
) -> bool {
    match cmd {
        Command::Parse {
            text,
            country,
            mode,
            resp,
        } => {
            let res = parse_exchange(state, &text, &country, mode);
            match &res {
                Ok(parsed) => {
                    if let Some(call) = parsed.replacement_call() {
                        let _ = events_tx.send(ExchangeEvent::ReplacementCall {
                            call: call.to_string(),
                        });
                    }
                    if !parsed.is_valid() {
                        let _ = events_tx.send(ExchangeEvent::Unparseable {
                            exchange: parsed.received().join(" "),
                        });
                    }
                    let _ = events_tx.send(ExchangeEvent::Parsed {
                        valid: parsed.is_valid(),
                    });
                }
                Err(RuntimeError::Exchange(ExchangeError::FieldCountMismatch { expected, found })) => {
                    let _ = events_tx.send(ExchangeEvent::FieldCountMismatch {
                        expected: *expected,
                        found: *found,
                    });
                }
                Err(_) => {}
            }
            let _ = resp.send(res);
        }
        Command::Log {
            call,
            exchange,
            resp,
        } => {
            let res = log_exchange(state, &call, exchange, events_tx, journal_tx, config);
            if res.is_ok() {
                maybe_auto_checkpoint(state, journal_tx, config).await;
            }
            let _ = resp.send(res);
        }
        Command::LearnValue { field, value, resp } => {
            let learned = learn_value(state, &field, &value, events_tx);
            let _ = resp.send(learned);
        }
        Command::SetMult {
            field,
            is_mult,
            resp,
        } => {
            let known = {
                let mut registry = state.registry.write().unwrap_or_else(PoisonError::into_inner);
                let changed = registry.spec(&field).is_some() && registry.is_mult(&field) != is_mult;
                let known = registry.set_mult(&field, is_mult);
                if changed {
                    let _ = events_tx.send(ExchangeEvent::MultStatusChanged {
                        field: field.clone(),
                        is_mult,
                    });
                }
                known
            };
            let _ = resp.send(known);
        }
        Command::Flush { resp } => {
            let out = if let Some(tx) = journal_tx {
                let (flush_tx, flush_rx) = oneshot::channel();
                if tx.send(JournalMsg::Sync { resp: flush_tx }).await.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    flush_rx
                        .await
                        .map_err(|_| RuntimeError::ChannelClosed)
                        .and_then(|r| r.map_err(RuntimeError::from))
                }
            } else {
                Ok(state.last_seq)
            };
            let _ = resp.send(out);
        }
        Command::Checkpoint { resp } => {
            let out = if let Some(tx) = journal_tx {
                send_checkpoint(state, tx, config).await
            } else {
                Ok(())
            };
            let _ = resp.send(out);
        }
        Command::Shutdown { resp } => {
            let out = if let Some(tx) = journal_tx {
                let (done_tx, done_rx) = oneshot::channel();
                if tx.send(JournalMsg::Close { resp: done_tx }).await.is_err() {
                    Err(RuntimeError::ChannelClosed)
                } else {
                    done_rx.await.map_err(|_| RuntimeError::ChannelClosed)
                }
            } else {
                Ok(())
            };
            let _ = resp.send(out);
            return true;
        }
    }

    false
}

fn parse_exchange(
    state: &RuntimeState,
    text: &str,
    country: &str,
    mode: Mode,
) -> Result<ParsedExchange, RuntimeError> {
    let template = state
        .templates
        .template(country, mode)
        .ok_or_else(|| RuntimeError::UnknownTemplate {
            country: country.to_string(),
            mode,
        })?;
    let registry = state.registry.read().unwrap_or_else(PoisonError::into_inner);
    let parsed = ExchangeMatcher::new(&registry).parse(text, &template)?;
    Ok(parsed)
}

fn log_exchange(
    state: &mut RuntimeState,
    call: &str,
    exchange: ParsedExchange,
    events_tx: &broadcast::Sender<ExchangeEvent>,
    journal_tx: Option<&mpsc::Sender<JournalMsg>>,
    config: &RuntimeConfig,
) -> Result<ObsSeq, RuntimeError> {
    let exchange = exchange.into_result()?;

    // A full journal queue rejects the log before the registry or cache change.
    let slot = journal_tx
        .map(|tx| tx.try_reserve())
        .transpose()
        .map_err(|err| RuntimeError::Persist(PersistError::Message(format!("journal queue: {err}"))))?;

    if config.learn_mult_values {
        for field in exchange.mult_values() {
            learn_value(state, &field.name, &field.value, events_tx);
        }
    }

    let observations = state.cache.record_logged(call, &exchange);
    if observations.is_empty() {
        return Ok(state.last_seq);
    }

    let ts_ms = now_ms();
    let batch: Vec<StoredObservation> = observations
        .into_iter()
        .map(|observation| {
            state.last_seq += 1;
            StoredObservation {
                seq: state.last_seq,
                ts_ms,
                observation,
            }
        })
        .collect();
    state.obs_since_snapshot += batch.len();

    match slot {
        Some(slot) => slot.send(JournalMsg::Append(batch)),
        None => {
            let _ = events_tx.send(ExchangeEvent::DurableUpTo {
                obs_seq: state.last_seq,
            });
        }
    }
    Ok(state.last_seq)
}

fn learn_value(
    state: &RuntimeState,
    field: &str,
    value: &str,
    events_tx: &broadcast::Sender<ExchangeEvent>,
) -> bool {
    let learned = state
        .registry
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .learn_value(field, value);
    if learned {
        debug!(field, value, "canonical value learned");
        let _ = events_tx.send(ExchangeEvent::ValueLearned {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    learned
}

async fn send_checkpoint(
    state: &RuntimeState,
    tx: &mpsc::Sender<JournalMsg>,
    config: &RuntimeConfig,
) -> Result<(), RuntimeError> {
    let snapshot = CacheSnapshotV1 {
        last_seq: state.last_seq,
        observations: state.cache.snapshot(),
    };
    let (cp_tx, cp_rx) = oneshot::channel();
    if tx
        .send(JournalMsg::Checkpoint {
            snapshot,
            compact: config.compact_after_snapshot,
            resp: cp_tx,
        })
        .await
        .is_err()
    {
        return Err(RuntimeError::ChannelClosed);
    }
    cp_rx
        .await
        .map_err(|_| RuntimeError::ChannelClosed)
        .and_then(|r| r.map_err(RuntimeError::from))
}

/// Journal side of the runtime. Holds appended observations until they are
/// written, and runs every sink call on the blocking pool.
struct JournalWriter {
    sink: Arc<Mutex<Box<dyn GuessSink>>>,
    pending: Vec<StoredObservation>,
    durable_seq: ObsSeq,
    durable_tx: mpsc::UnboundedSender<Result<ObsSeq, PersistError>>,
}

impl JournalWriter {
    async fn on_sink<T, F>(&self, work: F) -> Result<T, PersistError>
    where
        F: FnOnce(&mut Box<dyn GuessSink>) -> Result<T, PersistError> + Send + 'static,
        T: Send + 'static,
    {
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || work(&mut sink.blocking_lock()))
            .await
            .map_err(|e| PersistError::Message(format!("journal task failed: {e}")))?
    }

    /// Appends pending observations; `sync` also flushes the sink.
    async fn write_pending(&mut self, sync: bool) -> Result<(), PersistError> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            if sync {
                self.on_sink(|sink| sink.flush()).await?;
            }
            return Ok(());
        }

        let appended = self
            .on_sink(move |sink| {
                let seq = sink.append(&pending)?;
                if sync {
                    sink.flush()?;
                }
                Ok(seq)
            })
            .await;
        match appended {
            Ok(seq) => {
                self.durable_seq = self.durable_seq.max(seq);
                let _ = self.durable_tx.send(Ok(self.durable_seq));
                Ok(())
            }
            Err(err) => {
                let _ = self
                    .durable_tx
                    .send(Err(PersistError::Message(format!("append failed: {err}"))));
                Err(err)
            }
        }
    }

    async fn checkpoint(&mut self, snapshot: CacheSnapshotV1, compact: bool) -> Result<(), PersistError> {
        self.write_pending(true).await?;
        self.on_sink(move |sink| {
            sink.write_snapshot(&snapshot)?;
            if compact {
                let removed = sink.compact_through(snapshot.last_seq)?;
                debug!(removed, last_seq = snapshot.last_seq, "journal compacted");
            }
            Ok(())
        })
        .await
    }
}

fn spawn_journal_writer(
    sink: Box<dyn GuessSink>,
    mut rx: mpsc::Receiver<JournalMsg>,
    durable_tx: mpsc::UnboundedSender<Result<ObsSeq, PersistError>>,
    config: RuntimeConfig,
    start_seq: ObsSeq,
) {
    let mut writer = JournalWriter {
        sink: Arc::new(Mutex::new(sink)),
        pending: Vec::new(),
        durable_seq: start_seq,
        durable_tx,
    };
    let max_wait = Duration::from_millis(config.batch_max_latency_ms);

    tokio::spawn(async move {
        let mut deadline = Instant::now() + max_wait;
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(JournalMsg::Append(observations)) => {
                        writer.pending.extend(observations);
                        if config.flush_on_log || writer.pending.len() >= config.batch_max_ops {
                            let _ = writer.write_pending(true).await;
                            deadline = Instant::now() + max_wait;
                        }
                    }
                    Some(JournalMsg::Sync { resp }) => {
                        let result = writer.write_pending(true).await.map(|()| writer.durable_seq);
                        let _ = resp.send(result);
                        deadline = Instant::now() + max_wait;
                    }
                    Some(JournalMsg::Checkpoint { snapshot, compact, resp }) => {
                        let _ = resp.send(writer.checkpoint(snapshot, compact).await);
                        deadline = Instant::now() + max_wait;
                    }
                    Some(JournalMsg::Close { resp }) => {
                        let _ = writer.write_pending(true).await;
                        let _ = resp.send(());
                        break;
                    }
                    None => {
                        let _ = writer.write_pending(true).await;
                        break;
                    }
                },
                _ = tokio::time::sleep_until(deadline), if !writer.pending.is_empty() => {
                    let _ = writer.write_pending(false).await;
                    deadline = Instant::now() + max_wait;
                }
            }
        }
        debug!(durable_seq = writer.durable_seq, "journal writer stopped");
    });
}

async fn maybe_auto_checkpoint(
    state: &mut RuntimeState,
    journal_tx: Option<&mpsc::Sender<JournalMsg>>,
    config: &RuntimeConfig,
) {
    if config.snapshot_every_ops == 0 || state.obs_since_snapshot < config.snapshot_every_ops {
        return;
    }
    let Some(tx) = journal_tx else {
        return;
    };
    match send_checkpoint(state, tx, config).await {
        Ok(()) => state.obs_since_snapshot = 0,
        Err(err) => warn!(error = %err, "automatic snapshot failed"),
    }
}
