//! Production runner: drives one replica's state machine with tokio I/O.
//!
//! A single task owns the state machine and pulls events from dedicated
//! channels. Timers have their own channel so a flood of network messages
//! can never delay a view timeout.

use crate::network::{ChannelTransport, CodecError};
use crate::timers::TimerManager;
use canopy_bft::{BftConfig, BftStats, DynBftState};
use canopy_core::{Action, Event, FatalError, Mempool, QueueMempool, StateMachine};
use canopy_types::{Block, KeyPair, Topology, ValidatorId, View};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, span, trace, warn, Level};

/// Errors from the production runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Event channel closed")]
    ChannelClosed,
    #[error("Missing runner component: {0}")]
    MissingComponent(&'static str),
    #[error("Replica stopped: {0}")]
    Fatal(#[from] FatalError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Handle for shutting down a running [`ProductionRunner`].
///
/// When dropped, signals the runner to exit gracefully.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    /// Trigger shutdown (consumes the handle).
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// What a runner did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerReport {
    pub validator: ValidatorId,
    /// Events handed to the state machine.
    pub events: u64,
    pub committed_blocks: u64,
    pub forked_blocks: u64,
    /// View the replica was in when it stopped.
    pub final_view: View,
    pub highest_committed_view: View,
    pub stats: BftStats,
}

/// Builder for constructing a [`ProductionRunner`].
///
/// Required: `topology`, `signing_key`, `transport`.
/// Optional: `bft_config` (defaults), `channel_capacity` (10,000),
/// `commit_sink`.
pub struct ProductionRunnerBuilder {
    topology: Option<Arc<dyn Topology>>,
    signing_key: Option<KeyPair>,
    bft_config: BftConfig,
    transport: Option<(ChannelTransport, mpsc::Receiver<Event>)>,
    channel_capacity: usize,
    commit_sink: Option<mpsc::UnboundedSender<Block>>,
}

impl Default for ProductionRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionRunnerBuilder {
    pub fn new() -> Self {
        Self {
            topology: None,
            signing_key: None,
            bft_config: BftConfig::default(),
            transport: None,
            channel_capacity: 10_000,
            commit_sink: None,
        }
    }

    pub fn topology(mut self, topology: Arc<dyn Topology>) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn signing_key(mut self, key: KeyPair) -> Self {
        self.signing_key = Some(key);
        self
    }

    pub fn bft_config(mut self, config: BftConfig) -> Self {
        self.bft_config = config;
        self
    }

    /// Transport and inbox, usually from `ChannelNetwork::take_endpoint`.
    pub fn transport(mut self, transport: ChannelTransport, inbox: mpsc::Receiver<Event>) -> Self {
        self.transport = Some((transport, inbox));
        self
    }

    /// Capacity of the timer and transaction channels.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Receive every block this replica commits, in commit order.
    pub fn commit_sink(mut self, sink: mpsc::UnboundedSender<Block>) -> Self {
        self.commit_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<ProductionRunner, RunnerError> {
        let topology = self
            .topology
            .ok_or(RunnerError::MissingComponent("topology"))?;
        let signing_key = self
            .signing_key
            .ok_or(RunnerError::MissingComponent("signing_key"))?;
        let (transport, event_rx) = self
            .transport
            .ok_or(RunnerError::MissingComponent("transport"))?;

        let (timer_tx, timer_rx) = mpsc::channel(self.channel_capacity);
        let (transaction_tx, transaction_rx) = mpsc::channel(self.channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let validator = topology.local_validator_id();
        let state = DynBftState::from_config(signing_key, topology, self.bft_config);

        Ok(ProductionRunner {
            state,
            mempool: QueueMempool::new(),
            transport,
            timers: TimerManager::new(timer_tx),
            timer_rx,
            event_rx,
            transaction_rx,
            transaction_tx,
            shutdown_rx,
            shutdown_tx: Some(shutdown_tx),
            commit_sink: self.commit_sink,
            start_time: Instant::now(),
            report: RunnerReport {
                validator,
                ..Default::default()
            },
        })
    }
}

/// Drives one replica until shutdown or a fatal error.
pub struct ProductionRunner {
    state: DynBftState,
    mempool: QueueMempool,
    transport: ChannelTransport,
    timers: TimerManager,
    timer_rx: mpsc::Receiver<Event>,
    event_rx: mpsc::Receiver<Event>,
    transaction_rx: mpsc::Receiver<Vec<u8>>,
    transaction_tx: mpsc::Sender<Vec<u8>>,
    shutdown_rx: oneshot::Receiver<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    commit_sink: Option<mpsc::UnboundedSender<Block>>,
    start_time: Instant,
    report: RunnerReport,
}

impl ProductionRunner {
    pub fn builder() -> ProductionRunnerBuilder {
        ProductionRunnerBuilder::new()
    }

    /// Take the shutdown handle. Returns `None` after the first call.
    pub fn shutdown_handle(&mut self) -> Option<ShutdownHandle> {
        self.shutdown_tx
            .take()
            .map(|tx| ShutdownHandle { tx: Some(tx) })
    }

    /// Sender feeding this replica's mempool.
    pub fn transaction_sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.transaction_tx.clone()
    }

    pub fn validator_id(&self) -> ValidatorId {
        self.report.validator
    }

    /// Run the event loop until shutdown.
    ///
    /// Channels are polled with a `biased` select in priority order:
    /// shutdown, timers, consensus messages, then transactions.
    pub async fn run(mut self) -> Result<RunnerReport, RunnerError> {
        info!(
            validator = %self.report.validator,
            variant = ?self.state.config().variant,
            view_timeout_ms = self.state.config().view_timeout_ms,
            "Starting production runner"
        );

        self.dispatch(Event::Start)?;

        loop {
            tokio::select! {
                biased;

                _ = &mut self.shutdown_rx => {
                    info!(validator = %self.report.validator, "Shutdown signal received");
                    break;
                }

                Some(event) = self.timer_rx.recv() => {
                    self.dispatch(event)?;
                }

                Some(event) = self.event_rx.recv() => {
                    self.dispatch(event)?;
                }

                Some(transaction) = self.transaction_rx.recv() => {
                    self.mempool.submit(transaction);
                }

                else => return Err(RunnerError::ChannelClosed),
            }
        }

        self.timers.cancel_all();
        Ok(self.finish())
    }

    /// Feed an event and everything it produces locally, in order.
    fn dispatch(&mut self, event: Event) -> Result<(), RunnerError> {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let event_span = span!(
                Level::DEBUG,
                "handle_event",
                event.type = event.type_name(),
                validator = %self.report.validator,
            );
            let _guard = event_span.enter();

            self.state.set_time(self.start_time.elapsed());
            let actions = self.state.handle(event)?;
            self.report.events += 1;

            for action in actions {
                if let Some(follow_up) = self.process_action(action)? {
                    queue.push_back(follow_up);
                }
            }
        }
        Ok(())
    }

    /// Execute one action. Returns an event to feed back when the action is
    /// answered locally.
    fn process_action(&mut self, action: Action) -> Result<Option<Event>, RunnerError> {
        match action {
            Action::SendTo { to, message } => self.transport.send_to(to, &message)?,
            Action::Broadcast { message } => self.transport.broadcast(&message)?,
            Action::Multicast { to, message } => self.transport.multicast(&to, &message)?,

            Action::SetTimer { id, duration } => self.timers.set_timer(id, duration),
            Action::CancelTimer { id } => self.timers.cancel_timer(id),

            Action::RequestPayload { view } => {
                let payload = self.mempool.get_payload(self.state.config().max_payload);
                trace!(view = view.0, transactions = payload.len(), "Payload ready");
                return Ok(Some(Event::PayloadReady { view, payload }));
            }

            Action::EmitCommittedBlock { block } => {
                self.report.committed_blocks += 1;
                info!(
                    validator = %self.report.validator,
                    view = block.view.0,
                    block = ?block.id,
                    transactions = block.payload.len(),
                    "Block committed"
                );
                if let Some(sink) = &self.commit_sink {
                    if sink.send(block).is_err() {
                        debug!("Commit sink closed");
                        self.commit_sink = None;
                    }
                }
            }

            Action::EmitForkedBlock { block } => {
                self.report.forked_blocks += 1;
                warn!(
                    validator = %self.report.validator,
                    view = block.view.0,
                    block = ?block.id,
                    "Block forked"
                );
            }
        }
        Ok(None)
    }

    fn finish(self) -> RunnerReport {
        RunnerReport {
            final_view: self.state.cur_view(),
            highest_committed_view: self.state.highest_committed_view(),
            stats: self.state.stats(),
            ..self.report
        }
    }
}
