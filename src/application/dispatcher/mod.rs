//! Rate-limited background execution of work units over rotating proxies.
//!
//! Units are appended to an unbounded FIFO queue. A driver task wakes every
//! `tick`, takes at most `max_per_tick` due units and runs each on its own
//! task with the next proxy from the pool. Units scheduled for later wait in
//! a deferred heap owned by the driver and do not count against the budget
//! until they are due. The dispatcher never retries anything by itself.

mod pool;
mod unit;

pub use pool::ProxyPool;
pub use unit::{TaskAction, TaskFuture, WorkUnit};

use crate::config::DispatcherConfig;
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, MissedTickBehavior};

pub struct TaskDispatcher {
    proxies: Arc<ProxyPool>,
    config: DispatcherConfig,
    queue_tx: UnboundedSender<WorkUnit>,
    queue_rx: Mutex<Option<UnboundedReceiver<WorkUnit>>>,
    started: AtomicBool,
    queued: Arc<AtomicU64>,
}

impl TaskDispatcher {
    pub fn new(proxies: Arc<ProxyPool>, config: DispatcherConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            proxies,
            config,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            started: AtomicBool::new(false),
            queued: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn proxies(&self) -> &Arc<ProxyPool> {
        &self.proxies
    }

    /// Enqueues a unit. Never blocks.
    pub fn add_task(&self, unit: WorkUnit) {
        tracing::trace!(task = unit.name(), attempt = unit.attempt(), "Task queued");
        self.queued.fetch_add(1, Ordering::Relaxed);
        // The receiver lives as long as the driver, which runs for the process lifetime.
        if self.queue_tx.send(unit).is_err() {
            self.queued.fetch_sub(1, Ordering::Relaxed);
            tracing::error!("Task queue is closed, dropping task");
        }
    }

    /// Units submitted but not yet handed to a proxy, deferred ones included.
    pub fn backlog(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Starts the driver loop. Calling it again is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let receiver = self
            .queue_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(receiver) = receiver else {
            return;
        };

        let driver = Driver {
            receiver,
            deferred: BinaryHeap::new(),
            seq: 0,
            proxies: Arc::clone(&self.proxies),
            config: self.config.clone(),
            queued: Arc::clone(&self.queued),
        };
        tracing::info!(
            tick_ms = self.config.tick.as_millis() as u64,
            max_per_tick = self.config.max_per_tick,
            "Task dispatcher started"
        );
        tokio::spawn(driver.run());
    }
}

struct Driver {
    receiver: UnboundedReceiver<WorkUnit>,
    deferred: BinaryHeap<Reverse<Deferred>>,
    seq: u64,
    proxies: Arc<ProxyPool>,
    config: DispatcherConfig,
    queued: Arc<AtomicU64>,
}

impl Driver {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let batch = self.collect_due(Instant::now());
            if batch.is_empty() {
                continue;
            }
            tracing::debug!(count = batch.len(), "Dispatching tasks");
            for unit in batch {
                let proxy = self.proxies.next().await;
                tracing::trace!(
                    task = unit.name(),
                    attempt = unit.attempt(),
                    proxy = proxy.label(),
                    "Running task"
                );
                self.queued.fetch_sub(1, Ordering::Relaxed);
                tokio::spawn(unit.into_future(proxy));
            }
        }
    }

    fn collect_due(&mut self, now: Instant) -> Vec<WorkUnit> {
        let budget = self.config.max_per_tick;
        let mut batch = Vec::new();

        while batch.len() < budget {
            match self.deferred.peek() {
                Some(Reverse(next)) if next.unit.is_due(now) => {
                    if let Some(Reverse(next)) = self.deferred.pop() {
                        batch.push(next.unit);
                    }
                }
                _ => break,
            }
        }

        while batch.len() < budget {
            match self.receiver.try_recv() {
                Ok(unit) if unit.is_due(now) => batch.push(unit),
                Ok(unit) => self.defer(unit),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        batch
    }

    fn defer(&mut self, unit: WorkUnit) {
        self.seq += 1;
        self.deferred.push(Reverse(Deferred {
            seq: self.seq,
            unit,
        }));
    }
}

/// Heap entry ordered by due time, then by submission order.
struct Deferred {
    seq: u64,
    unit: WorkUnit,
}

impl PartialEq for Deferred {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Deferred {}

impl PartialOrd for Deferred {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deferred {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.unit
            .not_before()
            .cmp(&other.unit.not_before())
            .then(self.seq.cmp(&other.seq))
    }
}
