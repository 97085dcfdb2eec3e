use crate::infrastructure::proxy::ProxyHandle;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Instant;

pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type TaskAction = Box<dyn FnOnce(ProxyHandle) -> TaskFuture + Send + 'static>;

/// One schedulable action executed by the dispatcher against a proxy.
///
/// Units are immutable: a retry is a new unit built with [`WorkUnit::retry`].
pub struct WorkUnit {
    name: String,
    attempt: u32,
    not_before: Instant,
    action: TaskAction,
}

impl WorkUnit {
    /// First attempt, runnable immediately.
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(ProxyHandle) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            attempt: 1,
            not_before: Instant::now(),
            action: Box::new(move |proxy| Box::pin(action(proxy))),
        }
    }

    /// Successor of attempt `previous`, due after `delay`.
    pub fn retry<F, Fut>(name: impl Into<String>, previous: u32, delay: Duration, action: F) -> Self
    where
        F: FnOnce(ProxyHandle) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(name, action)
            .with_attempt(previous.saturating_add(1))
            .delayed(delay)
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.not_before = Instant::now() + delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn not_before(&self) -> Instant {
        self.not_before
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.not_before <= now
    }

    pub(crate) fn into_future(self, proxy: ProxyHandle) -> TaskFuture {
        (self.action)(proxy)
    }
}

impl fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkUnit")
            .field("name", &self.name)
            .field("attempt", &self.attempt)
            .field("not_before", &self.not_before)
            .finish()
    }
}
