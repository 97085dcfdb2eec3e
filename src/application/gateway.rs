use super::allocator::CardAllocator;
use super::broker::SubscriptionBroker;
use super::completion::CompletionRecorder;
use super::dispatcher::{ProxyPool, TaskDispatcher};
use super::notifications::NotificationService;
use super::orders::OrderService;
use super::settlement::SettlementOrchestrator;
use super::waiter::LinkWaiter;
use crate::config::GatewayConfig;
use crate::domain::ports::{AlerterRef, BankApiRef, ListenerRef, Stores};
use crate::error::Result;
use crate::infrastructure::proxy::ProxyHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Collaborators injected into a [`Gateway`].
pub struct GatewayParts {
    pub stores: Stores,
    pub bank: BankApiRef,
    pub alerter: AlerterRef,
    pub listener: ListenerRef,
    pub proxies: Vec<ProxyHandle>,
    pub config: GatewayConfig,
}

/// Every service of the settlement core, wired together.
pub struct Gateway {
    pub stores: Stores,
    pub allocator: Arc<CardAllocator>,
    pub dispatcher: Arc<TaskDispatcher>,
    pub broker: Arc<SubscriptionBroker>,
    pub settlement: Arc<SettlementOrchestrator>,
    pub orders: OrderService,
    pub notifications: NotificationService,
    pub waiter: LinkWaiter,
    started: AtomicBool,
}

impl Gateway {
    /// Builds the services and the initial card pool. Nothing runs until [`start`](Self::start).
    pub async fn build(parts: GatewayParts) -> Result<Self> {
        let GatewayParts {
            stores,
            bank,
            alerter,
            listener,
            proxies,
            config,
        } = parts;

        let cards = stores.cards.enabled_cards().await?;
        tracing::info!(cards = cards.len(), proxies = proxies.len(), "Building gateway");

        let allocator = Arc::new(CardAllocator::new(
            cards,
            config.allocator.clone(),
            Arc::clone(&alerter),
        ));
        let dispatcher = Arc::new(TaskDispatcher::new(
            Arc::new(ProxyPool::new(proxies)),
            config.dispatcher.clone(),
        ));
        let broker = Arc::new(SubscriptionBroker::new(config.broker.clone()));
        let recorder = Arc::new(CompletionRecorder::new(
            stores.clone(),
            Arc::clone(&broker),
            listener,
            alerter,
            config.card_disable_amount,
        ));
        let settlement = Arc::new(SettlementOrchestrator::new(
            stores.clone(),
            bank,
            Arc::clone(&dispatcher),
            Arc::clone(&allocator),
            Arc::clone(&recorder),
            config.settlement.clone(),
        ));
        let orders = OrderService::new(
            stores.clone(),
            Arc::clone(&allocator),
            Arc::clone(&settlement),
            config.clone(),
        );
        let notifications =
            NotificationService::new(stores.clone(), Arc::clone(&allocator), recorder);
        let waiter = LinkWaiter::new(
            stores.clone(),
            Arc::clone(&broker),
            config.settlement.link_wait_timeout,
        );

        Ok(Self {
            stores,
            allocator,
            dispatcher,
            broker,
            settlement,
            orders,
            notifications,
            waiter,
            started: AtomicBool::new(false),
        })
    }

    /// Starts the dispatcher and the maintenance loops, then resumes the
    /// confirmation of links left pending. Calling it again is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.dispatcher.start();
        self.allocator.spawn_lock_sweep();
        self.allocator.spawn_refresh(Arc::clone(&self.stores.cards));
        self.broker.spawn_gc();
        self.settlement.resume_pending().await?;
        Ok(())
    }
}
