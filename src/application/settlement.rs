//! Payment-link settlement state machine.
//!
//! ```text
//! New --create-link--> Pending --check-link (attempt n)--> Completed | Failed
//!   \                     |  ^
//!    \--error--> Failed   +--+ transient: attempt n+1 after `check_interval`
//! ```
//!
//! Every step is a [`WorkUnit`] on the dispatcher. Each transition is
//! persisted before the next unit is submitted, so the pending links in
//! storage are enough to resume the flow after a restart.

use super::allocator::CardAllocator;
use super::broker::Watched;
use super::completion::CompletionRecorder;
use super::dispatcher::{TaskDispatcher, WorkUnit};
use crate::config::SettlementConfig;
use crate::domain::bank::{CheckMerchantRequest, LinkRequest};
use crate::domain::card::Card;
use crate::domain::order::{Order, Status};
use crate::domain::payment_link::{PaymentLink, PaymentLinkId};
use crate::domain::ports::{BankApiRef, Stores};
use crate::error::{GatewayError, Result};
use crate::infrastructure::proxy::ProxyHandle;
use chrono::Utc;
use reqwest::Url;
use std::sync::Arc;

/// A redirect such as `https://host/a/b/<tx>` has at least this many `/`-separated parts.
const MIN_REDIRECT_SEGMENTS: usize = 5;
const MIN_TRANSACTION_ID_LEN: usize = 10;

/// Result of one confirmation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Completed(String),
    Failed(String),
    Retry(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Creation,
    Confirmation,
}

pub struct SettlementOrchestrator {
    stores: Stores,
    bank: BankApiRef,
    dispatcher: Arc<TaskDispatcher>,
    allocator: Arc<CardAllocator>,
    recorder: Arc<CompletionRecorder>,
    config: SettlementConfig,
}

impl SettlementOrchestrator {
    pub fn new(
        stores: Stores,
        bank: BankApiRef,
        dispatcher: Arc<TaskDispatcher>,
        allocator: Arc<CardAllocator>,
        recorder: Arc<CompletionRecorder>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            stores,
            bank,
            dispatcher,
            allocator,
            recorder,
            config,
        }
    }

    /// Persists a new link for `order` and schedules its creation.
    pub async fn start(self: &Arc<Self>, order: &Order, card: Card) -> Result<PaymentLink> {
        let link = self.stores.links.save(PaymentLink::for_order(order)).await?;
        let link_id = link.id;
        let this = Arc::clone(self);
        self.dispatcher.add_task(WorkUnit::new(
            format!("create-link#{link_id}"),
            move |proxy| async move { this.create_link(link_id, card, proxy).await },
        ));
        tracing::debug!(order_id = order.id, link_id, "Link creation scheduled");
        Ok(link)
    }

    /// Re-arms the confirmation chain of every pending link.
    pub async fn resume_pending(self: &Arc<Self>) -> Result<usize> {
        let pending = self.stores.links.get_pending().await?;
        for link in &pending {
            self.schedule_check(link.id, 1);
        }
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "Resumed pending payment links");
        }
        Ok(pending.len())
    }

    async fn create_link(self: Arc<Self>, link_id: PaymentLinkId, card: Card, proxy: ProxyHandle) {
        let (link, order) = match self.load(link_id).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                tracing::error!(link_id, "Payment link or its order disappeared");
                return;
            }
            Err(e) => {
                tracing::error!(link_id, error = %e, "Failed to load payment link");
                return;
            }
        };

        match self.request_link(&proxy, &link, &card).await {
            Ok((check_merchant_id, url)) => {
                if let Err(e) = self.activate(link, order, check_merchant_id, url).await {
                    tracing::error!(link_id, error = %e, "Failed to persist created link");
                }
            }
            Err(e) => {
                tracing::warn!(link_id, proxy = proxy.label(), error = %e, "Link creation failed");
                self.finish(link, Status::Failed, Some(e.to_string()), Phase::Creation)
                    .await;
            }
        }
    }

    async fn request_link(
        &self,
        proxy: &ProxyHandle,
        link: &PaymentLink,
        card: &Card,
    ) -> Result<(String, String)> {
        let attributes = self.bank.get_attributes(proxy).await?;

        let (prefix, number) = card
            .phone()
            .ok_or_else(|| GatewayError::Validation(format!("card #{} has no phone", card.id)))?;
        let request = CheckMerchantRequest::new(&attributes, prefix, number);
        let check_merchant_id = self.bank.check_merchant(proxy, &request).await?;
        if check_merchant_id.is_empty() {
            return Err(GatewayError::ExternalProtocol(
                "check merchant id is empty".to_string(),
            ));
        }

        let card_type = link.card_type.bank_name().ok_or_else(|| {
            GatewayError::Validation(format!("card type {:?} is not supported", link.card_type))
        })?;
        let request = LinkRequest {
            check_merchant: check_merchant_id.clone(),
            amount: link.formatted_amount(),
            card_type: card_type.to_string(),
        };
        let url = self.bank.get_link(proxy, &request).await?;
        Url::parse(&url).map_err(|e| {
            GatewayError::ExternalProtocol(format!("payment url '{url}' is invalid: {e}"))
        })?;

        Ok((check_merchant_id, url))
    }

    async fn activate(
        self: &Arc<Self>,
        mut link: PaymentLink,
        mut order: Order,
        check_merchant_id: String,
        url: String,
    ) -> Result<()> {
        link.check_merchant_id = check_merchant_id;
        link.url = url;
        link.advance(Status::Pending)?;
        let link = self.stores.links.save(link).await?;

        order.advance(Status::Pending)?;
        let order = self.stores.orders.save(order).await?;
        tracing::info!(order_id = order.id, link_id = link.id, "Payment link created");

        self.recorder.listener().link_created(&link);
        self.recorder.publish(Watched::Order(order));
        self.recorder.publish(Watched::PaymentLink(link.clone()));
        self.schedule_check(link.id, 1);
        Ok(())
    }

    fn schedule_check(self: &Arc<Self>, link_id: PaymentLinkId, attempt: u32) {
        let this = Arc::clone(self);
        self.dispatcher.add_task(WorkUnit::retry(
            format!("check-link#{link_id}"),
            attempt.saturating_sub(1),
            self.config.check_interval,
            move |proxy| async move { this.confirm(link_id, attempt, proxy).await },
        ));
    }

    async fn confirm(self: Arc<Self>, link_id: PaymentLinkId, attempt: u32, proxy: ProxyHandle) {
        let link = match self.stores.links.find_by_id(link_id).await {
            Ok(Some(link)) if !link.status.is_terminal() => link,
            Ok(_) => return,
            Err(e) => {
                tracing::error!(link_id, error = %e, "Failed to load payment link");
                return;
            }
        };

        match self.check_once(&link, attempt, &proxy).await {
            CheckOutcome::Completed(transaction_id) => {
                let mut link = link;
                link.transaction_id = transaction_id;
                self.finish(link, Status::Completed, None, Phase::Confirmation)
                    .await;
            }
            CheckOutcome::Failed(reason) => {
                self.finish(link, Status::Failed, Some(reason), Phase::Confirmation)
                    .await;
            }
            CheckOutcome::Retry(reason) => {
                tracing::debug!(link_id, attempt, proxy = proxy.label(), %reason, "Payment not confirmed yet");
                self.schedule_check(link_id, attempt.saturating_add(1));
            }
        }
    }

    /// One confirmation attempt. Never fails: every error becomes an outcome.
    pub async fn check_once(
        &self,
        link: &PaymentLink,
        attempt: u32,
        proxy: &ProxyHandle,
    ) -> CheckOutcome {
        if attempt > self.config.max_attempts {
            return CheckOutcome::Failed("attempts exceeded".to_string());
        }
        let elapsed = (Utc::now() - link.updated_at).to_std().unwrap_or_default();
        if elapsed > self.config.check_timeout {
            return CheckOutcome::Failed("timeout".to_string());
        }

        let location = match self.bank.follow_payment_url(proxy, &link.url).await {
            Ok(Some(location)) => location,
            Ok(None) => return CheckOutcome::Retry("no redirect".to_string()),
            Err(e) => return CheckOutcome::Retry(e.to_string()),
        };
        let Some(transaction_id) = transaction_id_from_redirect(&location) else {
            return CheckOutcome::Retry(format!("malformed redirect '{location}'"));
        };

        match self.bank.get_transaction_info(proxy, &transaction_id).await {
            Ok(info) if info.is_settled() => CheckOutcome::Completed(info.transaction_id),
            Ok(_) => CheckOutcome::Failed("not completed".to_string()),
            Err(e) if e.is_transient() => CheckOutcome::Retry(e.to_string()),
            Err(e) => {
                tracing::warn!(link_id = link.id, error = %e, "Unusable transaction info");
                CheckOutcome::Failed("not completed".to_string())
            }
        }
    }

    async fn finish(&self, mut link: PaymentLink, status: Status, reason: Option<String>, phase: Phase) {
        let link_id = link.id;
        if let Err(e) = link.advance(status) {
            tracing::warn!(link_id, error = %e, "Ignoring late settlement outcome");
            return;
        }
        if status == Status::Completed {
            link.date_paid = Some(Utc::now());
        }
        link.failure_reason = reason;
        let link = match self.stores.links.save(link).await {
            Ok(link) => link,
            Err(e) => {
                tracing::error!(link_id, error = %e, "Failed to persist payment link");
                return;
            }
        };
        tracing::info!(
            link_id,
            order_id = link.order_id,
            status = %link.status,
            reason = link.failure_reason.as_deref().unwrap_or(""),
            "Payment link finished"
        );

        self.allocator.unlock_by_order(link.order_id).await;
        match self.stores.orders.find_by_id(link.order_id).await {
            Ok(Some(order)) if !order.is_finished() => {
                if let Err(e) = self.recorder.finish_order(order, status).await {
                    tracing::error!(order_id = link.order_id, error = %e, "Failed to finish order");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!(order_id = link.order_id, error = %e, "Failed to load order"),
        }

        if phase == Phase::Creation {
            self.recorder.listener().link_created(&link);
        }
        self.recorder.publish(Watched::PaymentLink(link));
    }

    async fn load(&self, link_id: PaymentLinkId) -> Result<Option<(PaymentLink, Order)>> {
        let Some(link) = self.stores.links.find_by_id(link_id).await? else {
            return Ok(None);
        };
        let order = self.stores.orders.find_by_id(link.order_id).await?;
        Ok(order.map(|order| (link, order)))
    }
}

/// Extracts the transaction id from the last path segment of a redirect.
pub fn transaction_id_from_redirect(location: &str) -> Option<String> {
    let segments: Vec<&str> = location.split('/').collect();
    if segments.len() < MIN_REDIRECT_SEGMENTS {
        return None;
    }
    segments
        .last()
        .filter(|id| id.len() >= MIN_TRANSACTION_ID_LEN)
        .map(|id| id.to_string())
}
