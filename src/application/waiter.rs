use super::broker::{SubscriptionBroker, WatchKey, Watched};
use crate::domain::order::Status;
use crate::domain::payment_link::PaymentLink;
use crate::domain::ports::Stores;
use crate::error::{GatewayError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The link is ready to be handed to the payer.
    Link(String),
    /// Creation finished without a usable link.
    Empty,
    TimedOut,
    Disconnected,
}

impl WaitOutcome {
    fn from_link(link: &PaymentLink) -> Self {
        if link.status == Status::Pending && !link.url.is_empty() {
            Self::Link(link.url.clone())
        } else {
            Self::Empty
        }
    }
}

/// Blocks a caller until the payment link of an order is created.
///
/// Giving up here never cancels the settlement running in the background.
pub struct LinkWaiter {
    stores: Stores,
    broker: Arc<SubscriptionBroker>,
    timeout: Duration,
}

impl LinkWaiter {
    pub fn new(stores: Stores, broker: Arc<SubscriptionBroker>, timeout: Duration) -> Self {
        Self {
            stores,
            broker,
            timeout,
        }
    }

    /// Resolves on the first of: link created, timeout, or `disconnect` completing.
    pub async fn wait<D>(&self, number: Uuid, disconnect: D) -> Result<WaitOutcome>
    where
        D: Future<Output = ()>,
    {
        let order = self
            .stores
            .orders
            .find_by_number(number)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("order {number}")))?;
        let link = self
            .stores
            .links
            .find_by_order_id(order.id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("payment link of order {number}")))?;
        if link.status == Status::Pending {
            return Ok(WaitOutcome::from_link(&link));
        }

        // Subscribe before re-reading so a publish in between is not lost.
        let (tx, rx) = oneshot::channel();
        self.broker
            .subscribe(vec![WatchKey::payment_link(link.id)], move |entity| {
                if let Watched::PaymentLink(link) = entity {
                    let _ = tx.send(link);
                }
            })
            .await?;

        if let Some(current) = self.stores.links.find_by_id(link.id).await?
            && current.status != Status::New
        {
            return Ok(WaitOutcome::from_link(&current));
        }

        tokio::select! {
            published = rx => Ok(match published {
                Ok(link) => WaitOutcome::from_link(&link),
                Err(_) => WaitOutcome::Empty,
            }),
            _ = tokio::time::sleep(self.timeout) => {
                tracing::debug!(%number, "Gave up waiting for payment link");
                Ok(WaitOutcome::TimedOut)
            }
            _ = disconnect => Ok(WaitOutcome::Disconnected),
        }
    }
}
