//! Runtime tunables and the bank endpoint configuration.

use crate::domain::order::PaymentMethod;
use crate::error::{GatewayError, Result};
use reqwest::Url;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// How long a card stays reserved for one order.
    pub lock_ttl: Duration,
    pub lock_sweep_interval: Duration,
    pub pool_refresh_interval: Duration,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(10 * 60),
            lock_sweep_interval: Duration::from_secs(30),
            pool_refresh_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub tick: Duration,
    pub max_per_tick: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            max_per_tick: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub check_interval: Duration,
    pub check_timeout: Duration,
    pub max_attempts: u32,
    /// How long a waiter blocks for the payment link.
    pub link_wait_timeout: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(20),
            check_timeout: Duration::from_secs(10 * 60),
            max_attempts: 100,
            link_wait_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub subscription_lifetime: Duration,
    pub gc_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            subscription_lifetime: Duration::from_secs(30),
            gc_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountLimits {
    pub min: Decimal,
    pub max: Decimal,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub allocator: AllocatorConfig,
    pub dispatcher: DispatcherConfig,
    pub settlement: SettlementConfig,
    pub broker: BrokerConfig,
    /// Balance at which a card is taken out of rotation.
    pub card_disable_amount: Decimal,
    pub bank_transfer_limits: AmountLimits,
    pub kapital_bank_limits: AmountLimits,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            allocator: AllocatorConfig::default(),
            dispatcher: DispatcherConfig::default(),
            settlement: SettlementConfig::default(),
            broker: BrokerConfig::default(),
            card_disable_amount: dec!(5000),
            bank_transfer_limits: AmountLimits {
                min: dec!(5),
                max: dec!(100000),
            },
            kapital_bank_limits: AmountLimits {
                min: dec!(1),
                max: dec!(100000),
            },
        }
    }
}

impl GatewayConfig {
    pub fn limits(&self, method: PaymentMethod) -> AmountLimits {
        match method {
            PaymentMethod::BankTransfer => self.bank_transfer_limits,
            PaymentMethod::KapitalBank => self.kapital_bank_limits,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BankLinks {
    pub get_atts_url: String,
    pub check_merchant_url: String,
    pub payment_url: String,
    /// Prefix; the transaction id is appended to it.
    pub transaction_info: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BankConfig {
    pub host: String,
    pub links: BankLinks,
}

impl BankConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GatewayError::Validation(format!("invalid bank config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let urls = [
            ("bank.host", &self.host),
            ("bank.links.get_atts_url", &self.links.get_atts_url),
            ("bank.links.check_merchant_url", &self.links.check_merchant_url),
            ("bank.links.payment_url", &self.links.payment_url),
            ("bank.links.transaction_info", &self.links.transaction_info),
        ];
        for (name, value) in urls {
            if Url::parse(value).is_err() {
                return Err(GatewayError::Validation(format!(
                    "{name} is not a correct URL"
                )));
            }
        }
        Ok(())
    }
}
