#![allow(dead_code)]

use async_trait::async_trait;
use cardpool::application::gateway::{Gateway, GatewayParts};
use cardpool::config::GatewayConfig;
use cardpool::domain::bank::{
    Attributes, CheckMerchantRequest, IdDto, LinkRequest, TransactionInfo,
};
use cardpool::domain::card::{Card, CardId};
use cardpool::domain::order::{Order, OrderId, PaymentMethod, Status};
use cardpool::domain::payment_link::PaymentLink;
use cardpool::domain::ports::{Alerter, BankApi, SettlementListener, Stores};
use cardpool::error::{GatewayError, Result};
use cardpool::infrastructure::proxy::ProxyHandle;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PAYMENT_URL: &str = "https://pay.bank.test/link/abc";
pub const REDIRECT: &str = "https://pay.bank.test/receipt/tx0000000001";

/// Fake bank answering from a fixed script.
pub struct ScriptedBank {
    pub attributes_fail: bool,
    pub check_merchant_id: String,
    pub payment_url: String,
    /// Calls to the payment URL failing with a transport error before the redirect shows up.
    pub transient_failures: u32,
    pub redirect: Option<String>,
    pub settled: bool,
    pub follow_calls: AtomicU32,
    pub link_requests: Mutex<Vec<LinkRequest>>,
    pub check_requests: Mutex<Vec<CheckMerchantRequest>>,
}

impl Default for ScriptedBank {
    fn default() -> Self {
        Self {
            attributes_fail: false,
            check_merchant_id: "check-1".to_string(),
            payment_url: PAYMENT_URL.to_string(),
            transient_failures: 0,
            redirect: Some(REDIRECT.to_string()),
            settled: true,
            follow_calls: AtomicU32::new(0),
            link_requests: Mutex::new(Vec::new()),
            check_requests: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedBank {
    pub fn follow_calls(&self) -> u32 {
        self.follow_calls.load(Ordering::SeqCst)
    }

    pub fn link_requests(&self) -> Vec<LinkRequest> {
        self.link_requests.lock().unwrap().clone()
    }

    pub fn check_requests(&self) -> Vec<CheckMerchantRequest> {
        self.check_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BankApi for ScriptedBank {
    async fn get_attributes(&self, _proxy: &ProxyHandle) -> Result<Attributes> {
        if self.attributes_fail {
            return Err(GatewayError::ExternalProtocol("merchant.id is empty".into()));
        }
        Ok(Attributes {
            merchant_id: "merchant-1".to_string(),
            payment_information_id: "info-1".to_string(),
        })
    }

    async fn check_merchant(
        &self,
        _proxy: &ProxyHandle,
        request: &CheckMerchantRequest,
    ) -> Result<String> {
        self.check_requests.lock().unwrap().push(request.clone());
        Ok(self.check_merchant_id.clone())
    }

    async fn get_link(&self, _proxy: &ProxyHandle, request: &LinkRequest) -> Result<String> {
        self.link_requests.lock().unwrap().push(request.clone());
        Ok(self.payment_url.clone())
    }

    async fn follow_payment_url(&self, _proxy: &ProxyHandle, _url: &str) -> Result<Option<String>> {
        let call = self.follow_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.transient_failures {
            return Err(GatewayError::TransientNetwork("connection reset".into()));
        }
        Ok(self.redirect.clone())
    }

    async fn get_transaction_info(
        &self,
        _proxy: &ProxyHandle,
        transaction_id: &str,
    ) -> Result<TransactionInfo> {
        let merchant = self.settled.then(|| IdDto {
            id: "merchant-1".to_string(),
        });
        Ok(TransactionInfo {
            transaction_id: transaction_id.to_string(),
            merchant,
            status: 1,
        })
    }
}

#[derive(Default)]
pub struct RecordingListener {
    pub created: Mutex<Vec<PaymentLink>>,
    pub finished: Mutex<Vec<Order>>,
}

impl SettlementListener for RecordingListener {
    fn link_created(&self, link: &PaymentLink) {
        self.created.lock().unwrap().push(link.clone());
    }

    fn order_finished(&self, order: &Order) {
        self.finished.lock().unwrap().push(order.clone());
    }
}

#[derive(Default)]
pub struct CountingAlerter {
    pub no_cards: AtomicUsize,
    pub disabled: Mutex<Vec<CardId>>,
}

impl CountingAlerter {
    pub fn no_cards(&self) -> usize {
        self.no_cards.load(Ordering::SeqCst)
    }
}

impl Alerter for CountingAlerter {
    fn no_cards_available(&self, _method: Option<PaymentMethod>) {
        self.no_cards.fetch_add(1, Ordering::SeqCst);
    }

    fn card_disabled(&self, card: &Card, _balance: Decimal) {
        self.disabled.lock().unwrap().push(card.id);
    }
}

pub fn number_card(number: &str) -> Card {
    Card::with_number(number).enabled()
}

pub fn phone_card(number: &str) -> Card {
    Card::with_phone("99890", number).enabled()
}

/// Short cadences so timer-driven flows finish quickly under paused time.
pub fn fast_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.dispatcher.tick = Duration::from_millis(10);
    config.settlement.check_interval = Duration::from_secs(1);
    config.settlement.check_timeout = Duration::from_secs(24 * 60 * 60);
    config.settlement.link_wait_timeout = Duration::from_secs(5);
    config
}

pub struct TestGateway {
    pub gateway: Gateway,
    pub stores: Stores,
    pub bank: Arc<ScriptedBank>,
    pub alerter: Arc<CountingAlerter>,
    pub listener: Arc<RecordingListener>,
}

/// Saves `cards`, then builds (but does not start) a gateway over in-memory stores.
pub async fn build_gateway(bank: ScriptedBank, cards: Vec<Card>, config: GatewayConfig) -> TestGateway {
    let stores = Stores::in_memory();
    for card in cards {
        stores.cards.save(card).await.unwrap();
    }
    let bank = Arc::new(bank);
    let alerter = Arc::new(CountingAlerter::default());
    let listener = Arc::new(RecordingListener::default());
    let gateway = Gateway::build(GatewayParts {
        stores: stores.clone(),
        bank: bank.clone(),
        alerter: alerter.clone(),
        listener: listener.clone(),
        proxies: Vec::new(),
        config,
    })
    .await
    .unwrap();
    TestGateway {
        gateway,
        stores,
        bank,
        alerter,
        listener,
    }
}

pub async fn started_gateway(bank: ScriptedBank, cards: Vec<Card>) -> TestGateway {
    let test = build_gateway(bank, cards, fast_config()).await;
    test.gateway.start().await.unwrap();
    test
}

/// Polls storage until the order reaches a terminal status or `limit` elapses.
pub async fn wait_until_finished(stores: &Stores, order_id: OrderId, limit: Duration) -> Order {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let order = stores.orders.find_by_id(order_id).await.unwrap().unwrap();
        if order.status.is_terminal() || tokio::time::Instant::now() >= deadline {
            return order;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Polls storage until the order reaches `status` or `limit` elapses.
pub async fn wait_for_status(stores: &Stores, order_id: OrderId, status: Status, limit: Duration) -> Order {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let order = stores.orders.find_by_id(order_id).await.unwrap().unwrap();
        if order.status == status || tokio::time::Instant::now() >= deadline {
            return order;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
