use crate::config::BankLinks;
use crate::domain::bank::{
    Attributes, AttributesResponse, CheckMerchantRequest, CheckMerchantResponse, LinkRequest,
    LinkResponse, TransactionInfo,
};
use crate::domain::ports::BankApi;
use crate::error::{GatewayError, Result};
use crate::infrastructure::proxy::ProxyHandle;
use async_trait::async_trait;
use reqwest::Response;
use reqwest::header::LOCATION;
use serde::de::DeserializeOwned;

/// [`BankApi`] over HTTP, using the client of whichever proxy the task got.
#[derive(Debug, Clone)]
pub struct HttpBank {
    links: BankLinks,
}

impl HttpBank {
    pub fn new(links: BankLinks) -> Self {
        Self { links }
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        return Err(GatewayError::ExternalProtocol(format!(
            "{} answered {}",
            resp.url(),
            status.as_u16()
        )));
    }
    Ok(resp.json::<T>().await?)
}

#[async_trait]
impl BankApi for HttpBank {
    async fn get_attributes(&self, proxy: &ProxyHandle) -> Result<Attributes> {
        let resp = proxy.client().get(&self.links.get_atts_url).send().await?;
        let dto: AttributesResponse = decode(resp).await?;
        Attributes::try_from(dto)
    }

    async fn check_merchant(
        &self,
        proxy: &ProxyHandle,
        request: &CheckMerchantRequest,
    ) -> Result<String> {
        let resp = proxy
            .client()
            .post(&self.links.check_merchant_url)
            .json(request)
            .send()
            .await?;
        let dto: CheckMerchantResponse = decode(resp).await?;
        Ok(dto.check_merchant_id)
    }

    async fn get_link(&self, proxy: &ProxyHandle, request: &LinkRequest) -> Result<String> {
        let resp = proxy
            .client()
            .post(&self.links.payment_url)
            .json(request)
            .send()
            .await?;
        let dto: LinkResponse = decode(resp).await?;
        Ok(dto.payment_url)
    }

    async fn follow_payment_url(&self, proxy: &ProxyHandle, url: &str) -> Result<Option<String>> {
        let resp = proxy.client().get(url).send().await?;
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Ok(location)
    }

    async fn get_transaction_info(
        &self,
        proxy: &ProxyHandle,
        transaction_id: &str,
    ) -> Result<TransactionInfo> {
        let url = format!("{}{}", self.links.transaction_info, transaction_id);
        let resp = proxy.client().get(&url).send().await?;
        // The bank reports unknown transactions with an error status but a
        // regular body, so the body wins over the status code.
        let status = resp.status();
        let body = resp.bytes().await?;
        match serde_json::from_slice::<TransactionInfo>(&body) {
            Ok(info) => Ok(info),
            Err(_) if !status.is_success() => Err(GatewayError::ExternalProtocol(format!(
                "{url} answered {}",
                status.as_u16()
            ))),
            Err(e) => Err(GatewayError::ExternalProtocol(format!(
                "malformed transaction info: {e}"
            ))),
        }
    }
}

/// Stand-in used when no bank endpoints are configured: every call fails,
/// so link orders end up `Failed` instead of hanging.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledBank;

impl DisabledBank {
    fn unavailable<T>() -> Result<T> {
        Err(GatewayError::ExternalProtocol(
            "bank endpoints are not configured".to_string(),
        ))
    }
}

#[async_trait]
impl BankApi for DisabledBank {
    async fn get_attributes(&self, _proxy: &ProxyHandle) -> Result<Attributes> {
        Self::unavailable()
    }

    async fn check_merchant(
        &self,
        _proxy: &ProxyHandle,
        _request: &CheckMerchantRequest,
    ) -> Result<String> {
        Self::unavailable()
    }

    async fn get_link(&self, _proxy: &ProxyHandle, _request: &LinkRequest) -> Result<String> {
        Self::unavailable()
    }

    async fn follow_payment_url(&self, _proxy: &ProxyHandle, _url: &str) -> Result<Option<String>> {
        Self::unavailable()
    }

    async fn get_transaction_info(
        &self,
        _proxy: &ProxyHandle,
        _transaction_id: &str,
    ) -> Result<TransactionInfo> {
        Self::unavailable()
    }
}
