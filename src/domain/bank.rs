//! Wire types of the bank's consumer web flow.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};

/// Identifiers needed to start a payment with the bank's merchant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub merchant_id: String,
    pub payment_information_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AttributesResponse {
    pub merchant: Option<IdDto>,
    #[serde(rename = "paymentInformation", default)]
    pub payment_information: Vec<IdDto>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct IdDto {
    #[serde(default)]
    pub id: String,
}

impl TryFrom<AttributesResponse> for Attributes {
    type Error = GatewayError;

    fn try_from(dto: AttributesResponse) -> Result<Self, Self::Error> {
        let merchant_id = dto.merchant.map(|m| m.id).unwrap_or_default();
        if merchant_id.is_empty() {
            return Err(GatewayError::ExternalProtocol("merchant.id is empty".into()));
        }
        let payment_information_id = dto
            .payment_information
            .into_iter()
            .next()
            .map(|p| p.id)
            .unwrap_or_default();
        if payment_information_id.is_empty() {
            return Err(GatewayError::ExternalProtocol(
                "paymentInformation[0].id is empty".into(),
            ));
        }
        Ok(Self {
            merchant_id,
            payment_information_id,
        })
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CheckMerchantRequest {
    pub merchant: String,
    #[serde(rename = "paymentInformation")]
    pub payment_information: String,
    pub values: CheckMerchantValues,
    pub step: u8,
    pub bonusable: bool,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CheckMerchantValues {
    pub list_of_values: Vec<PhoneValue>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PhoneValue {
    pub attribute_name: String,
    pub value: String,
    pub prefix: String,
}

impl CheckMerchantRequest {
    pub fn new(attributes: &Attributes, phone_prefix: &str, phone_number: &str) -> Self {
        Self {
            merchant: attributes.merchant_id.clone(),
            payment_information: attributes.payment_information_id.clone(),
            values: CheckMerchantValues {
                list_of_values: vec![PhoneValue {
                    attribute_name: "phoneNumber".to_string(),
                    value: phone_number.to_string(),
                    prefix: phone_prefix.to_string(),
                }],
            },
            step: 2,
            bonusable: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckMerchantResponse {
    #[serde(rename = "checkMerchantId", default)]
    pub check_merchant_id: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LinkRequest {
    #[serde(rename = "checkMerchant")]
    pub check_merchant: String,
    pub amount: String,
    #[serde(rename = "cardType")]
    pub card_type: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkResponse {
    #[serde(rename = "paymentUrl", default)]
    pub payment_url: String,
}

/// State of a transaction as reported by the bank.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct TransactionInfo {
    #[serde(rename = "id", default)]
    pub transaction_id: String,
    #[serde(default)]
    pub merchant: Option<IdDto>,
    #[serde(default)]
    pub status: i64,
}

impl TransactionInfo {
    /// A transaction the bank knows about and attributes to a merchant has been paid.
    pub fn is_settled(&self) -> bool {
        !self.transaction_id.is_empty()
            && self.merchant.as_ref().is_some_and(|m| !m.id.is_empty())
    }
}
