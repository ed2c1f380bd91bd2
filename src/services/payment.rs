//! Hosted payment page integration.
//!
//! Checkout exchanges the order for a one-time token and the storefront
//! embeds the gateway's page in an iframe. The gateway later posts the
//! outcome to our callback, signed with the same merchant secrets.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::config::PaymentConfig;
use crate::domain::value_objects::Money;

type HmacSha256 = Hmac<Sha256>;

const NO_INSTALLMENT: &str = "0";
const MAX_INSTALLMENT: &str = "0";
const TIMEOUT_MINUTES: &str = "30";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment gateway is not configured")]
    NotConfigured,
    #[error("Payment gateway refused the request: {0}")]
    Refused(String),
    #[error("Payment gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Could not sign payment request")]
    Signing,
}

#[derive(Debug, Clone)]
pub struct BasketLine {
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Alphanumeric order reference echoed back in the callback.
    pub reference: String,
    pub email: String,
    pub amount: Money,
    pub user_ip: String,
    pub user_name: String,
    pub user_address: String,
    pub user_phone: String,
    pub basket: Vec<BasketLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub token: String,
    pub iframe_url: String,
}

/// Form the gateway posts to the callback URL.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCallback {
    pub merchant_oid: String,
    pub status: String,
    pub total_amount: String,
    pub hash: String,
}

impl PaymentCallback {
    pub fn succeeded(&self) -> bool { self.status == "success" }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    async fn request_token(&self, request: &PaymentRequest) -> Result<PaymentSession, PaymentError>;
    fn verify_callback(&self, callback: &PaymentCallback) -> bool;
}

pub struct IframeGateway {
    http: reqwest::Client,
    config: PaymentConfig,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    status: String,
    token: Option<String>,
    reason: Option<String>,
}

impl IframeGateway {
    pub fn new(config: PaymentConfig) -> Self { Self { http: reqwest::Client::new(), config } }

    fn sign(&self, message: &str) -> Result<String, PaymentError> {
        sign(&self.config.merchant_key, message)
    }

    fn test_mode(&self) -> &'static str { if self.config.test_mode { "1" } else { "0" } }
}

pub fn sign(key: &str, message: &str) -> Result<String, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| PaymentError::Signing)?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Basket as the gateway wants it: base64 of `[[name, unit price, qty], ...]`.
pub fn encode_basket(lines: &[BasketLine]) -> String {
    let rows: Vec<(String, String, u32)> = lines
        .iter()
        .map(|l| (l.name.clone(), l.unit_price.rounded().amount().to_string(), l.quantity))
        .collect();
    STANDARD.encode(serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string()))
}

#[async_trait]
impl PaymentGateway for IframeGateway {
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn request_token(&self, request: &PaymentRequest) -> Result<PaymentSession, PaymentError> {
        if self.config.merchant_id.is_empty() || self.config.merchant_key.is_empty() {
            return Err(PaymentError::NotConfigured);
        }
        let amount = request.amount.minor_units().to_string();
        let basket = encode_basket(&request.basket);
        let currency = "TL";
        let hash_input = format!(
            "{}{}{}{}{}{}{}{}{}{}{}",
            self.config.merchant_id, request.user_ip, request.reference, request.email, amount, basket,
            NO_INSTALLMENT, MAX_INSTALLMENT, currency, self.test_mode(), self.config.merchant_salt,
        );
        let token = self.sign(&hash_input)?;

        let form = [
            ("merchant_id", self.config.merchant_id.as_str()),
            ("user_ip", request.user_ip.as_str()),
            ("merchant_oid", request.reference.as_str()),
            ("email", request.email.as_str()),
            ("payment_amount", amount.as_str()),
            ("paytr_token", token.as_str()),
            ("user_basket", basket.as_str()),
            ("debug_on", self.test_mode()),
            ("no_installment", NO_INSTALLMENT),
            ("max_installment", MAX_INSTALLMENT),
            ("user_name", request.user_name.as_str()),
            ("user_address", request.user_address.as_str()),
            ("user_phone", request.user_phone.as_str()),
            ("merchant_ok_url", self.config.ok_url.as_str()),
            ("merchant_fail_url", self.config.fail_url.as_str()),
            ("timeout_limit", TIMEOUT_MINUTES),
            ("currency", currency),
            ("test_mode", self.test_mode()),
        ];

        let response: TokenResponse = self.http.post(&self.config.api_url).form(&form).send().await?.json().await?;
        match (response.status.as_str(), response.token) {
            ("success", Some(token)) => Ok(PaymentSession {
                iframe_url: format!("{}/{token}", self.config.iframe_base_url.trim_end_matches('/')),
                token,
            }),
            _ => {
                let reason = response.reason.unwrap_or_else(|| "unknown reason".to_string());
                warn!(%reason, "payment token refused");
                Err(PaymentError::Refused(reason))
            }
        }
    }

    fn verify_callback(&self, callback: &PaymentCallback) -> bool {
        let message = format!("{}{}{}{}", callback.merchant_oid, self.config.merchant_salt, callback.status, callback.total_amount);
        self.sign(&message).is_ok_and(|expected| expected == callback.hash)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Gateway double that hands out predictable tokens and trusts
    /// callbacks whose hash is `ok`.
    #[derive(Debug, Default)]
    pub struct FakeGateway;

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn request_token(&self, request: &PaymentRequest) -> Result<PaymentSession, PaymentError> {
            Ok(PaymentSession { token: format!("tok-{}", request.reference), iframe_url: format!("https://pay.test/{}", request.reference) })
        }

        fn verify_callback(&self, callback: &PaymentCallback) -> bool { callback.hash == "ok" }
    }
}
