//! Service configuration loaded from the environment (after `.env`).
//!
//! Required: `DATABASE_URL`, `ADMIN_TOKEN`.
//! Optional: `PORT` (8083), `NATS_URL`, `PUBLIC_BASE_URL`, `MEDIA_DIR`,
//! `MEDIA_BASE_URL`, `FREE_SHIPPING_THRESHOLD` (500), `SHIPPING_FEE` (49.90)
//! and the `PAYMENT_*` gateway credentials.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::aggregates::ShippingPolicy;
use crate::domain::value_objects::Money;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct PaymentConfig {
    pub merchant_id: String,
    pub merchant_key: String,
    pub merchant_salt: String,
    pub api_url: String,
    pub iframe_base_url: String,
    pub ok_url: String,
    pub fail_url: String,
    pub test_mode: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    pub admin_token: String,
    pub public_base_url: String,
    pub media_dir: PathBuf,
    pub media_base_url: String,
    pub shipping: ShippingPolicy,
    pub payment: PaymentConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let or = |key: &'static str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let public_base_url = or("PUBLIC_BASE_URL", "http://localhost:8083").trim_end_matches('/').to_string();
        let payment = PaymentConfig {
            merchant_id: or("PAYMENT_MERCHANT_ID", ""),
            merchant_key: or("PAYMENT_MERCHANT_KEY", ""),
            merchant_salt: or("PAYMENT_MERCHANT_SALT", ""),
            api_url: or("PAYMENT_API_URL", "https://www.paytr.com/odeme/api/get-token"),
            iframe_base_url: or("PAYMENT_IFRAME_URL", "https://www.paytr.com/odeme/guvenli"),
            ok_url: or("PAYMENT_OK_URL", &format!("{public_base_url}/odeme/basarili")),
            fail_url: or("PAYMENT_FAIL_URL", &format!("{public_base_url}/odeme/hata")),
            test_mode: parse("PAYMENT_TEST_MODE", &or("PAYMENT_TEST_MODE", "true"))?,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            port: parse("PORT", &or("PORT", "8083"))?,
            nats_url: get("NATS_URL"),
            admin_token: required("ADMIN_TOKEN")?,
            media_dir: PathBuf::from(or("MEDIA_DIR", "./media")),
            media_base_url: or("MEDIA_BASE_URL", &format!("{public_base_url}/media")),
            shipping: ShippingPolicy {
                free_over: Money::lira(parse::<Decimal>("FREE_SHIPPING_THRESHOLD", &or("FREE_SHIPPING_THRESHOLD", "500"))?),
                flat_fee: Money::lira(parse::<Decimal>("SHIPPING_FEE", &or("SHIPPING_FEE", "49.90"))?),
            },
            public_base_url,
            payment,
        })
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://x"), ("ADMIN_TOKEN", "t")])).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.shipping, ShippingPolicy::default());
        assert!(config.payment.test_mode);
        assert_eq!(config.media_base_url, "http://localhost:8083/media");
    }

    #[test]
    fn test_missing_and_invalid() {
        assert!(matches!(Config::from_lookup(lookup(&[("ADMIN_TOKEN", "t")])), Err(ConfigError::Missing("DATABASE_URL"))));
        let bad = Config::from_lookup(lookup(&[("DATABASE_URL", "x"), ("ADMIN_TOKEN", "t"), ("PORT", "http")]));
        assert!(matches!(bad, Err(ConfigError::Invalid { key: "PORT", .. })));
    }
}
