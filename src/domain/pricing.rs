//! Made-to-measure pricing
//!
//! Custom-size curtains are sold by the running metre of width. Wide panels
//! get a stepped discount, very tall ones a small surcharge for the extra
//! fabric drop.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::value_objects::Money;

/// Width tiers as (minimum width in cm, discount percent), widest first.
const WIDTH_DISCOUNTS: [(u32, i64); 3] = [(500, 15), (300, 10), (200, 5)];

/// Height tiers as (height strictly above, surcharge percent), tallest first.
const HEIGHT_SURCHARGES: [(u32, i64); 2] = [(300, 10), (250, 5)];

/// Pricing parameters of a made-to-measure product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomSizing {
    /// Rate per metre of width. Older catalog documents call it `pricePerSqM`.
    #[serde(alias = "pricePerSqM")]
    pub price_per_meter: Money,
    pub min_width_cm: u32,
    pub max_width_cm: u32,
    pub min_height_cm: u32,
    pub max_height_cm: u32,
}

/// Customer-entered panel size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub width_cm: u32,
    pub height_cm: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}x{}", self.width_cm, self.height_cm) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("width {value} cm outside {min}-{max} cm")]
    WidthOutOfRange { value: u32, min: u32, max: u32 },
    #[error("height {value} cm outside {min}-{max} cm")]
    HeightOutOfRange { value: u32, min: u32, max: u32 },
    #[error("product is not sold by custom size")]
    NotCustomSized,
    #[error("dimensions are required for custom-size products")]
    DimensionsRequired,
}

impl CustomSizing {
    pub fn check(&self, dims: Dimensions) -> Result<(), PricingError> {
        if dims.width_cm < self.min_width_cm || dims.width_cm > self.max_width_cm {
            return Err(PricingError::WidthOutOfRange { value: dims.width_cm, min: self.min_width_cm, max: self.max_width_cm });
        }
        if dims.height_cm < self.min_height_cm || dims.height_cm > self.max_height_cm {
            return Err(PricingError::HeightOutOfRange { value: dims.height_cm, min: self.min_height_cm, max: self.max_height_cm });
        }
        Ok(())
    }
}

pub fn width_discount_percent(width_cm: u32) -> Decimal {
    WIDTH_DISCOUNTS
        .iter()
        .find(|(min, _)| width_cm >= *min)
        .map_or(Decimal::ZERO, |(_, pct)| Decimal::from(*pct))
}

pub fn height_surcharge_percent(height_cm: u32) -> Decimal {
    HEIGHT_SURCHARGES
        .iter()
        .find(|(above, _)| height_cm > *above)
        .map_or(Decimal::ZERO, |(_, pct)| Decimal::from(*pct))
}

/// Unit price of one panel at the given size.
pub fn quote(sizing: &CustomSizing, dims: Dimensions) -> Result<Money, PricingError> {
    sizing.check(dims)?;
    let meters = Decimal::from(dims.width_cm) / Decimal::ONE_HUNDRED;
    let discount = Decimal::ONE - width_discount_percent(dims.width_cm) / Decimal::ONE_HUNDRED;
    let surcharge = Decimal::ONE + height_surcharge_percent(dims.height_cm) / Decimal::ONE_HUNDRED;
    Ok(sizing.price_per_meter.scale(meters * discount * surcharge))
}
