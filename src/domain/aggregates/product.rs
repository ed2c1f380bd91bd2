//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::pricing::{self, CustomSizing, Dimensions, PricingError};
use crate::domain::value_objects::{Money, Quantity, Sku};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    id: String,
    name: String,
    slug: String,
    description: String,
    category_id: Option<String>,
    price: Money,
    compare_at_price: Option<Money>,
    variants: Vec<Variant>,
    custom_sizing: Option<CustomSizing>,
    #[serde(default)]
    original_rate: Option<Money>,
    #[serde(default)]
    images: Vec<ProductImage>,
    #[serde(default)]
    reviews: Vec<Review>,
    #[serde(default)]
    questions: Vec<Question>,
    status: ProductStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub sku: Sku,
    pub color: Option<String>,
    pub size: Option<String>,
    pub price: Money,
    /// Price before the running deal, if any.
    #[serde(default)]
    pub original_price: Option<Money>,
    pub stock: Quantity,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage { pub url: String, pub alt: Option<String>, pub position: u32 }

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review { pub id: String, pub author: String, pub rating: u8, pub comment: String, pub created_at: DateTime<Utc> }

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question { pub id: String, pub author: String, pub text: String, pub answer: Option<String>, pub asked_at: DateTime<Utc>, pub answered_at: Option<DateTime<Utc>> }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus { #[default] Draft, Active, Archived }

impl Product {
    pub fn create(name: impl Into<String>, slug: impl Into<String>, price: Money) -> Self {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let mut product = Self {
            id: id.clone(), name: name.into(), slug: slug.into(), description: String::new(), category_id: None,
            price, compare_at_price: None, variants: vec![], custom_sizing: None, original_rate: None,
            images: vec![], reviews: vec![], questions: vec![], status: ProductStatus::Draft,
            created_at: now, updated_at: now, events: vec![],
        };
        product.raise_event(DomainEvent::Product(ProductEvent::Created { product_id: id }));
        product
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn slug(&self) -> &str { &self.slug }
    pub fn description(&self) -> &str { &self.description }
    pub fn category_id(&self) -> Option<&str> { self.category_id.as_deref() }
    pub fn price(&self) -> &Money { &self.price }
    pub fn compare_at_price(&self) -> Option<&Money> { self.compare_at_price.as_ref() }
    pub fn variants(&self) -> &[Variant] { &self.variants }
    pub fn custom_sizing(&self) -> Option<&CustomSizing> { self.custom_sizing.as_ref() }
    pub fn images(&self) -> &[ProductImage] { &self.images }
    pub fn reviews(&self) -> &[Review] { &self.reviews }
    pub fn questions(&self) -> &[Question] { &self.questions }
    pub fn status(&self) -> &ProductStatus { &self.status }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_active(&self) -> bool { self.status == ProductStatus::Active }
    pub fn on_deal(&self) -> bool { self.compare_at_price.is_some() }
    pub fn is_in_stock(&self) -> bool { self.custom_sizing.is_some() || self.variants.iter().any(|v| !v.stock.is_zero()) }

    pub fn variant(&self, sku: &Sku) -> Option<&Variant> { self.variants.iter().find(|v| &v.sku == sku) }

    pub fn rename(&mut self, name: impl Into<String>) { self.name = name.into(); self.touch(); }
    pub fn set_slug(&mut self, slug: impl Into<String>) { self.slug = slug.into(); self.touch(); }
    pub fn set_description(&mut self, description: impl Into<String>) { self.description = description.into(); self.touch(); }
    pub fn set_category(&mut self, category_id: Option<String>) { self.category_id = category_id; self.touch(); }

    pub fn set_custom_sizing(&mut self, sizing: Option<CustomSizing>) -> Result<(), ProductError> {
        if let Some(s) = &sizing {
            if s.min_width_cm > s.max_width_cm || s.min_height_cm > s.max_height_cm || s.max_width_cm == 0 {
                return Err(ProductError::InvalidSizing);
            }
        }
        self.custom_sizing = sizing;
        self.original_rate = None;
        self.touch();
        Ok(())
    }

    pub fn add_variant(&mut self, variant: Variant) -> Result<(), ProductError> {
        if self.variant(&variant.sku).is_some() { return Err(ProductError::DuplicateSku(variant.sku)); }
        if variant.price.is_negative() { return Err(ProductError::NegativePrice); }
        self.variants.push(variant);
        self.touch();
        Ok(())
    }

    /// Replaces the variant list and list price. Any running deal ends first.
    pub fn reprice(&mut self, price: Money, variants: Vec<Variant>) -> Result<(), ProductError> {
        if price.is_negative() { return Err(ProductError::NegativePrice); }
        for (i, v) in variants.iter().enumerate() {
            if variants.iter().skip(i + 1).any(|other| other.sku == v.sku) { return Err(ProductError::DuplicateSku(v.sku.clone())); }
            if v.price.is_negative() { return Err(ProductError::NegativePrice); }
        }
        if self.on_deal() { self.reset_deal_price()?; }
        self.price = price;
        self.variants = variants;
        self.touch();
        Ok(())
    }

    pub fn remove_variant(&mut self, sku: &Sku) -> Result<(), ProductError> {
        let before = self.variants.len();
        self.variants.retain(|v| &v.sku != sku);
        if self.variants.len() == before { return Err(ProductError::VariantNotFound(sku.clone())); }
        self.touch();
        Ok(())
    }

    pub fn add_image(&mut self, url: impl Into<String>, alt: Option<String>) {
        let position = u32::try_from(self.images.len()).unwrap_or(u32::MAX);
        self.images.push(ProductImage { url: url.into(), alt, position });
        self.touch();
    }

    pub fn publish(&mut self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() { return Err(ProductError::MissingName); }
        if self.variants.is_empty() && self.custom_sizing.is_none() { return Err(ProductError::NothingToSell); }
        self.status = ProductStatus::Active;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::Published { product_id: self.id.clone() }));
        Ok(())
    }

    pub fn archive(&mut self) { self.status = ProductStatus::Archived; self.touch(); }

    /// SKU for made-to-measure lines of a product sold without variants.
    pub fn made_to_measure_sku(&self) -> Option<Sku> {
        if self.custom_sizing.is_none() || !self.variants.is_empty() { return None; }
        Sku::new(self.id.as_str()).ok()
    }

    /// Price of one unit of `sku`, or of a made-to-measure panel when `dims` is given.
    /// Made-to-measure lines name one of the variants (the fabric), or
    /// [`Product::made_to_measure_sku`] when there are none.
    pub fn unit_price(&self, sku: &Sku, dims: Option<Dimensions>) -> Result<Money, ProductError> {
        match (dims, &self.custom_sizing) {
            (Some(d), Some(sizing)) => {
                if self.variant(sku).is_none() && self.made_to_measure_sku().as_ref() != Some(sku) {
                    return Err(ProductError::VariantNotFound(sku.clone()));
                }
                Ok(pricing::quote(sizing, d)?)
            }
            (Some(_), None) => Err(PricingError::NotCustomSized.into()),
            (None, _) => self.variant(sku).map(|v| v.price.clone()).ok_or_else(|| ProductError::VariantNotFound(sku.clone())),
        }
    }

    /// Takes `qty` units of `sku` out of stock. Made-to-measure lines are
    /// sewn to order and never run out.
    pub fn reserve_stock(&mut self, sku: &Sku, qty: u32, made_to_measure: bool) -> Result<(), ProductError> {
        if made_to_measure && self.custom_sizing.is_some() { return Ok(()); }
        let id = self.id.clone();
        let variant = self.variants.iter_mut().find(|v| &v.sku == sku).ok_or_else(|| ProductError::VariantNotFound(sku.clone()))?;
        variant.stock = variant.stock.subtract(qty).ok_or(ProductError::InsufficientStock { sku: sku.clone(), available: variant.stock.value() })?;
        let out = variant.stock.is_zero();
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::StockReserved { product_id: id.clone(), sku: sku.clone(), quantity: qty }));
        if out { self.raise_event(DomainEvent::Product(ProductEvent::OutOfStock { product_id: id, sku: sku.clone() })); }
        Ok(())
    }

    pub fn restock(&mut self, sku: &Sku, qty: u32) -> Result<(), ProductError> {
        let variant = self.variants.iter_mut().find(|v| &v.sku == sku).ok_or_else(|| ProductError::VariantNotFound(sku.clone()))?;
        variant.stock = variant.stock.add(qty);
        self.touch();
        Ok(())
    }

    /// Puts the product on a deal at `deal_price`, rescaling every variant
    /// (and the made-to-measure rate) by the same ratio. Deals do not stack:
    /// the ratio is always taken against the pre-deal price.
    pub fn apply_deal_price(&mut self, deal_price: Money) -> Result<(), ProductError> {
        if deal_price.is_negative() { return Err(ProductError::NegativePrice); }
        let reference = self.compare_at_price.clone().unwrap_or_else(|| self.price.clone());
        let ratio = if reference.is_zero() { None } else { Some(deal_price.amount() / reference.amount()) };

        for v in &mut self.variants {
            let original = v.original_price.clone().unwrap_or_else(|| v.price.clone());
            v.original_price = Some(original.clone());
            v.price = match ratio {
                Some(r) => original.scale(r),
                None => deal_price.clone(),
            };
        }
        if let Some(sizing) = &mut self.custom_sizing {
            let original = self.original_rate.clone().unwrap_or_else(|| sizing.price_per_meter.clone());
            self.original_rate = Some(original.clone());
            if let Some(r) = ratio { sizing.price_per_meter = original.scale(r); }
        }
        self.compare_at_price = Some(reference);
        self.price = deal_price.rounded();
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::DealApplied { product_id: self.id.clone(), price: self.price.amount() }));
        Ok(())
    }

    /// Ends the running deal and restores every pre-deal price.
    pub fn reset_deal_price(&mut self) -> Result<(), ProductError> {
        let reference = self.compare_at_price.take().ok_or(ProductError::NoActiveDeal)?;
        self.price = reference;
        for v in &mut self.variants {
            if let Some(original) = v.original_price.take() { v.price = original; }
        }
        if let (Some(sizing), Some(rate)) = (&mut self.custom_sizing, self.original_rate.take()) {
            sizing.price_per_meter = rate;
        }
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::DealCleared { product_id: self.id.clone() }));
        Ok(())
    }

    pub fn add_review(&mut self, author: impl Into<String>, rating: u8, comment: impl Into<String>) -> Result<&Review, ProductError> {
        if !(1..=5).contains(&rating) { return Err(ProductError::InvalidRating(rating)); }
        self.reviews.push(Review { id: Uuid::new_v4().to_string(), author: author.into(), rating, comment: comment.into(), created_at: Utc::now() });
        self.touch();
        self.reviews.last().ok_or(ProductError::InvalidRating(rating))
    }

    pub fn average_rating(&self) -> Option<Decimal> {
        if self.reviews.is_empty() { return None; }
        let sum: u32 = self.reviews.iter().map(|r| u32::from(r.rating)).sum();
        Some((Decimal::from(sum) / Decimal::from(self.reviews.len())).round_dp(1))
    }

    pub fn ask_question(&mut self, author: impl Into<String>, text: impl Into<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.questions.push(Question { id: id.clone(), author: author.into(), text: text.into(), answer: None, asked_at: Utc::now(), answered_at: None });
        self.touch();
        id
    }

    pub fn answer_question(&mut self, question_id: &str, answer: impl Into<String>) -> Result<(), ProductError> {
        let q = self.questions.iter_mut().find(|q| q.id == question_id).ok_or(ProductError::QuestionNotFound)?;
        q.answer = Some(answer.into());
        q.answered_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Missing name")]
    MissingName,
    #[error("Product has neither variants nor custom sizing")]
    NothingToSell,
    #[error("Duplicate SKU {0}")]
    DuplicateSku(Sku),
    #[error("Variant {0} not found")]
    VariantNotFound(Sku),
    #[error("Insufficient stock for {sku}: {available} left")]
    InsufficientStock { sku: Sku, available: u32 },
    #[error("Price must not be negative")]
    NegativePrice,
    #[error("Product is not on a deal")]
    NoActiveDeal,
    #[error("Invalid custom sizing bounds")]
    InvalidSizing,
    #[error("Rating {0} outside 1-5")]
    InvalidRating(u8),
    #[error("Question not found")]
    QuestionNotFound,
    #[error(transparent)]
    Pricing(#[from] PricingError),
}
