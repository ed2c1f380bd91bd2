//! Session carts, checkout and the payment callback.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{
    Address, Cart, CartError, CartItem, CartTotals, Coupon, CouponError, Order, PaymentStatus, Product, ProductError, ShippingPolicy,
};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::pricing::{Dimensions, PricingError};
use crate::domain::value_objects::{Money, Sku};
use crate::error::{AppError, AppResult};
use crate::services::notifications::{announce, Notifier};
use crate::services::orders::{email_data, release_order};
use crate::services::payment::{BasketLine, PaymentCallback, PaymentGateway, PaymentRequest, PaymentSession};
use crate::storage::Collections;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub session_id: String,
    pub items: Vec<CartItem>,
    pub coupon_code: Option<String>,
    /// Why the stored coupon no longer applies, if it doesn't.
    pub coupon_error: Option<String>,
    pub totals: CartTotals,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddItemInput {
    pub product_id: String,
    #[validate(length(min = 1, max = 50))]
    pub sku: String,
    #[validate(range(min = 1, max = 99))]
    pub quantity: u32,
    pub width_cm: Option<u32>,
    pub height_cm: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutInput {
    #[validate(length(min = 1))]
    pub session_id: String,
    #[validate(email)]
    pub email: String,
    pub user_id: Option<String>,
    pub address: Address,
    /// Filled in by the HTTP layer from the connection.
    #[serde(skip)]
    pub user_ip: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResult {
    pub order_id: String,
    pub order_number: String,
    pub total: Money,
    pub payment: PaymentSession,
}

/// Alphanumeric order reference the gateway accepts; the order id without dashes.
pub fn payment_reference(order_id: &str) -> String { order_id.replace('-', "") }

fn order_id_from_reference(reference: &str) -> Option<String> {
    Uuid::parse_str(reference).ok().map(|id| id.hyphenated().to_string())
}

fn dimensions(width_cm: Option<u32>, height_cm: Option<u32>) -> Result<Option<Dimensions>, PricingError> {
    match (width_cm, height_cm) {
        (None, None) => Ok(None),
        (Some(width_cm), Some(height_cm)) => Ok(Some(Dimensions { width_cm, height_cm })),
        _ => Err(PricingError::DimensionsRequired),
    }
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Collections,
    notifier: Arc<dyn Notifier>,
    payments: Arc<dyn PaymentGateway>,
    shipping: ShippingPolicy,
}

impl CheckoutService {
    pub fn new(db: Collections, notifier: Arc<dyn Notifier>, payments: Arc<dyn PaymentGateway>, shipping: ShippingPolicy) -> Self {
        Self { db, notifier, payments, shipping }
    }

    async fn load(&self, session_id: &str) -> AppResult<Cart> {
        Ok(self.db.carts.get(session_id).await?.unwrap_or_else(|| Cart::new(session_id)))
    }

    async fn coupon(&self, code: &str) -> AppResult<Coupon> {
        Ok(self.db.coupons.find(|c| c.matches(code)).await?.ok_or(CouponError::NotFound)?)
    }

    /// Cart with totals. A stored coupon that has stopped applying is
    /// reported but not removed, so the customer can see why.
    pub async fn view(&self, session_id: &str) -> AppResult<CartView> {
        let cart = self.load(session_id).await?;
        self.render(cart).await
    }

    async fn render(&self, cart: Cart) -> AppResult<CartView> {
        let subtotal = cart.subtotal()?;
        let (coupon, coupon_error) = match cart.coupon_code() {
            None => (None, None),
            Some(code) => match self.coupon(code).await {
                Ok(c) => match c.validate(&subtotal, Utc::now()) {
                    Ok(()) => (Some(c), None),
                    Err(e) => (None, Some(e.to_string())),
                },
                Err(AppError::Coupon(e)) => (None, Some(e.to_string())),
                Err(e) => return Err(e),
            },
        };
        let totals = cart.totals(&self.shipping, coupon.as_ref())?;
        Ok(CartView {
            session_id: cart.session_id().to_string(),
            items: cart.items().to_vec(),
            coupon_code: cart.coupon_code().map(str::to_string),
            coupon_error,
            totals,
        })
    }

    async fn save(&self, cart: Cart) -> AppResult<CartView> {
        self.db.carts.put(&cart).await?;
        self.render(cart).await
    }

    #[instrument(skip(self, input), fields(product_id = %input.product_id, sku = %input.sku))]
    pub async fn add_item(&self, session_id: &str, input: AddItemInput) -> AppResult<CartView> {
        input.validate()?;
        let product = self.db.products.get(&input.product_id).await?.filter(Product::is_active)
            .ok_or_else(|| AppError::NotFound(format!("product {}", input.product_id)))?;
        let sku = Sku::new(input.sku)?;
        let dims = dimensions(input.width_cm, input.height_cm)?;
        let unit_price = product.unit_price(&sku, dims)?;

        let mut cart = self.load(session_id).await?;
        if dims.is_none() {
            let variant = product.variant(&sku).ok_or_else(|| ProductError::VariantNotFound(sku.clone()))?;
            let in_cart: u32 = cart.items().iter().filter(|i| i.sku == sku && i.dimensions.is_none()).map(|i| i.quantity).sum();
            if in_cart + input.quantity > variant.stock.value() {
                return Err(ProductError::InsufficientStock { sku, available: variant.stock.value() }.into());
            }
        }

        cart.add_item(CartItem {
            product_id: product.id().to_string(),
            sku,
            name: product.name().to_string(),
            dimensions: dims,
            quantity: input.quantity,
            unit_price,
            image_url: product.images().first().map(|i| i.url.clone()),
        })?;
        self.save(cart).await
    }

    pub async fn update_item(&self, session_id: &str, key: &str, quantity: u32) -> AppResult<CartView> {
        let mut cart = self.load(session_id).await?;
        let line = cart.items().iter().find(|i| i.key() == key).ok_or(CartError::ItemNotFound)?;
        if quantity > 0 && line.dimensions.is_none() {
            let product = self.db.products.require(&line.product_id).await?;
            let variant = product.variant(&line.sku).ok_or_else(|| ProductError::VariantNotFound(line.sku.clone()))?;
            if quantity > variant.stock.value() {
                return Err(ProductError::InsufficientStock { sku: line.sku.clone(), available: variant.stock.value() }.into());
            }
        }
        cart.update_quantity(key, quantity)?;
        self.save(cart).await
    }

    pub async fn remove_item(&self, session_id: &str, key: &str) -> AppResult<CartView> {
        let mut cart = self.load(session_id).await?;
        cart.remove_item(key)?;
        self.save(cart).await
    }

    pub async fn clear(&self, session_id: &str) -> AppResult<()> {
        self.db.carts.delete(session_id).await?;
        Ok(())
    }

    /// Attaches a coupon after checking it against the current cart.
    pub async fn apply_coupon(&self, session_id: &str, code: &str) -> AppResult<CartView> {
        let mut cart = self.load(session_id).await?;
        let coupon = self.coupon(code).await?;
        coupon.validate(&cart.subtotal()?, Utc::now())?;
        cart.apply_coupon(coupon.code());
        self.save(cart).await
    }

    pub async fn remove_coupon(&self, session_id: &str) -> AppResult<CartView> {
        let mut cart = self.load(session_id).await?;
        cart.remove_coupon();
        self.save(cart).await
    }

    /// Turns the session cart into an order and opens a payment session.
    ///
    /// Prices, stock and the coupon are checked again against the catalog.
    /// The payment token is requested before anything is written, so a
    /// gateway failure leaves stock, coupon and cart untouched.
    #[instrument(skip(self, input), fields(session = %input.session_id))]
    pub async fn checkout(&self, input: CheckoutInput) -> AppResult<CheckoutResult> {
        input.validate()?;
        let address = &input.address;
        if [&address.full_name, &address.phone, &address.line1, &address.city].iter().any(|f| f.trim().is_empty()) {
            return Err(AppError::Validation("address needs a name, phone, street and city".into()));
        }

        let cart = self.load(&input.session_id).await?;
        if cart.is_empty() { return Err(CartError::Empty.into()); }

        let mut products: HashMap<String, Product> = HashMap::new();
        let mut priced = Cart::new(cart.session_id());
        for item in cart.items() {
            if !products.contains_key(&item.product_id) {
                let product = self.db.products.get(&item.product_id).await?.filter(Product::is_active)
                    .ok_or_else(|| AppError::BadRequest(format!("{} is no longer available", item.name)))?;
                products.insert(item.product_id.clone(), product);
            }
            let product = products.get_mut(&item.product_id).ok_or_else(|| AppError::NotFound(item.product_id.clone()))?;
            let unit_price = product.unit_price(&item.sku, item.dimensions)?;
            product.reserve_stock(&item.sku, item.quantity, item.dimensions.is_some())?;
            priced.add_item(CartItem { unit_price, name: product.name().to_string(), ..item.clone() })?;
        }

        let subtotal = priced.subtotal()?;
        let coupon = match cart.coupon_code() {
            Some(code) => {
                let mut coupon = self.coupon(code).await?;
                coupon.validate(&subtotal, Utc::now())?;
                coupon.redeem()?;
                Some(coupon)
            }
            None => None,
        };
        let totals = priced.totals(&self.shipping, coupon.as_ref())?;
        let mut order = Order::place(
            input.email.trim(),
            input.user_id.clone(),
            input.address.clone(),
            priced.items(),
            totals,
            coupon.as_ref().map(|c| c.code().to_string()),
        )?;

        let request = PaymentRequest {
            reference: payment_reference(order.id()),
            email: order.email().to_string(),
            amount: order.total().clone(),
            user_ip: input.user_ip.clone(),
            user_name: address.full_name.clone(),
            user_address: format!("{} {} {}", address.line1, address.district, address.city),
            user_phone: address.phone.clone(),
            basket: order.items().iter().map(|i| BasketLine { name: i.name.clone(), unit_price: i.unit_price.clone(), quantity: i.quantity }).collect(),
        };
        let session = self.payments.request_token(&request).await?;

        for mut product in products.into_values() {
            for event in product.take_events() {
                if let DomainEvent::Product(ProductEvent::OutOfStock { sku, .. }) = event {
                    warn!(product = product.name(), %sku, "variant sold out");
                }
            }
            self.db.products.put(&product).await?;
        }
        if let Some(coupon) = &coupon {
            self.db.coupons.put(coupon).await?;
        }
        let events = order.take_events();
        self.db.orders.put(&order).await?;
        self.db.carts.delete(cart.session_id()).await?;

        info!(order = order.order_number(), total = %order.total(), "order placed");
        announce(self.notifier.as_ref(), order.email(), &events, &email_data(&order)).await;

        Ok(CheckoutResult {
            order_id: order.id().to_string(),
            order_number: order.order_number().to_string(),
            total: order.total().clone(),
            payment: session,
        })
    }

    /// Gateway notification. Settled orders are left alone so repeated
    /// deliveries are harmless.
    #[instrument(skip(self, callback), fields(reference = %callback.merchant_oid, status = %callback.status))]
    pub async fn payment_callback(&self, callback: PaymentCallback) -> AppResult<()> {
        if !self.payments.verify_callback(&callback) {
            warn!("payment callback with bad signature");
            return Err(AppError::BadRequest("invalid payment signature".into()));
        }
        let id = order_id_from_reference(&callback.merchant_oid)
            .ok_or_else(|| AppError::BadRequest(format!("unknown reference {}", callback.merchant_oid)))?;
        let mut order = self.db.orders.require(&id).await?;
        if order.payment() != PaymentStatus::Pending {
            info!(order = order.order_number(), "payment already settled");
            return Ok(());
        }

        if callback.succeeded() {
            order.mark_paid()?;
            if order.payment() == PaymentStatus::RefundDue {
                warn!(order = order.order_number(), total = %order.total(), "payment captured on a cancelled order, refund required");
            }
        } else if order.mark_payment_failed()? {
            release_order(&self.db, &order).await?;
        }
        let events = order.take_events();
        self.db.orders.put(&order).await?;
        info!(order = order.order_number(), payment = ?order.payment(), "payment settled");
        announce(self.notifier.as_ref(), order.email(), &events, &email_data(&order)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{DiscountKind, OrderStatus, Variant};
    use crate::domain::pricing::CustomSizing;
    use crate::domain::value_objects::Quantity;
    use crate::services::notifications::testing::RecordingNotifier;
    use crate::services::orders::OrderService;
    use crate::services::payment::testing::FakeGateway;
    use crate::services::payment::PaymentError;
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    fn lira(units: i64) -> Money { Money::lira(Decimal::new(units, 0)) }

    struct Fixture {
        db: Collections,
        notifier: Arc<RecordingNotifier>,
        service: CheckoutService,
        product_id: String,
    }

    async fn fixture() -> Fixture { fixture_with(Arc::new(FakeGateway)).await }

    async fn fixture_with(payments: Arc<dyn PaymentGateway>) -> Fixture {
        let db = Collections::in_memory();
        let mut product = Product::create("Keten Tül", "keten-tul", lira(200));
        product.add_variant(Variant { sku: Sku::new("KT-140").unwrap(), color: Some("Krem".into()), size: None, price: lira(200), original_price: None, stock: Quantity::new(3) }).unwrap();
        product.set_custom_sizing(Some(CustomSizing { price_per_meter: lira(100), min_width_cm: 50, max_width_cm: 600, min_height_cm: 50, max_height_cm: 300 })).unwrap();
        product.publish().unwrap();
        db.products.put(&product).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let service = CheckoutService::new(db.clone(), notifier.clone(), payments, ShippingPolicy::default());
        Fixture { db, notifier, service, product_id: product.id().to_string() }
    }

    fn item(product_id: &str, quantity: u32) -> AddItemInput {
        AddItemInput { product_id: product_id.into(), sku: "kt-140".into(), quantity, width_cm: None, height_cm: None }
    }

    fn checkout_input() -> CheckoutInput {
        CheckoutInput {
            session_id: "sess".into(), email: "ayse@example.com".into(), user_id: None,
            address: Address { full_name: "Ayşe".into(), phone: "555".into(), line1: "Kordon 1".into(), city: "İzmir".into(), ..Default::default() },
            user_ip: "10.0.0.1".into(),
        }
    }

    #[tokio::test]
    async fn test_cart_totals_and_stock_guard() {
        let f = fixture().await;
        let view = f.service.add_item("sess", item(&f.product_id, 2)).await.unwrap();
        assert_eq!(view.totals.subtotal.amount(), Decimal::new(400, 0));
        assert_eq!(view.totals.shipping.amount(), Decimal::new(4990, 2));
        assert!(matches!(
            f.service.add_item("sess", item(&f.product_id, 2)).await,
            Err(AppError::Product(ProductError::InsufficientStock { available: 3, .. }))
        ));
        assert!(matches!(
            f.service.update_item("sess", "KT-140", 99).await,
            Err(AppError::Product(ProductError::InsufficientStock { available: 3, .. }))
        ));
        assert_eq!(f.service.update_item("sess", "KT-140", 3).await.unwrap().totals.item_count, 3);
        assert_eq!(f.service.view("sess").await.unwrap().items[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_made_to_measure_lines() {
        let f = fixture().await;
        let custom = AddItemInput { width_cm: Some(300), height_cm: Some(260), ..item(&f.product_id, 5) };
        let view = f.service.add_item("sess", custom).await.unwrap();
        // 3m x 100 = 300, -10% width discount, +5% height surcharge
        assert_eq!(view.items[0].unit_price.amount(), Decimal::new(28350, 2));
        assert_eq!(view.items[0].key(), "KT-140@300x260");
        let half = AddItemInput { width_cm: Some(300), ..item(&f.product_id, 1) };
        assert!(matches!(f.service.add_item("sess", half).await, Err(AppError::Pricing(PricingError::DimensionsRequired))));
        let made_up = AddItemInput { sku: "ZZZ".into(), width_cm: Some(300), height_cm: Some(260), ..item(&f.product_id, 1) };
        assert!(matches!(f.service.add_item("sess", made_up).await, Err(AppError::Product(ProductError::VariantNotFound(_)))));
        assert_eq!(f.service.view("sess").await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_checkout_places_order() {
        let f = fixture().await;
        f.service.add_item("sess", item(&f.product_id, 3)).await.unwrap();
        let coupon = Coupon::create("YAZ10", DiscountKind::Percent(Decimal::TEN), lira(100), None).unwrap();
        f.db.coupons.put(&coupon).await.unwrap();
        let view = f.service.apply_coupon("sess", " yaz10 ").await.unwrap();
        assert_eq!(view.coupon_code.as_deref(), Some("YAZ10"));

        let result = f.service.checkout(checkout_input()).await.unwrap();
        // 600 - 60, free shipping above 500
        assert_eq!(result.total.amount(), Decimal::new(540, 0));
        assert_eq!(result.payment.token, format!("tok-{}", payment_reference(&result.order_id)));

        let product = f.db.products.require(&f.product_id).await.unwrap();
        assert!(product.variants()[0].stock.is_zero());
        assert_eq!(f.db.coupons.require(&coupon.id).await.unwrap().used_count, 1);
        assert!(f.db.carts.get("sess").await.unwrap().is_none());
        assert_eq!(f.notifier.scenarios(), vec!["order_created"]);
    }

    #[tokio::test]
    async fn test_checkout_rejects_empty_cart_and_bad_address() {
        let f = fixture().await;
        assert!(matches!(f.service.checkout(checkout_input()).await, Err(AppError::Cart(CartError::Empty))));
        let mut input = checkout_input();
        input.address.city = " ".into();
        assert!(matches!(f.service.checkout(input).await, Err(AppError::Validation(_))));
    }

    struct DownGateway;

    #[async_trait]
    impl PaymentGateway for DownGateway {
        async fn request_token(&self, _: &PaymentRequest) -> Result<PaymentSession, PaymentError> { Err(PaymentError::Refused("maintenance".into())) }
        fn verify_callback(&self, _: &PaymentCallback) -> bool { false }
    }

    #[tokio::test]
    async fn test_gateway_failure_persists_nothing() {
        let f = fixture_with(Arc::new(DownGateway)).await;
        f.service.add_item("sess", item(&f.product_id, 1)).await.unwrap();
        assert!(matches!(f.service.checkout(checkout_input()).await, Err(AppError::Payment(PaymentError::Refused(_)))));
        assert_eq!(f.db.products.require(&f.product_id).await.unwrap().variants()[0].stock.value(), 3);
        assert!(f.db.orders.list().await.unwrap().is_empty());
        assert_eq!(f.service.view("sess").await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_payment_callback() {
        let f = fixture().await;
        f.service.add_item("sess", item(&f.product_id, 2)).await.unwrap();
        let placed = f.service.checkout(checkout_input()).await.unwrap();
        let callback = |status: &str, hash: &str| PaymentCallback {
            merchant_oid: payment_reference(&placed.order_id), status: status.into(), total_amount: "44990".into(), hash: hash.into(),
        };

        assert!(matches!(f.service.payment_callback(callback("success", "forged")).await, Err(AppError::BadRequest(_))));
        f.service.payment_callback(callback("failed", "ok")).await.unwrap();
        // a late success for a settled order changes nothing
        f.service.payment_callback(callback("success", "ok")).await.unwrap();

        let order = f.db.orders.require(&placed.order_id).await.unwrap();
        assert_eq!(order.payment(), PaymentStatus::Failed);
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(f.db.products.require(&f.product_id).await.unwrap().variants()[0].stock.value(), 3);
        assert_eq!(f.notifier.scenarios(), vec!["order_created", "payment_failed"]);
    }

    async fn place_with_single_use_coupon(f: &Fixture) -> CheckoutResult {
        let mut coupon = Coupon::create("TEK", DiscountKind::Fixed(lira(20)), lira(100), None).unwrap();
        coupon.usage_limit = Some(1);
        f.db.coupons.put(&coupon).await.unwrap();
        f.service.add_item("sess", item(&f.product_id, 2)).await.unwrap();
        f.service.apply_coupon("sess", "tek").await.unwrap();
        f.service.checkout(checkout_input()).await.unwrap()
    }

    async fn stock(f: &Fixture) -> u32 { f.db.products.require(&f.product_id).await.unwrap().variants()[0].stock.value() }

    async fn coupon_uses(f: &Fixture) -> u32 { f.db.coupons.find(|c| c.matches("TEK")).await.unwrap().unwrap().used_count }

    fn signed(order_id: &str, status: &str) -> PaymentCallback {
        PaymentCallback { merchant_oid: payment_reference(order_id), status: status.into(), total_amount: "38000".into(), hash: "ok".into() }
    }

    #[tokio::test]
    async fn test_declined_payment_gives_coupon_back() {
        let f = fixture().await;
        let placed = place_with_single_use_coupon(&f).await;
        assert_eq!(coupon_uses(&f).await, 1);
        f.service.payment_callback(signed(&placed.order_id, "failed")).await.unwrap();
        assert_eq!(coupon_uses(&f).await, 0);
        assert_eq!(stock(&f).await, 3);

        f.service.add_item("sess", item(&f.product_id, 1)).await.unwrap();
        assert!(f.service.apply_coupon("sess", "TEK").await.is_ok());
    }

    #[tokio::test]
    async fn test_decline_after_cancel_releases_once() {
        let f = fixture().await;
        let placed = place_with_single_use_coupon(&f).await;
        assert_eq!(stock(&f).await, 1);

        let orders = OrderService::new(f.db.clone(), f.notifier.clone());
        orders.cancel(&placed.order_id, "ayse@example.com").await.unwrap();
        assert_eq!(stock(&f).await, 3);
        assert_eq!(coupon_uses(&f).await, 0);

        f.service.payment_callback(signed(&placed.order_id, "failed")).await.unwrap();
        assert_eq!(stock(&f).await, 3);
        assert_eq!(coupon_uses(&f).await, 0);
        let order = f.db.orders.require(&placed.order_id).await.unwrap();
        assert_eq!(order.payment(), PaymentStatus::Failed);
        assert_eq!(order.history().len(), 2);
        assert_eq!(f.notifier.scenarios(), vec!["order_created", "order_cancelled"]);
    }

    #[tokio::test]
    async fn test_capture_after_cancel_is_owed_back() {
        let f = fixture().await;
        let placed = place_with_single_use_coupon(&f).await;
        let orders = OrderService::new(f.db.clone(), f.notifier.clone());
        orders.cancel(&placed.order_id, "ayse@example.com").await.unwrap();

        f.service.payment_callback(signed(&placed.order_id, "success")).await.unwrap();
        let order = f.db.orders.require(&placed.order_id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.payment(), PaymentStatus::RefundDue);
        assert_eq!(stock(&f).await, 3);
        assert_eq!(f.notifier.scenarios(), vec!["order_created", "order_cancelled"]);
    }

    #[tokio::test]
    async fn test_stale_coupon_reported_in_view() {
        let f = fixture().await;
        f.service.add_item("sess", item(&f.product_id, 1)).await.unwrap();
        let coupon = Coupon::create("BUYUK", DiscountKind::Fixed(lira(50)), lira(150), None).unwrap();
        f.db.coupons.put(&coupon).await.unwrap();
        f.service.apply_coupon("sess", "buyuk").await.unwrap();
        f.service.update_item("sess", "KT-140", 0).await.unwrap();
        let view = f.service.view("sess").await.unwrap();
        assert!(view.coupon_error.is_some());
        assert!(view.totals.discount.is_zero());
    }
}
