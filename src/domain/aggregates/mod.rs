//! Aggregates module
pub mod cart;
pub mod category;
pub mod coupon;
pub mod order;
pub mod product;
pub mod returns;
pub mod user;

pub use cart::{Cart, CartError, CartItem, CartTotals, ShippingPolicy};
pub use category::Category;
pub use coupon::{Coupon, CouponError, DiscountKind};
pub use order::{Address, LineItem, Order, OrderError, OrderStatus, PaymentStatus, Tracking};
pub use product::{Product, ProductError, ProductStatus, Variant};
pub use returns::{ReturnError, ReturnLine, ReturnRequest, ReturnStatus};
pub use user::{Role, User};
