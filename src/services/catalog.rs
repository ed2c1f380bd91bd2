//! Catalog, promotions and SEO maintenance.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::domain::aggregates::{Category, Coupon, DiscountKind, Product, User, Variant};
use crate::domain::pricing::{self, CustomSizing, Dimensions, PricingError};
use crate::domain::seo::{self, LegacyTarget, SitemapEntry};
use crate::domain::value_objects::{Money, Quantity, Sku};
use crate::error::{AppError, AppResult};
use crate::services::media::MediaStore;
use crate::storage::Collections;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VariantInput {
    #[validate(length(min = 1, max = 50))]
    pub sku: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub stock: u32,
}

impl VariantInput {
    fn into_variant(self) -> AppResult<Variant> {
        Ok(Variant {
            sku: Sku::new(self.sku)?, color: self.color, size: self.size,
            price: Money::lira(self.price), original_price: None, stock: Quantity::new(self.stock),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub category_id: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    #[validate]
    pub variants: Vec<VariantInput>,
    pub custom_sizing: Option<CustomSizing>,
    #[serde(default)]
    pub publish: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub slug: Option<String>,
    pub parent_id: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub position: u32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CouponInput {
    #[validate(length(min = 3, max = 32))]
    pub code: String,
    pub kind: DiscountKind,
    #[serde(default)]
    pub min_spend: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool { true }

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    pub category: Option<String>,
    pub q: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlugChange {
    pub collection: &'static str,
    pub id: String,
    pub from: String,
    pub to: String,
}

#[derive(Clone)]
pub struct CatalogService {
    db: Collections,
    media: Arc<dyn MediaStore>,
}

impl CatalogService {
    pub fn new(db: Collections, media: Arc<dyn MediaStore>) -> Self { Self { db, media } }

    // ---- products ---------------------------------------------------------

    pub async fn list_products(&self, filter: &ProductFilter) -> AppResult<Vec<Product>> {
        let category_id = match &filter.category {
            Some(slug) => Some(self.category_by_slug(slug).await?.id),
            None => None,
        };
        let needle = filter.q.as_deref().map(seo::slugify).filter(|q| !q.is_empty());
        let mut products: Vec<Product> = self
            .db
            .products
            .list()
            .await?
            .into_iter()
            .filter(|p| filter.include_inactive || p.is_active())
            .filter(|p| category_id.as_deref().map_or(true, |c| p.category_id() == Some(c)))
            .filter(|p| needle.as_deref().map_or(true, |n| seo::slugify(p.name()).contains(n)))
            .collect();
        products.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        Ok(products)
    }

    pub async fn product(&self, id: &str) -> AppResult<Product> { Ok(self.db.products.require(id).await?) }

    /// Storefront lookup: only published products are visible.
    pub async fn product_by_slug(&self, slug: &str) -> AppResult<Product> {
        self.db
            .products
            .find(|p| p.slug() == slug && p.is_active())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("product {slug}")))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: ProductInput) -> AppResult<Product> {
        input.validate()?;
        let taken = self.product_slugs(None).await?;
        let base = seo::slug_or(input.slug.as_deref().unwrap_or(&input.name), &input.name);
        let mut product = Product::create(&input.name, seo::unique_slug(&base, &taken), Money::lira(input.price));
        self.apply_input(&mut product, input).await?;
        self.db.products.put(&product).await?;
        info!(product_id = product.id(), slug = product.slug(), "product created");
        Ok(product)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(&self, id: &str, input: ProductInput) -> AppResult<Product> {
        input.validate()?;
        let mut product = self.db.products.require(id).await?;
        if let Some(slug) = input.slug.as_deref().map(seo::slugify).filter(|s| !s.is_empty() && s != product.slug()) {
            let taken = self.product_slugs(Some(id)).await?;
            product.set_slug(seo::unique_slug(&slug, &taken));
        }
        product.rename(&input.name);
        self.apply_input(&mut product, input).await?;
        self.db.products.put(&product).await?;
        Ok(product)
    }

    async fn apply_input(&self, product: &mut Product, input: ProductInput) -> AppResult<()> {
        if let Some(category_id) = &input.category_id {
            self.db.categories.require(category_id).await?;
        }
        product.set_description(input.description);
        product.set_category(input.category_id);
        let variants = input.variants.into_iter().map(VariantInput::into_variant).collect::<AppResult<Vec<_>>>()?;
        product.reprice(Money::lira(input.price), variants)?;
        product.set_custom_sizing(input.custom_sizing)?;
        if input.publish { product.publish()?; }
        product.take_events();
        Ok(())
    }

    pub async fn delete_product(&self, id: &str) -> AppResult<()> {
        if !self.db.products.delete(id).await? {
            return Err(AppError::NotFound(format!("product {id}")));
        }
        info!(product_id = id, "product deleted");
        Ok(())
    }

    pub async fn publish_product(&self, id: &str, publish: bool) -> AppResult<Product> {
        let mut product = self.db.products.require(id).await?;
        if publish { product.publish()?; } else { product.archive(); }
        product.take_events();
        self.db.products.put(&product).await?;
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn set_deal_price(&self, id: &str, price: Decimal) -> AppResult<Product> {
        let mut product = self.db.products.require(id).await?;
        product.apply_deal_price(Money::lira(price))?;
        product.take_events();
        self.db.products.put(&product).await?;
        info!(product_id = id, %price, "deal price applied");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn reset_deal_price(&self, id: &str) -> AppResult<Product> {
        let mut product = self.db.products.require(id).await?;
        product.reset_deal_price()?;
        product.take_events();
        self.db.products.put(&product).await?;
        Ok(product)
    }

    pub async fn quote(&self, slug: &str, dims: Dimensions) -> AppResult<Money> {
        let product = self.product_by_slug(slug).await?;
        let sizing = product.custom_sizing().ok_or(PricingError::NotCustomSized)?;
        Ok(pricing::quote(sizing, dims)?)
    }

    pub async fn add_review(&self, slug: &str, author: &str, rating: u8, comment: &str) -> AppResult<Product> {
        let mut product = self.product_by_slug(slug).await?;
        product.add_review(author, rating, comment)?;
        self.db.products.put(&product).await?;
        Ok(product)
    }

    pub async fn ask_question(&self, slug: &str, author: &str, text: &str) -> AppResult<String> {
        let mut product = self.product_by_slug(slug).await?;
        let id = product.ask_question(author, text);
        self.db.products.put(&product).await?;
        Ok(id)
    }

    pub async fn answer_question(&self, product_id: &str, question_id: &str, answer: &str) -> AppResult<Product> {
        let mut product = self.db.products.require(product_id).await?;
        product.answer_question(question_id, answer)?;
        self.db.products.put(&product).await?;
        Ok(product)
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn attach_image(&self, id: &str, file_name: &str, content_type: &str, alt: Option<String>, bytes: &[u8]) -> AppResult<Product> {
        let mut product = self.db.products.require(id).await?;
        let url = self.media.upload(file_name, content_type, bytes).await?;
        product.add_image(url, alt);
        self.db.products.put(&product).await?;
        Ok(product)
    }

    async fn product_slugs(&self, except: Option<&str>) -> AppResult<HashSet<String>> {
        Ok(self.db.products.list().await?.into_iter().filter(|p| Some(p.id()) != except).map(|p| p.slug().to_string()).collect())
    }

    // ---- categories -------------------------------------------------------

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let mut categories = self.db.categories.list().await?;
        categories.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.name.cmp(&b.name)));
        Ok(categories)
    }

    pub async fn category_by_slug(&self, slug: &str) -> AppResult<Category> {
        self.db.categories.find(|c| c.slug == slug).await?.ok_or_else(|| AppError::NotFound(format!("category {slug}")))
    }

    pub async fn create_category(&self, input: CategoryInput) -> AppResult<Category> {
        input.validate()?;
        let taken = self.category_slugs(None).await?;
        let base = seo::slug_or(input.slug.as_deref().unwrap_or(&input.name), &input.name);
        let mut category = Category::create(&input.name, seo::unique_slug(&base, &taken), input.parent_id.clone());
        self.fill_category(&mut category, input).await?;
        self.db.categories.put(&category).await?;
        Ok(category)
    }

    pub async fn update_category(&self, id: &str, input: CategoryInput) -> AppResult<Category> {
        input.validate()?;
        let mut category = self.db.categories.require(id).await?;
        if let Some(slug) = input.slug.as_deref().map(seo::slugify).filter(|s| !s.is_empty() && *s != category.slug) {
            let taken = self.category_slugs(Some(id)).await?;
            category.slug = seo::unique_slug(&slug, &taken);
        }
        category.name = input.name.clone();
        self.fill_category(&mut category, input).await?;
        self.db.categories.put(&category).await?;
        Ok(category)
    }

    async fn fill_category(&self, category: &mut Category, input: CategoryInput) -> AppResult<()> {
        if let Some(parent) = &input.parent_id {
            if parent == &category.id { return Err(AppError::BadRequest("a category cannot be its own parent".into())); }
            self.db.categories.require(parent).await?;
        }
        category.parent_id = input.parent_id;
        category.description = input.description;
        category.image_url = input.image_url;
        category.position = input.position;
        category.touch();
        Ok(())
    }

    pub async fn delete_category(&self, id: &str) -> AppResult<()> {
        let in_use = self.db.products.list().await?.iter().any(|p| p.category_id() == Some(id));
        if in_use { return Err(AppError::BadRequest("category still has products".into())); }
        if !self.db.categories.delete(id).await? { return Err(AppError::NotFound(format!("category {id}"))); }
        Ok(())
    }

    async fn category_slugs(&self, except: Option<&str>) -> AppResult<HashSet<String>> {
        Ok(self.db.categories.list().await?.into_iter().filter(|c| Some(c.id.as_str()) != except).map(|c| c.slug).collect())
    }

    // ---- coupons ----------------------------------------------------------

    pub async fn list_coupons(&self) -> AppResult<Vec<Coupon>> { Ok(self.db.coupons.list().await?) }

    pub async fn create_coupon(&self, input: CouponInput) -> AppResult<Coupon> {
        input.validate()?;
        if self.db.coupons.find(|c| c.matches(&input.code)).await?.is_some() {
            return Err(AppError::BadRequest(format!("coupon {} already exists", input.code)));
        }
        let mut coupon = Coupon::create(&input.code, input.kind, Money::lira(input.min_spend), input.expires_at)?;
        coupon.usage_limit = input.usage_limit;
        coupon.active = input.active;
        self.db.coupons.put(&coupon).await?;
        Ok(coupon)
    }

    pub async fn set_coupon_active(&self, id: &str, active: bool) -> AppResult<Coupon> {
        let mut coupon = self.db.coupons.require(id).await?;
        coupon.active = active;
        self.db.coupons.put(&coupon).await?;
        Ok(coupon)
    }

    pub async fn delete_coupon(&self, id: &str) -> AppResult<()> {
        if !self.db.coupons.delete(id).await? { return Err(AppError::NotFound(format!("coupon {id}"))); }
        Ok(())
    }

    // ---- users ------------------------------------------------------------

    /// Mirrors a profile from the auth provider; existing wishlists survive.
    pub async fn upsert_user(&self, id: &str, email: &str, display_name: Option<String>) -> AppResult<User> {
        let mut user = self.db.users.get(id).await?.unwrap_or_else(|| User::new(id, email));
        user.email = email.to_string();
        user.display_name = display_name;
        self.db.users.put(&user).await?;
        Ok(user)
    }

    pub async fn toggle_wishlist(&self, user_id: &str, product_id: &str) -> AppResult<User> {
        let mut user = self.db.users.require(user_id).await?;
        self.db.products.require(product_id).await?;
        user.toggle_wishlist(product_id);
        self.db.users.put(&user).await?;
        Ok(user)
    }

    // ---- SEO --------------------------------------------------------------

    /// Gives every category and product a well-formed, unique slug. Slugs
    /// that are already valid are kept so published URLs stay stable.
    #[instrument(skip(self))]
    pub async fn migrate_slugs(&self) -> AppResult<Vec<SlugChange>> {
        let mut changes = Vec::new();

        let categories = self.db.categories.list().await?;
        let slugs = assign_slugs(categories.iter().map(|c| (c.id.as_str(), c.slug.as_str(), c.name.as_str())));
        for (mut category, next) in categories.into_iter().zip(slugs) {
            let Some(next) = next else { continue };
            changes.push(SlugChange { collection: "categories", id: category.id.clone(), from: category.slug.clone(), to: next.clone() });
            category.slug = next;
            self.db.categories.put(&category).await?;
        }

        let products = self.db.products.list().await?;
        let slugs = assign_slugs(products.iter().map(|p| (p.id(), p.slug(), p.name())));
        for (mut product, next) in products.into_iter().zip(slugs) {
            let Some(next) = next else { continue };
            changes.push(SlugChange { collection: "products", id: product.id().to_string(), from: product.slug().to_string(), to: next.clone() });
            product.set_slug(next);
            self.db.products.put(&product).await?;
        }

        info!(changed = changes.len(), "slug migration finished");
        Ok(changes)
    }

    /// Where an old query-string URL lives now.
    pub async fn resolve_legacy(&self, target: LegacyTarget) -> AppResult<Option<String>> {
        Ok(match target {
            LegacyTarget::ProductById(id) => self.db.products.get(&id).await?.map(|p| seo::product_path(p.slug())),
            LegacyTarget::CategoryById(id) => self.db.categories.get(&id).await?.map(|c| seo::category_path(&c.slug)),
            LegacyTarget::CategoryByName(name) => {
                let wanted = seo::slugify(&name);
                self.db
                    .categories
                    .find(|c| c.slug == wanted || seo::slugify(&c.name) == wanted)
                    .await?
                    .map(|c| seo::category_path(&c.slug))
            }
        })
    }

    pub async fn sitemap(&self, base_url: &str) -> AppResult<String> {
        let mut entries = vec![SitemapEntry { path: "/".into(), last_modified: None, priority: "1.0" }];
        entries.extend(self.list_categories().await?.into_iter().map(|c| SitemapEntry {
            path: seo::category_path(&c.slug), last_modified: Some(c.updated_at), priority: "0.8",
        }));
        entries.extend(self.list_products(&ProductFilter::default()).await?.into_iter().map(|p| SitemapEntry {
            path: seo::product_path(p.slug()), last_modified: Some(p.updated_at()), priority: "0.6",
        }));
        Ok(seo::render_sitemap(base_url, &entries))
    }
}

/// New slug per record, `None` where the current one stays. Well-formed
/// slugs are claimed first (earliest record wins) so a broken record can
/// never take a slug that is already live.
fn assign_slugs<'a>(records: impl Iterator<Item = (&'a str, &'a str, &'a str)>) -> Vec<Option<String>> {
    let records: Vec<_> = records.collect();
    let mut taken = HashSet::new();
    let mut keep = vec![false; records.len()];
    for (i, (_, current, _)) in records.iter().enumerate() {
        let well_formed = !current.is_empty() && seo::slugify(current) == *current;
        keep[i] = well_formed && taken.insert(current.to_string());
    }
    records
        .iter()
        .zip(keep)
        .map(|((id, _, name), keep)| {
            if keep { return None; }
            let next = seo::unique_slug(&seo::slug_or(name, id), &taken);
            taken.insert(next.clone());
            Some(next)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::media::LocalMediaStore;

    fn service() -> CatalogService {
        let media = Arc::new(LocalMediaStore::new(std::env::temp_dir().join("perde-catalog-tests"), "/media"));
        CatalogService::new(Collections::in_memory(), media)
    }

    fn input(name: &str) -> ProductInput {
        ProductInput {
            name: name.into(), slug: None, description: String::new(), category_id: None, price: Decimal::new(200, 0),
            variants: vec![VariantInput { sku: format!("{}-1", name.len()), color: None, size: None, price: Decimal::new(200, 0), stock: 3 }],
            custom_sizing: None, publish: true,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_unique_slugs() {
        let s = service();
        let a = s.create_product(input("Keten Tül")).await.unwrap();
        let b = s.create_product(input("Keten Tül")).await.unwrap();
        assert_eq!(a.slug(), "keten-tul");
        assert_eq!(b.slug(), "keten-tul-2");
        assert_eq!(s.product_by_slug("keten-tul-2").await.unwrap().id(), b.id());
    }

    #[tokio::test]
    async fn test_search_ignores_turkish_case() {
        let s = service();
        s.create_product(input("Şönil Fon Perde")).await.unwrap();
        s.create_product(input("Keten Tül")).await.unwrap();
        let found = s.list_products(&ProductFilter { q: Some("SONIL".into()), ..Default::default() }).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "Şönil Fon Perde");
    }

    #[tokio::test]
    async fn test_unpublished_products_hidden() {
        let s = service();
        let mut draft = input("Taslak");
        draft.publish = false;
        s.create_product(draft).await.unwrap();
        assert!(s.list_products(&ProductFilter::default()).await.unwrap().is_empty());
        assert!(matches!(s.product_by_slug("taslak").await, Err(AppError::NotFound(_))));
        let all = s.list_products(&ProductFilter { include_inactive: true, ..Default::default() }).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_deal_round_trip_persists() {
        let s = service();
        let p = s.create_product(input("Blackout")).await.unwrap();
        s.set_deal_price(p.id(), Decimal::new(150, 0)).await.unwrap();
        assert_eq!(s.product(p.id()).await.unwrap().variants()[0].price.amount(), Decimal::new(150, 0));
        s.reset_deal_price(p.id()).await.unwrap();
        assert_eq!(s.product(p.id()).await.unwrap().variants()[0].price.amount(), Decimal::new(200, 0));
    }

    #[tokio::test]
    async fn test_slug_migration() {
        let db = Collections::in_memory();
        let s = CatalogService::new(db.clone(), Arc::new(LocalMediaStore::new(std::env::temp_dir(), "/m")));
        let broken = Product::create("Çift Katlı Tül", "", Money::lira(Decimal::ONE));
        db.products.put(&broken).await.unwrap();
        let dup = Product::create("Çift Katlı Tül", "Cift Katli", Money::lira(Decimal::ONE));
        db.products.put(&dup).await.unwrap();
        let good = Product::create("Fon", "fon", Money::lira(Decimal::ONE));
        db.products.put(&good).await.unwrap();

        let changes = s.migrate_slugs().await.unwrap();
        assert_eq!(changes.len(), 2);
        let mut migrated = vec![
            db.products.require(broken.id()).await.unwrap().slug().to_string(),
            db.products.require(dup.id()).await.unwrap().slug().to_string(),
        ];
        migrated.sort();
        assert_eq!(migrated, vec!["cift-katli-tul", "cift-katli-tul-2"]);
        assert_eq!(db.products.require(good.id()).await.unwrap().slug(), "fon");
        assert!(s.migrate_slugs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slug_migration_keeps_live_slug() {
        let db = Collections::in_memory();
        let s = CatalogService::new(db.clone(), Arc::new(LocalMediaStore::new(std::env::temp_dir(), "/m")));
        // created first, so it is listed before the record that owns "fon"
        let broken = Product::create("Fon", "", Money::lira(Decimal::ONE));
        db.products.put(&broken).await.unwrap();
        let live = Product::create("Fon Perde", "fon", Money::lira(Decimal::ONE));
        db.products.put(&live).await.unwrap();

        let changes = s.migrate_slugs().await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].id, broken.id());
        assert_eq!(changes[0].to, "fon-2");
        assert_eq!(db.products.require(live.id()).await.unwrap().slug(), "fon");
    }

    #[tokio::test]
    async fn test_legacy_resolution_and_sitemap() {
        let s = service();
        let cat = s.create_category(CategoryInput { name: "Tül Perde".into(), slug: None, parent_id: None, description: None, image_url: None, position: 0 }).await.unwrap();
        let mut p = input("Keten Tül");
        p.category_id = Some(cat.id.clone());
        let product = s.create_product(p).await.unwrap();

        assert_eq!(s.resolve_legacy(LegacyTarget::ProductById(product.id().to_string())).await.unwrap().as_deref(), Some("/urun/keten-tul"));
        assert_eq!(s.resolve_legacy(LegacyTarget::CategoryByName("TÜL PERDE".into())).await.unwrap().as_deref(), Some("/kategori/tul-perde"));
        assert_eq!(s.resolve_legacy(LegacyTarget::ProductById("nope".into())).await.unwrap(), None);

        let xml = s.sitemap("https://perde.example").await.unwrap();
        assert!(xml.contains("https://perde.example/kategori/tul-perde"));
        assert!(xml.contains("https://perde.example/urun/keten-tul"));
        assert!(matches!(s.delete_category(&cat.id).await, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_coupon_codes_unique() {
        let s = service();
        let input = CouponInput { code: "yaz10".into(), kind: DiscountKind::Percent(Decimal::TEN), min_spend: Decimal::ZERO, expires_at: None, usage_limit: None, active: true };
        s.create_coupon(input.clone()).await.unwrap();
        assert!(matches!(s.create_coupon(CouponInput { code: "YAZ10".into(), ..input }).await, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_wishlist() {
        let s = service();
        let p = s.create_product(input("Fon")).await.unwrap();
        s.upsert_user("uid", "a@b.com", None).await.unwrap();
        let user = s.toggle_wishlist("uid", p.id()).await.unwrap();
        assert_eq!(user.wishlist, vec![p.id().to_string()]);
        let user = s.upsert_user("uid", "new@b.com", Some("Ayşe".into())).await.unwrap();
        assert_eq!(user.wishlist.len(), 1);
    }
}
