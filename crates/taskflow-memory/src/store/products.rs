//! Tracked product CRUD.

use super::users::{user_entry, user_key};
use super::Store;
use crate::types::{NewProduct, ProductPatch, TrackedProduct};
use chrono::Utc;
use serde_json::Map;
use taskflow_core::error::TaskflowError;
use taskflow_core::normalize_user_id;
use uuid::Uuid;

impl Store {
    /// Start tracking a product. Returns the new product id.
    pub async fn add_tracked_product(
        &self,
        user_id: &str,
        product: NewProduct,
    ) -> Result<String, TaskflowError> {
        let key = user_key(user_id)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let record = TrackedProduct {
            id: id.clone(),
            title: product.title,
            url: product.url,
            current_price: product.current_price,
            target_price: product.target_price,
            tracked_since: now,
            last_checked: now,
            extra: Map::new(),
        };
        self.mutate(|root| {
            let (user, _) = user_entry(root, &key, now);
            user.tracked_products.push(record);
            user.last_interaction = now;
            Ok((id, true))
        })
        .await
    }

    pub async fn get_tracked_products(&self, user_id: &str) -> Vec<TrackedProduct> {
        let key = normalize_user_id(user_id);
        self.read(|root| {
            root.users
                .get(&key)
                .map(|u| u.tracked_products.clone())
                .unwrap_or_default()
        })
        .await
    }

    /// Apply `patch` and bump `last_checked`. `false` if the product is unknown.
    pub async fn update_tracked_product(
        &self,
        user_id: &str,
        product_id: &str,
        patch: ProductPatch,
    ) -> Result<bool, TaskflowError> {
        let key = normalize_user_id(user_id);
        self.mutate(|root| {
            let Some(user) = root.users.get_mut(&key) else {
                return Ok((false, false));
            };
            let Some(product) = user.tracked_products.iter_mut().find(|p| p.id == product_id)
            else {
                return Ok((false, false));
            };
            let now = Utc::now();
            if let Some(title) = patch.title {
                product.title = title;
            }
            if let Some(url) = patch.url {
                product.url = url;
            }
            if let Some(price) = patch.current_price {
                product.current_price = Some(price);
            }
            if let Some(target) = patch.target_price {
                product.target_price = Some(target);
            }
            product.last_checked = now;
            user.last_interaction = now;
            Ok((true, true))
        })
        .await
    }

    /// Stop tracking a product. `false` if it was not tracked.
    pub async fn remove_tracked_product(
        &self,
        user_id: &str,
        product_id: &str,
    ) -> Result<bool, TaskflowError> {
        let key = normalize_user_id(user_id);
        self.mutate(|root| {
            let Some(user) = root.users.get_mut(&key) else {
                return Ok((false, false));
            };
            let before = user.tracked_products.len();
            user.tracked_products.retain(|p| p.id != product_id);
            if user.tracked_products.len() == before {
                return Ok((false, false));
            }
            user.last_interaction = Utc::now();
            Ok((true, true))
        })
        .await
    }
}
