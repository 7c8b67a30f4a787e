//! Typed endpoint catalogue over `ApiClient`
//!
//! Reads return the unwrapped payload; writes return the full `Envelope` so
//! callers can surface the server's message. Optional scope parameters
//! (shipping method, country, search text) are only sent when present.

use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::{json, Value};

use crate::client::{ApiClient, ApiError, Envelope, RequestOptions};
use crate::error::ParcelError;
use crate::models::*;
use crate::session::SessionScope;

/// Canonical cache keys for every read model.
pub mod keys {
    use crate::query::QueryKey;

    pub const USER: &str = "user";
    pub const ADDRESSES: &str = "addresses";
    pub const MEMBERSHIPS: &str = "memberships";
    pub const WALLET: &str = "wallet";
    pub const DELIVERY_REQUESTS: &str = "delivery-requests";
    pub const PACKAGES: &str = "packages";
    pub const SHIPMENTS: &str = "shipments";
    pub const ARCHIVE: &str = "archive";
    pub const RETURNED: &str = "returned-packages";
    pub const SHIPPING_LOCATIONS: &str = "shipping-locations";
    pub const BUY_FOR_ME_REQUESTS: &str = "buy-for-me-requests";
    pub const USER_NOTIFICATIONS: &str = "user-notifications";
    pub const USER_CHAT_MESSAGES: &str = "user-chat-messages";
    pub const ADMIN_CLIENTS: &str = "admin-clients";
    pub const ADMIN_STATS: &str = "admin-stats";
    pub const ADMIN_SHIPMENTS: &str = "admin-shipments";
    pub const ADMIN_ARCHIVES: &str = "admin-archives";
    pub const ADMIN_DISCOUNTS: &str = "admin-discounts";
    pub const ADMIN_SHIPPING_ADDRESSES: &str = "admin-shipping-addresses";
    pub const ADMIN_INSURED_PACKAGES: &str = "insured-packages";
    pub const ADMIN_INSURANCE_STATS: &str = "insurance-statistics";
    pub const ADMIN_BUY_FOR_ME_REQUESTS: &str = "admin-buy-for-me-requests";
    pub const ADMIN_CHAT_USERS: &str = "admin-chat-users";
    pub const ADMIN_CHAT_MESSAGES: &str = "admin-chat-messages";

    /// Placeholder parameter for an unscoped list.
    pub const ALL: &str = "all";

    pub fn key(resource: &str) -> QueryKey {
        QueryKey::new(resource)
    }

    /// `resource:<scope>` or `resource:all`.
    pub fn scoped(resource: &str, scope: Option<&str>) -> QueryKey {
        QueryKey::new(resource).with(scope.filter(|s| !s.is_empty()).unwrap_or(ALL))
    }

    pub fn admin_chat_messages(user_id: i64) -> QueryKey {
        QueryKey::new(ADMIN_CHAT_MESSAGES).with(user_id)
    }

    pub fn client_packages(client_id: i64) -> QueryKey {
        QueryKey::new(ADMIN_CLIENTS).with(client_id).with(PACKAGES)
    }
}

/// One page of buy-for-me requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuyForMeQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
struct ClientPackage<'a> {
    client_id: i64,
    #[serde(flatten)]
    package: &'a NewPackage,
}

fn optional(name: &'static str, value: Option<&str>) -> Vec<(&'static str, String)> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| vec![(name, v.to_string())])
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct ParcelApi {
    client: ApiClient,
    support_admin_id: i64,
}

impl ParcelApi {
    pub fn new(client: ApiClient, support_admin_id: i64) -> Self {
        Self {
            client,
            support_admin_id,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    // ========================================================================
    // Auth
    // ========================================================================

    /// Customer login. Any stale token is dropped first; token and user are
    /// stored on success.
    pub async fn login(&self, credentials: &Credentials) -> Result<Envelope<AuthPayload>, ParcelError> {
        self.authenticate(SessionScope::Customer, "/auth/login", credentials)
            .await
    }

    pub async fn register(&self, form: &RegisterForm) -> Result<Envelope<AuthPayload>, ParcelError> {
        self.authenticate(SessionScope::Customer, "/auth/register", form)
            .await
    }

    pub async fn admin_login(&self, credentials: &Credentials) -> Result<Envelope<AuthPayload>, ParcelError> {
        self.authenticate(SessionScope::Admin, "/admin/auth/login", credentials)
            .await
    }

    async fn authenticate<B: Serialize + ?Sized>(
        &self,
        scope: SessionScope,
        path: &str,
        body: &B,
    ) -> Result<Envelope<AuthPayload>, ParcelError> {
        let session = self.client.sessions().get(scope);
        session.clear_token()?;

        let envelope: Envelope<AuthPayload> = self
            .client
            .request(reqwest::Method::POST, path, &[], Some(body), RequestOptions::anonymous())
            .await
            .map_err(|e| {
                tracing::warn!(scope = scope.name(), error = %e, "Login failed");
                e
            })?;

        session.store_login(&envelope.data.token, &envelope.data.user)?;
        Ok(envelope)
    }

    /// Server logout, then local session cleanup. Local keys are cleared only
    /// once the server call returns successfully.
    pub async fn logout(&self, scope: SessionScope) -> Result<Envelope<Value>, ParcelError> {
        let path = match scope {
            SessionScope::Customer => "/auth/logout",
            SessionScope::Admin => "/admin/auth/logout",
        };
        let envelope = self.client.post_empty(path).await?;
        self.client.sessions().get(scope).clear()?;
        Ok(envelope)
    }

    pub async fn verify(&self, scope: SessionScope) -> Result<VerifyPayload, ApiError> {
        Ok(self.client.get(scope.verify_path()).await?.into_data())
    }

    // ========================================================================
    // User
    // ========================================================================

    pub async fn user(&self) -> Result<User, ApiError> {
        Ok(self.client.get("/user").await?.into_data())
    }

    pub async fn update_user(&self, form: &UserProfileForm) -> Result<Envelope<User>, ApiError> {
        self.client.put("/user", form).await
    }

    pub async fn change_password(&self, form: &PasswordChangeForm) -> Result<Envelope<Value>, ApiError> {
        self.client.put("/user/password", form).await
    }

    pub async fn update_location(&self, location: &str) -> Result<Envelope<User>, ApiError> {
        self.client
            .put("/user/location", &json!({ "location": location }))
            .await
    }

    // ========================================================================
    // Addresses
    // ========================================================================

    pub async fn addresses(&self) -> Result<Vec<Address>, ApiError> {
        Ok(self.client.get("/addresses").await?.into_data())
    }

    pub async fn create_address(&self, form: &AddressForm) -> Result<Envelope<Address>, ApiError> {
        self.client.post("/addresses", form).await
    }

    pub async fn update_address(&self, id: i64, form: &AddressForm) -> Result<Envelope<Address>, ApiError> {
        self.client.put(&format!("/addresses/{}", id), form).await
    }

    pub async fn delete_address(&self, id: i64) -> Result<Envelope<Value>, ApiError> {
        self.client.delete(&format!("/addresses/{}", id)).await
    }

    // ========================================================================
    // Packages and shipments
    // ========================================================================

    pub async fn packages(&self, shipping_method: Option<&str>) -> Result<Vec<Package>, ApiError> {
        self.scoped_list("/packages", "shipping_method", shipping_method)
            .await
    }

    pub async fn all_packages(&self) -> Result<Vec<Package>, ApiError> {
        Ok(self.client.get("/packages/all").await?.into_data())
    }

    pub async fn shipments(&self, shipping_method: Option<&str>) -> Result<Vec<Package>, ApiError> {
        self.scoped_list("/shipments", "shipping_method", shipping_method)
            .await
    }

    pub async fn archived_shipments(&self, shipping_method: Option<&str>) -> Result<Vec<Package>, ApiError> {
        self.scoped_list("/archive", "shipping_method", shipping_method)
            .await
    }

    pub async fn returned_packages(&self, shipping_method: Option<&str>) -> Result<Vec<Package>, ApiError> {
        self.scoped_list("/archive/returned", "shipping_method", shipping_method)
            .await
    }

    pub async fn request_return(&self, package_id: i64) -> Result<Envelope<Value>, ApiError> {
        self.client
            .post_empty(&format!("/packages/{}/return-request", package_id))
            .await
    }

    pub async fn request_shipping(&self, package_id: i64) -> Result<Envelope<Value>, ApiError> {
        self.client
            .post_empty(&format!("/packages/{}/shipping-request", package_id))
            .await
    }

    pub async fn apply_insurance(&self, package_id: i64, insurance_value: f64) -> Result<Envelope<Value>, ApiError> {
        self.client
            .post(
                &format!("/packages/{}/insurance", package_id),
                &json!({ "insurance_value": insurance_value }),
            )
            .await
    }

    pub async fn apply_discount(&self, discount_code: &str, package_id: i64) -> Result<Envelope<Value>, ApiError> {
        self.client
            .post(
                "/discounts/apply",
                &json!({ "discount_code": discount_code, "package_id": package_id }),
            )
            .await
    }

    pub async fn shipping_locations(&self) -> Result<Vec<ShippingLocation>, ApiError> {
        Ok(self.client.get("/shipping-locations").await?.into_data())
    }

    pub async fn shipping_location(&self, id: i64) -> Result<ShippingLocation, ApiError> {
        Ok(self
            .client
            .get(&format!("/shipping-locations/{}", id))
            .await?
            .into_data())
    }

    // ========================================================================
    // Delivery, wallet, memberships, search
    // ========================================================================

    pub async fn delivery_requests(&self, country: Option<&str>) -> Result<Vec<DeliveryRequest>, ApiError> {
        self.scoped_list("/delivery-requests", "country", country)
            .await
    }

    pub async fn create_delivery_request(
        &self,
        form: &DeliveryRequestForm,
    ) -> Result<Envelope<DeliveryRequest>, ApiError> {
        self.client.post("/delivery-requests", form).await
    }

    pub async fn wallet(&self) -> Result<Wallet, ApiError> {
        Ok(self.client.get("/wallet").await?.into_data())
    }

    pub async fn memberships(&self) -> Result<Vec<Membership>, ApiError> {
        Ok(self.client.get("/memberships").await?.into_data())
    }

    pub async fn update_membership(&self, membership_id: i64) -> Result<Envelope<Membership>, ApiError> {
        self.client
            .put_empty(&format!("/memberships/{}", membership_id))
            .await
    }

    pub async fn search_shipments(&self, q: &str) -> Result<Vec<Value>, ApiError> {
        self.search("/search/shipments", q).await
    }

    pub async fn search_addresses(&self, q: &str) -> Result<Vec<Value>, ApiError> {
        self.search("/search/addresses", q).await
    }

    pub async fn search_transactions(&self, q: &str) -> Result<Vec<Value>, ApiError> {
        self.search("/search/transactions", q).await
    }

    async fn search(&self, path: &str, q: &str) -> Result<Vec<Value>, ApiError> {
        Ok(self
            .client
            .get_with_query(path, &[("q", q.to_string())])
            .await?
            .into_data())
    }

    async fn scoped_list<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        param: &'static str,
        value: Option<&str>,
    ) -> Result<T, ApiError> {
        Ok(self
            .client
            .get_with_query(path, &optional(param, value))
            .await?
            .into_data())
    }

    // ========================================================================
    // Buy-for-me
    // ========================================================================

    /// Multipart create; the image, when given, is sent as `product_image`.
    pub async fn create_buy_for_me(
        &self,
        form: &BuyForMeForm,
        image: Option<&ImageAttachment>,
    ) -> Result<Envelope<Value>, ApiError> {
        let mut multipart = Form::new();
        for (name, value) in form.fields() {
            multipart = multipart.text(name, value);
        }
        if let Some(image) = image {
            let part = Part::bytes(image.data.to_vec())
                .file_name(image.file_name.clone())
                .mime_str(&image.mime_type)?;
            multipart = multipart.part("product_image", part);
        }
        self.client
            .post_multipart("/buy-for-me-requests", multipart)
            .await
    }

    /// The list endpoint returns a paginated object; it is passed through
    /// untouched.
    pub async fn buy_for_me_requests(&self, query: &BuyForMeQuery) -> Result<Value, ApiError> {
        let mut params = optional("status", query.status.as_deref());
        if let Some(page) = query.page.filter(|p| *p > 0) {
            params.push(("page", page.to_string()));
        }
        if let Some(limit) = query.limit.filter(|l| *l > 0) {
            params.push(("limit", limit.to_string()));
        }
        Ok(self
            .client
            .get_with_query("/buy-for-me-requests", &params)
            .await?
            .into_data())
    }

    pub async fn buy_for_me_request(&self, id: i64) -> Result<BuyForMeRequest, ApiError> {
        Ok(self
            .client
            .get(&format!("/buy-for-me-requests/{}", id))
            .await?
            .into_data())
    }

    pub async fn update_buy_for_me_status(
        &self,
        id: i64,
        update: &BuyForMeStatusUpdate,
    ) -> Result<Envelope<Value>, ApiError> {
        self.client
            .put(&format!("/buy-for-me-requests/{}/status", id), update)
            .await
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    pub async fn notifications(&self) -> Result<Vec<Notification>, ApiError> {
        Ok(self.client.get("/notifications").await?.into_data())
    }

    pub async fn mark_notification_read(&self, id: i64) -> Result<Envelope<Value>, ApiError> {
        self.client
            .put_empty(&format!("/notifications/{}/read", id))
            .await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<Envelope<Value>, ApiError> {
        self.client.put_empty("/notifications/read-all").await
    }

    pub async fn delete_notification(&self, id: i64) -> Result<Envelope<Value>, ApiError> {
        self.client
            .delete(&format!("/notifications/{}", id))
            .await
    }

    // ========================================================================
    // Customer chat
    // ========================================================================

    pub async fn chat_messages(&self) -> Result<Vec<ChatMessage>, ApiError> {
        Ok(self.client.get("/chat/messages").await?.into_data())
    }

    /// Customer messages always go to the configured support admin.
    pub async fn send_chat_message(&self, message: &str) -> Result<Envelope<Value>, ApiError> {
        self.client
            .post(
                "/chat/messages",
                &json!({ "message": message, "admin_id": self.support_admin_id }),
            )
            .await
    }

    // ========================================================================
    // Admin
    // ========================================================================

    pub async fn admin_clients(&self, search: Option<&str>) -> Result<Vec<Client>, ApiError> {
        self.scoped_list("/admin/clients", "search", search).await
    }

    pub async fn admin_stats(&self) -> Result<AdminStats, ApiError> {
        Ok(self.client.get("/admin/stats").await?.into_data())
    }

    pub async fn create_package(&self, client_id: i64, package: &NewPackage) -> Result<Envelope<Value>, ApiError> {
        self.client
            .post("/admin/packages", &ClientPackage { client_id, package })
            .await
    }

    pub async fn client_packages(&self, client_id: i64) -> Result<Vec<Package>, ApiError> {
        Ok(self
            .client
            .get(&format!("/admin/clients/{}/packages", client_id))
            .await?
            .into_data())
    }

    pub async fn admin_shipments(&self) -> Result<Vec<Package>, ApiError> {
        Ok(self.client.get("/admin/shipments").await?.into_data())
    }

    pub async fn admin_archives(&self) -> Result<Vec<Package>, ApiError> {
        Ok(self.client.get("/admin/archives").await?.into_data())
    }

    pub async fn update_package_status(&self, package_id: i64, status: &str) -> Result<Envelope<Value>, ApiError> {
        self.client
            .put(
                &format!("/admin/packages/{}/status", package_id),
                &json!({ "status": status }),
            )
            .await
    }

    pub async fn update_admin_profile(&self, form: &AdminProfileForm) -> Result<Envelope<Value>, ApiError> {
        self.client.put("/admin/profile", form).await
    }

    pub async fn change_admin_password(&self, form: &AdminPasswordForm) -> Result<Envelope<Value>, ApiError> {
        self.client.put("/admin/password", form).await
    }

    pub async fn discounts(&self) -> Result<Vec<Discount>, ApiError> {
        Ok(self.client.get("/admin/discounts").await?.into_data())
    }

    pub async fn create_discount(&self, form: &DiscountForm) -> Result<Envelope<Value>, ApiError> {
        self.client.post("/admin/discounts", form).await
    }

    pub async fn update_discount(&self, id: i64, form: &DiscountForm) -> Result<Envelope<Value>, ApiError> {
        self.client
            .put(&format!("/admin/discounts/{}", id), form)
            .await
    }

    pub async fn delete_discount(&self, id: i64) -> Result<Envelope<Value>, ApiError> {
        self.client
            .delete(&format!("/admin/discounts/{}", id))
            .await
    }

    pub async fn insured_packages(&self) -> Result<Vec<Package>, ApiError> {
        Ok(self.client.get("/admin/insured-packages").await?.into_data())
    }

    pub async fn insurance_statistics(&self) -> Result<InsuranceStatistics, ApiError> {
        Ok(self
            .client
            .get("/admin/insurance/statistics")
            .await?
            .into_data())
    }

    pub async fn shipping_addresses(&self) -> Result<Vec<ShippingAddress>, ApiError> {
        Ok(self
            .client
            .get("/admin/shipping-addresses")
            .await?
            .into_data())
    }

    pub async fn create_shipping_address(
        &self,
        form: &ShippingAddressForm,
    ) -> Result<Envelope<Value>, ApiError> {
        self.client.post("/admin/shipping-addresses", form).await
    }

    pub async fn update_shipping_address(
        &self,
        id: i64,
        form: &ShippingAddressForm,
    ) -> Result<Envelope<Value>, ApiError> {
        self.client
            .put(&format!("/admin/shipping-addresses/{}", id), form)
            .await
    }

    pub async fn delete_shipping_address(&self, id: i64) -> Result<Envelope<Value>, ApiError> {
        self.client
            .delete(&format!("/admin/shipping-addresses/{}", id))
            .await
    }

    pub async fn admin_buy_for_me_requests(&self) -> Result<Vec<BuyForMeRequest>, ApiError> {
        Ok(self
            .client
            .get("/admin/buy-for-me-requests")
            .await?
            .into_data())
    }

    pub async fn send_notification(&self, client_id: i64, message: &str) -> Result<Envelope<Value>, ApiError> {
        self.client
            .post(
                "/admin/notifications",
                &json!({ "client_id": client_id, "message": message }),
            )
            .await
    }

    pub async fn admin_chat_users(&self) -> Result<Vec<ChatUser>, ApiError> {
        Ok(self.client.get("/admin/chat/users").await?.into_data())
    }

    pub async fn admin_chat_messages(&self, user_id: i64) -> Result<Vec<ChatMessage>, ApiError> {
        Ok(self
            .client
            .get_with_query("/admin/chat/messages", &[("user_id", user_id.to_string())])
            .await?
            .into_data())
    }

    pub async fn send_admin_chat_message(&self, user_id: i64, message: &str) -> Result<Envelope<Value>, ApiError> {
        self.client
            .post(
                "/admin/chat/messages",
                &json!({ "message": message, "user_id": user_id }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_keys_fall_back_to_all() {
        assert_eq!(keys::scoped(keys::PACKAGES, None).to_string(), "packages:all");
        assert_eq!(keys::scoped(keys::PACKAGES, Some("")).to_string(), "packages:all");
        assert_eq!(
            keys::scoped(keys::DELIVERY_REQUESTS, Some("Turkey")).to_string(),
            "delivery-requests:Turkey"
        );
        assert!(keys::admin_chat_messages(5).starts_with(&keys::key(keys::ADMIN_CHAT_MESSAGES)));
        assert!(keys::client_packages(5).starts_with(&keys::key(keys::ADMIN_CLIENTS)));
    }

    #[test]
    fn test_optional_params_skip_empty_values() {
        assert!(optional("search", None).is_empty());
        assert!(optional("search", Some("")).is_empty());
        assert_eq!(
            optional("search", Some("ana")),
            vec![("search", "ana".to_string())]
        );
    }

    #[test]
    fn test_client_package_body_is_flattened() {
        let package = NewPackage {
            description: "Shoes".to_string(),
            weight: 1.5,
            price: 40.0,
            country: "Turkey".to_string(),
            shipping_method: "air".to_string(),
            status: "pending".to_string(),
            ..Default::default()
        };
        let body = serde_json::to_value(ClientPackage {
            client_id: 12,
            package: &package,
        })
        .unwrap();
        assert_eq!(body["client_id"], 12);
        assert_eq!(body["description"], "Shoes");
        assert!(body.get("notes").is_none());
    }
}
