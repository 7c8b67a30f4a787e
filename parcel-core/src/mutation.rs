//! Mutations — one request plus a declared invalidation set
//!
//! `mutate` runs the request exactly once (no retry). On success every
//! declared key is invalidated in a single `invalidate_many` pass; on failure
//! nothing is invalidated and the error is returned untouched.

use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::client::ApiError;
use crate::query::{QueryClient, QueryKey};

type Runner<A, T> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;
type KeyFn<A> = Arc<dyn Fn(&A) -> QueryKey + Send + Sync>;

pub struct Mutation<A, T> {
    name: &'static str,
    client: QueryClient,
    run: Runner<A, T>,
    invalidations: Vec<KeyFn<A>>,
}

impl<A, T> Clone for Mutation<A, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            client: self.client.clone(),
            run: self.run.clone(),
            invalidations: self.invalidations.clone(),
        }
    }
}

impl<A, T> fmt::Debug for Mutation<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("name", &self.name)
            .field("invalidations", &self.invalidations.len())
            .finish()
    }
}

impl<A, T> Mutation<A, T>
where
    A: Send + 'static,
    T: Send + 'static,
{
    pub fn new<F, Fut>(name: &'static str, client: QueryClient, run: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self {
            name,
            client,
            run: Arc::new(move |args| run(args).boxed()),
            invalidations: Vec::new(),
        }
    }

    /// Invalidate `key` (prefix match) after every successful run.
    pub fn invalidates(mut self, key: QueryKey) -> Self {
        self.invalidations.push(Arc::new(move |_| key.clone()));
        self
    }

    /// Invalidate a key derived from the arguments, e.g. the conversation a
    /// message was sent to.
    pub fn invalidates_with(mut self, key: impl Fn(&A) -> QueryKey + Send + Sync + 'static) -> Self {
        self.invalidations.push(Arc::new(key));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Keys this mutation would invalidate for `args`.
    pub fn invalidation_keys(&self, args: &A) -> Vec<QueryKey> {
        self.invalidations.iter().map(|k| k(args)).collect()
    }

    pub async fn mutate(&self, args: A) -> Result<T, ApiError> {
        let keys = self.invalidation_keys(&args);
        match (self.run)(args).await {
            Ok(value) => {
                let marked = self.client.invalidate_many(&keys);
                tracing::info!(mutation = self.name, invalidated = marked, "Mutation succeeded");
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(mutation = self.name, kind = ?e.kind(), error = %e, "Mutation failed");
                Err(e)
            }
        }
    }
}

/// The client's mutations with their invalidation sets.
pub mod mutations {
    use serde_json::Value;

    use super::Mutation;
    use crate::api::{keys, ParcelApi};
    use crate::client::Envelope;
    use crate::models::*;
    use crate::query::QueryClient;

    macro_rules! api_mutation {
        ($name:literal, $api:expr, $client:expr, $args_ty:ty, |$api_var:ident, $args:pat_param| $body:expr) => {{
            let api = $api.clone();
            Mutation::new($name, $client.clone(), move |$args: $args_ty| {
                let $api_var = api.clone();
                async move { $body.await }
            })
        }};
    }

    pub fn create_address(api: &ParcelApi, client: &QueryClient) -> Mutation<AddressForm, Envelope<Address>> {
        api_mutation!("create_address", api, client, AddressForm, |api, form| api.create_address(&form))
            .invalidates(keys::key(keys::ADDRESSES))
    }

    pub fn update_address(
        api: &ParcelApi,
        client: &QueryClient,
    ) -> Mutation<(i64, AddressForm), Envelope<Address>> {
        api_mutation!("update_address", api, client, (i64, AddressForm), |api, (id, form)| api
            .update_address(id, &form))
        .invalidates(keys::key(keys::ADDRESSES))
    }

    pub fn delete_address(api: &ParcelApi, client: &QueryClient) -> Mutation<i64, Envelope<Value>> {
        api_mutation!("delete_address", api, client, i64, |api, id| api.delete_address(id))
            .invalidates(keys::key(keys::ADDRESSES))
    }

    pub fn create_package(
        api: &ParcelApi,
        client: &QueryClient,
    ) -> Mutation<(i64, NewPackage), Envelope<Value>> {
        api_mutation!("create_package", api, client, (i64, NewPackage), |api, (client_id, package)| api
            .create_package(client_id, &package))
        .invalidates(keys::key(keys::ADMIN_CLIENTS))
        .invalidates(keys::key(keys::ADMIN_STATS))
    }

    pub fn update_package_status(
        api: &ParcelApi,
        client: &QueryClient,
    ) -> Mutation<(i64, String), Envelope<Value>> {
        api_mutation!("update_package_status", api, client, (i64, String), |api, (id, status)| api
            .update_package_status(id, &status))
        .invalidates(keys::key(keys::ADMIN_SHIPMENTS))
    }

    pub fn send_notification(
        api: &ParcelApi,
        client: &QueryClient,
    ) -> Mutation<(i64, String), Envelope<Value>> {
        api_mutation!("send_notification", api, client, (i64, String), |api, (client_id, message)| api
            .send_notification(client_id, &message))
        .invalidates(keys::key(keys::ADMIN_CLIENTS))
    }

    pub fn update_membership(api: &ParcelApi, client: &QueryClient) -> Mutation<i64, Envelope<Membership>> {
        api_mutation!("update_membership", api, client, i64, |api, id| api.update_membership(id))
            .invalidates(keys::key(keys::MEMBERSHIPS))
            .invalidates(keys::key(keys::USER))
    }

    pub fn update_profile(api: &ParcelApi, client: &QueryClient) -> Mutation<UserProfileForm, Envelope<User>> {
        api_mutation!("update_profile", api, client, UserProfileForm, |api, form| api.update_user(&form))
            .invalidates(keys::key(keys::USER))
    }

    pub fn update_location(api: &ParcelApi, client: &QueryClient) -> Mutation<String, Envelope<User>> {
        api_mutation!("update_location", api, client, String, |api, location| api
            .update_location(&location))
        .invalidates(keys::key(keys::USER))
    }

    pub fn create_delivery_request(
        api: &ParcelApi,
        client: &QueryClient,
    ) -> Mutation<DeliveryRequestForm, Envelope<DeliveryRequest>> {
        api_mutation!("create_delivery_request", api, client, DeliveryRequestForm, |api, form| api
            .create_delivery_request(&form))
        .invalidates(keys::key(keys::DELIVERY_REQUESTS))
    }

    pub fn create_buy_for_me(
        api: &ParcelApi,
        client: &QueryClient,
    ) -> Mutation<(BuyForMeForm, Option<ImageAttachment>), Envelope<Value>> {
        api_mutation!("create_buy_for_me", api, client, (BuyForMeForm, Option<ImageAttachment>), |api, (form, image)| api
            .create_buy_for_me(&form, image.as_ref()))
        .invalidates(keys::key(keys::BUY_FOR_ME_REQUESTS))
    }

    pub fn update_buy_for_me_status(
        api: &ParcelApi,
        client: &QueryClient,
    ) -> Mutation<(i64, BuyForMeStatusUpdate), Envelope<Value>> {
        api_mutation!("update_buy_for_me_status", api, client, (i64, BuyForMeStatusUpdate), |api, (id, update)| api
            .update_buy_for_me_status(id, &update))
        .invalidates(keys::key(keys::ADMIN_BUY_FOR_ME_REQUESTS))
    }

    pub fn mark_notification_read(api: &ParcelApi, client: &QueryClient) -> Mutation<i64, Envelope<Value>> {
        api_mutation!("mark_notification_read", api, client, i64, |api, id| api
            .mark_notification_read(id))
        .invalidates(keys::key(keys::USER_NOTIFICATIONS))
    }

    pub fn mark_all_notifications_read(api: &ParcelApi, client: &QueryClient) -> Mutation<(), Envelope<Value>> {
        api_mutation!("mark_all_notifications_read", api, client, (), |api, ()| api
            .mark_all_notifications_read())
        .invalidates(keys::key(keys::USER_NOTIFICATIONS))
    }

    pub fn delete_notification(api: &ParcelApi, client: &QueryClient) -> Mutation<i64, Envelope<Value>> {
        api_mutation!("delete_notification", api, client, i64, |api, id| api.delete_notification(id))
            .invalidates(keys::key(keys::USER_NOTIFICATIONS))
    }

    pub fn create_discount(api: &ParcelApi, client: &QueryClient) -> Mutation<DiscountForm, Envelope<Value>> {
        api_mutation!("create_discount", api, client, DiscountForm, |api, form| api.create_discount(&form))
            .invalidates(keys::key(keys::ADMIN_DISCOUNTS))
    }

    pub fn update_discount(
        api: &ParcelApi,
        client: &QueryClient,
    ) -> Mutation<(i64, DiscountForm), Envelope<Value>> {
        api_mutation!("update_discount", api, client, (i64, DiscountForm), |api, (id, form)| api
            .update_discount(id, &form))
        .invalidates(keys::key(keys::ADMIN_DISCOUNTS))
    }

    pub fn delete_discount(api: &ParcelApi, client: &QueryClient) -> Mutation<i64, Envelope<Value>> {
        api_mutation!("delete_discount", api, client, i64, |api, id| api.delete_discount(id))
            .invalidates(keys::key(keys::ADMIN_DISCOUNTS))
    }

    pub fn create_shipping_address(
        api: &ParcelApi,
        client: &QueryClient,
    ) -> Mutation<ShippingAddressForm, Envelope<Value>> {
        api_mutation!("create_shipping_address", api, client, ShippingAddressForm, |api, form| api
            .create_shipping_address(&form))
        .invalidates(keys::key(keys::ADMIN_SHIPPING_ADDRESSES))
    }

    pub fn update_shipping_address(
        api: &ParcelApi,
        client: &QueryClient,
    ) -> Mutation<(i64, ShippingAddressForm), Envelope<Value>> {
        api_mutation!("update_shipping_address", api, client, (i64, ShippingAddressForm), |api, (id, form)| api
            .update_shipping_address(id, &form))
        .invalidates(keys::key(keys::ADMIN_SHIPPING_ADDRESSES))
    }

    pub fn delete_shipping_address(api: &ParcelApi, client: &QueryClient) -> Mutation<i64, Envelope<Value>> {
        api_mutation!("delete_shipping_address", api, client, i64, |api, id| api
            .delete_shipping_address(id))
        .invalidates(keys::key(keys::ADMIN_SHIPPING_ADDRESSES))
    }

    pub fn send_chat_message(api: &ParcelApi, client: &QueryClient) -> Mutation<String, Envelope<Value>> {
        api_mutation!("send_chat_message", api, client, String, |api, message| api
            .send_chat_message(&message))
        .invalidates(keys::key(keys::USER_CHAT_MESSAGES))
    }

    /// Invalidates the conversation the message went to plus the
    /// conversation list (previews, unread counts).
    pub fn send_admin_chat_message(
        api: &ParcelApi,
        client: &QueryClient,
    ) -> Mutation<(i64, String), Envelope<Value>> {
        api_mutation!("send_admin_chat_message", api, client, (i64, String), |api, (user_id, message)| api
            .send_admin_chat_message(user_id, &message))
        .invalidates_with(|(user_id, _)| keys::admin_chat_messages(*user_id))
        .invalidates(keys::key(keys::ADMIN_CHAT_USERS))
    }
}
