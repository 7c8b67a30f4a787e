//! Client route table and navigation
//!
//! Public routes render directly. Customer routes and everything under
//! `/admin/` (except `/admin/login`) go through the matching `RouteGuard` on
//! every navigation. Unknown paths resolve to `NotFound`.

use serde_json::Value;

use crate::api::ParcelApi;
use crate::forms::Notice;
use crate::guard::{GuardState, RouteGuard};
use crate::session::SessionScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Guarded(SessionScope),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    AdminLogin,
    MySuite,
    Dashboard,
    Shipments,
    Archive,
    Address,
    Delivery,
    Analytics,
    Settings,
    AdminClients,
    AdminShipments,
    AdminShippingAddresses,
    AdminDiscounts,
    AdminInsuredPackages,
    AdminCustomsRequests,
    AdminSettings,
    NotFound,
}

impl Route {
    pub const ALL: [Route; 18] = [
        Route::Login,
        Route::Register,
        Route::AdminLogin,
        Route::MySuite,
        Route::Dashboard,
        Route::Shipments,
        Route::Archive,
        Route::Address,
        Route::Delivery,
        Route::Analytics,
        Route::Settings,
        Route::AdminClients,
        Route::AdminShipments,
        Route::AdminShippingAddresses,
        Route::AdminDiscounts,
        Route::AdminInsuredPackages,
        Route::AdminCustomsRequests,
        Route::AdminSettings,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Register => "/register",
            Route::AdminLogin => "/admin/login",
            Route::MySuite => "/",
            Route::Dashboard => "/dashboard",
            Route::Shipments => "/shipments",
            Route::Archive => "/archive",
            Route::Address => "/address",
            Route::Delivery => "/delivery",
            Route::Analytics => "/analytics",
            Route::Settings => "/settings",
            Route::AdminClients => "/admin",
            Route::AdminShipments => "/admin/shipments",
            Route::AdminShippingAddresses => "/admin/shipping-addresses",
            Route::AdminDiscounts => "/admin/discounts",
            Route::AdminInsuredPackages => "/admin/insured-packages",
            Route::AdminCustomsRequests => "/admin/customs-requests",
            Route::AdminSettings => "/admin/settings",
            Route::NotFound => "*",
        }
    }

    pub fn access(self) -> Access {
        match self {
            Route::Login | Route::Register | Route::AdminLogin | Route::NotFound => Access::Public,
            Route::AdminClients
            | Route::AdminShipments
            | Route::AdminShippingAddresses
            | Route::AdminDiscounts
            | Route::AdminInsuredPackages
            | Route::AdminCustomsRequests
            | Route::AdminSettings => Access::Guarded(SessionScope::Admin),
            _ => Access::Guarded(SessionScope::Customer),
        }
    }

    /// Match a location. Query string, fragment and a trailing slash are
    /// ignored.
    pub fn parse(location: &str) -> Route {
        let path = location
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        Route::ALL
            .iter()
            .copied()
            .find(|r| r.path() == path)
            .unwrap_or(Route::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Render {
        route: Route,
        /// Verified user for guarded routes.
        user: Option<Value>,
    },
    Redirect {
        from: Route,
        to: &'static str,
        notice: Option<Notice>,
    },
}

#[derive(Debug, Clone)]
pub struct Navigator {
    customer: RouteGuard,
    admin: RouteGuard,
}

impl Navigator {
    pub fn new(api: ParcelApi) -> Self {
        Self {
            customer: RouteGuard::new(api.clone(), SessionScope::Customer),
            admin: RouteGuard::new(api, SessionScope::Admin),
        }
    }

    pub async fn resolve(&self, location: &str) -> Resolution {
        let route = Route::parse(location);
        let guard = match route.access() {
            Access::Public => return Resolution::Render { route, user: None },
            Access::Guarded(SessionScope::Customer) => &self.customer,
            Access::Guarded(SessionScope::Admin) => &self.admin,
        };

        let state = guard.check().await;
        tracing::debug!(location, route = ?route, authorized = state.is_authorized(), "Route resolved");
        match state {
            GuardState::Authorized { user } => Resolution::Render { route, user },
            GuardState::Unauthorized { redirect, .. } => Resolution::Redirect {
                from: route,
                to: redirect,
                notice: state.notice(),
            },
            GuardState::Checking => Resolution::Redirect {
                from: route,
                to: guard.scope().login_route(),
                notice: None,
            },
        }
    }
}
