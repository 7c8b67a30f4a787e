use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub suite_number: Option<String>,
    #[serde(default)]
    pub total_packages: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminStats {
    #[serde(default)]
    pub total_clients: u64,
    #[serde(default)]
    pub active_shipments: u64,
    #[serde(default)]
    pub total_revenue: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsuranceStatistics {
    pub total_insured_packages: u64,
    pub total_insurance_value: f64,
}

/// Package created by an admin on behalf of a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPackage {
    pub description: String,
    pub weight: f64,
    pub price: f64,
    pub country: String,
    pub shipping_method: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_arrival: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddressForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}
