use serde::{Deserialize, Serialize};

use super::address::AddressForm;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub id: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub delivery_date: Option<String>,
    #[serde(default)]
    pub delivery_time: Option<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequestForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_address_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_pickup_address: Option<AddressForm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_delivery_address: Option<AddressForm>,
    pub package_weight: f64,
    pub package_length: f64,
    pub package_width: f64,
    pub package_height: f64,
    pub package_value: f64,
    pub package_description: String,
    pub delivery_date: String,
    pub delivery_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}
