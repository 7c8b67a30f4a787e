use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyForMeRequest {
    pub id: i64,
    pub product_name: String,
    #[serde(default)]
    pub product_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub estimated_price: Option<f64>,
    #[serde(default)]
    pub actual_price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
    #[serde(default)]
    pub product_image_path: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyForMeForm {
    pub product_name: String,
    pub product_url: String,
    pub description: String,
    pub estimated_price: f64,
    pub currency: String,
    pub quantity: u32,
    pub shipping_address: String,
    pub special_instructions: String,
}

impl Default for BuyForMeForm {
    fn default() -> Self {
        Self {
            product_name: String::new(),
            product_url: String::new(),
            description: String::new(),
            estimated_price: 0.0,
            currency: "USD".to_string(),
            quantity: 1,
            shipping_address: String::new(),
            special_instructions: String::new(),
        }
    }
}

impl BuyForMeForm {
    /// Text fields in multipart order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("product_name", self.product_name.clone()),
            ("product_url", self.product_url.clone()),
            ("description", self.description.clone()),
            ("estimated_price", self.estimated_price.to_string()),
            ("currency", self.currency.clone()),
            ("quantity", self.quantity.to_string()),
            ("shipping_address", self.shipping_address.clone()),
            ("special_instructions", self.special_instructions.clone()),
        ]
    }
}

/// Product image sent as the `product_image` multipart part.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl ImageAttachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuyForMeStatusUpdate {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
}
