use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    #[default]
    Home,
    Work,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: i64,
    pub name: String,
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub country: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(rename = "type", default)]
    pub kind: AddressType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressForm {
    pub name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
    pub phone: String,
    #[serde(rename = "type")]
    pub kind: AddressType,
    pub is_default: bool,
}

impl Default for AddressForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            street: String::new(),
            city: String::new(),
            state: String::new(),
            country: "Iraq".to_string(),
            postal_code: String::new(),
            phone: String::new(),
            kind: AddressType::Home,
            is_default: false,
        }
    }
}
