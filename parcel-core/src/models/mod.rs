pub mod address;
pub mod admin;
pub mod buy_for_me;
pub mod chat;
pub mod delivery;
pub mod discount;
pub mod notification;
pub mod package;
pub mod user;
pub mod wallet;

pub use address::{Address, AddressForm, AddressType};
pub use admin::{
    AdminStats, Client, InsuranceStatistics, NewPackage, ShippingAddress, ShippingAddressForm,
};
pub use buy_for_me::{BuyForMeForm, BuyForMeRequest, BuyForMeStatusUpdate, ImageAttachment};
pub use chat::{ChatMessage, ChatUser, SenderRole};
pub use delivery::{DeliveryRequest, DeliveryRequestForm};
pub use discount::{Discount, DiscountForm};
pub use notification::Notification;
pub use package::{Package, ShippingLocation};
pub use user::{
    AdminPasswordForm, AdminProfileForm, AuthPayload, Credentials, PasswordChangeForm, RegisterForm, User,
    UserProfileForm, VerifyPayload,
};
pub use wallet::{Membership, Wallet, WalletTransaction};
