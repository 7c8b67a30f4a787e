pub mod api;
pub mod chat;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod forms;
pub mod guard;
pub mod models;
pub mod mutation;
pub mod query;
pub mod routes;
pub mod session;

pub use api::{keys, BuyForMeQuery, ParcelApi};
pub use chat::{
    dedupe_messages, AdminChat, AdminChatWidget, ChatBackend, ChatView, CustomerChat,
    CustomerChatWidget,
};
pub use client::{ApiClient, ApiError, Envelope, ErrorKind, FieldErrors, RequestOptions};
pub use config::ParcelConfig;
pub use context::ParcelContext;
pub use error::ParcelError;
pub use forms::{FormModal, Notice, NoticeVariant};
pub use guard::{GuardState, RouteGuard, UnauthorizedReason};
pub use mutation::{mutations, Mutation};
pub use query::{
    QueryClient, QueryKey, QueryOptions, QueryState, QueryStatus, ScopedQuery, Subscription,
};
pub use routes::{Access, Navigator, Resolution, Route};
pub use session::{FileStorage, MemoryStorage, Session, SessionScope, Sessions, TokenStorage};
