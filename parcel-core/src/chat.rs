//! Polling chat — admin and customer widgets over the query cache
//!
//! Admin widget state machine:
//! ```text
//! Minimized --open--> ConversationList --select(id)--> Conversation(id)
//!     ^                      ^  <-------back--------------   |
//!     +------ minimize ------+-------------------------------+
//! ```
//! - the conversation list polls every `conversation_poll` while open
//! - the message list polls every `message_poll` while a counterparty is
//!   selected; it is keyed by counterparty, so switching never exposes the
//!   previous conversation
//! - minimizing stops both polls

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::api::{keys, ParcelApi};
use crate::client::ApiError;
use crate::config::ChatConfig;
use crate::models::{ChatMessage, ChatUser};
use crate::mutation::Mutation;
use crate::query::{QueryClient, QueryKey, QueryOptions, QueryState, ScopedQuery, Subscription};

/// Transport behind a chat widget.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    async fn conversations(&self) -> Result<Vec<ChatUser>, ApiError>;

    async fn messages(&self, counterparty: i64) -> Result<Vec<ChatMessage>, ApiError>;

    async fn send(&self, counterparty: i64, body: &str) -> Result<(), ApiError>;
}

/// Admin side: one conversation per customer.
#[derive(Debug, Clone)]
pub struct AdminChat {
    api: ParcelApi,
}

impl AdminChat {
    pub fn new(api: ParcelApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ChatBackend for AdminChat {
    async fn conversations(&self) -> Result<Vec<ChatUser>, ApiError> {
        self.api.admin_chat_users().await
    }

    async fn messages(&self, counterparty: i64) -> Result<Vec<ChatMessage>, ApiError> {
        self.api.admin_chat_messages(counterparty).await
    }

    async fn send(&self, counterparty: i64, body: &str) -> Result<(), ApiError> {
        self.api.send_admin_chat_message(counterparty, body).await?;
        Ok(())
    }
}

/// Customer side: a single thread with the support admin. The counterparty
/// argument is ignored; the recipient comes from configuration.
#[derive(Debug, Clone)]
pub struct CustomerChat {
    api: ParcelApi,
}

impl CustomerChat {
    pub fn new(api: ParcelApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ChatBackend for CustomerChat {
    async fn conversations(&self) -> Result<Vec<ChatUser>, ApiError> {
        Ok(Vec::new())
    }

    async fn messages(&self, _counterparty: i64) -> Result<Vec<ChatMessage>, ApiError> {
        self.api.chat_messages().await
    }

    async fn send(&self, _counterparty: i64, body: &str) -> Result<(), ApiError> {
        self.api.send_chat_message(body).await?;
        Ok(())
    }
}

/// Keep server order, drop repeated ids (first occurrence wins).
pub fn dedupe_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut seen = HashSet::with_capacity(messages.len());
    messages
        .iter()
        .filter(|m| seen.insert(m.id))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatView {
    Minimized,
    ConversationList,
    Conversation { counterparty: i64 },
}

fn send_mutation<B: ChatBackend>(
    backend: &Arc<B>,
    client: &QueryClient,
) -> Mutation<(i64, String), ()> {
    let backend = backend.clone();
    Mutation::new("send_chat_message", client.clone(), move |(counterparty, body): (i64, String)| {
        let backend = backend.clone();
        async move { backend.send(counterparty, &body).await }
    })
}

// ============================================================================
// Admin widget
// ============================================================================

pub struct AdminChatWidget<B: ChatBackend> {
    view: ChatView,
    conversations: Subscription<Vec<ChatUser>>,
    messages: ScopedQuery<i64, Vec<ChatMessage>>,
    send: Mutation<(i64, String), ()>,
    search: String,
    draft: String,
    _backend: Arc<B>,
}

impl<B: ChatBackend> AdminChatWidget<B> {
    /// Starts minimized; nothing is fetched until `open`. Must be created
    /// inside a tokio runtime.
    pub fn new(backend: Arc<B>, client: QueryClient, config: &ChatConfig) -> Self {
        let list_backend = backend.clone();
        let conversations = client.subscribe(
            keys::key(keys::ADMIN_CHAT_USERS),
            move || {
                let backend = list_backend.clone();
                async move { backend.conversations().await }
            },
            QueryOptions::new()
                .refetch_every(config.conversation_poll())
                .enabled(false),
        );

        let message_backend = backend.clone();
        let messages = ScopedQuery::new(
            client.clone(),
            keys::key(keys::ADMIN_CHAT_MESSAGES),
            QueryOptions::new().refetch_every(config.message_poll()),
            move |counterparty: i64| {
                let backend = message_backend.clone();
                async move { backend.messages(counterparty).await }
            },
        );

        let send = send_mutation(&backend, &client)
            .invalidates_with(|(counterparty, _)| keys::admin_chat_messages(*counterparty))
            .invalidates(keys::key(keys::ADMIN_CHAT_USERS));

        Self {
            view: ChatView::Minimized,
            conversations,
            messages,
            send,
            search: String::new(),
            draft: String::new(),
            _backend: backend,
        }
    }

    pub fn view(&self) -> ChatView {
        self.view
    }

    pub fn is_open(&self) -> bool {
        self.view != ChatView::Minimized
    }

    pub fn selected(&self) -> Option<i64> {
        match self.view {
            ChatView::Conversation { counterparty } => Some(counterparty),
            _ => None,
        }
    }

    pub fn open(&mut self) {
        if self.view == ChatView::Minimized {
            self.view = ChatView::ConversationList;
            self.conversations.set_enabled(true);
            tracing::debug!("Admin chat opened");
        }
    }

    /// Any state → minimized. The selection is dropped, so reopening shows
    /// the conversation list.
    pub fn minimize(&mut self) {
        self.view = ChatView::Minimized;
        self.conversations.set_enabled(false);
        self.messages.set_scope(None);
        tracing::debug!("Admin chat minimized");
    }

    /// Select a counterparty. Ignored while minimized.
    pub fn select(&mut self, counterparty: i64) -> bool {
        if self.view == ChatView::Minimized {
            return false;
        }
        self.view = ChatView::Conversation { counterparty };
        self.messages.set_scope(Some(counterparty));
        tracing::debug!(counterparty, "Admin chat conversation selected");
        true
    }

    pub fn back(&mut self) {
        if let ChatView::Conversation { .. } = self.view {
            self.view = ChatView::ConversationList;
            self.messages.set_scope(None);
        }
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.search = query.into();
    }

    /// Conversation list filtered by the search text.
    pub fn conversations(&self) -> Vec<ChatUser> {
        let query = self.search.trim();
        self.conversations
            .data()
            .map(|users| {
                users
                    .iter()
                    .filter(|u| query.is_empty() || u.matches(query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn conversation_state(&self) -> QueryState<Vec<ChatUser>> {
        self.conversations.state()
    }

    /// Messages of the selected conversation; empty without a selection.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages
            .data()
            .map(|m| dedupe_messages(&m))
            .unwrap_or_default()
    }

    pub fn message_state(&self) -> Option<QueryState<Vec<ChatMessage>>> {
        self.messages.state()
    }

    pub fn message_key(&self) -> Option<&QueryKey> {
        self.messages.key()
    }

    /// Wait for the conversation list to settle.
    pub async fn conversations_settled(&mut self) -> QueryState<Vec<ChatUser>> {
        self.conversations.settled().await
    }

    /// Wait for the selected conversation to settle.
    pub async fn messages_settled(&mut self) -> Option<QueryState<Vec<ChatMessage>>> {
        match self.messages.subscription_mut() {
            Some(sub) => Some(sub.settled().await),
            None => None,
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    /// Send the trimmed draft to the selected counterparty. Returns
    /// `Ok(false)` when there is nothing to send or no selection; the draft
    /// is cleared only on success.
    pub async fn send(&mut self) -> Result<bool, ApiError> {
        let body = self.draft.trim().to_string();
        let Some(counterparty) = self.selected() else {
            return Ok(false);
        };
        if body.is_empty() {
            return Ok(false);
        }

        self.send.mutate((counterparty, body)).await?;
        self.draft.clear();
        Ok(true)
    }
}

// ============================================================================
// Customer widget
// ============================================================================

pub struct CustomerChatWidget<B: ChatBackend> {
    open: bool,
    admin_id: i64,
    messages: Subscription<Vec<ChatMessage>>,
    send: Mutation<(i64, String), ()>,
    draft: String,
    _backend: Arc<B>,
}

impl<B: ChatBackend> CustomerChatWidget<B> {
    pub fn new(backend: Arc<B>, client: QueryClient, config: &ChatConfig) -> Self {
        let admin_id = config.support_admin_id;
        let fetch_backend = backend.clone();
        let messages = client.subscribe(
            keys::key(keys::USER_CHAT_MESSAGES),
            move || {
                let backend = fetch_backend.clone();
                async move { backend.messages(admin_id).await }
            },
            QueryOptions::new()
                .refetch_every(config.message_poll())
                .enabled(false),
        );
        let send = send_mutation(&backend, &client).invalidates(keys::key(keys::USER_CHAT_MESSAGES));

        Self {
            open: false,
            admin_id,
            messages,
            send,
            draft: String::new(),
            _backend: backend,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
        self.messages.set_enabled(true);
    }

    pub fn minimize(&mut self) {
        self.open = false;
        self.messages.set_enabled(false);
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages
            .data()
            .map(|m| dedupe_messages(&m))
            .unwrap_or_default()
    }

    pub fn message_state(&self) -> QueryState<Vec<ChatMessage>> {
        self.messages.state()
    }

    pub async fn messages_settled(&mut self) -> QueryState<Vec<ChatMessage>> {
        self.messages.settled().await
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    pub async fn send(&mut self) -> Result<bool, ApiError> {
        let body = self.draft.trim().to_string();
        if body.is_empty() {
            return Ok(false);
        }
        self.send.mutate((self.admin_id, body)).await?;
        self.draft.clear();
        Ok(true)
    }
}

// ============================================================================
// TESTS
// ============================================================================
