//! parcel — command-line front-end for the parcel forwarding API
//!
//! Drives the same session, query and mutation layers a UI would. Tokens are
//! kept in the session file so consecutive invocations stay logged in.
//!
//! # Subcommands
//! - `login` / `admin-login` / `logout [--admin]` / `verify [--admin]`
//! - `packages [--method]`, `shipments [--method]`, `addresses`, `notifications`
//! - `stats`, `clients [--search]` (admin)
//! - `chat [--user ID]`: poll a conversation and print new messages until Ctrl+C
//! - `send [--user ID] <message>`

use clap::{Parser, Subcommand};
use parcel_core::models::{Address, ChatMessage, Client, Credentials, Notification, Package, SenderRole};
use parcel_core::{
    AdminChat, AdminChatWidget, CustomerChat, CustomerChatWidget, ParcelConfig, ParcelContext,
    SessionScope,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_CONFIG: &str = "parcel.toml";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "parcel", version, about = "Parcel forwarding client")]
struct Cli {
    /// Config file (TOML); missing files fall back to defaults
    #[arg(long, env = "PARCEL_CONFIG", default_value = DEFAULT_CONFIG)]
    config: String,

    /// Print raw JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Log in as a customer
    Login {
        #[arg(long, env = "PARCEL_EMAIL")]
        email: String,
        #[arg(long, env = "PARCEL_PASSWORD")]
        password: String,
    },

    /// Log in as an administrator
    AdminLogin {
        #[arg(long, env = "PARCEL_ADMIN_EMAIL")]
        email: String,
        #[arg(long, env = "PARCEL_ADMIN_PASSWORD")]
        password: String,
    },

    /// End the session on the server and forget the stored token
    Logout {
        #[arg(long)]
        admin: bool,
    },

    /// Check the stored token against the server
    Verify {
        #[arg(long)]
        admin: bool,
    },

    /// Packages in the warehouse
    Packages {
        /// Shipping method filter (air, sea, land)
        #[arg(long)]
        method: Option<String>,
    },

    /// Shipments in transit
    Shipments {
        #[arg(long)]
        method: Option<String>,
    },

    /// Saved delivery addresses
    Addresses,

    /// Customer notifications
    Notifications,

    /// Admin dashboard summary
    Stats,

    /// Admin client list
    Clients {
        #[arg(long)]
        search: Option<String>,
    },

    /// Follow a conversation; `--user` switches to the admin side
    Chat {
        #[arg(long)]
        user: Option<i64>,
    },

    /// Send one chat message; `--user` sends as admin to that customer
    Send {
        #[arg(long)]
        user: Option<i64>,
        message: String,
    },
}

// ============================================================================
// Formatting
// ============================================================================

fn or_dash(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => "-",
    }
}

pub fn format_package(p: &Package) -> String {
    format!(
        "#{:<6} {:<18} {:<14} {:<6} {:>8} {}",
        p.id,
        or_dash(p.tracking_number.as_deref()),
        or_dash(p.status.as_deref()),
        or_dash(p.shipping_method.as_deref()),
        p.weight.map(|w| format!("{:.2}kg", w)).unwrap_or_else(|| "-".to_string()),
        or_dash(p.description.as_deref()),
    )
}

pub fn format_address(a: &Address) -> String {
    let mut line = format!("#{:<4} {}: {}, {}, {}", a.id, a.name, a.street, a.city, a.country);
    if a.is_default {
        line.push_str(" (default)");
    }
    line
}

pub fn format_notification(n: &Notification) -> String {
    let marker = if n.is_read { " " } else { "*" };
    let when = n
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    format!("{} #{:<5} {:<16} {}", marker, n.id, when, n.message)
}

pub fn format_client(c: &Client) -> String {
    format!(
        "#{:<5} {:<24} {:<28} {:<10} {}",
        c.id,
        c.name,
        c.email,
        or_dash(c.suite_number.as_deref()),
        c.total_packages.unwrap_or(0)
    )
}

pub fn format_message(m: &ChatMessage) -> String {
    let who = match m.sender {
        SenderRole::Admin if m.sender_name.is_empty() => "Support",
        SenderRole::User if m.sender_name.is_empty() => "Customer",
        _ => m.sender_name.as_str(),
    };
    format!("[{}] {}: {}", m.created_at.format("%H:%M:%S"), who, m.body)
}

fn print_rows<T: Serialize>(rows: &[T], json: bool, empty: &str, line: fn(&T) -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else if rows.is_empty() {
        eprintln!("{}", empty);
    } else {
        for row in rows {
            println!("{}", line(row));
        }
    }
    Ok(())
}

fn scope(admin: bool) -> SessionScope {
    if admin {
        SessionScope::Admin
    } else {
        SessionScope::Customer
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn do_login(ctx: &ParcelContext, scope: SessionScope, email: String, password: String) -> anyhow::Result<()> {
    let credentials = Credentials { email, password };
    let envelope = match scope {
        SessionScope::Customer => ctx.api.login(&credentials).await?,
        SessionScope::Admin => ctx.api.admin_login(&credentials).await?,
    };
    let name = envelope.data.user["name"].as_str().unwrap_or("user");
    println!("Logged in as {} ({})", name, scope.name());
    Ok(())
}

async fn do_verify(ctx: &ParcelContext, scope: SessionScope, json: bool) -> anyhow::Result<()> {
    let guard = parcel_core::RouteGuard::new(ctx.api.clone(), scope);
    match guard.check().await {
        parcel_core::GuardState::Authorized { user } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&user)?);
            } else {
                let name = user
                    .as_ref()
                    .and_then(|u| u["name"].as_str())
                    .unwrap_or("unknown");
                println!("Session valid: {} ({})", name, scope.name());
            }
            Ok(())
        }
        state => {
            let reason = state
                .notice()
                .map(|n| n.title)
                .unwrap_or_else(|| "Not logged in".to_string());
            let command = match scope {
                SessionScope::Customer => "login",
                SessionScope::Admin => "admin-login",
            };
            anyhow::bail!("{}, run `parcel {}`", reason, command)
        }
    }
}

async fn do_stats(ctx: &ParcelContext, json: bool) -> anyhow::Result<()> {
    let stats = ctx.api.admin_stats().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Clients:          {}", stats.total_clients);
        println!("Active shipments: {}", stats.active_shipments);
        println!("Revenue:          ${:.2}", stats.total_revenue);
    }
    Ok(())
}

fn print_new(messages: Vec<ChatMessage>, seen: &mut HashSet<i64>) {
    for message in messages {
        if seen.insert(message.id) {
            println!("{}", format_message(&message));
        }
    }
}

/// Poll until Ctrl+C, printing each message once.
async fn do_chat(ctx: &ParcelContext, user: Option<i64>) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    let mut tick = tokio::time::interval(ctx.config.chat.message_poll());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    match user {
        Some(user_id) => {
            let backend = Arc::new(AdminChat::new(ctx.api.clone()));
            let mut widget = AdminChatWidget::new(backend, ctx.queries.clone(), &ctx.config.chat);
            widget.open();
            widget.select(user_id);
            if let Some(state) = widget.messages_settled().await {
                if let Some(e) = state.error {
                    anyhow::bail!("{}", e.user_message("Failed to load messages"));
                }
            }
            eprintln!("Chatting with client #{}; Ctrl+C to stop", user_id);
            loop {
                tokio::select! {
                    _ = &mut ctrl_c => break,
                    _ = tick.tick() => print_new(widget.messages(), &mut seen),
                }
            }
            widget.minimize();
        }
        None => {
            let backend = Arc::new(CustomerChat::new(ctx.api.clone()));
            let mut widget = CustomerChatWidget::new(backend, ctx.queries.clone(), &ctx.config.chat);
            widget.open();
            if let Some(e) = widget.messages_settled().await.error {
                anyhow::bail!("{}", e.user_message("Failed to load messages"));
            }
            eprintln!("Chatting with support; Ctrl+C to stop");
            loop {
                tokio::select! {
                    _ = &mut ctrl_c => break,
                    _ = tick.tick() => print_new(widget.messages(), &mut seen),
                }
            }
            widget.minimize();
        }
    }
    Ok(())
}

async fn do_send(ctx: &ParcelContext, user: Option<i64>, message: &str) -> anyhow::Result<()> {
    let body = message.trim();
    if body.is_empty() {
        anyhow::bail!("Message is empty");
    }
    match user {
        Some(user_id) => ctx.api.send_admin_chat_message(user_id, body).await?,
        None => ctx.api.send_chat_message(body).await?,
    };
    println!("Sent");
    Ok(())
}

async fn run(cli: Cli, ctx: ParcelContext) -> anyhow::Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Login { email, password } => do_login(&ctx, SessionScope::Customer, email, password).await,
        Commands::AdminLogin { email, password } => do_login(&ctx, SessionScope::Admin, email, password).await,
        Commands::Logout { admin } => {
            ctx.api.logout(scope(admin)).await?;
            println!("Logged out");
            Ok(())
        }
        Commands::Verify { admin } => do_verify(&ctx, scope(admin), json).await,
        Commands::Packages { method } => {
            let rows = ctx.api.packages(method.as_deref()).await?;
            print_rows(&rows, json, "No packages", format_package)
        }
        Commands::Shipments { method } => {
            let rows = ctx.api.shipments(method.as_deref()).await?;
            print_rows(&rows, json, "No shipments", format_package)
        }
        Commands::Addresses => {
            let rows = ctx.api.addresses().await?;
            print_rows(&rows, json, "No addresses", format_address)
        }
        Commands::Notifications => {
            let rows = ctx.api.notifications().await?;
            print_rows(&rows, json, "No notifications", format_notification)
        }
        Commands::Stats => do_stats(&ctx, json).await,
        Commands::Clients { search } => {
            let rows = ctx.api.admin_clients(search.as_deref()).await?;
            print_rows(&rows, json, "No clients", format_client)
        }
        Commands::Chat { user } => do_chat(&ctx, user).await,
        Commands::Send { user, message } => do_send(&ctx, user, &message).await,
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match ParcelConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("parcel: failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    tracing::debug!(config = %cli.config, api = %config.api.base_url, "Configuration loaded");

    let ctx = match ParcelContext::from_config(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("parcel: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, ctx).await {
        eprintln!("parcel: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
