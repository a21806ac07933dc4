//! # mailrelay-smtp
//!
//! Async SMTP submission client (RFC 5321) used by `mailrelay` to hand
//! messages to a relay server.
//!
//! ## Features
//!
//! - **Type-state session**: a [`Client`] is `Connected` after the greeting
//!   and becomes `Authenticated` through `Client::<Connected>::login`
//! - **Classified failures**: every step of a session maps to its own
//!   [`Error`] variant (greeting, hello, authentication, sender, recipients,
//!   data), so callers can decide which ones are routine
//! - **TLS support**: implicit TLS (port 465) and STARTTLS
//! - **Authentication**: PLAIN and LOGIN
//! - **Connection knobs**: timeout, EHLO name, local source address, wire
//!   tracing
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailrelay_smtp::{Client, ConnectOptions, Security};
//!
//! #[tokio::main]
//! async fn main() -> mailrelay_smtp::Result<()> {
//!     let opts = ConnectOptions::new("smtp.example.com").security(Security::StartTls);
//!     let client = Client::connect(&opts).await?;
//!     let mut client = client.login("user@example.com", "password").await?;
//!
//!     let message = b"Subject: Test\r\n\r\nHello, World!\r\n";
//!     let report = client
//!         .send_mail("user@example.com", &["friend@example.org".into()], message)
//!         .await?;
//!     assert!(report.refused.is_empty());
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Connection management and type-state client
//! - [`parser`]: Reply parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Authenticated, Client, ConnectOptions, Connected, Security, SendReport, ServerInfo,
    SmtpConnection,
};
pub use error::{Error, RefusedRecipient, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
