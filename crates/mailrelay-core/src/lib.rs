//! # mailrelay-core
//!
//! Core logic for `mailrelay`, a mail-sending component for an event bus.
//!
//! This crate provides:
//! - Account management (named SMTP accounts with a default)
//! - Configuration loading from a `configs/` tree
//! - Message construction (RFC 5322, plain text)
//! - Send orchestration with classified, logged failures
//! - The bus-facing component that ties them together

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod component;
pub mod config;
mod error;
pub mod service;

pub use account::{AccountConfig, AccountRegistry, Security, SourceAddress};
pub use component::{BusEvent, MailComponent, parse_send_mail_args};
pub use config::{ConfigLoader, GlobalConfig};
pub use error::{Error, Result};
pub use service::{
    Connector, Delivery, EstablishFailure, Mailer, OutgoingMessage, Recipients, SendFailure,
    SendMailRequest, Session, SmtpConnector, SmtpSession,
};
