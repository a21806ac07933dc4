//! Mail sending services.
//!
//! This module holds the send path: message construction, the transport
//! seam over the SMTP client, and the dispatcher tying them to the account
//! registry.

pub mod dispatch;
pub mod message;
pub mod transport;

pub use dispatch::{Delivery, EstablishFailure, Mailer, SendFailure, SendMailRequest};
pub use message::{OutgoingMessage, Recipients};
pub use transport::{Connector, Session, SmtpConnector, SmtpSession};
