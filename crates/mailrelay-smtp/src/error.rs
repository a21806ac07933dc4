//! Error types for SMTP operations.

use std::io;
use std::time::Duration;

use crate::types::Reply;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A recipient the server refused during `RCPT TO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefusedRecipient {
    /// The recipient address as given to the client.
    pub address: String,
    /// The server's reply to the `RCPT TO` command.
    pub reply: Reply,
}

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// TCP connection to the server could not be established.
    #[error("could not connect to {host}:{port}: {source}")]
    Connect {
        /// Server hostname.
        host: String,
        /// Server port.
        port: u16,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// Connect or command did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Server greeting was not a 220 reply.
    #[error("unexpected greeting {}: {}", .0.code, .0.message_text())]
    Greeting(Reply),

    /// Server did not accept EHLO nor HELO.
    #[error("({}, {})", .0.code, .0.message_text())]
    Hello(Reply),

    /// Server rejected the credentials.
    #[error("({}, {})", .0.code, .0.message_text())]
    Authentication(Reply),

    /// Server rejected the envelope sender.
    #[error("({}, {}, {sender})", .reply.code, .reply.message_text())]
    SenderRefused {
        /// Envelope sender that was refused.
        sender: String,
        /// Server reply to `MAIL FROM`.
        reply: Reply,
    },

    /// Server refused every recipient; nothing was sent.
    #[error("{}", format_refused(.0))]
    RecipientsRefused(Vec<RefusedRecipient>),

    /// Server rejected `DATA` or the message content.
    #[error("({}, {})", .0.code, .0.message_text())]
    Data(Reply),

    /// Server returned an error reply outside a classified step.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Server closed the connection.
    #[error("connection unexpectedly closed")]
    Disconnected,

    /// Protocol error (unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),
}

impl Error {
    /// Creates an SMTP error from a reply.
    #[must_use]
    pub fn from_reply(reply: &Reply) -> Self {
        Self::SmtpError {
            code: reply.code.as_u16(),
            message: reply.message_text(),
        }
    }

    /// Returns the server reply code carried by this error, if any.
    #[must_use]
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Greeting(reply)
            | Self::Hello(reply)
            | Self::Authentication(reply)
            | Self::Data(reply)
            | Self::SenderRefused { reply, .. } => Some(reply.code.as_u16()),
            Self::SmtpError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.reply_code().is_some_and(|code| (500..600).contains(&code))
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.reply_code().is_some_and(|code| (400..500).contains(&code))
    }
}

fn format_refused(refused: &[RefusedRecipient]) -> String {
    let parts: Vec<String> = refused
        .iter()
        .map(|r| format!("'{}': ({}, {})", r.address, r.reply.code, r.reply.message_text()))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ReplyCode;

    fn reply(code: u16, text: &str) -> Reply {
        Reply::new(ReplyCode::new(code), vec![text.to_string()])
    }

    #[test]
    fn permanent_and_transient() {
        assert!(Error::Data(reply(554, "rejected")).is_permanent());
        assert!(Error::Hello(reply(421, "busy")).is_transient());
        assert!(!Error::Disconnected.is_permanent());
        assert!(!Error::Disconnected.is_transient());
    }

    #[test]
    fn refused_display_lists_every_recipient() {
        let err = Error::RecipientsRefused(vec![
            RefusedRecipient {
                address: "a@x.com".into(),
                reply: reply(550, "no such user"),
            },
            RefusedRecipient {
                address: "b@y.com".into(),
                reply: reply(551, "not local"),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "{'a@x.com': (550, no such user), 'b@y.com': (551, not local)}"
        );
    }

    #[test]
    fn sender_refused_display() {
        let err = Error::SenderRefused {
            sender: "me@x.com".into(),
            reply: reply(553, "not allowed"),
        };
        assert_eq!(err.to_string(), "(553, not allowed, me@x.com)");
        assert_eq!(err.reply_code(), Some(553));
    }
}
