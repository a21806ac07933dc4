//! Outgoing message construction.

use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountConfig;

/// Body line length before base64 output is wrapped.
const BASE64_LINE_LEN: usize = 76;

/// Recipients of a send request: one string, or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    /// A single address, or several separated by commas.
    One(String),
    /// Addresses taken as given.
    Many(Vec<String>),
}

impl Recipients {
    /// Returns the recipient list.
    ///
    /// A single string containing commas has all whitespace removed and is
    /// split on the commas. Any other string becomes a one-element list, and
    /// a list passes through unchanged.
    #[must_use]
    pub fn normalize(&self) -> Vec<String> {
        match self {
            Self::One(to) if to.contains(',') => {
                let compact: String = to.chars().filter(|c| !c.is_whitespace()).collect();
                compact.split(',').map(str::to_string).collect()
            }
            Self::One(to) => vec![to.clone()],
            Self::Many(to) => to.clone(),
        }
    }
}

impl Default for Recipients {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl From<&str> for Recipients {
    fn from(to: &str) -> Self {
        Self::One(to.to_string())
    }
}

impl From<Vec<String>> for Recipients {
    fn from(to: Vec<String>) -> Self {
        Self::Many(to)
    }
}

/// A plain-text message ready to be rendered for DATA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Sender address.
    pub from: String,
    /// Sender display name.
    pub from_name: Option<String>,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
    /// Value of the `Date` header; the render time when unset.
    pub date: Option<DateTime<Utc>>,
}

impl OutgoingMessage {
    /// Creates a new outgoing message.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            from_name: None,
            to: Vec::new(),
            subject: subject.into(),
            body: body.into(),
            date: None,
        }
    }

    /// Creates a message whose sender comes from `account`.
    #[must_use]
    pub fn from_account(
        account: &AccountConfig,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let mut message = Self::new(account.from_address(), subject, body);
        message.from_name.clone_from(&account.display_name);
        message
    }

    /// Sets the display name.
    #[must_use]
    pub fn from_name(mut self, name: impl Into<String>) -> Self {
        self.from_name = Some(name.into());
        self
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Replaces the recipient list.
    #[must_use]
    pub fn recipients(mut self, to: Vec<String>) -> Self {
        self.to = to;
        self
    }

    /// Fixes the `Date` header.
    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Value of the `From` header.
    #[must_use]
    pub fn from_header(&self) -> String {
        match &self.from_name {
            Some(name) => format!("{} <{}>", encode_word(name), self.from),
            None => self.from.clone(),
        }
    }

    /// Renders the message in RFC 5322 format with CRLF line endings.
    #[must_use]
    pub fn to_rfc5322(&self) -> String {
        let date = self.date.unwrap_or_else(Utc::now);
        let ascii = self.body.is_ascii();

        let mut message = String::new();
        let _ = write!(message, "Subject: {}\r\n", encode_word(&self.subject));
        let _ = write!(message, "From: {}\r\n", self.from_header());
        let _ = write!(message, "To: {}\r\n", self.to.join(", "));
        let _ = write!(message, "Date: {}\r\n", date.to_rfc2822());
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        let _ = write!(
            message,
            "Content-Transfer-Encoding: {}\r\n",
            if ascii { "7bit" } else { "base64" }
        );
        message.push_str("\r\n");

        let body = normalize_line_endings(&self.body);
        if ascii {
            message.push_str(&body);
            if !body.is_empty() && !body.ends_with("\r\n") {
                message.push_str("\r\n");
            }
        } else {
            let encoded = STANDARD.encode(body.as_bytes());
            for chunk in encoded.as_bytes().chunks(BASE64_LINE_LEN) {
                // base64 output is ASCII
                message.push_str(&String::from_utf8_lossy(chunk));
                message.push_str("\r\n");
            }
        }

        message
    }
}

/// Encodes a header value as an RFC 2047 encoded word when it is not plain
/// ASCII.
fn encode_word(text: &str) -> String {
    if text.is_ascii() && !text.contains(['\r', '\n']) {
        text.to_string()
    } else {
        format!("=?utf-8?b?{}?=", STANDARD.encode(text.as_bytes()))
    }
}

fn normalize_line_endings(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut lines = text.split('\n').peekable();
    while let Some(line) = lines.next() {
        out.push_str(line.strip_suffix('\r').unwrap_or(line));
        if lines.peek().is_some() {
            out.push_str("\r\n");
        }
    }
    out
}
