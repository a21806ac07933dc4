//! Server replies.

use std::fmt;

/// One complete server reply, possibly spanning several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit status.
    pub code: ReplyCode,
    /// Text after the code, one entry per line.
    pub message: Vec<String>,
}

impl Reply {
    /// Builds a reply from its code and text lines.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Whether the code is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Reply text with lines joined by `\n`.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }

    /// Every line but the first; for EHLO, the extension keywords.
    pub fn extension_lines(&self) -> impl Iterator<Item = &str> {
        self.message.iter().skip(1).map(String::as_str)
    }
}

/// Reply status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220, greeting.
    pub const SERVICE_READY: Self = Self(220);
    /// 221, reply to QUIT.
    pub const CLOSING: Self = Self(221);
    /// 235, AUTH accepted.
    pub const AUTH_SUCCEEDED: Self = Self(235);
    /// 250, command completed.
    pub const OK: Self = Self(250);
    /// 251, recipient accepted for forwarding.
    pub const FORWARD: Self = Self(251);
    /// 334, AUTH challenge.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354, send the message content.
    pub const START_DATA: Self = Self(354);
    /// 421, server is closing the channel.
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 501, syntax error in parameters.
    pub const SYNTAX_ERROR: Self = Self(501);
    /// 535, credentials rejected.
    pub const AUTH_FAILED: Self = Self(535);
    /// 550, mailbox unavailable.
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
    /// 554, transaction failed.
    pub const TRANSACTION_FAILED: Self = Self(554);

    /// Wraps a raw status.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Raw status.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self.0, 200..=299)
    }

    /// 3xx: the server waits for more input.
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        matches!(self.0, 300..=399)
    }

    /// 4xx: worth retrying later.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self.0, 400..=499)
    }

    /// 5xx: retrying will not help.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(self.0, 500..=599)
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
