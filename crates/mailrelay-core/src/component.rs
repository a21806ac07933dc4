//! Bus-facing lifecycle wrapper around the mailer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::account::AccountRegistry;
use crate::config::ConfigLoader;
use crate::service::{Connector, Mailer, Recipients, SendMailRequest, SmtpConnector};
use crate::{Error, Result};

/// Channel the component is registered on.
pub const CHANNEL: &str = "mail";

/// Name of the event this component handles.
pub const SEND_MAIL: &str = "send_mail";

/// An event as delivered by the dispatch layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    /// Channel the event was fired on; every channel is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Event name.
    pub name: String,
    /// Event arguments, as an object or positionally.
    #[serde(default)]
    pub args: Value,
}

impl BusEvent {
    /// Creates a `send_mail` event.
    #[must_use]
    pub fn send_mail(request: &SendMailRequest) -> Self {
        Self {
            channel: Some(CHANNEL.to_string()),
            name: SEND_MAIL.to_string(),
            args: serde_json::to_value(request).unwrap_or_default(),
        }
    }
}

/// Parses `send_mail` arguments.
///
/// Accepts `{"subject", "to", "msg", "account"}` or the positional form
/// `[subject, to, msg]` / `[subject, to, msg, account]`.
///
/// # Errors
///
/// Returns [`Error::Config`] when the arguments have another shape.
pub fn parse_send_mail_args(args: Value) -> Result<SendMailRequest> {
    let invalid = |e: serde_json::Error| Error::Config(format!("invalid send_mail arguments: {e}"));
    match args {
        Value::Array(items) if (3..=4).contains(&items.len()) => {
            let mut items = items.into_iter();
            let mut next = || items.next().unwrap_or_default();
            Ok(SendMailRequest {
                subject: serde_json::from_value(next()).map_err(invalid)?,
                to: serde_json::from_value::<Recipients>(next()).map_err(invalid)?,
                body: serde_json::from_value(next()).map_err(invalid)?,
                account: match next() {
                    Value::Null => String::new(),
                    account => serde_json::from_value(account).map_err(invalid)?,
                },
            })
        }
        Value::Object(_) => serde_json::from_value(args).map_err(invalid),
        other => Err(Error::Config(format!(
            "invalid send_mail arguments: expected object or 3-4 element array, got {other}"
        ))),
    }
}

/// Owns the mailer for the lifetime of the host.
///
/// [`started`](Self::started) loads the configuration once; afterwards each
/// `send_mail` event runs on its own task.
#[derive(Debug)]
pub struct MailComponent<C = SmtpConnector> {
    loader: ConfigLoader,
    connector: C,
    mailer: Option<Arc<Mailer<C>>>,
    tasks: JoinSet<()>,
}

impl MailComponent {
    /// Creates a component speaking SMTP.
    #[must_use]
    pub fn new(loader: ConfigLoader) -> Self {
        Self::with_connector(loader, SmtpConnector)
    }
}

impl<C> MailComponent<C>
where
    C: Connector + Clone + 'static,
{
    /// Creates a component using `connector` for sessions.
    #[must_use]
    pub fn with_connector(loader: ConfigLoader, connector: C) -> Self {
        Self {
            loader,
            connector,
            mailer: None,
            tasks: JoinSet::new(),
        }
    }

    /// Loads the configuration and readies the mailer.
    ///
    /// Returns the number of accounts loaded.
    ///
    /// # Errors
    ///
    /// Returns the loader's error; the component then stays unstarted.
    pub fn started(&mut self) -> Result<usize> {
        let mut registry = AccountRegistry::new();
        let loaded = self.loader.load_configuration(&mut registry)?;
        self.mailer = Some(Arc::new(Mailer::new(
            Arc::new(registry),
            self.connector.clone(),
        )));
        Ok(loaded)
    }

    /// The mailer, once started.
    #[must_use]
    pub fn mailer(&self) -> Option<&Mailer<C>> {
        self.mailer.as_deref()
    }

    /// Handles one bus event.
    ///
    /// `send_mail` events are spawned onto their own task; any other event
    /// is ignored. Returns whether a send was started.
    pub fn handle_event(&mut self, event: BusEvent) -> bool {
        if event.name != SEND_MAIL {
            debug!(name = %event.name, "ignoring event");
            return false;
        }
        let Some(mailer) = self.mailer.clone() else {
            warn!("send_mail received before the component started");
            return false;
        };
        let request = match parse_send_mail_args(event.args) {
            Ok(request) => request,
            Err(e) => {
                error!("{e}");
                return false;
            }
        };

        let span = info_span!("send_mail", account = %request.account);
        self.tasks.spawn(
            async move {
                if let Err(e) = mailer.send_mail(&request).await {
                    error!("unhandled error in send_mail handler: {e}");
                }
            }
            .instrument(span),
        );
        true
    }

    /// Feeds events from `events` until the channel closes, then waits for
    /// in-flight sends.
    pub async fn run(&mut self, mut events: mpsc::Receiver<BusEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
            // Reap finished sends
            while self.tasks.try_join_next().is_some() {}
        }
        self.shutdown().await;
    }

    /// Waits for every in-flight send to finish.
    pub async fn shutdown(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!("send_mail task failed: {e}");
            }
        }
    }
}
