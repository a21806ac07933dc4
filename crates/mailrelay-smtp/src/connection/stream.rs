//! Low-level SMTP stream handling.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpSocket, TcpStream};
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore},
};

use super::ConnectOptions;
use crate::error::{Error, Result};
use crate::parser::read_reply;
use crate::types::Reply;

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
}

impl SmtpStream {
    /// Opens the TCP connection described by `opts`, wrapping it in TLS for
    /// [`Security::Tls`](super::Security::Tls).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if no resolved address accepts the
    /// connection, [`Error::Timeout`] if the connect takes too long, or a TLS
    /// error if the handshake fails.
    pub async fn open(opts: &ConnectOptions) -> Result<Self> {
        let port = opts.effective_port();
        let tcp = with_timeout(opts.timeout, dial(&opts.host, port, opts.source_address)).await?;

        if opts.security == super::Security::Tls {
            let tls = with_timeout(opts.timeout, wrap_tls(tcp, &opts.host)).await?;
            Ok(Self::Tls(Box::new(BufReader::new(tls))))
        } else {
            Ok(Self::Tcp(BufReader::new(tcp)))
        }
    }

    /// Reads one complete reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the reply is malformed.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        match self {
            Self::Tcp(reader) => read_reply(reader).await,
            Self::Tls(reader) => read_reply(&mut **reader).await,
        }
    }

    /// Writes data to the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Local end of the underlying socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let addr = match self {
            Self::Tcp(reader) => reader.get_ref().local_addr()?,
            Self::Tls(reader) => reader.get_ref().get_ref().0.local_addr()?,
        };
        Ok(addr)
    }

    /// Upgrades a TCP stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        let tcp_stream = match self {
            Self::Tcp(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::Protocol("Already using TLS".into())),
        };

        let tls_stream = wrap_tls(tcp_stream, hostname).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls_stream))))
    }

    /// Shuts down the write half and drops the connection.
    pub async fn shutdown(self) {
        let result = match self {
            Self::Tcp(mut reader) => reader.get_mut().shutdown().await,
            Self::Tls(mut reader) => reader.get_mut().shutdown().await,
        };
        if let Err(e) = result {
            tracing::debug!(?e, "error while closing SMTP connection");
        }
    }
}

/// Runs `fut`, failing with [`Error::Timeout`] when `timeout` is set and elapses.
pub(crate) async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => fut.await,
    }
}

async fn dial(host: &str, port: u16, source: Option<SocketAddr>) -> Result<TcpStream> {
    let connect_error = |source| Error::Connect {
        host: host.to_string(),
        port,
        source,
    };

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(connect_error)?;

    let mut last_error = None;
    for addr in addrs {
        let attempt = match source {
            Some(local) => connect_from(local, addr).await,
            None => TcpStream::connect(addr).await,
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(%addr, ?e, "connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(connect_error(last_error.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "host resolved to no addresses",
        )
    })))
}

async fn connect_from(local: SocketAddr, remote: SocketAddr) -> std::io::Result<TcpStream> {
    let socket = if remote.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.bind(local)?;
    socket.connect(remote).await
}

async fn wrap_tls(
    tcp_stream: TcpStream,
    hostname: &str,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let connector = create_tls_connector();
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Protocol(format!("Invalid hostname: {hostname}")))?;

    Ok(connector.connect(server_name, tcp_stream).await?)
}

/// Creates a TLS connector with the webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
