//! Contains available options to configure the [WebhookServer][crate::WebhookServer].
use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
};

use crate::constants::{
    DEFAULT_CERT_DIR, DEFAULT_CERT_NAME, DEFAULT_KEY_NAME, DEFAULT_SOCKET_ADDRESS,
};

/// Specifies available webhook server options.
///
/// The [`Default`] implementation for this struct contains the following values:
///
/// - The socket binds to 0.0.0.0 on port 9443 (HTTPS)
/// - The serving certificate is read from `/tmp/k8s-webhook-server/serving-certs/tls.crt`
/// - The private key is read from `/tmp/k8s-webhook-server/serving-certs/tls.key`
///
/// ### Example with Custom HTTPS IP Address and Port
///
/// ```
/// use serving_webhook::WebhookServerOptions;
///
/// // Set IP address and port at the same time
/// let options = WebhookServerOptions::builder()
///     .bind_address([0, 0, 0, 0], 12345)
///     .build();
///
/// // Set IP address only
/// let options = WebhookServerOptions::builder()
///     .bind_ip([0, 0, 0, 0])
///     .build();
///
/// // Set port only
/// let options = WebhookServerOptions::builder()
///     .bind_port(12345)
///     .build();
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookServerOptions {
    /// The HTTPS socket address the [`TcpListener`][tokio::net::TcpListener] binds to.
    pub socket_addr: SocketAddr,

    /// The directory containing the mounted serving certificate and private key.
    pub cert_dir: PathBuf,

    /// File name of the PEM certificate chain inside [`Self::cert_dir`].
    pub cert_name: String,

    /// File name of the PEM private key inside [`Self::cert_dir`].
    pub key_name: String,
}

impl Default for WebhookServerOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl WebhookServerOptions {
    /// Returns the default [`WebhookServerOptionsBuilder`] which allows to selectively
    /// customize the options. See the documentation for [`WebhookServerOptions`] for more
    /// information on available functions.
    pub fn builder() -> WebhookServerOptionsBuilder {
        WebhookServerOptionsBuilder::default()
    }

    /// The full path of the certificate chain file.
    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir.join(&self.cert_name)
    }

    /// The full path of the private key file.
    pub fn key_path(&self) -> PathBuf {
        self.cert_dir.join(&self.key_name)
    }
}

/// The [`WebhookServerOptionsBuilder`] which allows to selectively customize the webhook
/// server [`WebhookServerOptions`].
///
/// Usually, this struct is not constructed manually, but instead by calling
/// [`WebhookServerOptions::builder()`] or [`WebhookServerOptionsBuilder::default()`].
#[derive(Debug, Default)]
pub struct WebhookServerOptionsBuilder {
    socket_addr: Option<SocketAddr>,
    cert_dir: Option<PathBuf>,
    cert_name: Option<String>,
    key_name: Option<String>,
}

impl WebhookServerOptionsBuilder {
    /// Sets the socket address the webhook server uses to bind for HTTPS.
    pub fn bind_address(mut self, bind_ip: impl Into<IpAddr>, bind_port: u16) -> Self {
        self.socket_addr = Some(SocketAddr::new(bind_ip.into(), bind_port));
        self
    }

    /// Sets the complete socket address at once.
    pub fn socket_addr(mut self, socket_addr: impl Into<SocketAddr>) -> Self {
        self.socket_addr = Some(socket_addr.into());
        self
    }

    /// Sets the IP address of the socket address the webhook server uses to
    /// bind for HTTPS.
    pub fn bind_ip(mut self, bind_ip: impl Into<IpAddr>) -> Self {
        let addr = self.socket_addr.get_or_insert(DEFAULT_SOCKET_ADDRESS);
        addr.set_ip(bind_ip.into());
        self
    }

    /// Sets the port of the socket address the webhook server uses to bind
    /// for HTTPS.
    pub fn bind_port(mut self, bind_port: u16) -> Self {
        let addr = self.socket_addr.get_or_insert(DEFAULT_SOCKET_ADDRESS);
        addr.set_port(bind_port);
        self
    }

    /// Sets the directory the serving certificate and key are mounted into.
    pub fn cert_dir(mut self, cert_dir: impl AsRef<Path>) -> Self {
        self.cert_dir = Some(cert_dir.as_ref().to_path_buf());
        self
    }

    /// Overrides the file name of the certificate chain.
    pub fn cert_name(mut self, cert_name: impl Into<String>) -> Self {
        self.cert_name = Some(cert_name.into());
        self
    }

    /// Overrides the file name of the private key.
    pub fn key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }

    /// Builds the final [`WebhookServerOptions`] by using default values for any not
    /// explicitly set option.
    pub fn build(self) -> WebhookServerOptions {
        WebhookServerOptions {
            socket_addr: self.socket_addr.unwrap_or(DEFAULT_SOCKET_ADDRESS),
            cert_dir: self
                .cert_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CERT_DIR)),
            cert_name: self
                .cert_name
                .unwrap_or_else(|| DEFAULT_CERT_NAME.to_owned()),
            key_name: self.key_name.unwrap_or_else(|| DEFAULT_KEY_NAME.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn defaults() {
        let options = WebhookServerOptions::default();

        assert_eq!(options.socket_addr, DEFAULT_SOCKET_ADDRESS);
        assert_eq!(
            options.cert_path(),
            PathBuf::from("/tmp/k8s-webhook-server/serving-certs/tls.crt")
        );
        assert_eq!(
            options.key_path(),
            PathBuf::from("/tmp/k8s-webhook-server/serving-certs/tls.key")
        );
    }

    #[test]
    fn bind_port_keeps_default_ip() {
        let options = WebhookServerOptions::builder().bind_port(8443).build();

        assert_eq!(options.socket_addr.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(options.socket_addr.port(), 8443);
    }

    #[test]
    fn custom_cert_location() {
        let options = WebhookServerOptions::builder()
            .cert_dir("/etc/webhook/certs")
            .cert_name("cert.pem")
            .key_name("key.pem")
            .build();

        assert_eq!(options.cert_path(), PathBuf::from("/etc/webhook/certs/cert.pem"));
        assert_eq!(options.key_path(), PathBuf::from("/etc/webhook/certs/key.pem"));
    }
}
