use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use arc_swap::ArcSwap;
use snafu::{OptionExt, ResultExt, Snafu};
use tokio_rustls::rustls::{
    crypto::ring::default_provider,
    server::{ClientHello, ResolvesServerCert},
    sign::CertifiedKey,
};

type Result<T, E = CertificateResolverError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum CertificateResolverError {
    #[snafu(display("failed to read certificate file {path:?}"))]
    ReadCertificateFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to read private key file {path:?}"))]
    ReadPrivateKeyFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse PEM encoded certificate chain from {path:?}"))]
    ParseCertificateChain {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("certificate file {path:?} does not contain any certificate"))]
    NoCertificateFound { path: PathBuf },

    #[snafu(display("failed to parse PEM encoded private key from {path:?}"))]
    ParsePrivateKey {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("private key file {path:?} does not contain a private key"))]
    NoPrivateKeyFound { path: PathBuf },

    #[snafu(display("failed to decode CertifiedKey from DER"))]
    DecodeCertifiedKeyFromDer { source: tokio_rustls::rustls::Error },
}

/// This struct serves as [`ResolvesServerCert`] to always hand out the current certificate for TLS
/// client connections.
///
/// The certificate and private key are read from files which are usually mounted from a Secret.
/// It offers the [`Self::reload_certificate`] function to re-read both files and hot-reload the
/// certificate in the running webhook, so that rotated certificates are picked up without a
/// restart.
#[derive(Debug)]
pub struct CertificateResolver {
    /// Using a [`ArcSwap`] (over e.g. [`tokio::sync::RwLock`]), so that we can easily
    /// (and performant) bridge between async write and sync read.
    current_certified_key: ArcSwap<CertifiedKey>,

    cert_path: PathBuf,
    key_path: PathBuf,
}

impl CertificateResolver {
    pub async fn new(cert_path: PathBuf, key_path: PathBuf) -> Result<Self> {
        let certified_key = Self::load_certified_key(&cert_path, &key_path).await?;

        Ok(Self {
            current_certified_key: ArcSwap::new(certified_key),
            cert_path,
            key_path,
        })
    }

    /// Re-reads the certificate and private key files and swaps in the new [`CertifiedKey`].
    ///
    /// On error the currently used certificate stays in place.
    pub async fn reload_certificate(&self) -> Result<()> {
        let certified_key = Self::load_certified_key(&self.cert_path, &self.key_path).await?;
        self.current_certified_key.store(certified_key);

        tracing::debug!(
            cert.path = %self.cert_path.display(),
            "reloaded webhook serving certificate"
        );

        Ok(())
    }

    async fn load_certified_key(cert_path: &Path, key_path: &Path) -> Result<Arc<CertifiedKey>> {
        let cert_pem = tokio::fs::read(cert_path)
            .await
            .context(ReadCertificateFileSnafu { path: cert_path })?;
        let key_pem = tokio::fs::read(key_path)
            .await
            .context(ReadPrivateKeyFileSnafu { path: key_path })?;

        let cert_chain = rustls_pemfile::certs(&mut cert_pem.as_slice())
            .collect::<Result<Vec<_>, _>>()
            .context(ParseCertificateChainSnafu { path: cert_path })?;
        if cert_chain.is_empty() {
            return NoCertificateFoundSnafu { path: cert_path }.fail();
        }

        let private_key = rustls_pemfile::private_key(&mut key_pem.as_slice())
            .context(ParsePrivateKeySnafu { path: key_path })?
            .context(NoPrivateKeyFoundSnafu { path: key_path })?;

        let certified_key = CertifiedKey::from_der(cert_chain, private_key, &default_provider())
            .context(DecodeCertifiedKeyFromDerSnafu)?;

        Ok(Arc::new(certified_key))
    }
}

impl ResolvesServerCert for CertificateResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.current_certified_key.load_full())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    struct CertFiles {
        dir: TempDir,
        der: Vec<u8>,
    }

    impl CertFiles {
        fn cert_path(&self) -> PathBuf {
            self.dir.path().join("tls.crt")
        }

        fn key_path(&self) -> PathBuf {
            self.dir.path().join("tls.key")
        }

        fn rotate(&mut self) {
            self.der = write_self_signed(self.dir.path());
        }
    }

    fn write_self_signed(dir: &Path) -> Vec<u8> {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_owned()])
                .expect("self-signed certificate generation must succeed");

        fs::write(dir.join("tls.crt"), cert.pem()).expect("write certificate");
        fs::write(dir.join("tls.key"), key_pair.serialize_pem()).expect("write private key");

        cert.der().to_vec()
    }

    fn cert_files() -> CertFiles {
        let dir = tempfile::tempdir().expect("create temporary directory");
        let der = write_self_signed(dir.path());
        CertFiles { dir, der }
    }

    fn current_der(resolver: &CertificateResolver) -> Vec<u8> {
        resolver.current_certified_key.load().cert[0].to_vec()
    }

    #[tokio::test]
    async fn loads_mounted_certificate() {
        let files = cert_files();

        let resolver = CertificateResolver::new(files.cert_path(), files.key_path())
            .await
            .expect("valid certificate files must load");

        assert_eq!(current_der(&resolver), files.der);
    }

    #[tokio::test]
    async fn reload_picks_up_rotated_certificate() {
        let mut files = cert_files();
        let resolver = CertificateResolver::new(files.cert_path(), files.key_path())
            .await
            .expect("valid certificate files must load");
        let initial = current_der(&resolver);

        files.rotate();
        resolver
            .reload_certificate()
            .await
            .expect("rotated certificate files must load");

        assert_ne!(current_der(&resolver), initial);
        assert_eq!(current_der(&resolver), files.der);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_certificate() {
        let files = cert_files();
        let resolver = CertificateResolver::new(files.cert_path(), files.key_path())
            .await
            .expect("valid certificate files must load");

        fs::write(files.key_path(), "").expect("truncate private key");
        let err = resolver
            .reload_certificate()
            .await
            .expect_err("empty private key must be rejected");

        assert!(matches!(err, CertificateResolverError::NoPrivateKeyFound { .. }));
        assert_eq!(current_der(&resolver), files.der);
    }

    #[tokio::test]
    async fn missing_certificate_file() {
        let dir = tempfile::tempdir().expect("create temporary directory");

        let err = CertificateResolver::new(dir.path().join("tls.crt"), dir.path().join("tls.key"))
            .await
            .expect_err("missing files must be rejected");

        assert!(matches!(
            err,
            CertificateResolverError::ReadCertificateFile { .. }
        ));
    }

    #[tokio::test]
    async fn certificate_file_without_certificate() {
        let files = cert_files();
        fs::write(files.cert_path(), "not a certificate\n").expect("overwrite certificate");

        let err = CertificateResolver::new(files.cert_path(), files.key_path())
            .await
            .expect_err("file without PEM blocks must be rejected");

        assert!(matches!(
            err,
            CertificateResolverError::NoCertificateFound { .. }
        ));
    }
}
