// Certificate material for the mutually-authenticated TLS connection.
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::{Error, Result};

/// Where the client obtains its TLS identity and the CA pool used to
/// validate the broker. The client core never reads PEM files itself; it
/// only calls this port, so certificate material can equally come from a
/// secret store or be generated on the fly in tests.
pub trait CertSource: Send + Sync {
    /// The certificate chain and private key the client presents to the
    /// broker.
    fn client_key_pair(&self)
    -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>;

    /// The CA pool the broker's certificate must chain to.
    fn ca_pool(&self) -> Result<RootCertStore>;
}

/// [`CertSource`] backed by PEM files on disk: the usual deployment shape,
/// with one file for the CA certificate and one each for the client
/// certificate and its private key.
#[derive(Debug, Clone)]
pub struct PemCertFiles {
    pub ca_cert_file: PathBuf,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl PemCertFiles {
    fn read_certs(what: &'static str, path: &Path) -> Result<Vec<CertificateDer<'static>>> {
        let file = std::fs::File::open(path).map_err(|source| Error::CertRead {
            what,
            path: path.to_path_buf(),
            source,
        })?;

        let certs: std::io::Result<Vec<_>> =
            rustls_pemfile::certs(&mut BufReader::new(file)).collect();
        let certs = certs.map_err(|err| Error::CertParse {
            what,
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        if certs.is_empty() {
            return Err(Error::CertParse {
                what,
                path: path.to_path_buf(),
                reason: "no certificates found".to_string(),
            });
        }

        Ok(certs)
    }
}

impl CertSource for PemCertFiles {
    fn client_key_pair(
        &self,
    ) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
        let certs = Self::read_certs("client certificate", &self.cert_file)?;

        let file = std::fs::File::open(&self.key_file).map_err(|source| Error::CertRead {
            what: "private key",
            path: self.key_file.clone(),
            source,
        })?;
        let key = rustls_pemfile::private_key(&mut BufReader::new(file))
            .map_err(|err| Error::CertParse {
                what: "private key",
                path: self.key_file.clone(),
                reason: err.to_string(),
            })?
            .ok_or_else(|| Error::CertParse {
                what: "private key",
                path: self.key_file.clone(),
                reason: "no private key found".to_string(),
            })?;

        Ok((certs, key))
    }

    fn ca_pool(&self) -> Result<RootCertStore> {
        let certs = Self::read_certs("CA certificate", &self.ca_cert_file)?;

        let mut pool = RootCertStore::empty();
        for cert in certs {
            pool.add(cert).map_err(|err| Error::CertParse {
                what: "CA certificate",
                path: self.ca_cert_file.clone(),
                reason: err.to_string(),
            })?;
        }

        Ok(pool)
    }
}
