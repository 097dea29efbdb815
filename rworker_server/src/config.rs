use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use rocket::{
    config::{CipherSuite, MutualTls, TlsConfig},
    Config,
};
use structopt::StructOpt;
use tokio::fs;
use tracing::error;

use crate::error::ServerError;

/// Run jobs on behalf of clients authenticated with mutual TLS
#[derive(StructOpt, Debug)]
#[structopt(name = "rworker-server")]
pub struct ServerOpt {
    /// address to listen on, e.g. 127.0.0.1:8443
    #[structopt(long, default_value = "127.0.0.1:8443")]
    pub address: SocketAddr,

    /// PEM certificate chain presented to clients
    #[structopt(long, parse(from_os_str))]
    pub server_cert: PathBuf,

    /// PEM private key of the server certificate
    #[structopt(long, parse(from_os_str))]
    pub server_key: PathBuf,

    /// PEM certificates trusted to verify client certificates
    #[structopt(long, parse(from_os_str), required = true, min_values = 1)]
    pub client_certs: Vec<PathBuf>,
}

impl ServerOpt {
    /// rocket config with TLS 1.3 only and mandatory client certificates
    pub async fn rocket_config(&self) -> Result<Config, ServerError> {
        let server_cert = read(&self.server_cert).await?;
        let server_key = read(&self.server_key).await?;
        let client_pool = load_client_pool(&self.client_certs).await?;

        let tls_config = TlsConfig::from_bytes(&server_cert, &server_key)
            .with_ciphers(CipherSuite::TLS_V13_SET)
            .with_mutual(MutualTls::from_bytes(&client_pool).mandatory(true));

        Ok(Config {
            address: self.address.ip(),
            port: self.address.port(),
            tls: Some(tls_config),
            ..Default::default()
        })
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, ServerError> {
    fs::read(path).await.map_err(|source| ServerError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

/// concatenates all PEM files, reporting every unreadable one at once
async fn load_client_pool(paths: &[PathBuf]) -> Result<Vec<u8>, ServerError> {
    let mut pool = Vec::new();
    let mut failures = Vec::new();
    for path in paths {
        match read(path).await {
            Ok(pem) => {
                pool.extend_from_slice(&pem);
                pool.push(b'\n');
            }
            Err(err) => {
                error!("{}", err);
                failures.push(err.to_string());
            }
        }
    }
    if failures.is_empty() {
        Ok(pool)
    } else {
        Err(ServerError::ClientCertificates(failures.join("; ")))
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use structopt::StructOpt;

    use super::{load_client_pool, ServerOpt};
    use crate::error::ServerError;

    fn fixture(name: &str) -> PathBuf {
        [env!("CARGO_MANIFEST_DIR"), "certs", "test", name]
            .iter()
            .collect()
    }

    #[test]
    fn test_parse_flags() {
        let opt = ServerOpt::from_iter(&[
            "rworker-server",
            "--server-cert",
            "server.crt",
            "--server-key",
            "server.key",
            "--client-certs",
            "alice.crt",
            "bob.crt",
        ]);
        assert_eq!("127.0.0.1:8443", opt.address.to_string());
        assert_eq!(PathBuf::from("server.key"), opt.server_key);
        assert_eq!(
            vec![PathBuf::from("alice.crt"), PathBuf::from("bob.crt")],
            opt.client_certs
        );
    }

    #[test]
    fn test_client_certs_required() {
        let result = ServerOpt::from_iter_safe(&[
            "rworker-server",
            "--server-cert",
            "server.crt",
            "--server-key",
            "server.key",
        ]);
        assert!(result.is_err());
    }

    #[rocket::async_test]
    async fn test_client_pool_concatenates_certificates() {
        let pool = load_client_pool(&[fixture("alice.crt"), fixture("bob.crt")])
            .await
            .unwrap();
        let pool = String::from_utf8(pool).unwrap();
        assert_eq!(2, pool.matches("-----BEGIN CERTIFICATE-----").count());
    }

    #[rocket::async_test]
    async fn test_client_pool_reports_all_missing_files() {
        let result =
            load_client_pool(&[fixture("missing0.crt"), fixture("ca.crt"), fixture("missing1.crt")])
                .await;
        match result {
            Err(ServerError::ClientCertificates(msg)) => {
                assert!(msg.contains("missing0.crt"));
                assert!(msg.contains("missing1.crt"));
            }
            other => panic!("expected client certificate error, got: {:?}", other.map(|_| ())),
        }
    }
}
