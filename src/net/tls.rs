//! TLS configuration and certificate loading.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

use crate::errors::ServerError;

/// Load a rustls server configuration from PEM certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, ServerError> {
    if !cert_path.exists() {
        return Err(ServerError::Tls(format!(
            "certificate file not found: {}",
            cert_path.display()
        )));
    }
    if !key_path.exists() {
        return Err(ServerError::Tls(format!(
            "private key file not found: {}",
            key_path.display()
        )));
    }

    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| ServerError::Tls(e.to_string()))
}

/// Resolve a `host:port` string into a socket address.
pub fn parse_listen_addr(addr: &str) -> Result<std::net::SocketAddr, ServerError> {
    let candidate = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    candidate
        .parse()
        .map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
            addr: addr.to_string(),
            reason: e.to_string(),
        })
}
