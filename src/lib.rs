// Library interface for scout402
// The binary and the tests import the modules from here

pub mod chain;
pub mod cli;
pub mod config;
pub mod llm;
pub mod logging;
pub mod mcp;
pub mod news;
pub mod pipeline;
pub mod report;
pub mod x402;

/// Install rustls-rustcrypto as the process crypto provider
///
/// reqwest is built without a bundled provider, so this must run before any
/// client is constructed. Repeated calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::CryptoProvider::install_default(rustls_rustcrypto::provider());
}

/// A plain reqwest client with the crypto provider in place
pub fn http_client() -> reqwest::Client {
    install_crypto_provider();
    reqwest::Client::new()
}
