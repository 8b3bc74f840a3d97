//! This library provisions the PKI behind an OpenVPN deployment: a
//! certificate authority, a server certificate, client certificates and
//! their revocation. Certificates are built with [rcgen]; everything a
//! server or client needs is rendered into OpenVPN config files with the
//! key material inlined.
//!
//! State lives in a directory (see [`store`]) and every mutating operation
//! is a [`pipeline`] that stages its output and writes it in one go.

pub mod cert;
pub mod config;
pub mod dh;
mod error;
pub mod pipeline;
pub mod render;
pub mod revoke;
pub mod store;

pub use config::{Algorithm, ConfigOptions, PkiConfig};
pub use error::{Error, ErrorKind, Result};
pub use pipeline::{create_client, initialize, list, revoke_client};
pub use store::PkiStore;
