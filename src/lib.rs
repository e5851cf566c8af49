//! SOAP Translator Web Service
//!
//! Exposes a single `GetTranslation` operation over SOAP 1.1/1.2, secured
//! with WS-Security Timestamp and UsernameToken validation. The bundled
//! translator is a stub that always answers with a fault.
//!
//! # Features
//!
//! - SOAP envelope parsing with XXE prevention
//! - WS-Security gate (timestamp freshness, PasswordText/PasswordDigest)
//! - Pluggable [`Translator`] behind the endpoint
//! - SOAP Fault responses in the caller's SOAP version
//! - WSDL publication
//! - Secured SOAP client
//!
//! # Example
//!
//! ```ignore
//! use translator_ws::{server, TranslatorEndpoint, TranslatorServiceConfig};
//!
//! let endpoint = Arc::new(TranslatorEndpoint::new(TranslatorServiceConfig::default()));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! server::serve(listener, endpoint, std::future::pending()).await?;
//! ```

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod parser;
pub mod schema;
pub mod security;
pub mod server;
pub mod translator;

pub use client::TranslatorClient;
pub use config::TranslatorServiceConfig;
pub use endpoint::TranslatorEndpoint;
pub use error::{ClientError, ServiceError};
pub use translator::{StubTranslator, Translator};
