//! Configuration types for the translator web service.

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upper bound for the timestamp lifetimes in [`WsSecurityConfig`].
pub const MAX_TIME_TO_LIVE_SECS: u64 = i32::MAX as u64;

/// Main configuration for the translator web service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorServiceConfig {
    /// Config version
    pub version: String,

    /// HTTP transport settings
    pub server: ServerConfig,

    /// Envelope acceptance limits
    pub envelope: EnvelopeConfig,

    /// WS-Security validation configuration
    pub ws_security: WsSecurityConfig,
}

impl Default for TranslatorServiceConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            server: ServerConfig::default(),
            envelope: EnvelopeConfig::default(),
            ws_security: WsSecurityConfig::default(),
        }
    }
}

impl TranslatorServiceConfig {
    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if !self.server.endpoint_path.starts_with('/') {
            return Err(ServiceError::Config(format!(
                "endpoint_path '{}' must start with '/'",
                self.server.endpoint_path
            )));
        }
        if self.server.endpoint_path.len() > 1 && self.server.endpoint_path.ends_with('/') {
            return Err(ServiceError::Config(format!(
                "endpoint_path '{}' must not end with '/'",
                self.server.endpoint_path
            )));
        }
        if self.envelope.allowed_versions.is_empty() {
            return Err(ServiceError::Config(
                "at least one SOAP version must be allowed".to_string(),
            ));
        }

        let ws = &self.ws_security;
        if ws.validation_actions.contains(&ValidationAction::Timestamp) && ws.time_to_live_secs == 0 {
            return Err(ServiceError::Config(
                "time_to_live_secs must be greater than zero".to_string(),
            ));
        }
        for (name, secs) in [
            ("time_to_live_secs", ws.time_to_live_secs),
            ("future_time_to_live_secs", ws.future_time_to_live_secs),
        ] {
            if secs > MAX_TIME_TO_LIVE_SECS {
                return Err(ServiceError::Config(format!(
                    "{} must not exceed {} seconds",
                    name, MAX_TIME_TO_LIVE_SECS
                )));
            }
        }
        if ws.validation_actions.contains(&ValidationAction::UsernameToken) {
            if ws.users.is_empty() {
                return Err(ServiceError::Config(
                    "UsernameToken validation requires at least one user".to_string(),
                ));
            }
            if ws.allowed_password_types.is_empty() {
                return Err(ServiceError::Config(
                    "UsernameToken validation requires at least one password type".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub listen_address: String,

    /// Path the SOAP endpoint is mounted on
    pub endpoint_path: String,

    /// Maximum request body size (bytes)
    pub max_body_size: usize,

    /// Accepted Content-Type headers for SOAP requests
    pub allowed_content_types: Vec<String>,

    /// Rewrite the WSDL service address to the host the WSDL was requested from
    pub transform_wsdl_locations: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".to_string(),
            endpoint_path: "/ws".to_string(),
            max_body_size: 1_048_576, // 1MB
            allowed_content_types: vec![
                "text/xml".to_string(),
                "application/soap+xml".to_string(),
            ],
            transform_wsdl_locations: true,
        }
    }
}

/// Limits applied to every inbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Accepted SOAP versions
    pub allowed_versions: Vec<SoapVersion>,

    /// Maximum nesting depth in SOAP Body
    pub max_body_depth: u32,

    /// Maximum number of elements in SOAP Body
    pub max_elements: u32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            allowed_versions: vec![SoapVersion::Soap11, SoapVersion::Soap12],
            max_body_depth: 20,
            max_elements: 1000,
        }
    }
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => crate::parser::SOAP_11_NS,
            Self::Soap12 => crate::parser::SOAP_12_NS,
        }
    }

    /// HTTP Content-Type for messages of this version.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml; charset=utf-8",
            Self::Soap12 => "application/soap+xml; charset=utf-8",
        }
    }
}

/// WS-Security validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsSecurityConfig {
    /// Validation actions, applied in order. Empty disables WS-Security.
    pub validation_actions: Vec<ValidationAction>,

    /// Reject timestamps whose Created is older than the time to live
    pub timestamp_strict: bool,

    /// Maximum age of a message timestamp in seconds
    pub time_to_live_secs: u64,

    /// Tolerated clock skew for Created values in the future, in seconds
    pub future_time_to_live_secs: u64,

    /// Accepted UsernameToken password types
    pub allowed_password_types: Vec<PasswordType>,

    /// Username to password table
    pub users: HashMap<String, String>,
}

impl Default for WsSecurityConfig {
    fn default() -> Self {
        Self {
            validation_actions: vec![ValidationAction::Timestamp, ValidationAction::UsernameToken],
            timestamp_strict: true,
            time_to_live_secs: 10,
            future_time_to_live_secs: 60,
            allowed_password_types: vec![PasswordType::PasswordText, PasswordType::PasswordDigest],
            users: HashMap::from([("root".to_string(), "toor".to_string())]),
        }
    }
}

/// WS-Security validation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationAction {
    /// Validate the wsu:Timestamp element
    Timestamp,
    /// Validate the wsse:UsernameToken against the user table
    UsernameToken,
}

/// WS-Security UsernameToken password types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordType {
    /// Plain text password
    #[serde(rename = "PasswordText")]
    PasswordText,
    /// Digested password (SHA-1 over nonce, created and password)
    #[serde(rename = "PasswordDigest")]
    PasswordDigest,
}
