//! SOAP endpoint for the translator service.
//!
//! Runs every inbound message through parse, authenticate and translate, and
//! converts any error into a SOAP Fault at this boundary only.

use crate::config::{SoapVersion, TranslatorServiceConfig};
use crate::error::ServiceError;
use crate::parser::{parse_soap_envelope, SoapEnvelope, SoapHeader};
use crate::schema::{soap_envelope, GetTranslationRequest, GetTranslationResponse};
use crate::security::WsSecurityValidator;
use crate::translator::{StubTranslator, TranslationResult, Translator};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Serialized SOAP response handed back to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

/// The `GetTranslation` endpoint.
pub struct TranslatorEndpoint {
    config: TranslatorServiceConfig,
    security: WsSecurityValidator,
    translator: Arc<dyn Translator>,
}

impl TranslatorEndpoint {
    /// Create an endpoint backed by the stub translator.
    pub fn new(config: TranslatorServiceConfig) -> Self {
        Self::with_translator(config, Arc::new(StubTranslator))
    }

    pub fn with_translator(config: TranslatorServiceConfig, translator: Arc<dyn Translator>) -> Self {
        let security = WsSecurityValidator::new(&config.ws_security);
        Self {
            config,
            security,
            translator,
        }
    }

    pub fn config(&self) -> &TranslatorServiceConfig {
        &self.config
    }

    /// Handle a raw SOAP message received now.
    pub async fn handle(&self, body: &[u8]) -> SoapResponse {
        self.handle_at(body, Utc::now()).await
    }

    /// Handle a raw SOAP message received at `now`.
    pub async fn handle_at(&self, body: &[u8], now: DateTime<Utc>) -> SoapResponse {
        debug!(body_size = body.len(), "SOAP message received");

        match self.dispatch(body, now).await {
            Ok((version, response)) => {
                debug!("SOAP response sent");
                SoapResponse {
                    status: StatusCode::OK,
                    content_type: version.content_type(),
                    body: soap_envelope(version, None, &response.to_xml()),
                }
            }
            Err((version, err)) => {
                let version = version.unwrap_or(SoapVersion::Soap11);
                let fault = err.to_fault();
                debug!(fault_code = fault.code.as_str(), "SOAP fault sent");
                SoapResponse {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    content_type: version.content_type(),
                    body: fault.to_envelope(version),
                }
            }
        }
    }

    async fn dispatch(
        &self,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(SoapVersion, GetTranslationResponse), (Option<SoapVersion>, ServiceError)> {
        let envelope = self.parse(body).map_err(|e| {
            warn!(error = %e, "Rejecting malformed SOAP message");
            (None, e)
        })?;
        let version = envelope.version;
        let fail = |e: ServiceError| (Some(version), e);

        let request = GetTranslationRequest::from_body(&envelope.body).map_err(|e| {
            warn!(error = %e, "Rejecting malformed translation request");
            fail(e)
        })?;
        debug!(version = ?version, "SOAP message parsed");

        let not_understood = not_understood_headers(envelope.header.as_ref());
        if !not_understood.is_empty() {
            warn!(headers = ?not_understood, "Mandatory SOAP headers not understood");
            return Err(fail(ServiceError::MustUnderstand(not_understood)));
        }

        let context = self
            .security
            .validate(envelope.header.as_ref(), now)
            .map_err(|e| {
                warn!(
                    fault_code = e.fault_code().as_str(),
                    reason = %e,
                    "WS-Security validation failed"
                );
                fail(e)
            })?;
        debug!(username = ?context.username, "SOAP message authenticated");

        let result = self.translator.translate(&request).await;
        debug!(
            lang_from = %request.lang_from,
            lang_to = %request.lang_to,
            "Translation request handled"
        );

        match result {
            TranslationResult::Translated { text } => Ok((
                version,
                GetTranslationResponse { translation: text },
            )),
            TranslationResult::Failure { reason } => {
                info!(
                    lang_from = %request.lang_from,
                    lang_to = %request.lang_to,
                    "Translation unavailable"
                );
                Err(fail(ServiceError::TranslationUnavailable(reason)))
            }
        }
    }

    /// Parse the message and apply envelope limits.
    fn parse(&self, body: &[u8]) -> Result<SoapEnvelope, ServiceError> {
        let max_body_size = self.config.server.max_body_size;
        if body.len() > max_body_size {
            return Err(ServiceError::MalformedRequest(format!(
                "Request body size {} exceeds maximum {}",
                body.len(),
                max_body_size
            )));
        }

        let envelope = parse_soap_envelope(body)?;
        let limits = &self.config.envelope;

        if !limits.allowed_versions.contains(&envelope.version) {
            return Err(ServiceError::MalformedRequest(format!(
                "SOAP version {:?} not allowed, allowed versions: {:?}",
                envelope.version, limits.allowed_versions
            )));
        }
        if envelope.body.analysis.max_depth > limits.max_body_depth {
            return Err(ServiceError::MalformedRequest(format!(
                "SOAP Body nesting depth {} exceeds maximum {}",
                envelope.body.analysis.max_depth, limits.max_body_depth
            )));
        }
        if envelope.body.analysis.element_count > limits.max_elements {
            return Err(ServiceError::MalformedRequest(format!(
                "SOAP Body contains {} elements, maximum is {}",
                envelope.body.analysis.element_count, limits.max_elements
            )));
        }

        Ok(envelope)
    }
}

/// Header blocks flagged `mustUnderstand`. Only `wsse:Security` is processed
/// and it is kept apart from the generic elements by the parser.
fn not_understood_headers(header: Option<&SoapHeader>) -> Vec<String> {
    header
        .map(|h| {
            h.elements
                .iter()
                .filter(|e| e.must_understand)
                .map(|e| {
                    format!(
                        "{{{}}}{}",
                        e.name.namespace.as_deref().unwrap_or_default(),
                        e.name.local_name
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}
