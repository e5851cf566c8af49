//! SOAP client for the translator endpoint.
//!
//! Secures outgoing messages with a `wsse:Security` header carrying a
//! Timestamp and a UsernameToken when credentials are configured.

use crate::config::{PasswordType, SoapVersion};
use crate::error::ClientError;
use crate::parser::{parse_soap_envelope, SoapBody, SOAP_11_NS, WSSE_NS, WSU_NS};
use crate::schema::{soap_envelope, GetTranslationRequest, GetTranslationResponse};
use crate::security::{digest_password, BASE64_ENCODING_URI};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::escape;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Credentials placed in the UsernameToken.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub username: String,
    pub password: String,
    pub password_type: PasswordType,
}

/// Client for the `GetTranslation` operation.
#[derive(Debug, Clone)]
pub struct TranslatorClient {
    http: reqwest::Client,
    endpoint: String,
    version: SoapVersion,
    credentials: Option<ClientCredentials>,
    time_to_live: chrono::Duration,
}

impl TranslatorClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            version: SoapVersion::Soap11,
            credentials: None,
            time_to_live: chrono::Duration::seconds(300),
        })
    }

    /// Secure requests with a UsernameToken for these credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        password_type: PasswordType,
    ) -> Self {
        self.credentials = Some(ClientCredentials {
            username: username.into(),
            password: password.into(),
            password_type,
        });
        self
    }

    pub fn with_soap_version(mut self, version: SoapVersion) -> Self {
        self.version = version;
        self
    }

    /// Lifetime announced in the Timestamp Expires element.
    pub fn with_time_to_live(mut self, time_to_live: chrono::Duration) -> Self {
        self.time_to_live = time_to_live;
        self
    }

    /// Call the `GetTranslation` operation.
    pub async fn get_translation(
        &self,
        request: &GetTranslationRequest,
    ) -> Result<GetTranslationResponse, ClientError> {
        let header = self
            .credentials
            .as_ref()
            .map(|c| security_header(c, Utc::now(), self.time_to_live));
        let message = soap_envelope(self.version, header.as_deref(), &request.to_xml());

        let body = self.send(message).await?;
        GetTranslationResponse::from_body(&body)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// Post a complete envelope and return the body of the reply.
    pub async fn send(&self, message: String) -> Result<SoapBody, ClientError> {
        debug!(endpoint = %self.endpoint, "Sending SOAP request");

        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, self.version.content_type())
            .body(message)
            .send()
            .await?;

        let status = response.status();
        let is_xml = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("xml"))
            .unwrap_or(false);

        if status != StatusCode::OK && !(status == StatusCode::INTERNAL_SERVER_ERROR && is_xml) {
            return Err(ClientError::Transport {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let text = response.text().await?;
        let envelope = parse_soap_envelope(text.as_bytes())
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        if let Some(fault) = fault_of(&envelope.body) {
            debug!(code = %fault.0, "SOAP fault received");
            return Err(ClientError::Fault {
                code: fault.0,
                reason: fault.1,
            });
        }
        if status != StatusCode::OK {
            return Err(ClientError::InvalidResponse(format!(
                "HTTP {} without a SOAP Fault",
                status.as_u16()
            )));
        }

        Ok(envelope.body)
    }
}

/// Extract `(code, reason)` from a SOAP 1.1 or 1.2 Fault body.
fn fault_of(body: &SoapBody) -> Option<(String, String)> {
    let operation = body.operation.as_ref()?;
    if operation.local_name != "Fault" {
        return None;
    }

    if operation.namespace.as_deref() == Some(SOAP_11_NS) {
        Some((
            body.field(&["faultcode"]).unwrap_or_default().trim().to_string(),
            body.field(&["faultstring"]).unwrap_or_default().to_string(),
        ))
    } else {
        let code = body
            .field(&["Code", "Subcode", "Value"])
            .or_else(|| body.field(&["Code", "Value"]))
            .unwrap_or_default();
        Some((
            code.trim().to_string(),
            body.field(&["Reason", "Text"]).unwrap_or_default().to_string(),
        ))
    }
}

/// Build a `wsse:Security` header with a Timestamp and a UsernameToken.
pub fn security_header(
    credentials: &ClientCredentials,
    now: DateTime<Utc>,
    time_to_live: chrono::Duration,
) -> String {
    let created = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let expires = (now + time_to_live).to_rfc3339_opts(SecondsFormat::Millis, true);
    let nonce_bytes = *Uuid::new_v4().as_bytes();
    let nonce = STANDARD.encode(nonce_bytes);

    let password = match credentials.password_type {
        PasswordType::PasswordText => credentials.password.clone(),
        PasswordType::PasswordDigest => {
            digest_password(&nonce_bytes, &created, &credentials.password)
        }
    };

    format!(
        r#"<wsse:Security xmlns:wsse="{wsse}" xmlns:wsu="{wsu}">
      <wsu:Timestamp wsu:Id="TS-{ts_id}">
        <wsu:Created>{created}</wsu:Created>
        <wsu:Expires>{expires}</wsu:Expires>
      </wsu:Timestamp>
      <wsse:UsernameToken wsu:Id="UsernameToken-{token_id}">
        <wsse:Username>{username}</wsse:Username>
        <wsse:Password Type="{password_type}">{password}</wsse:Password>
        <wsse:Nonce EncodingType="{encoding}">{nonce}</wsse:Nonce>
        <wsu:Created>{created}</wsu:Created>
      </wsse:UsernameToken>
    </wsse:Security>"#,
        wsse = WSSE_NS,
        wsu = WSU_NS,
        ts_id = Uuid::new_v4().simple(),
        token_id = Uuid::new_v4().simple(),
        created = created,
        expires = expires,
        username = escape(credentials.username.as_str()),
        password_type = credentials.password_type.uri(),
        password = escape(password.as_str()),
        encoding = BASE64_ENCODING_URI,
        nonce = nonce,
    )
}
