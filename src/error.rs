//! Error types and SOAP Fault generation for the translator web service.

use crate::config::SoapVersion;
use crate::schema::soap_envelope;
use quick_xml::escape::escape;
use thiserror::Error;

/// Fault string returned when a message carries no `wsse:Security` header.
pub const MISSING_SECURITY_HEADER: &str = "No WS-Security header found";

/// Translator service errors.
///
/// Every variant is terminal for the request that produced it and is turned
/// into a SOAP Fault by the endpoint.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("No WS-Security header found")]
    MissingSecurityHeader,

    /// Header blocks marked `mustUnderstand` that the service does not process.
    #[error("One or more mandatory SOAP header blocks not understood")]
    MustUnderstand(Vec<String>),

    #[error("stale timestamp: {0}")]
    StaleTimestamp(String),

    #[error("{0}")]
    InvalidCredentials(String),

    /// The translator could not produce a translation. The message is the
    /// translator's reason, surfaced verbatim.
    #[error("{0}")]
    TranslationUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Fault code reported to the caller for this error.
    pub fn fault_code(&self) -> FaultCode {
        match self {
            Self::MalformedRequest(_) => FaultCode::Client,
            Self::MissingSecurityHeader => FaultCode::InvalidSecurity,
            Self::MustUnderstand(_) => FaultCode::MustUnderstand,
            Self::StaleTimestamp(_) => FaultCode::MessageExpired,
            Self::InvalidCredentials(_) => FaultCode::FailedAuthentication,
            Self::TranslationUnavailable(_) | Self::Config(_) => FaultCode::Server,
        }
    }

    /// Whether the error was raised by the WS-Security gate.
    pub fn is_security_fault(&self) -> bool {
        self.fault_code().is_security()
    }

    /// Build the fault sent back for this error.
    pub fn to_fault(&self) -> Fault {
        Fault::new(self.fault_code(), self.to_string())
    }
}

/// Translator client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with a non-SOAP HTTP error (e.g. 404).
    #[error("HTTP transport error [{status}] {reason}")]
    Transport { status: u16, reason: String },

    /// The server could not be reached at all.
    #[error("I/O error: {0}")]
    Io(#[from] reqwest::Error),

    /// The server answered with a SOAP Fault.
    #[error("{reason}")]
    Fault { code: String, reason: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// SOAP fault codes, including the WS-Security ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// The message was malformed
    Client,
    /// The service failed to process a valid message
    Server,
    /// A mandatory header block was not understood
    MustUnderstand,
    /// An error was discovered processing the Security header
    InvalidSecurity,
    /// The security token could not be authenticated or authorized
    FailedAuthentication,
    /// The message has expired
    MessageExpired,
}

impl FaultCode {
    /// Local name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "Client",
            Self::Server => "Server",
            Self::MustUnderstand => "MustUnderstand",
            Self::InvalidSecurity => "InvalidSecurity",
            Self::FailedAuthentication => "FailedAuthentication",
            Self::MessageExpired => "MessageExpired",
        }
    }

    pub fn is_security(&self) -> bool {
        matches!(
            self,
            Self::InvalidSecurity | Self::FailedAuthentication | Self::MessageExpired
        )
    }

    /// Whether the fault is attributed to the sender of the message.
    pub fn is_sender(&self) -> bool {
        !matches!(self, Self::Server)
    }
}

/// A SOAP Fault ready to be serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: FaultCode,
    pub reason: String,
}

impl Fault {
    pub fn new(code: FaultCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Serialize as a complete envelope of the given version.
    pub fn to_envelope(&self, version: SoapVersion) -> String {
        match version {
            SoapVersion::Soap11 => soap_envelope(version, None, &self.soap_11_body()),
            SoapVersion::Soap12 => soap_envelope(version, None, &self.soap_12_body()),
        }
    }

    fn soap_11_body(&self) -> String {
        let fault_code = if self.code.is_security() {
            format!(
                r#"<faultcode xmlns:wsse="{}">wsse:{}</faultcode>"#,
                crate::parser::WSSE_NS,
                self.code.as_str()
            )
        } else {
            format!("<faultcode>soap:{}</faultcode>", self.code.as_str())
        };

        format!(
            r#"<soap:Fault>
      {}
      <faultstring xml:lang="en">{}</faultstring>
    </soap:Fault>"#,
            fault_code,
            escape(self.reason.as_str())
        )
    }

    fn soap_12_body(&self) -> String {
        let value = match self.code {
            FaultCode::MustUnderstand => "soap:MustUnderstand",
            code if code.is_sender() => "soap:Sender",
            _ => "soap:Receiver",
        };
        let subcode = if self.code.is_security() {
            format!(
                r#"
        <soap:Subcode>
          <soap:Value xmlns:wsse="{}">wsse:{}</soap:Value>
        </soap:Subcode>"#,
                crate::parser::WSSE_NS,
                self.code.as_str()
            )
        } else {
            String::new()
        };

        format!(
            r#"<soap:Fault>
      <soap:Code>
        <soap:Value>{}</soap:Value>{}
      </soap:Code>
      <soap:Reason>
        <soap:Text xml:lang="en">{}</soap:Text>
      </soap:Reason>
    </soap:Fault>"#,
            value,
            subcode,
            escape(self.reason.as_str())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_header_message() {
        assert_eq!(
            ServiceError::MissingSecurityHeader.to_string(),
            MISSING_SECURITY_HEADER
        );
    }

    #[test]
    fn test_fault_codes() {
        assert_eq!(
            ServiceError::MalformedRequest("x".into()).fault_code(),
            FaultCode::Client
        );
        assert_eq!(
            ServiceError::StaleTimestamp("x".into()).fault_code(),
            FaultCode::MessageExpired
        );
        assert_eq!(
            ServiceError::InvalidCredentials("x".into()).fault_code(),
            FaultCode::FailedAuthentication
        );
        assert_eq!(
            ServiceError::TranslationUnavailable("x".into()).fault_code(),
            FaultCode::Server
        );
        assert!(ServiceError::MissingSecurityHeader.is_security_fault());
        assert!(!ServiceError::TranslationUnavailable("x".into()).is_security_fault());
    }

    #[test]
    fn test_translation_unavailable_is_verbatim() {
        let err = ServiceError::TranslationUnavailable("I don't know".to_string());
        assert_eq!(err.to_fault().reason, "I don't know");
    }

    #[test]
    fn test_soap_11_fault() {
        let fault = Fault::new(FaultCode::Server, "boom");
        let xml = fault.to_envelope(SoapVersion::Soap11);
        assert!(xml.contains("http://schemas.xmlsoap.org/soap/envelope/"));
        assert!(xml.contains("<faultcode>soap:Server</faultcode>"));
        assert!(xml.contains("boom"));
    }

    #[test]
    fn test_soap_11_security_fault() {
        let xml = ServiceError::MissingSecurityHeader
            .to_fault()
            .to_envelope(SoapVersion::Soap11);
        assert!(xml.contains("wsse:InvalidSecurity"));
        assert!(xml.contains(MISSING_SECURITY_HEADER));
    }

    #[test]
    fn test_soap_12_fault() {
        let fault = Fault::new(FaultCode::FailedAuthentication, "bad credentials");
        let xml = fault.to_envelope(SoapVersion::Soap12);
        assert!(xml.contains("http://www.w3.org/2003/05/soap-envelope"));
        assert!(xml.contains("soap:Sender"));
        assert!(xml.contains("wsse:FailedAuthentication"));
    }

    #[test]
    fn test_must_understand_fault() {
        let err = ServiceError::MustUnderstand(vec!["{urn:trans}Trans".to_string()]);
        assert!(!err.is_security_fault());

        let xml = err.to_fault().to_envelope(SoapVersion::Soap11);
        assert!(xml.contains("<faultcode>soap:MustUnderstand</faultcode>"));
        assert!(xml.contains("One or more mandatory SOAP header blocks not understood"));

        let xml = err.to_fault().to_envelope(SoapVersion::Soap12);
        assert!(xml.contains("<soap:Value>soap:MustUnderstand</soap:Value>"));
        assert!(!xml.contains("soap:Sender"));
    }

    #[test]
    fn test_fault_reason_is_escaped() {
        let fault = Fault::new(FaultCode::Server, "the text '<b>&'");
        let xml = fault.to_envelope(SoapVersion::Soap11);
        assert!(xml.contains("&lt;b&gt;&amp;"));
        assert!(!xml.contains("<b>"));
    }
}
