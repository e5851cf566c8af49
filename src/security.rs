//! WS-Security validation: the authentication gate run before the translator.
//!
//! The gate is an ordered list of [`ValidationStep`]s built from
//! [`WsSecurityConfig::validation_actions`]. Steps run in order and the first
//! failure rejects the message.

use crate::config::{PasswordType, ValidationAction, WsSecurityConfig};
use crate::error::ServiceError;
use crate::parser::{SoapHeader, UsernameToken, WsSecurityHeader};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tracing::debug;

pub const PASSWORD_TEXT_URI: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";
pub const PASSWORD_DIGEST_URI: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
pub const BASE64_ENCODING_URI: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

impl PasswordType {
    /// Type URI carried in the `wsse:Password` element.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::PasswordText => PASSWORD_TEXT_URI,
            Self::PasswordDigest => PASSWORD_DIGEST_URI,
        }
    }

    /// Resolve a Type attribute. A missing attribute means PasswordText.
    pub fn from_uri(uri: Option<&str>) -> Option<Self> {
        match uri {
            None => Some(Self::PasswordText),
            Some(uri) if uri.ends_with("#PasswordText") => Some(Self::PasswordText),
            Some(uri) if uri.ends_with("#PasswordDigest") => Some(Self::PasswordDigest),
            Some(_) => None,
        }
    }
}

/// What the gate learned about an accepted message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityContext {
    /// Authenticated username
    pub username: Option<String>,
    /// Timestamp Created value
    pub created: Option<DateTime<Utc>>,
}

/// One validation action of the gate.
pub trait ValidationStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(
        &self,
        security: &WsSecurityHeader,
        now: DateTime<Utc>,
        context: &mut SecurityContext,
    ) -> Result<(), ServiceError>;
}

/// Validates `wsu:Timestamp` freshness.
pub struct TimestampStep {
    time_to_live: Duration,
    future_time_to_live: Duration,
    strict: bool,
}

impl TimestampStep {
    pub fn new(config: &WsSecurityConfig) -> Self {
        Self {
            time_to_live: seconds(config.time_to_live_secs),
            future_time_to_live: seconds(config.future_time_to_live_secs),
            strict: config.timestamp_strict,
        }
    }
}

impl ValidationStep for TimestampStep {
    fn name(&self) -> &'static str {
        "Timestamp"
    }

    fn validate(
        &self,
        security: &WsSecurityHeader,
        now: DateTime<Utc>,
        context: &mut SecurityContext,
    ) -> Result<(), ServiceError> {
        let timestamp = security.timestamp.as_ref().ok_or_else(|| {
            ServiceError::StaleTimestamp("no Timestamp in WS-Security header".to_string())
        })?;
        let created = timestamp
            .created
            .as_deref()
            .ok_or_else(|| ServiceError::StaleTimestamp("Timestamp has no Created".to_string()))
            .and_then(parse_timestamp)?;

        // An unrepresentable limit lies beyond any parseable Created
        if let Some(latest) = now.checked_add_signed(self.future_time_to_live) {
            if created > latest {
                return Err(ServiceError::StaleTimestamp(
                    "Timestamp Created is in the future".to_string(),
                ));
            }
        }

        if let Some(expires) = timestamp.expires.as_deref() {
            let expires = parse_timestamp(expires)?;
            if expires < created {
                return Err(ServiceError::StaleTimestamp(
                    "Timestamp expires before it was created".to_string(),
                ));
            }
            if now > expires {
                return Err(ServiceError::StaleTimestamp(
                    "Timestamp has expired".to_string(),
                ));
            }
        }

        if self.strict && now.signed_duration_since(created) > self.time_to_live {
            return Err(ServiceError::StaleTimestamp(format!(
                "Timestamp is older than {} seconds",
                self.time_to_live.num_seconds()
            )));
        }

        context.created = Some(created);
        Ok(())
    }
}

/// Validates `wsse:UsernameToken` against the user table.
pub struct UsernameTokenStep {
    users: HashMap<String, String>,
    allowed_password_types: Vec<PasswordType>,
}

impl UsernameTokenStep {
    pub fn new(config: &WsSecurityConfig) -> Self {
        Self {
            users: config.users.clone(),
            allowed_password_types: config.allowed_password_types.clone(),
        }
    }

    fn password_matches(
        &self,
        token: &UsernameToken,
        password_type: PasswordType,
        stored: &str,
    ) -> Result<bool, ServiceError> {
        let Some(supplied) = token.password.as_deref() else {
            return Ok(false);
        };

        let expected = match password_type {
            PasswordType::PasswordText => stored.to_string(),
            PasswordType::PasswordDigest => {
                let (Some(nonce), Some(created)) = (token.nonce.as_deref(), token.created.as_deref())
                else {
                    return Err(ServiceError::InvalidCredentials(
                        "PasswordDigest requires a Nonce and Created".to_string(),
                    ));
                };
                password_digest(nonce, created, stored)?
            }
        };

        Ok(constant_time_eq(supplied, &expected))
    }
}

impl ValidationStep for UsernameTokenStep {
    fn name(&self) -> &'static str {
        "UsernameToken"
    }

    fn validate(
        &self,
        security: &WsSecurityHeader,
        _now: DateTime<Utc>,
        context: &mut SecurityContext,
    ) -> Result<(), ServiceError> {
        let token = security.username_token.as_ref().ok_or_else(|| {
            ServiceError::InvalidCredentials("no UsernameToken in WS-Security header".to_string())
        })?;

        let stored = self
            .users
            .get(&token.username)
            .ok_or_else(|| ServiceError::InvalidCredentials("no such user".to_string()))?;

        let password_type = PasswordType::from_uri(token.password_type.as_deref())
            .filter(|t| self.allowed_password_types.contains(t))
            .ok_or_else(|| {
                ServiceError::InvalidCredentials(format!(
                    "password type '{}' is not allowed",
                    token.password_type.as_deref().unwrap_or("PasswordText")
                ))
            })?;

        if !self.password_matches(token, password_type, stored)? {
            return Err(ServiceError::InvalidCredentials("bad credentials".to_string()));
        }

        context.username = Some(token.username.clone());
        Ok(())
    }
}

/// The authentication gate.
pub struct WsSecurityValidator {
    steps: Vec<Box<dyn ValidationStep>>,
}

impl WsSecurityValidator {
    /// Create a validator running the configured actions in order.
    pub fn new(config: &WsSecurityConfig) -> Self {
        let steps = config
            .validation_actions
            .iter()
            .map(|action| -> Box<dyn ValidationStep> {
                match action {
                    ValidationAction::Timestamp => Box::new(TimestampStep::new(config)),
                    ValidationAction::UsernameToken => Box::new(UsernameTokenStep::new(config)),
                }
            })
            .collect();

        Self::with_steps(steps)
    }

    pub fn with_steps(steps: Vec<Box<dyn ValidationStep>>) -> Self {
        Self { steps }
    }

    /// Names of the steps, in execution order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Validate the security header of a message received at `now`.
    pub fn validate(
        &self,
        header: Option<&SoapHeader>,
        now: DateTime<Utc>,
    ) -> Result<SecurityContext, ServiceError> {
        let mut context = SecurityContext::default();
        if self.steps.is_empty() {
            return Ok(context);
        }

        let security = header
            .and_then(|h| h.security.as_ref())
            .ok_or(ServiceError::MissingSecurityHeader)?;

        for step in &self.steps {
            step.validate(security, now, &mut context)?;
            debug!(step = step.name(), "WS-Security step passed");
        }

        Ok(context)
    }
}

/// `Base64(SHA-1(nonce ‖ created ‖ password))` with the nonce given in base64.
pub fn password_digest(nonce_b64: &str, created: &str, password: &str) -> Result<String, ServiceError> {
    let nonce = STANDARD
        .decode(nonce_b64.trim())
        .map_err(|e| ServiceError::InvalidCredentials(format!("invalid Nonce encoding: {}", e)))?;

    Ok(digest_password(&nonce, created, password))
}

/// `Base64(SHA-1(nonce ‖ created ‖ password))` over the raw nonce bytes.
pub fn digest_password(nonce: &[u8], created: &str, password: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Lifetime in seconds, saturating at the largest representable duration.
fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ServiceError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ServiceError::StaleTimestamp(format!("invalid timestamp format: {}", value)))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SecurityTimestamp;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 5).unwrap()
    }

    fn rfc3339(t: DateTime<Utc>) -> String {
        t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }

    fn timestamp(created: DateTime<Utc>, ttl_secs: i64) -> SecurityTimestamp {
        SecurityTimestamp {
            created: Some(rfc3339(created)),
            expires: Some(rfc3339(created + Duration::seconds(ttl_secs))),
        }
    }

    fn text_token(username: &str, password: &str) -> UsernameToken {
        UsernameToken {
            username: username.to_string(),
            password: Some(password.to_string()),
            password_type: Some(PASSWORD_TEXT_URI.to_string()),
            ..Default::default()
        }
    }

    fn header(security: WsSecurityHeader) -> SoapHeader {
        SoapHeader {
            security: Some(security),
            elements: Vec::new(),
        }
    }

    fn valid_security() -> WsSecurityHeader {
        WsSecurityHeader {
            timestamp: Some(timestamp(now() - Duration::seconds(2), 300)),
            username_token: Some(text_token("root", "toor")),
        }
    }

    fn validator() -> WsSecurityValidator {
        WsSecurityValidator::new(&WsSecurityConfig::default())
    }

    #[test]
    fn test_default_step_order() {
        assert_eq!(validator().step_names(), vec!["Timestamp", "UsernameToken"]);
    }

    #[test]
    fn test_accepts_valid_header() {
        let context = validator()
            .validate(Some(&header(valid_security())), now())
            .unwrap();
        assert_eq!(context.username.as_deref(), Some("root"));
        assert_eq!(context.created, Some(now() - Duration::seconds(2)));
    }

    #[test]
    fn test_missing_header() {
        let err = validator().validate(None, now()).unwrap_err();
        assert!(matches!(err, ServiceError::MissingSecurityHeader));
        assert_eq!(err.to_string(), "No WS-Security header found");

        let no_security = SoapHeader::default();
        let err = validator().validate(Some(&no_security), now()).unwrap_err();
        assert!(matches!(err, ServiceError::MissingSecurityHeader));
    }

    #[test]
    fn test_no_actions_accepts_anything() {
        let config = WsSecurityConfig {
            validation_actions: Vec::new(),
            ..Default::default()
        };
        let context = WsSecurityValidator::new(&config).validate(None, now()).unwrap();
        assert_eq!(context, SecurityContext::default());
    }

    #[test]
    fn test_missing_timestamp() {
        let security = WsSecurityHeader {
            timestamp: None,
            ..valid_security()
        };
        let err = validator().validate(Some(&header(security)), now()).unwrap_err();
        assert!(matches!(err, ServiceError::StaleTimestamp(_)));
    }

    #[test]
    fn test_timestamp_older_than_ttl() {
        let security = WsSecurityHeader {
            timestamp: Some(timestamp(now() - Duration::seconds(11), 300)),
            ..valid_security()
        };
        let err = validator().validate(Some(&header(security)), now()).unwrap_err();
        assert!(matches!(err, ServiceError::StaleTimestamp(_)));
    }

    #[test]
    fn test_timestamp_age_ignored_when_not_strict() {
        let config = WsSecurityConfig {
            timestamp_strict: false,
            ..Default::default()
        };
        let security = WsSecurityHeader {
            timestamp: Some(timestamp(now() - Duration::seconds(60), 300)),
            ..valid_security()
        };
        assert!(WsSecurityValidator::new(&config)
            .validate(Some(&header(security)), now())
            .is_ok());
    }

    #[test]
    fn test_timestamp_expired() {
        let security = WsSecurityHeader {
            timestamp: Some(timestamp(now() - Duration::seconds(5), 3)),
            ..valid_security()
        };
        let err = validator().validate(Some(&header(security)), now()).unwrap_err();
        match err {
            ServiceError::StaleTimestamp(msg) => assert!(msg.contains("expired")),
            other => panic!("expected stale timestamp, got {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_in_the_future() {
        let security = WsSecurityHeader {
            timestamp: Some(timestamp(now() + Duration::seconds(61), 300)),
            ..valid_security()
        };
        let err = validator().validate(Some(&header(security)), now()).unwrap_err();
        assert!(matches!(err, ServiceError::StaleTimestamp(_)));

        // Within the clock skew tolerance
        let security = WsSecurityHeader {
            timestamp: Some(timestamp(now() + Duration::seconds(30), 300)),
            ..valid_security()
        };
        assert!(validator().validate(Some(&header(security)), now()).is_ok());
    }

    #[test]
    fn test_huge_lifetimes_saturate() {
        for secs in [9_000_000_000_000, u64::MAX] {
            let config = WsSecurityConfig {
                time_to_live_secs: secs,
                future_time_to_live_secs: secs,
                ..Default::default()
            };
            let validator = WsSecurityValidator::new(&config);

            assert!(validator.validate(Some(&header(valid_security())), now()).is_ok());

            let security = WsSecurityHeader {
                timestamp: Some(timestamp(now() + Duration::days(3650), 300)),
                ..valid_security()
            };
            assert!(validator.validate(Some(&header(security)), now()).is_ok());
        }
    }

    #[test]
    fn test_invalid_timestamp_format() {
        let security = WsSecurityHeader {
            timestamp: Some(SecurityTimestamp {
                created: Some("yesterday".to_string()),
                expires: None,
            }),
            ..valid_security()
        };
        let err = validator().validate(Some(&header(security)), now()).unwrap_err();
        assert!(matches!(err, ServiceError::StaleTimestamp(_)));
    }

    #[test]
    fn test_unknown_user() {
        let security = WsSecurityHeader {
            username_token: Some(text_token("admin", "toor")),
            ..valid_security()
        };
        let err = validator().validate(Some(&header(security)), now()).unwrap_err();
        match err {
            ServiceError::InvalidCredentials(msg) => assert_eq!(msg, "no such user"),
            other => panic!("expected invalid credentials, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_password() {
        let security = WsSecurityHeader {
            username_token: Some(text_token("root", "root")),
            ..valid_security()
        };
        let err = validator().validate(Some(&header(security)), now()).unwrap_err();
        match err {
            ServiceError::InvalidCredentials(msg) => assert_eq!(msg, "bad credentials"),
            other => panic!("expected invalid credentials, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_username_token() {
        let security = WsSecurityHeader {
            username_token: None,
            ..valid_security()
        };
        let err = validator().validate(Some(&header(security)), now()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials(_)));
    }

    #[test]
    fn test_timestamp_checked_before_credentials() {
        let security = WsSecurityHeader {
            timestamp: Some(timestamp(now() - Duration::seconds(30), 300)),
            username_token: Some(text_token("nobody", "wrong")),
        };
        let err = validator().validate(Some(&header(security)), now()).unwrap_err();
        assert!(matches!(err, ServiceError::StaleTimestamp(_)));
    }

    #[test]
    fn test_password_digest() {
        let created = rfc3339(now());
        let nonce = STANDARD.encode(b"0123456789abcdef");
        let digest = password_digest(&nonce, &created, "toor").unwrap();

        let security = WsSecurityHeader {
            username_token: Some(UsernameToken {
                username: "root".to_string(),
                password: Some(digest.clone()),
                password_type: Some(PASSWORD_DIGEST_URI.to_string()),
                nonce: Some(nonce.clone()),
                created: Some(created.clone()),
            }),
            ..valid_security()
        };
        assert!(validator().validate(Some(&header(security)), now()).is_ok());

        // Digest computed over a different password
        let wrong = password_digest(&nonce, &created, "guess").unwrap();
        assert_ne!(wrong, digest);
        let security = WsSecurityHeader {
            username_token: Some(UsernameToken {
                username: "root".to_string(),
                password: Some(wrong),
                password_type: Some(PASSWORD_DIGEST_URI.to_string()),
                nonce: Some(nonce),
                created: Some(created),
            }),
            ..valid_security()
        };
        let err = validator().validate(Some(&header(security)), now()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials(_)));
    }

    #[test]
    fn test_password_digest_known_vector() {
        // sha1("abc" + "2024-01-01T00:00:00Z" + "pw")
        let mut hasher = Sha1::new();
        hasher.update(b"abc2024-01-01T00:00:00Zpw");
        let expected = STANDARD.encode(hasher.finalize());
        let nonce = STANDARD.encode(b"abc");
        assert_eq!(password_digest(&nonce, "2024-01-01T00:00:00Z", "pw").unwrap(), expected);
    }

    #[test]
    fn test_password_type_not_allowed() {
        let config = WsSecurityConfig {
            allowed_password_types: vec![PasswordType::PasswordDigest],
            ..Default::default()
        };
        let security = valid_security();
        let err = WsSecurityValidator::new(&config)
            .validate(Some(&header(security)), now())
            .unwrap_err();
        match err {
            ServiceError::InvalidCredentials(msg) => assert!(msg.contains("not allowed")),
            other => panic!("expected invalid credentials, got {:?}", other),
        }
    }

    #[test]
    fn test_password_type_from_uri() {
        assert_eq!(PasswordType::from_uri(None), Some(PasswordType::PasswordText));
        assert_eq!(
            PasswordType::from_uri(Some(PASSWORD_DIGEST_URI)),
            Some(PasswordType::PasswordDigest)
        );
        assert_eq!(PasswordType::from_uri(Some("urn:custom")), None);
    }
}
