//! Translator message schema: payload types, envelope writer and WSDL.

use crate::config::SoapVersion;
use crate::error::ServiceError;
use crate::parser::SoapBody;
use quick_xml::escape::escape;

/// Target namespace of the translator schema.
pub const TRANSLATOR_NS: &str = "http://translator/web/ws/schema";

pub const GET_TRANSLATION_REQUEST: &str = "GetTranslationRequest";
pub const GET_TRANSLATION_RESPONSE: &str = "GetTranslationResponse";

/// Request for the `GetTranslation` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetTranslationRequest {
    pub lang_from: String,
    pub lang_to: String,
    pub text: String,
}

impl GetTranslationRequest {
    pub fn new(
        lang_from: impl Into<String>,
        lang_to: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            lang_from: lang_from.into(),
            lang_to: lang_to.into(),
            text: text.into(),
        }
    }

    /// Decode the request from a parsed SOAP Body.
    pub fn from_body(body: &SoapBody) -> Result<Self, ServiceError> {
        match &body.operation {
            Some(op) if op.is(TRANSLATOR_NS, GET_TRANSLATION_REQUEST) => {}
            Some(op) => {
                return Err(ServiceError::MalformedRequest(format!(
                    "No endpoint mapping found for element '{{{}}}{}'",
                    op.namespace.as_deref().unwrap_or_default(),
                    op.local_name
                )))
            }
            None => {
                return Err(ServiceError::MalformedRequest(
                    "SOAP Body is empty".to_string(),
                ))
            }
        }

        Ok(Self {
            lang_from: required_field(body, "langFrom")?,
            lang_to: required_field(body, "langTo")?,
            text: required_field(body, "text")?,
        })
    }

    /// Serialize as the body payload.
    pub fn to_xml(&self) -> String {
        format!(
            r#"<tr:{op} xmlns:tr="{ns}"><tr:langFrom>{}</tr:langFrom><tr:langTo>{}</tr:langTo><tr:text>{}</tr:text></tr:{op}>"#,
            escape(self.lang_from.as_str()),
            escape(self.lang_to.as_str()),
            escape(self.text.as_str()),
            op = GET_TRANSLATION_REQUEST,
            ns = TRANSLATOR_NS,
        )
    }
}

/// Response of the `GetTranslation` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetTranslationResponse {
    pub translation: String,
}

impl GetTranslationResponse {
    pub fn from_body(body: &SoapBody) -> Result<Self, ServiceError> {
        match &body.operation {
            Some(op) if op.is(TRANSLATOR_NS, GET_TRANSLATION_RESPONSE) => Ok(Self {
                translation: body.field(&["translation"]).unwrap_or_default().to_string(),
            }),
            _ => Err(ServiceError::MalformedRequest(format!(
                "Expected {} in SOAP Body",
                GET_TRANSLATION_RESPONSE
            ))),
        }
    }

    pub fn to_xml(&self) -> String {
        format!(
            r#"<tr:{op} xmlns:tr="{ns}"><tr:translation>{}</tr:translation></tr:{op}>"#,
            escape(self.translation.as_str()),
            op = GET_TRANSLATION_RESPONSE,
            ns = TRANSLATOR_NS,
        )
    }
}

fn required_field(body: &SoapBody, name: &str) -> Result<String, ServiceError> {
    let field = body
        .fields
        .iter()
        .find(|f| f.path.len() == 1 && f.path[0] == name)
        .ok_or_else(|| {
            ServiceError::MalformedRequest(format!("Missing required element '{}'", name))
        })?;

    if field.namespace.as_deref() != Some(TRANSLATOR_NS) {
        return Err(ServiceError::MalformedRequest(format!(
            "Element '{}' is not in namespace {}",
            name, TRANSLATOR_NS
        )));
    }
    if field.text.is_empty() {
        return Err(ServiceError::MalformedRequest(format!(
            "Element '{}' must not be empty",
            name
        )));
    }

    Ok(field.text.clone())
}

/// Wrap header and body content in a SOAP envelope using the `soap` prefix.
pub fn soap_envelope(version: SoapVersion, header: Option<&str>, body: &str) -> String {
    let header = header
        .map(|h| format!("\n  <soap:Header>\n    {}\n  </soap:Header>", h))
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}">{}
  <soap:Body>
    {}
  </soap:Body>
</soap:Envelope>"#,
        version.namespace(),
        header,
        body
    )
}

/// WSDL 1.1 definition of the translator service, bound to `location`.
pub fn wsdl_definition(location: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<wsdl:definitions xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/"
                  xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
                  xmlns:xs="http://www.w3.org/2001/XMLSchema"
                  xmlns:tns="{ns}"
                  targetNamespace="{ns}">
  <wsdl:types>
    <xs:schema elementFormDefault="qualified" targetNamespace="{ns}">
      <xs:element name="{req}">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="langFrom" type="xs:string"/>
            <xs:element name="langTo" type="xs:string"/>
            <xs:element name="text" type="xs:string"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
      <xs:element name="{resp}">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="translation" type="xs:string"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>
  </wsdl:types>
  <wsdl:message name="{req}">
    <wsdl:part element="tns:{req}" name="{req}"/>
  </wsdl:message>
  <wsdl:message name="{resp}">
    <wsdl:part element="tns:{resp}" name="{resp}"/>
  </wsdl:message>
  <wsdl:portType name="TranslatorPort">
    <wsdl:operation name="GetTranslation">
      <wsdl:input message="tns:{req}" name="{req}"/>
      <wsdl:output message="tns:{resp}" name="{resp}"/>
    </wsdl:operation>
  </wsdl:portType>
  <wsdl:binding name="TranslatorPortSoap11" type="tns:TranslatorPort">
    <soap:binding style="document" transport="http://schemas.xmlsoap.org/soap/http"/>
    <wsdl:operation name="GetTranslation">
      <soap:operation soapAction=""/>
      <wsdl:input name="{req}">
        <soap:body use="literal"/>
      </wsdl:input>
      <wsdl:output name="{resp}">
        <soap:body use="literal"/>
      </wsdl:output>
    </wsdl:operation>
  </wsdl:binding>
  <wsdl:service name="TranslatorPortService">
    <wsdl:port binding="tns:TranslatorPortSoap11" name="TranslatorPortSoap11">
      <soap:address location="{location}"/>
    </wsdl:port>
  </wsdl:service>
</wsdl:definitions>
"#,
        ns = TRANSLATOR_NS,
        req = GET_TRANSLATION_REQUEST,
        resp = GET_TRANSLATION_RESPONSE,
        location = escape(location),
    )
}
