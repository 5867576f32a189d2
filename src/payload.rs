//! The provisioning protocol payloads and their XML form.
//!
//! A payload travels as the signed content of a provisioning CMS object.
//! It is an XML `<message/>` document in the protocol namespace whose
//! `type` attribute selects one of seven bodies: a resource class list
//! exchange, a certificate issuance exchange, a key revocation exchange,
//! or an error report. The [`Message`] type wraps the common header and
//! the [`Payload`] sum type carries the variant.
//!
//! Emission is canonical: the same payload value always renders to the
//! same bytes. See [`crate::xml::encode`] for the textual conventions.

use std::{fmt, io};
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use crate::cert::Cert;
use crate::crypto::{KeyIdentifier, PublicKey};
use crate::resources::{
    RequestResourceLimit, ResourceBlocks, ResourceSet,
};
use crate::x509::Time;
use crate::xml;
use crate::xml::decode::{
    Content, Error as XmlError, Name as XmlName, Reader,
};
use crate::xml::encode;

// Constants for the protocol XML.
const VERSION: &str = "1";
const NS: &[u8] = b"http://www.apnic.net/specs/rescerts/up-down/";
const NS_STR: &str = "http://www.apnic.net/specs/rescerts/up-down/";

/// Content-type for HTTP(s) exchanges.
pub const CONTENT_TYPE: &str = "application/rpki-updown";


//------------ Message -------------------------------------------------------

/// A full provisioning protocol message.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Message {
    sender: String,
    recipient: String,
    payload: Payload,
}

/// # Data Access
///
impl Message {
    pub fn unpack(self) -> (String, String, Payload) {
        (self.sender, self.recipient, self.payload)
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn payload_type(&self) -> PayloadType {
        self.payload.payload_type()
    }
}

/// # Constructing
///
impl Message {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Message {
            sender: sender.into(),
            recipient: recipient.into(),
            payload,
        }
    }

    /// Creates a resource class list query.
    pub fn list(
        sender: impl Into<String>, recipient: impl Into<String>
    ) -> Self {
        Self::new(sender, recipient, Payload::List)
    }

    /// Creates a resource class list response.
    pub fn list_response(
        sender: impl Into<String>, recipient: impl Into<String>,
        class: ResourceClass,
    ) -> Self {
        Self::new(sender, recipient, Payload::ListResponse(class))
    }

    /// Creates a certificate issuance request.
    pub fn issue(
        sender: impl Into<String>, recipient: impl Into<String>,
        request: IssuanceRequest,
    ) -> Self {
        Self::new(sender, recipient, Payload::Issue(request))
    }

    /// Creates a certificate issuance response.
    pub fn issue_response(
        sender: impl Into<String>, recipient: impl Into<String>,
        class: ResourceClass,
    ) -> Self {
        Self::new(sender, recipient, Payload::IssueResponse(class))
    }

    /// Creates a certificate revocation request.
    pub fn revoke(
        sender: impl Into<String>, recipient: impl Into<String>,
        request: RevocationRequest,
    ) -> Self {
        Self::new(sender, recipient, Payload::Revoke(request))
    }

    /// Creates a certificate revocation response.
    pub fn revoke_response(
        sender: impl Into<String>, recipient: impl Into<String>,
        response: RevocationResponse,
    ) -> Self {
        Self::new(sender, recipient, Payload::RevokeResponse(response))
    }

    /// Creates a request-not-performed response.
    pub fn not_performed_response(
        sender: impl Into<String>, recipient: impl Into<String>,
        response: NotPerformedResponse,
    ) -> Self {
        Self::new(sender, recipient, Payload::ErrorResponse(response))
    }
}

/// # Encoding to XML
///
impl Message {
    /// Writes the message’s canonical XML representation.
    pub fn write_xml(
        &self, writer: &mut impl io::Write
    ) -> Result<(), io::Error> {
        let mut writer = xml::encode::Writer::new(writer);
        writer.element("message")?
            .attr("xmlns", &NS_STR)?
            .attr("recipient", &self.recipient)?
            .attr("sender", &self.sender)?
            .attr("type", &self.payload.payload_type())?
            .attr("version", &VERSION)?
            .content(|content| self.payload.write_xml(content))?;
        writer.done()
    }

    /// Writes the message’s XML representation to a new string.
    pub fn to_xml_string(&self) -> String {
        String::from_utf8(self.to_xml_bytes().to_vec())
            .unwrap() // the writer only emits UTF-8
    }

    /// Writes the message’s XML representation to new bytes.
    pub fn to_xml_bytes(&self) -> Bytes {
        let mut vec = Vec::new();
        self.write_xml(&mut vec)
            .unwrap(); // writing to a Vec can’t fail
        Bytes::from(vec)
    }
}

/// # Decoding from XML
///
impl Message {
    /// Parses a provisioning protocol `<message/>`.
    pub fn decode<R: io::BufRead>(reader: R) -> Result<Self, Error> {
        let mut reader = Reader::new(reader);

        let mut version: Option<String> = None;
        let mut sender: Option<String> = None;
        let mut recipient: Option<String> = None;
        let mut payload_type: Option<String> = None;

        let mut outer = reader.start(|element| {
            element.verify_name(XmlName::qualified(NS, b"message"))?;
            element.attributes(|name, value| match name {
                b"version" => {
                    version = Some(value.ascii_into()?);
                    Ok(())
                }
                b"sender" => {
                    sender = Some(value.ascii_into()?);
                    Ok(())
                }
                b"recipient" => {
                    recipient = Some(value.ascii_into()?);
                    Ok(())
                }
                b"type" => {
                    payload_type = Some(value.ascii_into()?);
                    Ok(())
                }
                _ => Err(XmlError::Malformed),
            })
        })?;

        // All four attributes are required.
        if version.ok_or(XmlError::Malformed)? != VERSION {
            return Err(Error::InvalidVersion)
        }
        let sender = sender.ok_or(XmlError::Malformed)?;
        let recipient = recipient.ok_or(XmlError::Malformed)?;
        let payload_type = PayloadType::from_str(
            &payload_type.ok_or(XmlError::Malformed)?
        )?;

        let payload = Payload::decode(payload_type, &mut outer, &mut reader)?;

        // Check that there is no additional stuff.
        outer.take_end(&mut reader)?;
        reader.end()?;

        Ok(Message { sender, recipient, payload })
    }
}


//------------ Payload -------------------------------------------------------

/// The body of a provisioning message.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[allow(clippy::large_enum_variant)]
pub enum Payload {
    List,
    ListResponse(ResourceClass),
    Issue(IssuanceRequest),
    IssueResponse(ResourceClass),
    Revoke(RevocationRequest),
    RevokeResponse(RevocationResponse),
    ErrorResponse(NotPerformedResponse),
}

impl Payload {
    /// Value for the type attribute in the `<message/>` element.
    pub fn payload_type(&self) -> PayloadType {
        match self {
            Payload::List => PayloadType::List,
            Payload::ListResponse(_) => PayloadType::ListResponse,
            Payload::Issue(_) => PayloadType::Issue,
            Payload::IssueResponse(_) => PayloadType::IssueResponse,
            Payload::Revoke(_) => PayloadType::Revoke,
            Payload::RevokeResponse(_) => PayloadType::RevokeResponse,
            Payload::ErrorResponse(_) => PayloadType::ErrorResponse,
        }
    }

    /// Decodes the nested payload.
    ///
    /// Needs to be given the value of the `type` attribute from the outer
    /// `<message/>` element so it can delegate to the proper variant.
    fn decode<R: io::BufRead>(
        payload_type: PayloadType,
        content: &mut Content,
        reader: &mut Reader<R>,
    ) -> Result<Self, Error> {
        match payload_type {
            PayloadType::List => Ok(Payload::List),
            PayloadType::ListResponse => {
                ResourceClass::decode(content, reader)
                    .map(Payload::ListResponse)
            }
            PayloadType::Issue => {
                IssuanceRequest::decode(content, reader).map(Payload::Issue)
            }
            PayloadType::IssueResponse => {
                ResourceClass::decode(content, reader)
                    .map(Payload::IssueResponse)
            }
            PayloadType::Revoke => {
                RevocationRequest::decode(content, reader)
                    .map(Payload::Revoke)
            }
            PayloadType::RevokeResponse => {
                RevocationResponse::decode(content, reader)
                    .map(Payload::RevokeResponse)
            }
            PayloadType::ErrorResponse => {
                NotPerformedResponse::decode(content, reader)
                    .map(Payload::ErrorResponse)
            }
        }
    }

    /// Encodes the payload content.
    fn write_xml<W: io::Write>(
        &self, content: &mut encode::Content<W>
    ) -> Result<(), io::Error> {
        match self {
            Payload::List => Ok(()), // nothing to write
            Payload::ListResponse(class) => class.write_xml(content),
            Payload::Issue(request) => request.write_xml(content),
            Payload::IssueResponse(class) => class.write_xml(content),
            Payload::Revoke(request) => request.write_xml(content),
            Payload::RevokeResponse(response) => response.write_xml(content),
            Payload::ErrorResponse(response) => response.write_xml(content),
        }
    }
}


//------------ PayloadType ---------------------------------------------------

/// The type of a payload for contexts where only the type matters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayloadType {
    List,
    ListResponse,
    Issue,
    IssueResponse,
    Revoke,
    RevokeResponse,
    ErrorResponse,
}

impl AsRef<str> for PayloadType {
    fn as_ref(&self) -> &str {
        match self {
            PayloadType::List => "list",
            PayloadType::ListResponse => "list_response",
            PayloadType::Issue => "issue",
            PayloadType::IssueResponse => "issue_response",
            PayloadType::Revoke => "revoke",
            PayloadType::RevokeResponse => "revoke_response",
            PayloadType::ErrorResponse => "error_response",
        }
    }
}

impl FromStr for PayloadType {
    type Err = PayloadTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(PayloadType::List),
            "list_response" => Ok(PayloadType::ListResponse),
            "issue" => Ok(PayloadType::Issue),
            "issue_response" => Ok(PayloadType::IssueResponse),
            "revoke" => Ok(PayloadType::Revoke),
            "revoke_response" => Ok(PayloadType::RevokeResponse),
            "error_response" => Ok(PayloadType::ErrorResponse),
            _ => Err(PayloadTypeError(s.to_string())),
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}


//------------ PayloadTypeError ----------------------------------------------

/// The type attribute was not one of the seven defined values.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PayloadTypeError(String);

impl fmt::Display for PayloadTypeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid payload type: {}", self.0)
    }
}

impl std::error::Error for PayloadTypeError { }


//------------ ResourceClassName ---------------------------------------------

/// The name of a resource class.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub struct ResourceClassName {
    name: Arc<str>,
}

impl AsRef<str> for ResourceClassName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl From<u32> for ResourceClassName {
    fn from(nr: u32) -> ResourceClassName {
        ResourceClassName { name: nr.to_string().into() }
    }
}

impl From<&str> for ResourceClassName {
    fn from(s: &str) -> ResourceClassName {
        ResourceClassName { name: s.into() }
    }
}

impl From<String> for ResourceClassName {
    fn from(s: String) -> ResourceClassName {
        ResourceClassName { name: s.into() }
    }
}

impl FromStr for ResourceClassName {
    type Err = (); // can’t fail, provided for convenience

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ResourceClassName::from(s))
    }
}

impl fmt::Display for ResourceClassName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

//--- Serialize and Deserialize

impl Serialize for ResourceClassName {
    fn serialize<S: Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        self.name.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceClassName {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D
    ) -> Result<ResourceClassName, D::Error> {
        Ok(ResourceClassName::from(String::deserialize(deserializer)?))
    }
}


//------------ CertUrls ------------------------------------------------------

/// One or more certificate publication URIs.
///
/// The `cert_url` attributes carry a comma-separated list of URIs under
/// which a certificate is or will be published, e.g., an rsync URI and
/// an HTTPS one. The URIs themselves are kept opaque.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CertUrls(Vec<String>);

impl CertUrls {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for CertUrls {
    type Err = CertUrlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut urls = Vec::new();
        for url in s.split(',') {
            if url.is_empty()
                || !url.bytes().all(|ch| ch.is_ascii_graphic() && ch != b'"')
            {
                return Err(CertUrlsError)
            }
            urls.push(url.into())
        }
        Ok(CertUrls(urls))
    }
}

impl fmt::Display for CertUrls {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for url in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(url)?;
            first = false;
        }
        Ok(())
    }
}

//--- Serialize and Deserialize

impl Serialize for CertUrls {
    fn serialize<S: Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CertUrls {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D
    ) -> Result<CertUrls, D::Error> {
        let string = String::deserialize(deserializer)?;
        CertUrls::from_str(&string).map_err(serde::de::Error::custom)
    }
}


//------------ CertUrlsError -------------------------------------------------

/// A `cert_url` attribute was not a comma-separated list of URIs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CertUrlsError;

impl fmt::Display for CertUrlsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid certificate URL list")
    }
}

impl std::error::Error for CertUrlsError { }


//------------ ResourceClass -------------------------------------------------

/// The resource class element of a list or issuance response.
///
/// Describes one class of resources the issuing CA makes available: the
/// class name, where the CA’s own certificate lives, the resources, the
/// expiry of the described entitlement, the certificates currently
/// issued to the receiving CA within the class, and optionally the CA
/// certificate itself in a trailing `<issuer>` element.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResourceClass {
    class_name: ResourceClassName,
    cert_urls: CertUrls,
    resource_set: ResourceSet,
    not_after: Time,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    suggested_sia_head: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    issued_certs: Vec<IssuedCert>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issuer: Option<Cert>,
}

/// # Data and Access
///
impl ResourceClass {
    pub fn new(
        class_name: ResourceClassName,
        cert_urls: CertUrls,
        resource_set: ResourceSet,
        not_after: Time,
    ) -> Self {
        ResourceClass {
            class_name,
            cert_urls,
            resource_set,
            not_after,
            suggested_sia_head: None,
            issued_certs: Vec::new(),
            issuer: None,
        }
    }

    pub fn with_suggested_sia_head(mut self, head: String) -> Self {
        self.suggested_sia_head = Some(head);
        self
    }

    pub fn with_issued_cert(mut self, issued: IssuedCert) -> Self {
        self.issued_certs.push(issued);
        self
    }

    pub fn with_issuer(mut self, issuer: Cert) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn class_name(&self) -> &ResourceClassName {
        &self.class_name
    }

    pub fn cert_urls(&self) -> &CertUrls {
        &self.cert_urls
    }

    pub fn resource_set(&self) -> &ResourceSet {
        &self.resource_set
    }

    pub fn not_after(&self) -> Time {
        self.not_after
    }

    pub fn suggested_sia_head(&self) -> Option<&str> {
        self.suggested_sia_head.as_deref()
    }

    pub fn issued_certs(&self) -> &[IssuedCert] {
        &self.issued_certs
    }

    pub fn issuer(&self) -> Option<&Cert> {
        self.issuer.as_ref()
    }
}

/// # Decoding from XML
///
impl ResourceClass {
    /// Decodes the single `<class/>` element of a response.
    fn decode<R: io::BufRead>(
        content: &mut Content,
        reader: &mut Reader<R>,
    ) -> Result<Self, Error> {
        let mut class_name: Option<ResourceClassName> = None;
        let mut cert_urls: Option<CertUrls> = None;
        let mut resource_set = ResourceSet::default();
        let mut not_after: Option<Time> = None;
        let mut suggested_sia_head: Option<String> = None;

        let mut class_element = content.take_element(reader, |element| {
            element.verify_name(XmlName::qualified(NS, b"class"))?;
            element.attributes(|name, value| match name {
                b"class_name" => {
                    class_name = Some(value.ascii_into()?);
                    Ok(())
                }
                b"cert_url" => {
                    cert_urls = Some(value.ascii_into()?);
                    Ok(())
                }
                b"resource_set_as" => {
                    resource_set.set_asn(value.ascii_into()?);
                    Ok(())
                }
                b"resource_set_ipv4" => {
                    resource_set.set_ipv4(value.ascii_into()?);
                    Ok(())
                }
                b"resource_set_ipv6" => {
                    resource_set.set_ipv6(value.ascii_into()?);
                    Ok(())
                }
                b"resource_set_notafter" => {
                    not_after = Some(value.ascii_into()?);
                    Ok(())
                }
                b"suggested_sia_head" => {
                    suggested_sia_head = Some(value.ascii_into()?);
                    Ok(())
                }
                _ => Err(XmlError::Malformed),
            })
        })?;

        // Make sure all required attributes were present.
        let class_name = class_name.ok_or(XmlError::Malformed)?;
        let cert_urls = cert_urls.ok_or(XmlError::Malformed)?;
        let not_after = not_after.ok_or(XmlError::Malformed)?;

        // Zero or more issued certificates follow, with the issuer
        // certificate last. Peers aren’t entirely reliable about the
        // order, so accept either element until the class ends.
        let mut issued_certs: Vec<IssuedCert> = Vec::new();
        let mut issuer: Option<Cert> = None;

        loop {
            let mut was_issuer = false;
            let mut urls: Option<CertUrls> = None;
            let mut req_limit = RequestResourceLimit::default();

            let cert_element = class_element.take_opt_element(
                reader,
                |element| match element.name().local() {
                    b"certificate"
                        if element.name().namespace() == Some(NS) =>
                    {
                        element.attributes(|name, value| match name {
                            b"cert_url" => {
                                urls = Some(value.ascii_into()?);
                                Ok(())
                            }
                            b"req_resource_set_as" => {
                                req_limit.with_asn(value.ascii_into()?);
                                Ok(())
                            }
                            b"req_resource_set_ipv4" => {
                                req_limit.with_ipv4(value.ascii_into()?);
                                Ok(())
                            }
                            b"req_resource_set_ipv6" => {
                                req_limit.with_ipv6(value.ascii_into()?);
                                Ok(())
                            }
                            _ => Err(XmlError::Malformed),
                        })
                    }
                    b"issuer" if element.name().namespace() == Some(NS) => {
                        was_issuer = true;
                        Ok(())
                    }
                    _ => Err(XmlError::Malformed),
                }
            )?;

            let mut cert_element = match cert_element {
                Some(element) => element,
                None => break,
            };

            // Either way there is a Base64 certificate inside.
            let bytes = cert_element.take_text(
                reader, |text| text.base64_decode()
            )?;
            let cert = Cert::decode(Bytes::from(bytes)).map_err(|err| {
                Error::CertSyntax(err.to_string())
            })?;

            if was_issuer {
                if issuer.is_some() {
                    return Err(Error::XmlError(XmlError::Malformed))
                }
                issuer = Some(cert);
            }
            else {
                issued_certs.push(IssuedCert {
                    cert_urls: urls.ok_or(XmlError::Malformed)?,
                    req_limit,
                    cert,
                });
            }

            cert_element.take_end(reader)?;
        }

        class_element.take_end(reader)?;

        Ok(ResourceClass {
            class_name,
            cert_urls,
            resource_set,
            not_after,
            suggested_sia_head,
            issued_certs,
            issuer,
        })
    }
}

/// # Encoding to XML
///
impl ResourceClass {
    fn write_xml<W: io::Write>(
        &self, content: &mut encode::Content<W>
    ) -> Result<(), io::Error> {
        content.element("class")?
            .attr("cert_url", &self.cert_urls)?
            .attr("class_name", &self.class_name)?
            .attr_opt("resource_set_as", self.resource_set.asn_opt())?
            .attr_opt("resource_set_ipv4", self.resource_set.ipv4_opt())?
            .attr_opt("resource_set_ipv6", self.resource_set.ipv6_opt())?
            .attr("resource_set_notafter", &self.not_after)?
            .attr_opt(
                "suggested_sia_head", self.suggested_sia_head.as_ref()
            )?
            .content(|content| {
                for issued in &self.issued_certs {
                    issued.write_xml(content)?;
                }
                if let Some(issuer) = &self.issuer {
                    content.element("issuer")?.content(|content| {
                        content.base64(issuer.to_captured().as_slice())
                    })?;
                }
                Ok(())
            })
    }
}


//------------ IssuedCert ----------------------------------------------------

/// A certificate issued to the receiving CA within a resource class.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IssuedCert {
    cert_urls: CertUrls,
    #[serde(default, skip_serializing_if = "RequestResourceLimit::is_empty")]
    req_limit: RequestResourceLimit,
    cert: Cert,
}

impl IssuedCert {
    pub fn new(
        cert_urls: CertUrls, req_limit: RequestResourceLimit, cert: Cert
    ) -> Self {
        IssuedCert { cert_urls, req_limit, cert }
    }

    pub fn unpack(self) -> (CertUrls, RequestResourceLimit, Cert) {
        (self.cert_urls, self.req_limit, self.cert)
    }

    pub fn cert_urls(&self) -> &CertUrls {
        &self.cert_urls
    }

    pub fn req_limit(&self) -> &RequestResourceLimit {
        &self.req_limit
    }

    pub fn cert(&self) -> &Cert {
        &self.cert
    }

    fn write_xml<W: io::Write>(
        &self, content: &mut encode::Content<W>
    ) -> Result<(), io::Error> {
        content.element("certificate")?
            .attr("cert_url", &self.cert_urls)?
            .attr_opt("req_resource_set_as", self.req_limit.asn())?
            .attr_opt("req_resource_set_ipv4", self.req_limit.ipv4())?
            .attr_opt("req_resource_set_ipv6", self.req_limit.ipv6())?
            .content(|content| {
                content.base64(self.cert.to_captured().as_slice())
            })
    }
}


//------------ IssuanceRequest -----------------------------------------------

/// The content of a certificate issuance request.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IssuanceRequest {
    class_name: ResourceClassName,
    #[serde(default, skip_serializing_if = "RequestResourceLimit::is_empty")]
    limit: RequestResourceLimit,
    #[serde(
        deserialize_with = "deserialize_base64",
        serialize_with = "serialize_base64",
    )]
    csr: Bytes,
}

/// # Data
///
impl IssuanceRequest {
    /// Creates a new issuance request.
    ///
    /// The certificate request is carried as its raw DER encoding;
    /// creating and interpreting PKCS #10 structures is the business of
    /// the certificate machinery, not the payload codec.
    pub fn new(
        class_name: ResourceClassName,
        limit: RequestResourceLimit,
        csr: Bytes,
    ) -> Self {
        IssuanceRequest { class_name, limit, csr }
    }

    pub fn unpack(self) -> (ResourceClassName, RequestResourceLimit, Bytes) {
        (self.class_name, self.limit, self.csr)
    }

    pub fn class_name(&self) -> &ResourceClassName {
        &self.class_name
    }

    pub fn limit(&self) -> &RequestResourceLimit {
        &self.limit
    }

    pub fn csr(&self) -> &Bytes {
        &self.csr
    }
}

/// # XML Support
///
impl IssuanceRequest {
    /// Decodes an issue request.
    ///
    /// Requests have the following format, with the `req_*` attributes
    /// optional:
    ///
    /// ```text
    /// <request
    ///    class_name="class name"
    ///    req_resource_set_as="as resource set"
    ///    req_resource_set_ipv4="ipv4 resource set"
    ///    req_resource_set_ipv6="ipv6 resource set">
    ///    [certificate request]
    /// </request>
    /// ```
    fn decode<R: io::BufRead>(
        content: &mut Content,
        reader: &mut Reader<R>,
    ) -> Result<Self, Error> {
        let mut class_name: Option<ResourceClassName> = None;
        let mut limit = RequestResourceLimit::default();

        let mut request_element = content.take_element(reader, |element| {
            element.verify_name(XmlName::qualified(NS, b"request"))?;
            element.attributes(|name, value| match name {
                b"class_name" => {
                    class_name = Some(value.ascii_into()?);
                    Ok(())
                }
                b"req_resource_set_as" => {
                    limit.with_asn(value.ascii_into()?);
                    Ok(())
                }
                b"req_resource_set_ipv4" => {
                    limit.with_ipv4(value.ascii_into()?);
                    Ok(())
                }
                b"req_resource_set_ipv6" => {
                    limit.with_ipv6(value.ascii_into()?);
                    Ok(())
                }
                _ => Err(XmlError::Malformed),
            })
        })?;

        let class_name = class_name.ok_or(XmlError::Malformed)?;
        let csr = request_element.take_text(
            reader, |text| text.base64_decode()
        )?;
        request_element.take_end(reader)?;

        Ok(IssuanceRequest {
            class_name,
            limit,
            csr: Bytes::from(csr),
        })
    }

    fn write_xml<W: io::Write>(
        &self, content: &mut encode::Content<W>
    ) -> Result<(), io::Error> {
        content.element("request")?
            .attr("class_name", &self.class_name)?
            .attr_opt("req_resource_set_as", self.limit.asn())?
            .attr_opt("req_resource_set_ipv4", self.limit.ipv4())?
            .attr_opt("req_resource_set_ipv6", self.limit.ipv6())?
            .content(|content| content.base64(self.csr.as_ref()))
    }
}


//------------ RevocationRequest ---------------------------------------------

/// A certificate revocation request.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct RevocationRequest(KeyElement);

impl RevocationRequest {
    pub fn new(class_name: ResourceClassName, key: KeyIdentifier) -> Self {
        RevocationRequest(KeyElement { class_name, key })
    }

    /// Creates a request to revoke the given public key.
    pub fn from_key(class_name: ResourceClassName, key: &PublicKey) -> Self {
        Self::new(class_name, key.key_identifier())
    }

    pub fn unpack(self) -> (ResourceClassName, KeyIdentifier) {
        (self.0.class_name, self.0.key)
    }

    fn decode<R: io::BufRead>(
        content: &mut Content,
        reader: &mut Reader<R>,
    ) -> Result<Self, Error> {
        KeyElement::decode(content, reader).map(RevocationRequest)
    }

    fn write_xml<W: io::Write>(
        &self, content: &mut encode::Content<W>
    ) -> Result<(), io::Error> {
        self.0.write_xml(content)
    }
}

impl Deref for RevocationRequest {
    type Target = KeyElement;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}


//------------ RevocationResponse --------------------------------------------

/// A certificate revocation response.
///
/// Carries the very same `<key/>` element as the request it confirms.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct RevocationResponse(KeyElement);

impl RevocationResponse {
    pub fn new(class_name: ResourceClassName, key: KeyIdentifier) -> Self {
        RevocationResponse(KeyElement { class_name, key })
    }

    fn decode<R: io::BufRead>(
        content: &mut Content,
        reader: &mut Reader<R>,
    ) -> Result<Self, Error> {
        KeyElement::decode(content, reader).map(RevocationResponse)
    }

    fn write_xml<W: io::Write>(
        &self, content: &mut encode::Content<W>
    ) -> Result<(), io::Error> {
        self.0.write_xml(content)
    }
}

impl Deref for RevocationResponse {
    type Target = KeyElement;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&RevocationRequest> for RevocationResponse {
    fn from(request: &RevocationRequest) -> Self {
        RevocationResponse(request.0.clone())
    }
}


//------------ KeyElement ----------------------------------------------------

/// The `<key/>` element shared by revocation requests and responses.
///
/// ```text
/// <key class_name="class name"
///      ski="[encoded hash of the subject public key]" />
/// ```
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct KeyElement {
    class_name: ResourceClassName,
    key: KeyIdentifier,
}

impl KeyElement {
    pub fn class_name(&self) -> &ResourceClassName {
        &self.class_name
    }

    pub fn key(&self) -> &KeyIdentifier {
        &self.key
    }

    fn decode<R: io::BufRead>(
        content: &mut Content,
        reader: &mut Reader<R>,
    ) -> Result<Self, Error> {
        let mut class_name = None;
        let mut key = None;

        let mut key_element = content.take_element(reader, |element| {
            element.verify_name(XmlName::qualified(NS, b"key"))?;
            element.attributes(|name, value| match name {
                b"class_name" => {
                    class_name = Some(value.ascii_into()?);
                    Ok(())
                }
                b"ski" => {
                    let encoded: String = value.ascii_into()?;
                    key = Some(
                        KeyIdentifier::from_encoded_str(&encoded)
                            .map_err(|_| XmlError::Malformed)?
                    );
                    Ok(())
                }
                _ => Err(XmlError::Malformed),
            })
        })?;

        let class_name = class_name.ok_or(XmlError::Malformed)?;
        let key = key.ok_or(XmlError::Malformed)?;
        key_element.take_end(reader)?;

        Ok(KeyElement { class_name, key })
    }

    fn write_xml<W: io::Write>(
        &self, content: &mut encode::Content<W>
    ) -> Result<(), io::Error> {
        content.element("key")?
            .attr("class_name", &self.class_name)?
            .attr("ski", &self.key.to_encoded_string())?
            .finish()
    }
}

impl fmt::Display for KeyElement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "class name '{}' key '{}'", self.class_name, self.key)
    }
}


//------------ NotPerformedResponse ------------------------------------------

/// A request-not-performed response.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NotPerformedResponse {
    status: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    descriptions: Vec<Description>,
}

impl NotPerformedResponse {
    pub fn status(&self) -> u64 {
        self.status
    }

    pub fn descriptions(&self) -> &[Description] {
        &self.descriptions
    }

    /// Private. Use the public `err_*` functions instead!
    fn new(status: u64, text: &str) -> Self {
        NotPerformedResponse {
            status,
            descriptions: vec![Description {
                lang: None,
                text: text.to_string(),
            }],
        }
    }

    /// Adds a description in the given language.
    pub fn with_description(
        mut self, lang: Option<&str>, text: &str
    ) -> Self {
        self.descriptions.push(Description {
            lang: lang.map(String::from),
            text: text.to_string(),
        });
        self
    }

    /// Already processing request.
    pub fn err_1101() -> Self {
        Self::new(1101, "already processing request")
    }

    /// Version number error.
    pub fn err_1102() -> Self {
        Self::new(1102, "version number error")
    }

    /// Unrecognized request type.
    pub fn err_1103() -> Self {
        Self::new(1103, "unrecognized request type")
    }

    /// Request scheduled for processing.
    pub fn err_1104() -> Self {
        Self::new(1104, "request scheduled for processing")
    }

    /// No such resource class.
    pub fn err_1201() -> Self {
        Self::new(1201, "request - no such resource class")
    }

    /// No resources allocated in resource class.
    pub fn err_1202() -> Self {
        Self::new(1202, "request - no resources allocated in resource class")
    }

    /// Badly formed certificate request.
    pub fn err_1203() -> Self {
        Self::new(1203, "request - badly formed certificate request")
    }

    /// Key re-use detected.
    pub fn err_1204() -> Self {
        Self::new(1204, "request - already used key in request")
    }

    /// No such resource class.
    pub fn err_1301() -> Self {
        Self::new(1301, "revoke - no such resource class")
    }

    /// No such key.
    pub fn err_1302() -> Self {
        Self::new(1302, "revoke - no such key")
    }

    /// Internal server error.
    pub fn err_2001() -> Self {
        Self::new(2001, "Internal Server Error - Request not performed")
    }

    /// Decodes a request-not-performed response.
    ///
    /// The format of the content is:
    ///
    /// ```text
    /// <status>[code]</status>
    /// <description xml:lang="en-US">[readable text]</description>
    /// ```
    ///
    /// with the description optional and repeatable per language.
    fn decode<R: io::BufRead>(
        content: &mut Content,
        reader: &mut Reader<R>,
    ) -> Result<Self, Error> {
        let mut status_element = content.take_element(reader, |element| {
            element.verify_name(XmlName::qualified(NS, b"status"))
        })?;
        let status = status_element.take_text(
            reader, |text| text.ascii_into::<u64>()
        )?;
        status_element.take_end(reader)?;

        let mut descriptions = Vec::new();
        loop {
            let mut lang = None;
            let element = content.take_opt_element(reader, |element| {
                element.verify_name(
                    XmlName::qualified(NS, b"description")
                )?;
                element.attributes(|name, value| match name {
                    b"xml:lang" => {
                        lang = Some(value.ascii_into()?);
                        Ok(())
                    }
                    _ => Err(XmlError::Malformed),
                })
            })?;
            let mut element = match element {
                Some(element) => element,
                None => break,
            };
            let text = element.take_text(
                reader, |text| text.to_ascii().map(|s| s.to_string())
            )?;
            element.take_end(reader)?;
            descriptions.push(Description { lang, text });
        }

        Ok(NotPerformedResponse { status, descriptions })
    }

    fn write_xml<W: io::Write>(
        &self, content: &mut encode::Content<W>
    ) -> Result<(), io::Error> {
        content.element("status")?
            .content(|status| status.raw(&self.status.to_string()))?;
        for description in &self.descriptions {
            let element = content.element("description")?;
            let element = match &description.lang {
                Some(lang) => element.attr("xml:lang", lang)?,
                None => element,
            };
            element.content(|content| content.raw(&description.text))?;
        }
        Ok(())
    }
}

impl fmt::Display for NotPerformedResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.descriptions.first() {
            None => write!(f, "{}", self.status),
            Some(description) => {
                write!(f, "{} - {}", self.status, description.text)
            }
        }
    }
}


//------------ Description ---------------------------------------------------

/// A human-readable description in one language.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Description {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lang: Option<String>,
    text: String,
}

impl Description {
    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}


//------------ Base64 serde helpers ------------------------------------------

fn serialize_base64<S: Serializer>(
    bytes: &Bytes, serializer: S
) -> Result<S::Ok, S::Error> {
    base64::encode(bytes.as_ref()).serialize(serializer)
}

fn deserialize_base64<'de, D: Deserializer<'de>>(
    deserializer: D
) -> Result<Bytes, D::Error> {
    let string = String::deserialize(deserializer)?;
    base64::decode(&string)
        .map(Bytes::from)
        .map_err(serde::de::Error::custom)
}


//------------ Error ---------------------------------------------------------

/// An error happened while decoding a payload.
#[derive(Debug)]
pub enum Error {
    /// The protocol version was not 1.
    InvalidVersion,

    /// The XML was malformed or did not follow the schema.
    XmlError(XmlError),

    /// The type attribute was not one of the defined values.
    InvalidPayloadType(PayloadTypeError),

    /// A certificate body could not be decoded.
    CertSyntax(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidVersion => {
                write!(f, "invalid protocol version, MUST be 1")
            }
            Error::XmlError(err) => err.fmt(f),
            Error::InvalidPayloadType(err) => err.fmt(f),
            Error::CertSyntax(msg) => {
                write!(f, "could not decode certificate: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error { }

impl From<XmlError> for Error {
    fn from(err: XmlError) -> Self {
        Error::XmlError(err)
    }
}

impl From<PayloadTypeError> for Error {
    fn from(err: PayloadTypeError) -> Self {
        Error::InvalidPayloadType(err)
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Re-encode the message to XML, parse it, and compare.
    fn assert_re_encode_equals(msg: Message) {
        let xml = msg.to_xml_string();
        let re_decoded = Message::decode(xml.as_bytes()).unwrap();
        assert_eq!(msg, re_decoded);
    }

    fn test_key() -> KeyIdentifier {
        let mut bytes = [0u8; 20];
        for (pos, item) in bytes.iter_mut().enumerate() {
            *item = pos as u8;
        }
        KeyIdentifier::try_from(bytes.as_ref()).unwrap()
    }

    #[test]
    fn canonical_list_request() {
        let msg = Message::list("sender", "recipient");
        assert_eq!(
            msg.to_xml_string(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <message \
             xmlns=\"http://www.apnic.net/specs/rescerts/up-down/\" \
             recipient=\"recipient\" sender=\"sender\" type=\"list\" \
             version=\"1\"/>\n"
        );
    }

    #[test]
    fn canonical_revoke_request() {
        let msg = Message::revoke(
            "sender", "recipient",
            RevocationRequest::new("a classname".into(), test_key()),
        );
        assert_eq!(
            msg.to_xml_string(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <message \
             xmlns=\"http://www.apnic.net/specs/rescerts/up-down/\" \
             recipient=\"recipient\" sender=\"sender\" type=\"revoke\" \
             version=\"1\">\n   \
             <key class_name=\"a classname\" \
             ski=\"AAECAwQFBgcICQoLDA0ODxAREhM\"/>\n\
             </message>\n"
        );
    }

    #[test]
    fn parse_and_encode_list() {
        assert_re_encode_equals(Message::list("child", "parent"));
    }

    #[test]
    fn parse_and_encode_issue() {
        let mut limit = RequestResourceLimit::default();
        limit.with_asn("AS1,AS2".parse().unwrap());
        let request = IssuanceRequest::new(
            "a classname".into(),
            limit,
            Bytes::from_static(b"\x30\x03\x02\x01\x00"),
        );
        assert_re_encode_equals(Message::issue("child", "parent", request));
    }

    #[test]
    fn parse_and_encode_revoke() {
        let msg = Message::revoke(
            "child", "parent",
            RevocationRequest::new("RC-1".into(), test_key()),
        );
        assert_re_encode_equals(msg);
    }

    #[test]
    fn parse_and_encode_revoke_response() {
        let msg = Message::revoke_response(
            "parent", "child",
            RevocationResponse::new("RC-1".into(), test_key()),
        );
        assert_re_encode_equals(msg);
    }

    #[test]
    fn parse_and_encode_not_performed_response() {
        let msg = Message::not_performed_response(
            "parent", "child", NotPerformedResponse::err_1201()
        );
        assert_re_encode_equals(msg);

        let msg = Message::not_performed_response(
            "parent", "child",
            NotPerformedResponse::err_2001()
                .with_description(Some("de-DE"), "es ist kaputt"),
        );
        assert_re_encode_equals(msg);
    }

    #[test]
    fn not_performed_status_codes() {
        assert_eq!(NotPerformedResponse::err_1101().status(), 1101);
        assert_eq!(NotPerformedResponse::err_1204().status(), 1204);
        assert_eq!(NotPerformedResponse::err_1302().status(), 1302);
        assert_eq!(NotPerformedResponse::err_2001().status(), 2001);
    }

    #[test]
    fn accepts_whitespace_variants() {
        let xml = concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<message\n",
            "     xmlns=\"http://www.apnic.net/specs/rescerts/up-down/\"\n",
            "     recipient=\"recipient\" sender=\"sender\"\n",
            "     type=\"revoke\" version=\"1\">\n",
            "  <key class_name=\"a classname\"\n",
            "       ski=\"AAECAwQFBgcICQoLDA0ODxAREhM\"/>  \n",
            "</message>",
        );
        let msg = Message::decode(xml.as_bytes()).unwrap();
        assert_eq!(msg.payload_type(), PayloadType::Revoke);
        match msg.payload() {
            Payload::Revoke(revoke) => {
                assert_eq!(revoke.class_name().as_ref(), "a classname");
                assert_eq!(*revoke.key(), test_key());
            }
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn rejects_unknown_version() {
        let xml = concat!(
            "<message ",
            "xmlns=\"http://www.apnic.net/specs/rescerts/up-down/\" ",
            "recipient=\"r\" sender=\"s\" type=\"list\" version=\"2\"/>",
        );
        assert!(matches!(
            Message::decode(xml.as_bytes()), Err(Error::InvalidVersion)
        ));
    }

    #[test]
    fn rejects_unknown_payload_type() {
        let xml = concat!(
            "<message ",
            "xmlns=\"http://www.apnic.net/specs/rescerts/up-down/\" ",
            "recipient=\"r\" sender=\"s\" type=\"bogus\" version=\"1\"/>",
        );
        assert!(matches!(
            Message::decode(xml.as_bytes()),
            Err(Error::InvalidPayloadType(_))
        ));
    }

    #[test]
    fn rejects_foreign_namespace() {
        let xml = concat!(
            "<message xmlns=\"http://example.com/other\" ",
            "recipient=\"r\" sender=\"s\" type=\"list\" version=\"1\"/>",
        );
        assert!(matches!(
            Message::decode(xml.as_bytes()), Err(Error::XmlError(_))
        ));
    }

    #[test]
    fn rejects_unknown_attribute() {
        let xml = concat!(
            "<message ",
            "xmlns=\"http://www.apnic.net/specs/rescerts/up-down/\" ",
            "recipient=\"r\" sender=\"s\" type=\"list\" version=\"1\" ",
            "color=\"red\"/>",
        );
        assert!(Message::decode(xml.as_bytes()).is_err());
    }

    #[test]
    fn rejects_unexpected_body() {
        let xml = concat!(
            "<message ",
            "xmlns=\"http://www.apnic.net/specs/rescerts/up-down/\" ",
            "recipient=\"r\" sender=\"s\" type=\"list\" version=\"1\">",
            "<key class_name=\"x\" ski=\"AAECAwQFBgcICQoLDA0ODxAREhM\"/>",
            "</message>",
        );
        assert!(Message::decode(xml.as_bytes()).is_err());
    }

    #[test]
    fn empty_resource_sets_are_absent() {
        let class = ResourceClass::new(
            "RC-0".into(),
            "rsync://repo.example/ca.cer".parse().unwrap(),
            ResourceSet::default(),
            Time::utc(2031, 1, 1, 0, 0, 0),
        );
        let msg = Message::list_response("parent", "child", class);
        let xml = msg.to_xml_string();
        assert!(!xml.contains("resource_set_as"));
        assert!(!xml.contains("resource_set_ipv4"));
        assert!(!xml.contains("resource_set_ipv6"));
        assert!(xml.contains(
            "resource_set_notafter=\"2031-01-01T00:00:00Z\""
        ));
    }

    #[test]
    fn serde_round_trip() {
        let msg = Message::revoke(
            "child", "parent",
            RevocationRequest::new("RC-1".into(), test_key()),
        );
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);

        let msg = Message::list("child", "parent");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}

#[cfg(all(test, feature = "softkeys"))]
mod signer_test {
    use super::*;
    use crate::crypto::softsigner::OpenSslSigner;
    use crate::crypto::{PublicKeyFormat, Signer};
    use crate::x509::Validity;

    fn test_certs() -> (Cert, Cert) {
        let signer = OpenSslSigner::new();
        let ca_key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let validity = Validity::new(
            Time::utc(2021, 1, 1, 0, 0, 0),
            Time::utc(2031, 1, 1, 0, 0, 0),
        );
        let ca_cert = Cert::new_ta(validity, &ca_key, &signer).unwrap();
        let ee_key =
            signer.create_key(PublicKeyFormat::default()).unwrap();
        let ee_cert = Cert::new_ee(
            &signer.get_key_info(&ee_key).unwrap(),
            validity, &ca_key, &signer
        ).unwrap();
        (ca_cert, ee_cert)
    }

    #[test]
    fn parse_and_encode_list_response() {
        let (ca_cert, issued) = test_certs();

        let mut resource_set = ResourceSet::default();
        resource_set.set_asn("AS64496,AS64497".parse().unwrap());
        resource_set.set_ipv4("192.0.2.0/24".parse().unwrap());

        let class = ResourceClass::new(
            "RC-0".into(),
            "rsync://repo.example/ca.cer,https://repo.example/ca.cer"
                .parse().unwrap(),
            resource_set,
            Time::utc(2031, 1, 1, 0, 0, 0),
        )
        .with_suggested_sia_head("rsync://repo.example/child/".into())
        .with_issued_cert(IssuedCert::new(
            "rsync://repo.example/child.cer".parse().unwrap(),
            RequestResourceLimit::default(),
            issued,
        ))
        .with_issuer(ca_cert);

        let msg = Message::list_response("parent", "child", class);
        let xml = msg.to_xml_string();
        let decoded = Message::decode(xml.as_bytes()).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn parse_and_encode_issue_response() {
        let (ca_cert, issued) = test_certs();

        let mut limit = RequestResourceLimit::default();
        limit.with_ipv6("2001:db8::/32".parse().unwrap());

        let class = ResourceClass::new(
            "RC-0".into(),
            "rsync://repo.example/ca.cer".parse().unwrap(),
            ResourceSet::default(),
            Time::utc(2031, 1, 1, 0, 0, 0),
        )
        .with_issued_cert(IssuedCert::new(
            "rsync://repo.example/child.cer".parse().unwrap(),
            limit,
            issued,
        ))
        .with_issuer(ca_cert);

        let msg = Message::issue_response("parent", "child", class);
        assert_eq!(
            msg, Message::decode(msg.to_xml_string().as_bytes()).unwrap()
        );
    }

    #[test]
    fn revoke_ski_matches_key_identifier() {
        let signer = OpenSslSigner::new();
        let key_id = signer.create_key(PublicKeyFormat::default()).unwrap();
        let key = signer.get_key_info(&key_id).unwrap();

        let msg = Message::revoke(
            "sender", "recipient",
            RevocationRequest::from_key("a classname".into(), &key),
        );
        let xml = msg.to_xml_string();
        assert!(xml.contains(&format!(
            "ski=\"{}\"", key.key_identifier().to_encoded_string()
        )));
        assert_eq!(msg, Message::decode(xml.as_bytes()).unwrap());
    }
}
