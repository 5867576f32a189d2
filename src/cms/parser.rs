//! Parsing and validation of provisioning CMS objects.
//!
//! The parser walks a received CMS blob against the protocol profile and
//! records the outcome of every check in a [`ValidationResult`] rather
//! than stopping at the first defect. Only an outer structure too broken
//! to walk aborts early. If, and only if, every check passed, the parsed
//! [`ProvisioningCmsObject`] can be taken out of the parser.

use std::fmt;
use bcder::{Captured, Mode, OctetString, Oid, Tag};
use bcder::decode::{self, DecodeError};
use bytes::Bytes;
use log::debug;
use crate::cert::Cert;
use crate::crl::Crl;
use crate::crypto::{DigestAlgorithm, Signature, SignatureAlgorithm};
use crate::oid;
use crate::payload::{Error as PayloadError, Message};
use crate::validation::*;
use crate::x509::Time;
use super::sigattr::SignedAttrs;


//------------ ProvisioningCmsObject -----------------------------------------

/// A validated provisioning CMS object.
///
/// Keeps the original encoded bytes so the object can be passed on
/// without re-signing, along with the parts a consumer acts upon.
#[derive(Clone, Debug)]
pub struct ProvisioningCmsObject {
    encoded: Bytes,
    ee_certificate: Cert,
    ca_certificates: Vec<Cert>,
    crl: Crl,
    message: Message,
}

impl ProvisioningCmsObject {
    pub(crate) fn new(
        encoded: Bytes,
        ee_certificate: Cert,
        ca_certificates: Vec<Cert>,
        crl: Crl,
        message: Message,
    ) -> Self {
        ProvisioningCmsObject {
            encoded, ee_certificate, ca_certificates, crl, message,
        }
    }

    /// Returns the original DER encoding of the object.
    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }

    pub fn to_bytes(&self) -> Bytes {
        self.encoded.clone()
    }

    /// Returns the one-off EE certificate the object was signed under.
    pub fn ee_certificate(&self) -> &Cert {
        &self.ee_certificate
    }

    /// Returns any CA certificates included in the object.
    ///
    /// Valid messages usually carry none.
    pub fn ca_certificates(&self) -> &[Cert] {
        &self.ca_certificates
    }

    pub fn crl(&self) -> &Crl {
        &self.crl
    }

    /// Returns the decoded payload message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

//--- PartialEq and Eq

impl PartialEq for ProvisioningCmsObject {
    fn eq(&self, other: &Self) -> bool {
        // Everything else is derived from the encoded bytes.
        self.encoded == other.encoded
    }
}

impl Eq for ProvisioningCmsObject { }


//------------ ProvisioningCmsObjectParser -----------------------------------

/// The profile-enforcing parser for provisioning CMS objects.
#[derive(Debug, Default)]
pub struct ProvisioningCmsObjectParser {
    result: ValidationResult,
    encoded: Bytes,
    ee_certificate: Option<Cert>,
    ca_certificates: Vec<Cert>,
    crl: Option<Crl>,
    message: Option<Message>,
}

impl ProvisioningCmsObjectParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser that records into an existing validation result.
    pub fn with_result(result: ValidationResult) -> Self {
        ProvisioningCmsObjectParser {
            result,
            ..Default::default()
        }
    }

    /// Returns the accumulated validation result.
    pub fn validation_result(&self) -> &ValidationResult {
        &self.result
    }

    /// Parses and validates an encoded CMS object found at `location`.
    ///
    /// Every profile deviation is recorded in the validation result; the
    /// method itself never fails. Call
    /// [`provisioning_cms_object`][Self::provisioning_cms_object]
    /// afterwards to get the parsed object or the collected failures.
    pub fn parse(
        &mut self, location: impl Into<ValidationLocation>, encoded: &[u8]
    ) {
        self.result.set_location(location);
        self.encoded = Bytes::copy_from_slice(encoded);

        let raw = match RawCmsObject::decode(encoded) {
            Some(raw) => raw,
            None => {
                debug!(
                    "{}: cannot parse CMS structure",
                    self.result.current_location()
                );
                self.result.reject_if_false(false, CMS_DATA_PARSING);
                return
            }
        };
        self.result.reject_if_false(true, CMS_DATA_PARSING);

        self.verify_version(&raw);
        self.verify_digest_algorithm(&raw);
        self.verify_content_type(&raw);
        self.parse_content(&raw);
        self.parse_certificates(&raw);
        self.parse_crls(&raw);
        self.verify_signer_infos(&raw);
    }

    /// Returns the parsed object if every check passed.
    pub fn provisioning_cms_object(
        self
    ) -> Result<ProvisioningCmsObject, ProvisioningCmsObjectParserError> {
        if self.result.has_failure_for_current_location() {
            return Err(ProvisioningCmsObjectParserError::validation(
                self.result.failures_for_current_location()
            ))
        }
        match (self.ee_certificate, self.crl, self.message) {
            (Some(ee_certificate), Some(crl), Some(message)) => {
                Ok(ProvisioningCmsObject::new(
                    self.encoded, ee_certificate,
                    self.ca_certificates, crl, message,
                ))
            }
            _ => Err(ProvisioningCmsObjectParserError::incomplete()),
        }
    }

    //--- The individual profile checks.

    /// The SignedData version must be 3.
    fn verify_version(&mut self, raw: &RawCmsObject) {
        self.result.reject_if_false(
            raw.version == 3, CMS_SIGNED_DATA_VERSION
        );
    }

    /// There must be exactly one digest algorithm and it must be SHA-256.
    fn verify_digest_algorithm(&mut self, raw: &RawCmsObject) {
        let ok = raw.digest_algorithms.len() == 1
            && raw.digest_algorithms.iter().all(|alg| *alg == oid::SHA256);
        self.result.reject_if_false_with(
            ok, CMS_SIGNED_DATA_DIGEST_ALGORITHM,
            raw.digest_algorithms.iter().map(|alg| alg.to_string()),
        );
    }

    /// The eContentType must be the provisioning content type.
    fn verify_content_type(&mut self, raw: &RawCmsObject) {
        self.result.reject_if_false(
            raw.content_type == oid::PROTOCOL_CONTENT_TYPE,
            CMS_CONTENT_TYPE,
        );
    }

    /// The eContent must be present and decode as a payload message.
    ///
    /// Payload defects are recorded and parsing continues so that the
    /// certificate and signature checks still run.
    fn parse_content(&mut self, raw: &RawCmsObject) {
        let content = match raw.content.as_ref() {
            Some(content) => content.to_bytes(),
            None => {
                self.result.reject_if_false(false, CMS_CONTENT_PARSING);
                return
            }
        };
        match Message::decode(content.as_ref()) {
            Ok(message) => {
                self.result.reject_if_false(true, CMS_CONTENT_PARSING);
                self.message = Some(message);
            }
            Err(PayloadError::InvalidVersion) => {
                self.result.reject_if_false(false, PAYLOAD_VERSION);
            }
            Err(PayloadError::InvalidPayloadType(_)) => {
                self.result.reject_if_false(false, PAYLOAD_TYPE_UNKNOWN);
            }
            Err(err) => {
                debug!(
                    "{}: rejected payload: {}",
                    self.result.current_location(), err
                );
                self.result.reject_if_false(false, CMS_CONTENT_PARSING);
            }
        }
    }

    /// Every certificate must be X.509 with exactly one EE certificate
    /// among them; the EE certificate must carry a key identifier.
    fn parse_certificates(&mut self, raw: &RawCmsObject) {
        self.result.reject_if_false(true, GET_CERTS_AND_CRLS);

        for captured in &raw.certificates {
            let cert = match captured.clone().decode(Cert::take_from) {
                Ok(cert) => cert,
                Err(_) => {
                    self.result.reject_if_false(false, CERT_IS_X509CERT);
                    continue
                }
            };
            self.result.reject_if_false(true, CERT_IS_X509CERT);
            self.process_certificate(cert);
        }

        if self.ee_certificate.is_none() {
            self.result.reject_if_false(false, CERT_IS_EE_CERT);
        }
    }

    fn process_certificate(&mut self, cert: Cert) {
        if !cert.is_ee() {
            self.ca_certificates.push(cert);
        }
        else if self.ee_certificate.is_none() {
            self.result.reject_if_false(true, CERT_IS_EE_CERT);
            self.result.reject_if_false(
                cert.subject_key_identifier().is_some(), CERT_HAS_SKI
            );
            // An unusual key size is reported as a warning, not a
            // failure.
            self.result.warn_if_false(
                cert.subject_public_key_info().key_size() == Some(2048),
                CERT_KEY_SIZE,
            );
            self.ee_certificate = Some(cert);
        }
        else {
            self.result.reject_if_false(false, ONLY_ONE_EE_CERT_ALLOWED);
        }
    }

    /// There must be exactly one CRL and it must be X.509.
    fn parse_crls(&mut self, raw: &RawCmsObject) {
        self.result.reject_if_false(
            raw.crls.len() == 1, ONLY_ONE_CRL_ALLOWED
        );
        let captured = match raw.crls.first() {
            Some(captured) => captured,
            None => return
        };
        match captured.clone().decode(Crl::take_from) {
            Ok(crl) => {
                self.result.reject_if_false(true, CRL_IS_X509CRL);
                self.crl = Some(crl);
            }
            Err(_) => {
                self.result.reject_if_false(false, CRL_IS_X509CRL);
            }
        }
    }

    /// Extracts the signer info and runs the remaining checks on it.
    ///
    /// Whether the signer info could be extracted and whether there is
    /// exactly one of it are separate questions; both checks are
    /// recorded independently of each other’s outcome.
    fn verify_signer_infos(&mut self, raw: &RawCmsObject) {
        let mut extracted = true;
        let mut signer = None;
        let mut attrs = None;
        if let Some(captured) = raw.signer_infos.first() {
            match captured.clone().decode(RawSignerInfo::take_from) {
                Ok(decoded) => {
                    match decoded.signed_attrs.as_ref()
                        .map(RawSignedAttrs::parse)
                    {
                        Some(None) => {
                            // The attribute table itself was
                            // undecodable, which is beyond recording
                            // individual attribute failures.
                            extracted = false;
                        }
                        Some(Some(parsed)) => {
                            attrs = Some(parsed);
                            signer = Some(decoded);
                        }
                        None => {
                            signer = Some(decoded);
                        }
                    }
                }
                Err(_) => {
                    extracted = false;
                }
            }
        }
        self.result.reject_if_false(extracted, GET_SIGNER_INFO);
        self.result.reject_if_false(
            raw.signer_infos.len() == 1, ONLY_ONE_SIGNER
        );

        let signer = match signer {
            Some(signer) => signer,
            None => return
        };

        self.verify_signer_version(&signer);
        self.verify_subject_key_identifier(&signer);
        self.verify_signer_digest_algorithm(&signer);
        self.verify_signed_attrs(attrs.as_ref());
        self.verify_encryption_algorithm(&signer);
        self.verify_signature(raw, &signer, attrs.as_ref());
        self.verify_unsigned_attrs(&signer);
    }

    /// The SignerInfo version must be 3.
    fn verify_signer_version(&mut self, signer: &RawSignerInfo) {
        self.result.reject_if_false(
            signer.version == 3, CMS_SIGNER_INFO_VERSION
        );
    }

    /// The signer must be identified by the subject key identifier form
    /// and it must match the EE certificate’s key identifier.
    fn verify_subject_key_identifier(&mut self, signer: &RawSignerInfo) {
        let sid_matches = match (&signer.sid, &self.ee_certificate) {
            (SignerIdentifier::KeyIdentifier(sid), Some(ee)) => {
                ee.subject_key_identifier()
                    .map_or(false, |ski| ski == *sid)
            }
            _ => false,
        };
        self.result.reject_if_false(sid_matches, CMS_SIGNER_INFO_SKI);
        self.result.reject_if_false(
            matches!(signer.sid, SignerIdentifier::KeyIdentifier(_)),
            CMS_SIGNER_INFO_SKI_ONLY,
        );
    }

    /// The signer digest algorithm must be SHA-256.
    fn verify_signer_digest_algorithm(&mut self, signer: &RawSignerInfo) {
        self.result.reject_if_false_with(
            signer.digest_algorithm == oid::SHA256,
            CMS_SIGNER_INFO_DIGEST_ALGORITHM,
            [signer.digest_algorithm.to_string()],
        );
    }

    /// Signed attributes must be present with single-valued contentType,
    /// messageDigest and signingTime attributes; the contentType value
    /// must repeat the provisioning content type.
    fn verify_signed_attrs(&mut self, attrs: Option<&RawSignedAttrs>) {
        let attrs = match attrs {
            Some(attrs) => attrs,
            None => {
                self.result.reject_if_false(false, SIGNED_ATTRS_PRESENT);
                return
            }
        };
        self.result.reject_if_false(true, SIGNED_ATTRS_PRESENT);

        if self.result.reject_if_false(
            !attrs.content_type.is_empty(), CONTENT_TYPE_ATTR_PRESENT
        ) && self.result.reject_if_false(
            attrs.content_type.len() == 1, CONTENT_TYPE_VALUE_COUNT
        ) {
            let value_ok = attrs.content_type_value().map_or(
                false, |value| value == oid::PROTOCOL_CONTENT_TYPE
            );
            self.result.reject_if_false(value_ok, CONTENT_TYPE_VALUE);
        }

        if self.result.reject_if_false(
            !attrs.message_digest.is_empty(), MSG_DIGEST_ATTR_PRESENT
        ) {
            self.result.reject_if_false(
                attrs.message_digest.len() == 1, MSG_DIGEST_VALUE_COUNT
            );
        }

        if self.result.reject_if_false(
            !attrs.signing_time.is_empty(), SIGNING_TIME_ATTR_PRESENT
        ) {
            self.result.reject_if_false(
                attrs.signing_time.len() == 1, ONLY_ONE_SIGNING_TIME_ATTR
            );
        }
    }

    /// The signature algorithm must be plain RSA.
    fn verify_encryption_algorithm(&mut self, signer: &RawSignerInfo) {
        self.result.reject_if_false_with(
            signer.signature_algorithm == oid::RSA_ENCRYPTION,
            ENCRYPTION_ALGORITHM,
            [signer.signature_algorithm.to_string()],
        );
    }

    /// The signature must verify under the EE certificate.
    ///
    /// A digest mismatch, a signing time outside the EE certificate’s
    /// validity, and a cryptographic mismatch all collapse into this one
    /// check.
    fn verify_signature(
        &mut self,
        raw: &RawCmsObject,
        signer: &RawSignerInfo,
        attrs: Option<&RawSignedAttrs>,
    ) {
        let verified = self.signature_verifies(raw, signer, attrs);
        self.result.reject_if_false(verified, SIGNATURE_VERIFICATION);
    }

    fn signature_verifies(
        &self,
        raw: &RawCmsObject,
        signer: &RawSignerInfo,
        attrs: Option<&RawSignedAttrs>,
    ) -> bool {
        let ee = match self.ee_certificate.as_ref() {
            Some(ee) => ee,
            None => return false
        };
        let attrs = match attrs {
            Some(attrs) => attrs,
            None => return false
        };
        let content = match raw.content.as_ref() {
            Some(content) => content,
            None => return false
        };

        // The digest committed to in the attributes must match the
        // actual content.
        let digest = {
            let mut context = DigestAlgorithm::sha256().start();
            content.iter().for_each(|chunk| context.update(chunk));
            context.finish()
        };
        let committed = match attrs.message_digest_value() {
            Some(committed) => committed,
            None => return false
        };
        if digest.as_ref() != committed.as_ref() {
            return false
        }

        // A signing time outside the EE certificate’s validity window
        // means the object was signed with a certificate that was not
        // valid at the time.
        if let Some(time) = attrs.signing_time_value() {
            if !ee.validity().contains(time) {
                return false
            }
        }

        let message = attrs.attrs.encode_verify();
        ee.subject_public_key_info().verify(
            &message,
            &Signature::new(
                SignatureAlgorithm::default(), signer.signature.clone()
            ),
        ).is_ok()
    }

    /// Unsigned attributes must be absent.
    fn verify_unsigned_attrs(&mut self, signer: &RawSignerInfo) {
        self.result.reject_if_false(
            !signer.unsigned_attrs, UNSIGNED_ATTRS_OMITTED
        );
    }
}


//------------ RawCmsObject --------------------------------------------------

/// The loosely decoded structure of a SignedData object.
///
/// This keeps everything the profile checks look at without applying any
/// of the profile itself, so that a deviation in one field does not
/// prevent examining the others.
struct RawCmsObject {
    version: u8,
    digest_algorithms: Vec<Oid<Bytes>>,
    content_type: Oid<Bytes>,
    content: Option<OctetString>,
    certificates: Vec<Captured>,
    crls: Vec<Captured>,
    signer_infos: Vec<Captured>,
}

impl RawCmsObject {
    /// Decodes the outer CMS structure.
    ///
    /// Returns `None` if the bytes are not walkable as BER SignedData
    /// at all.
    fn decode(source: &[u8]) -> Option<RawCmsObject> {
        let (
            version, digest_algorithms, content_type, content,
            certificates, crls, signer_infos,
        ) = Mode::Ber.decode(source, |cons| {
            cons.take_sequence(|cons| {
                oid::SIGNED_DATA.skip_if(cons)?;
                cons.take_constructed_if(Tag::CTX_0, |cons| {
                    cons.take_sequence(|cons| {
                        let version = cons.take_primitive_if(
                            Tag::INTEGER, |prim| prim.to_u8()
                        )?;
                        let digest_algorithms = cons.take_set(|cons| {
                            let mut algorithms = Vec::new();
                            while let Some(alg) = cons.take_opt_sequence(
                                |cons| {
                                    let alg = Oid::take_from(cons)?;
                                    cons.skip_all()?;
                                    Ok(alg)
                                }
                            )? {
                                algorithms.push(alg)
                            }
                            Ok(algorithms)
                        })?;
                        let (content_type, content) = cons.take_sequence(
                            |cons| {
                                Ok((
                                    Oid::take_from(cons)?,
                                    cons.take_opt_constructed_if(
                                        Tag::CTX_0, OctetString::take_from
                                    )?,
                                ))
                            }
                        )?;
                        let certificates = cons.take_opt_constructed_if(
                            Tag::CTX_0, |cons| cons.capture_all()
                        )?;
                        let crls = cons.take_opt_constructed_if(
                            Tag::CTX_1, |cons| cons.capture_all()
                        )?;
                        let signer_infos = cons.take_set(
                            |cons| cons.capture_all()
                        )?;
                        Ok((
                            version, digest_algorithms, content_type,
                            content, certificates, crls, signer_infos,
                        ))
                    })
                })
            })
        }).ok()?;

        Some(RawCmsObject {
            version,
            digest_algorithms,
            content_type,
            content,
            certificates: match certificates {
                Some(captured) => split_values(captured)?,
                None => Vec::new(),
            },
            crls: match crls {
                Some(captured) => split_values(captured)?,
                None => Vec::new(),
            },
            signer_infos: split_values(signer_infos)?,
        })
    }
}

/// Splits a captured series of values into the individual values.
fn split_values(mut captured: Captured) -> Option<Vec<Captured>> {
    let mut res = Vec::new();
    while !captured.as_slice().is_empty() {
        res.push(
            captured.decode_partial(|cons| cons.capture_one()).ok()?
        );
    }
    Some(res)
}


//------------ RawSignerInfo -------------------------------------------------

/// A loosely decoded SignerInfo.
struct RawSignerInfo {
    version: u8,
    sid: SignerIdentifier,
    digest_algorithm: Oid<Bytes>,
    signed_attrs: Option<Captured>,
    signature_algorithm: Oid<Bytes>,
    signature: Bytes,
    unsigned_attrs: bool,
}

impl RawSignerInfo {
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = cons.take_primitive_if(
                Tag::INTEGER, |prim| prim.to_u8()
            )?;
            let sid = match cons.take_opt_value_if(
                Tag::CTX_0, |content| OctetString::from_content(content)
            )? {
                Some(octets) => {
                    SignerIdentifier::KeyIdentifier(octets.into_bytes())
                }
                None => {
                    // issuerAndSerialNumber. The content is irrelevant:
                    // this form alone already violates the profile.
                    cons.take_sequence(|cons| cons.skip_all())?;
                    SignerIdentifier::IssuerAndSerialNumber
                }
            };
            let digest_algorithm = take_algorithm_oid(cons)?;
            let signed_attrs = cons.take_opt_constructed_if(
                Tag::CTX_0, |cons| cons.capture_all()
            )?;
            let signature_algorithm = take_algorithm_oid(cons)?;
            let signature = OctetString::take_from(cons)?.into_bytes();
            let unsigned_attrs = cons.take_opt_constructed_if(
                Tag::CTX_1, |cons| cons.skip_all()
            )?.is_some();

            Ok(RawSignerInfo {
                version,
                sid,
                digest_algorithm,
                signed_attrs,
                signature_algorithm,
                signature,
                unsigned_attrs,
            })
        })
    }
}

/// Takes an AlgorithmIdentifier, returning its object identifier and
/// skipping whatever parameters follow.
fn take_algorithm_oid<S: decode::Source>(
    cons: &mut decode::Constructed<S>
) -> Result<Oid<Bytes>, DecodeError<S::Error>> {
    cons.take_sequence(|cons| {
        let alg = Oid::take_from(cons)?;
        cons.skip_all()?;
        Ok(alg)
    })
}


//------------ SignerIdentifier ----------------------------------------------

/// The two forms the signer identifier choice can take.
enum SignerIdentifier {
    /// The subject key identifier form. The octets are kept verbatim so
    /// a wrong-length value still compares as a mismatch instead of
    /// failing the parse.
    KeyIdentifier(Bytes),

    /// The issuer and serial number form, disallowed by the profile.
    IssuerAndSerialNumber,
}


//------------ RawSignedAttrs ------------------------------------------------

/// The loosely decoded signed attributes.
struct RawSignedAttrs {
    /// The raw attribute sequences, for signature verification.
    attrs: SignedAttrs,

    /// The captured values of each contentType attribute.
    content_type: Vec<Captured>,

    /// The captured values of each messageDigest attribute.
    message_digest: Vec<Captured>,

    /// The captured values of each signingTime attribute.
    signing_time: Vec<Captured>,
}

impl RawSignedAttrs {
    /// Parses the attribute table out of the captured field content.
    ///
    /// Returns `None` if the table is not walkable at all.
    fn parse(captured: &Captured) -> Option<Self> {
        let mut content_type = Vec::new();
        let mut message_digest = Vec::new();
        let mut signing_time = Vec::new();

        let mut remaining = captured.clone();
        while !remaining.as_slice().is_empty() {
            let (attr_type, values) = remaining.decode_partial(|cons| {
                cons.take_sequence(|cons| {
                    let attr_type = Oid::take_from(cons)?;
                    let values = cons.take_set(|cons| cons.capture_all())?;
                    Ok((attr_type, values))
                })
            }).ok()?;
            let values = split_values(values)?;
            if attr_type == oid::CONTENT_TYPE {
                content_type.extend(values);
            }
            else if attr_type == oid::MESSAGE_DIGEST {
                message_digest.extend(values);
            }
            else if attr_type == oid::SIGNING_TIME {
                signing_time.extend(values);
            }
            // Other signed attributes are allowed and ignored; the
            // signature still covers them through the raw capture.
        }

        Some(RawSignedAttrs {
            attrs: SignedAttrs::from_captured(captured.clone()),
            content_type,
            message_digest,
            signing_time,
        })
    }

    /// Returns the value of the sole contentType attribute, if it is
    /// an object identifier.
    fn content_type_value(&self) -> Option<Oid<Bytes>> {
        self.content_type.first()?.clone().decode(Oid::take_from).ok()
    }

    /// Returns the value of the sole messageDigest attribute, if it is
    /// an octet string.
    fn message_digest_value(&self) -> Option<Bytes> {
        self.message_digest.first()?.clone()
            .decode(OctetString::take_from).ok()
            .map(OctetString::into_bytes)
    }

    /// Returns the value of the sole signingTime attribute, if it is a
    /// time.
    fn signing_time_value(&self) -> Option<Time> {
        self.signing_time.first()?.clone().decode(Time::take_from).ok()
    }
}


//------------ ProvisioningCmsObjectParserError ------------------------------

/// A provisioning CMS object could not be taken out of the parser.
#[derive(Clone, Debug)]
pub struct ProvisioningCmsObjectParserError(ErrorKind);

#[derive(Clone, Debug)]
enum ErrorKind {
    /// Validation recorded the contained failures.
    Validation(Vec<ValidationCheck>),

    /// No failures were recorded but parts are missing anyway.
    ///
    /// This cannot happen with the checks in place and exists so the
    /// impossible does not turn into a panic.
    Incomplete,
}

impl ProvisioningCmsObjectParserError {
    fn validation(failures: Vec<ValidationCheck>) -> Self {
        ProvisioningCmsObjectParserError(ErrorKind::Validation(failures))
    }

    fn incomplete() -> Self {
        ProvisioningCmsObjectParserError(ErrorKind::Incomplete)
    }

    /// Returns the recorded validation failures.
    pub fn failures(&self) -> &[ValidationCheck] {
        match &self.0 {
            ErrorKind::Validation(failures) => failures,
            ErrorKind::Incomplete => &[],
        }
    }
}

impl fmt::Display for ProvisioningCmsObjectParserError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.0 {
            ErrorKind::Validation(failures) => {
                write!(f, "provisioning CMS object validation failed:")?;
                for check in failures {
                    write!(f, " {};", check)?;
                }
                Ok(())
            }
            ErrorKind::Incomplete => {
                f.write_str("provisioning CMS object incomplete")
            }
        }
    }
}

impl std::error::Error for ProvisioningCmsObjectParserError { }


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_fails_data_parsing() {
        let mut parser = ProvisioningCmsObjectParser::new();
        parser.parse("test.cms", b"not a cms object");

        assert!(parser.validation_result().has_failures());
        let failures: Vec<_> = parser.validation_result()
            .failures_for_current_location();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].key(), CMS_DATA_PARSING);
        assert!(parser.provisioning_cms_object().is_err());
    }

    #[test]
    fn empty_input_fails_data_parsing() {
        let mut parser = ProvisioningCmsObjectParser::new();
        parser.parse("test.cms", b"");
        assert!(
            parser.validation_result().has_failure_for_current_location()
        );
    }
}

#[cfg(all(test, feature = "softkeys"))]
mod signer_test {
    use super::*;
    use bcder::ConstOid;
    use crate::cms::builder::{
        compose, ProvisioningCmsObjectBuilder,
    };
    use crate::crypto::softsigner::{KeyId, OpenSslSigner};
    use crate::crypto::{KeyIdentifier, PublicKeyFormat, Signer};
    use crate::payload::{Message, RevocationRequest};
    use crate::validation::ValidationStatus;
    use crate::x509::{Serial, Time, Validity};

    struct TestCa {
        signer: OpenSslSigner,
        ca_key: KeyId,
        ee_key: KeyId,
        ee_cert: Cert,
        crl: Crl,
    }

    fn validity() -> Validity {
        Validity::new(
            Time::utc(2021, 1, 1, 0, 0, 0),
            Time::utc(2031, 1, 1, 0, 0, 0),
        )
    }

    fn signing_time() -> Time {
        Time::utc(2021, 6, 1, 12, 0, 0)
    }

    fn test_ca() -> TestCa {
        let signer = OpenSslSigner::new();
        let ca_key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let ee_key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let ee_cert = Cert::new_ee(
            &signer.get_key_info(&ee_key).unwrap(),
            validity(), &ca_key, &signer
        ).unwrap();
        let crl = Crl::create(
            Time::utc(2021, 6, 1, 0, 0, 0),
            Time::utc(2021, 6, 2, 0, 0, 0),
            Serial::from(1_u64),
            &ca_key, &signer,
        ).unwrap();
        TestCa { signer, ca_key, ee_key, ee_cert, crl }
    }

    fn list_message() -> Message {
        Message::list("sender", "recipient")
    }

    fn build_bytes(ca: &TestCa, message: &Message) -> Bytes {
        ProvisioningCmsObjectBuilder::new()
            .with_ee_certificate(ca.ee_cert.clone())
            .with_crl(ca.crl.clone())
            .build(message, signing_time(), &ca.ee_key, &ca.signer)
            .unwrap()
            .to_bytes()
    }

    fn parse(encoded: &[u8]) -> ProvisioningCmsObjectParser {
        let mut parser = ProvisioningCmsObjectParser::new();
        parser.parse("test.cms", encoded);
        parser
    }

    fn assert_failure(
        parser: &ProvisioningCmsObjectParser, key: &'static str
    ) {
        assert!(
            parser.validation_result().failures_for_current_location()
                .iter().any(|check| check.key() == key),
            "expected failure for {}, got: {}",
            key, parser.validation_result()
        );
    }

    /// Composes with full control over the parts the negative tests
    /// manipulate.
    #[allow(clippy::too_many_arguments)]
    fn compose_bytes(
        ca: &TestCa,
        content: &Bytes,
        digest_oid: &'static ConstOid,
        extra_certs: &[Cert],
        crls: &[Crl],
        sid: KeyIdentifier,
        signing_time: Option<Time>,
    ) -> Bytes {
        compose(
            content, digest_oid, &ca.ee_cert, extra_certs, crls, sid,
            signing_time, 1, &ca.ee_key, &ca.signer,
        ).unwrap().into_bytes()
    }

    fn ee_sid(ca: &TestCa) -> KeyIdentifier {
        ca.ee_cert.subject_key_identifier().unwrap()
    }

    #[test]
    fn list_request_round_trip() {
        let ca = test_ca();
        let message = list_message();
        let bytes = build_bytes(&ca, &message);

        let parser = parse(&bytes);
        assert!(
            !parser.validation_result().has_failures(),
            "{}", parser.validation_result()
        );

        let object = parser.provisioning_cms_object().unwrap();
        assert_eq!(object.message(), &message);
        assert_eq!(object.ee_certificate(), &ca.ee_cert);
        assert_eq!(object.crl(), &ca.crl);
        assert!(object.ca_certificates().is_empty());
        assert_eq!(object.encoded(), &bytes);
    }

    #[test]
    fn revoke_request_round_trip() {
        let ca = test_ca();
        let ca_pub = ca.signer.get_key_info(&ca.ca_key).unwrap();
        let message = Message::revoke(
            "sender", "recipient",
            RevocationRequest::from_key("a classname".into(), &ca_pub),
        );
        let bytes = build_bytes(&ca, &message);

        let parser = parse(&bytes);
        assert!(
            !parser.validation_result().has_failures(),
            "{}", parser.validation_result()
        );
        assert_eq!(
            parser.provisioning_cms_object().unwrap().into_message(),
            message
        );
    }

    #[test]
    fn building_is_deterministic() {
        let ca = test_ca();
        let message = list_message();
        assert_eq!(
            build_bytes(&ca, &message), build_bytes(&ca, &message)
        );
    }

    #[test]
    fn embedded_ca_certificates_are_kept() {
        let ca = test_ca();
        let ca_cert = Cert::new_ta(
            validity(), &ca.ca_key, &ca.signer
        ).unwrap();
        let bytes = compose_bytes(
            &ca, &list_message().to_xml_bytes(), &oid::SHA256,
            std::slice::from_ref(&ca_cert),
            std::slice::from_ref(&ca.crl),
            ee_sid(&ca), Some(signing_time()),
        );

        let parser = parse(&bytes);
        assert!(
            !parser.validation_result().has_failures(),
            "{}", parser.validation_result()
        );
        let object = parser.provisioning_cms_object().unwrap();
        assert_eq!(
            object.ca_certificates(), std::slice::from_ref(&ca_cert)
        );
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let ca = test_ca();
        let mut bytes = build_bytes(&ca, &list_message()).to_vec();
        *bytes.last_mut().unwrap() ^= 0x01;

        let parser = parse(&bytes);
        assert!(parser.validation_result().has_failures());
        assert_failure(&parser, SIGNATURE_VERIFICATION);
    }

    #[test]
    fn tampered_content_is_rejected() {
        let ca = test_ca();
        let mut bytes = build_bytes(&ca, &list_message()).to_vec();
        let pos = bytes.windows(9)
            .position(|window| window == b"recipient")
            .unwrap();
        bytes[pos] ^= 0x01;

        let parser = parse(&bytes);
        assert!(parser.validation_result().has_failures());
        assert_failure(&parser, SIGNATURE_VERIFICATION);
    }

    #[test]
    fn tampered_version_is_rejected() {
        let ca = test_ca();
        let mut bytes = build_bytes(&ca, &list_message()).to_vec();
        // The first integer in the object is the SignedData version.
        let pos = bytes.windows(3)
            .position(|window| window == [0x02, 0x01, 0x03])
            .unwrap();
        bytes[pos + 2] = 0x02;

        let parser = parse(&bytes);
        assert_failure(&parser, CMS_SIGNED_DATA_VERSION);
    }

    #[test]
    fn missing_signing_time_is_rejected() {
        let ca = test_ca();
        let bytes = compose_bytes(
            &ca, &list_message().to_xml_bytes(), &oid::SHA256, &[],
            std::slice::from_ref(&ca.crl), ee_sid(&ca), None,
        );

        let parser = parse(&bytes);
        assert_failure(&parser, SIGNING_TIME_ATTR_PRESENT);
        // Nothing else is wrong with the object.
        assert_eq!(
            parser.validation_result()
                .failures_for_current_location().len(),
            1
        );
    }

    #[test]
    fn unknown_payload_type_is_rejected() {
        let ca = test_ca();
        let content = Bytes::from_static(
            b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
              <message \
              xmlns=\"http://www.apnic.net/specs/rescerts/up-down/\" \
              recipient=\"recipient\" sender=\"sender\" type=\"bogus\" \
              version=\"1\"/>\n"
        );
        let bytes = compose_bytes(
            &ca, &content, &oid::SHA256, &[],
            std::slice::from_ref(&ca.crl), ee_sid(&ca),
            Some(signing_time()),
        );

        let parser = parse(&bytes);
        assert_failure(&parser, PAYLOAD_TYPE_UNKNOWN);
    }

    #[test]
    fn unknown_payload_version_is_rejected() {
        let ca = test_ca();
        let content = Bytes::from_static(
            b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
              <message \
              xmlns=\"http://www.apnic.net/specs/rescerts/up-down/\" \
              recipient=\"recipient\" sender=\"sender\" type=\"list\" \
              version=\"3\"/>\n"
        );
        let bytes = compose_bytes(
            &ca, &content, &oid::SHA256, &[],
            std::slice::from_ref(&ca.crl), ee_sid(&ca),
            Some(signing_time()),
        );

        let parser = parse(&bytes);
        assert_failure(&parser, PAYLOAD_VERSION);
    }

    #[test]
    fn two_crls_still_complete_signature_checks() {
        let ca = test_ca();
        let second_crl = Crl::create(
            Time::utc(2021, 6, 1, 0, 0, 0),
            Time::utc(2021, 6, 2, 0, 0, 0),
            Serial::from(2_u64),
            &ca.ca_key, &ca.signer,
        ).unwrap();
        let bytes = compose_bytes(
            &ca, &list_message().to_xml_bytes(), &oid::SHA256, &[],
            &[ca.crl.clone(), second_crl], ee_sid(&ca),
            Some(signing_time()),
        );

        let parser = parse(&bytes);
        assert_failure(&parser, ONLY_ONE_CRL_ALLOWED);
        // The signature checks still ran and passed.
        assert!(parser.validation_result()
            .checks_for_current_location()
            .any(|check| {
                check.key() == SIGNATURE_VERIFICATION
                    && check.status() == ValidationStatus::Pass
            })
        );
    }

    #[test]
    fn missing_crl_is_rejected() {
        let ca = test_ca();
        let bytes = compose_bytes(
            &ca, &list_message().to_xml_bytes(), &oid::SHA256, &[], &[],
            ee_sid(&ca), Some(signing_time()),
        );

        let parser = parse(&bytes);
        assert_failure(&parser, ONLY_ONE_CRL_ALLOWED);
    }

    #[test]
    fn two_signers_still_complete_signature_checks() {
        let ca = test_ca();
        let bytes = compose(
            &list_message().to_xml_bytes(), &oid::SHA256, &ca.ee_cert,
            &[], std::slice::from_ref(&ca.crl), ee_sid(&ca),
            Some(signing_time()), 2, &ca.ee_key, &ca.signer,
        ).unwrap().into_bytes();

        let parser = parse(&bytes);
        assert_failure(&parser, ONLY_ONE_SIGNER);
        // The checks on the first signer still ran and passed.
        assert!(parser.validation_result()
            .checks_for_current_location()
            .any(|check| {
                check.key() == SIGNATURE_VERIFICATION
                    && check.status() == ValidationStatus::Pass
            })
        );
    }

    #[test]
    fn zero_signers_is_rejected() {
        let ca = test_ca();
        let bytes = compose(
            &list_message().to_xml_bytes(), &oid::SHA256, &ca.ee_cert,
            &[], std::slice::from_ref(&ca.crl), ee_sid(&ca),
            Some(signing_time()), 0, &ca.ee_key, &ca.signer,
        ).unwrap().into_bytes();

        let parser = parse(&bytes);
        assert_failure(&parser, ONLY_ONE_SIGNER);
        // Nothing was wrong with extracting the (empty) signer info
        // set itself.
        assert!(parser.validation_result()
            .checks_for_current_location()
            .any(|check| {
                check.key() == GET_SIGNER_INFO
                    && check.status() == ValidationStatus::Pass
            })
        );
    }

    #[test]
    fn wrong_sid_is_rejected() {
        let ca = test_ca();
        let wrong_sid = ca.signer.get_key_info(&ca.ca_key)
            .unwrap().key_identifier();
        let bytes = compose_bytes(
            &ca, &list_message().to_xml_bytes(), &oid::SHA256, &[],
            std::slice::from_ref(&ca.crl), wrong_sid,
            Some(signing_time()),
        );

        let parser = parse(&bytes);
        assert_failure(&parser, CMS_SIGNER_INFO_SKI);
    }

    #[test]
    fn second_ee_cert_is_rejected() {
        let ca = test_ca();
        let second_key =
            ca.signer.create_key(PublicKeyFormat::default()).unwrap();
        let second_ee = Cert::new_ee(
            &ca.signer.get_key_info(&second_key).unwrap(),
            validity(), &ca.ca_key, &ca.signer,
        ).unwrap();
        let bytes = compose_bytes(
            &ca, &list_message().to_xml_bytes(), &oid::SHA256,
            std::slice::from_ref(&second_ee),
            std::slice::from_ref(&ca.crl),
            ee_sid(&ca), Some(signing_time()),
        );

        let parser = parse(&bytes);
        assert_failure(&parser, ONLY_ONE_EE_CERT_ALLOWED);
    }

    #[test]
    fn sha1_digest_algorithm_is_rejected() {
        let ca = test_ca();
        let bytes = compose_bytes(
            &ca, &list_message().to_xml_bytes(), &oid::SHA1, &[],
            std::slice::from_ref(&ca.crl), ee_sid(&ca),
            Some(signing_time()),
        );

        let parser = parse(&bytes);
        assert_failure(&parser, CMS_SIGNED_DATA_DIGEST_ALGORITHM);
        assert_failure(&parser, CMS_SIGNER_INFO_DIGEST_ALGORITHM);
    }

    #[test]
    fn signing_time_outside_ee_validity_is_rejected() {
        let ca = test_ca();
        let bytes = compose_bytes(
            &ca, &list_message().to_xml_bytes(), &oid::SHA256, &[],
            std::slice::from_ref(&ca.crl), ee_sid(&ca),
            Some(Time::utc(2041, 1, 1, 0, 0, 0)),
        );

        let parser = parse(&bytes);
        assert_failure(&parser, SIGNATURE_VERIFICATION);
    }

    #[test]
    fn checks_are_recorded_in_profile_order() {
        let ca = test_ca();
        let bytes = build_bytes(&ca, &list_message());
        let parser = parse(&bytes);

        let keys: Vec<_> = parser.validation_result()
            .checks_for_current_location()
            .map(|check| check.key())
            .collect();
        assert_eq!(keys, [
            CMS_DATA_PARSING,
            CMS_SIGNED_DATA_VERSION,
            CMS_SIGNED_DATA_DIGEST_ALGORITHM,
            CMS_CONTENT_TYPE,
            CMS_CONTENT_PARSING,
            GET_CERTS_AND_CRLS,
            CERT_IS_X509CERT,
            CERT_IS_EE_CERT,
            CERT_HAS_SKI,
            CERT_KEY_SIZE,
            ONLY_ONE_CRL_ALLOWED,
            CRL_IS_X509CRL,
            GET_SIGNER_INFO,
            ONLY_ONE_SIGNER,
            CMS_SIGNER_INFO_VERSION,
            CMS_SIGNER_INFO_SKI,
            CMS_SIGNER_INFO_SKI_ONLY,
            CMS_SIGNER_INFO_DIGEST_ALGORITHM,
            SIGNED_ATTRS_PRESENT,
            CONTENT_TYPE_ATTR_PRESENT,
            CONTENT_TYPE_VALUE_COUNT,
            CONTENT_TYPE_VALUE,
            MSG_DIGEST_ATTR_PRESENT,
            MSG_DIGEST_VALUE_COUNT,
            SIGNING_TIME_ATTR_PRESENT,
            ONLY_ONE_SIGNING_TIME_ATTR,
            ENCRYPTION_ALGORITHM,
            SIGNATURE_VERIFICATION,
            UNSIGNED_ATTRS_OMITTED,
        ]);
    }
}
