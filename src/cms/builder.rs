//! Building provisioning CMS objects.
//!
//! The builder is the inverse of the parser: handed a payload message,
//! a freshly built EE certificate with its signing key, the covering
//! CRL and an injected signing time, it produces DER bytes that pass
//! every check of [`super::parser`]. Nothing here samples a clock; all
//! times come from the caller, which keeps building reproducible.

use std::fmt;
use bcder::{encode, Captured, ConstOid, Mode, OctetString, Oid, Tag};
use bcder::encode::PrimitiveContent;
use bytes::Bytes;
use crate::cert::Cert;
use crate::crl::Crl;
use crate::crypto::{
    DigestAlgorithm, KeyIdentifier, SignatureAlgorithm, Signer,
    SigningError,
};
use crate::oid;
use crate::payload::Message;
use crate::x509::Time;
use super::parser::ProvisioningCmsObject;
use super::sigattr::{MessageDigest, SignedAttrs};


//------------ ProvisioningCmsObjectBuilder ----------------------------------

/// A builder for provisioning CMS objects.
#[derive(Clone, Debug, Default)]
pub struct ProvisioningCmsObjectBuilder {
    ee_certificate: Option<Cert>,
    ca_certificates: Vec<Cert>,
    crl: Option<Crl>,
}

impl ProvisioningCmsObjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the EE certificate to embed and sign under.
    ///
    /// The certificate must have been built for a one-off key pair, with
    /// the Basic Constraints extension absent and a Subject Key
    /// Identifier matching that key.
    pub fn with_ee_certificate(mut self, cert: Cert) -> Self {
        self.ee_certificate = Some(cert);
        self
    }

    /// Adds a CA certificate to embed alongside the EE certificate.
    ///
    /// Receivers keep these but don’t need them; most messages carry
    /// none.
    pub fn with_ca_certificate(mut self, cert: Cert) -> Self {
        self.ca_certificates.push(cert);
        self
    }

    /// Sets the CRL covering the EE certificate.
    pub fn with_crl(mut self, crl: Crl) -> Self {
        self.crl = Some(crl);
        self
    }

    /// Wraps the message into a signed CMS object.
    ///
    /// The `signing_time` goes into the signed attributes verbatim and
    /// must fall within the EE certificate’s validity for the result to
    /// validate. The `ee_key` must be the signer’s handle for the key
    /// the EE certificate certifies.
    pub fn build<S: Signer>(
        self,
        message: &Message,
        signing_time: Time,
        ee_key: &S::KeyId,
        signer: &S,
    ) -> Result<ProvisioningCmsObject, CmsBuilderError<S::Error>> {
        let ee_certificate = self.ee_certificate
            .ok_or(CmsBuilderError::MissingEeCert)?;
        let crl = self.crl.ok_or(CmsBuilderError::MissingCrl)?;
        let sid = ee_certificate.subject_key_identifier()
            .ok_or(CmsBuilderError::MissingKeyIdentifier)?;

        let ee_public_key = signer.get_key_info(ee_key).map_err(|err| {
            CmsBuilderError::SigningFailed(err.into())
        })?;
        if ee_public_key != *ee_certificate.subject_public_key_info() {
            return Err(CmsBuilderError::KeyAlgorithmMismatch)
        }

        let content = message.to_xml_bytes();
        let captured = compose(
            &content,
            &oid::SHA256,
            &ee_certificate,
            &self.ca_certificates,
            std::slice::from_ref(&crl),
            sid,
            Some(signing_time),
            1,
            ee_key,
            signer,
        ).map_err(CmsBuilderError::SigningFailed)?;

        Ok(ProvisioningCmsObject::new(
            captured.into_bytes(),
            ee_certificate,
            self.ca_certificates,
            crl,
            message.clone(),
        ))
    }
}


/// Composes and signs the SignedData structure.
///
/// This takes all parts verbatim, including ones a valid object pins
/// down, so the test suite can produce profile violations on purpose:
/// `signer_count` repeats (or omits) the one signer info that gets
/// built. [`ProvisioningCmsObjectBuilder::build`] is the only
/// production caller and always passes conforming values.
#[allow(clippy::too_many_arguments)]
pub(crate) fn compose<S: Signer>(
    content: &Bytes,
    digest_oid: &'static ConstOid,
    ee_certificate: &Cert,
    more_certificates: &[Cert],
    crls: &[Crl],
    sid: KeyIdentifier,
    signing_time: Option<Time>,
    signer_count: usize,
    ee_key: &S::KeyId,
    signer: &S,
) -> Result<Captured, SigningError<S::Error>> {
    let digest = MessageDigest::from(
        DigestAlgorithm::sha256().digest(content.as_ref())
    );
    let signed_attrs = SignedAttrs::new(
        &Oid(oid::PROTOCOL_CONTENT_TYPE.0), &digest, signing_time
    );
    let signature = signer.sign(
        ee_key, SignatureAlgorithm::default(), &signed_attrs.encode_verify()
    )?;
    let (_, signature_bytes) = signature.unwrap();

    Ok(Captured::from_values(Mode::Der, encode::sequence((
        oid::SIGNED_DATA.encode(), // outer contentType
        encode::sequence_as(Tag::CTX_0,
            encode::sequence((
                3u8.encode(), // version
                encode::set( // digestAlgorithms
                    encode::sequence(digest_oid.encode())
                ),
                encode::sequence(( // encapContentInfo
                    oid::PROTOCOL_CONTENT_TYPE.encode(),
                    encode::sequence_as(Tag::CTX_0,
                        OctetString::encode_slice(content.as_ref())
                    ),
                )),
                encode::sequence_as(Tag::CTX_0, ( // certificates
                    ee_certificate.encode_ref(),
                    encode::iter(
                        more_certificates.iter().map(Cert::encode_ref)
                    ),
                )),
                encode::sequence_as(Tag::CTX_1, // crls
                    encode::iter(crls.iter().map(Crl::encode_ref))
                ),
                encode::set( // signerInfos
                    encode::iter((0..signer_count).map(|_| {
                        encode::sequence(( // SignerInfo
                            3u8.encode(), // version
                            sid.encode_ref_as(Tag::CTX_0),
                            encode::sequence(digest_oid.encode()),
                            signed_attrs.encode_ref(),
                            SignatureAlgorithm::default().cms_encode(),
                            OctetString::encode_slice(
                                signature_bytes.as_ref()
                            ),
                            // unsignedAttrs omitted
                        ))
                    }))
                ),
            ))
        ),
    ))))
}


//------------ CmsBuilderError -----------------------------------------------

/// Building a provisioning CMS object failed.
#[derive(Clone, Debug)]
pub enum CmsBuilderError<S> {
    /// No EE certificate was supplied.
    MissingEeCert,

    /// No CRL was supplied.
    MissingCrl,

    /// The EE certificate lacks a Subject Key Identifier.
    MissingKeyIdentifier,

    /// The signing key does not match the EE certificate’s public key.
    KeyAlgorithmMismatch,

    /// The signer refused or failed to sign.
    SigningFailed(SigningError<S>),
}

impl<S> From<SigningError<S>> for CmsBuilderError<S> {
    fn from(err: SigningError<S>) -> Self {
        CmsBuilderError::SigningFailed(err)
    }
}

impl<S: fmt::Display> fmt::Display for CmsBuilderError<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CmsBuilderError::MissingEeCert => {
                f.write_str("no EE certificate supplied")
            }
            CmsBuilderError::MissingCrl => f.write_str("no CRL supplied"),
            CmsBuilderError::MissingKeyIdentifier => {
                f.write_str("EE certificate lacks a key identifier")
            }
            CmsBuilderError::KeyAlgorithmMismatch => {
                f.write_str(
                    "signing key does not match the EE certificate"
                )
            }
            CmsBuilderError::SigningFailed(err) => {
                write!(f, "signing failed: {}", err)
            }
        }
    }
}

impl<S: fmt::Debug + fmt::Display> std::error::Error
    for CmsBuilderError<S> { }


//============ Tests =========================================================

#[cfg(all(test, feature = "softkeys"))]
mod signer_test {
    use super::*;
    use crate::crypto::softsigner::OpenSslSigner;
    use crate::crypto::{PublicKeyFormat, Signer};
    use crate::x509::{Serial, Validity};

    fn validity() -> Validity {
        Validity::new(
            Time::utc(2021, 1, 1, 0, 0, 0),
            Time::utc(2031, 1, 1, 0, 0, 0),
        )
    }

    fn test_crl(
        signer: &OpenSslSigner,
        key: &crate::crypto::softsigner::KeyId,
    ) -> Crl {
        Crl::create(
            Time::utc(2021, 6, 1, 0, 0, 0),
            Time::utc(2021, 6, 2, 0, 0, 0),
            Serial::from(1_u64),
            key, signer,
        ).unwrap()
    }

    #[test]
    fn missing_ee_cert() {
        let signer = OpenSslSigner::new();
        let ca_key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let ee_key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let res = ProvisioningCmsObjectBuilder::new()
            .with_crl(test_crl(&signer, &ca_key))
            .build(
                &Message::list("s", "r"),
                Time::utc(2021, 6, 1, 12, 0, 0),
                &ee_key, &signer,
            );
        assert!(matches!(res, Err(CmsBuilderError::MissingEeCert)));
    }

    #[test]
    fn missing_crl() {
        let signer = OpenSslSigner::new();
        let ca_key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let ee_key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let ee_cert = Cert::new_ee(
            &signer.get_key_info(&ee_key).unwrap(),
            validity(), &ca_key, &signer,
        ).unwrap();
        let res = ProvisioningCmsObjectBuilder::new()
            .with_ee_certificate(ee_cert)
            .build(
                &Message::list("s", "r"),
                Time::utc(2021, 6, 1, 12, 0, 0),
                &ee_key, &signer,
            );
        assert!(matches!(res, Err(CmsBuilderError::MissingCrl)));
    }

    #[test]
    fn key_mismatch() {
        let signer = OpenSslSigner::new();
        let ca_key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let ee_key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let other_key =
            signer.create_key(PublicKeyFormat::default()).unwrap();
        let ee_cert = Cert::new_ee(
            &signer.get_key_info(&ee_key).unwrap(),
            validity(), &ca_key, &signer,
        ).unwrap();
        let res = ProvisioningCmsObjectBuilder::new()
            .with_ee_certificate(ee_cert)
            .with_crl(test_crl(&signer, &ca_key))
            .build(
                &Message::list("s", "r"),
                Time::utc(2021, 6, 1, 12, 0, 0),
                &other_key, &signer,
            );
        assert!(matches!(res, Err(CmsBuilderError::KeyAlgorithmMismatch)));
    }
}
