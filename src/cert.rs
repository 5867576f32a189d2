//! Certificates as they appear in provisioning CMS objects.
//!
//! The certificates exchanged here are plain identity certificates: a
//! CA certificate wrapping the key a peer signs with, and the single-use
//! EE certificates embedded in each CMS message. No resource extensions
//! are involved.
//!
//! Parsing is deliberately lenient about the profile: whether a
//! certificate has a Subject Key Identifier, or carries the CA bit, are
//! questions for the CMS object parser to answer through its validation
//! result, not reasons to refuse decoding. Structural brokenness is still
//! an error.

use std::ops;
use bcder::{decode, encode};
use bcder::{Captured, Mode, OctetString, Oid, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bcder::encode::PrimitiveContent;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use crate::crypto::{
    KeyIdentifier, PublicKey, SignatureAlgorithm, Signer, SigningError,
};
use crate::oid;
use crate::x509::{
    encode_extension, Name, Serial, SignedData, Validity,
};


//------------ Cert ----------------------------------------------------------

/// A certificate embedded in, or referenced by, a provisioning message.
#[derive(Clone, Debug)]
pub struct Cert {
    /// The outer structure of the certificate.
    signed_data: SignedData,

    /// The data of the certificate.
    tbs: TbsCert,
}

/// # Creation
///
impl Cert {
    /// Creates a self-signed CA certificate for the given key.
    ///
    /// This is the kind of certificate peers exchange out of band before
    /// speaking the protocol: it simply wraps the public key the peer
    /// will sign its CMS messages under.
    pub fn new_ta<S: Signer>(
        validity: Validity,
        issuing_key_id: &S::KeyId,
        signer: &S,
    ) -> Result<Self, SigningError<S::Error>> {
        let pub_key = signer.get_key_info(issuing_key_id)?;
        TbsCert::new(
            Serial::from(1_u64), validity, &pub_key, &pub_key
        ).into_cert(signer, issuing_key_id)
    }

    /// Creates an EE certificate for a one-off CMS signing key.
    ///
    /// The certificate has the Basic Constraints extension absent, a
    /// Subject Key Identifier matching `ee_key`, and an Authority Key
    /// Identifier naming the issuing key, which also signs it.
    pub fn new_ee<S: Signer>(
        ee_key: &PublicKey,
        validity: Validity,
        issuing_key_id: &S::KeyId,
        signer: &S,
    ) -> Result<Self, SigningError<S::Error>> {
        let serial_number = Serial::random(signer)?;
        let issuing_key = signer.get_key_info(issuing_key_id)?;
        TbsCert::new(
            serial_number, validity, &issuing_key, ee_key
        ).into_cert(signer, issuing_key_id)
    }
}

/// # Decoding and Encoding
///
impl Cert {
    /// Decodes a source as a certificate.
    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    /// Takes an encoded certificate from the beginning of a value.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    /// Parses the content of a Certificate sequence.
    pub fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let signed_data = SignedData::from_constructed(cons)?;
        let tbs = signed_data.data().clone().decode(
            TbsCert::from_constructed
        ).map_err(DecodeError::convert)?;
        Ok(Self { signed_data, tbs })
    }

    /// Returns a value encoder for a reference to the certificate.
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        self.signed_data.encode_ref()
    }

    /// Returns a captured encoding of the certificate.
    pub fn to_captured(&self) -> Captured {
        Captured::from_values(Mode::Der, self.encode_ref())
    }

    /// Returns DER-encoded bytes for this certificate.
    pub fn to_bytes(&self) -> Bytes {
        self.to_captured().into_bytes()
    }
}

/// # Inspection
///
impl Cert {
    /// Returns whether this is an end-entity certificate.
    ///
    /// Per RFC 5280, a certificate without the Basic Constraints
    /// extension must not be used to verify certificate signatures, so
    /// an absent extension makes an EE certificate just as an explicit
    /// `cA` of false does.
    pub fn is_ee(&self) -> bool {
        !self.tbs.basic_ca.unwrap_or(false)
    }

    /// Verifies that this certificate carries `issuer`’s signature.
    pub fn verify_signature(
        &self, issuer_key: &PublicKey
    ) -> Result<(), crate::crypto::VerificationError> {
        self.signed_data.verify_signature(issuer_key)
    }
}

//--- Deref and AsRef

impl ops::Deref for Cert {
    type Target = TbsCert;

    fn deref(&self) -> &Self::Target {
        &self.tbs
    }
}

impl AsRef<TbsCert> for Cert {
    fn as_ref(&self) -> &TbsCert {
        &self.tbs
    }
}

//--- PartialEq and Eq

impl PartialEq for Cert {
    fn eq(&self, other: &Self) -> bool {
        // The TbsCert is just a parsed view of the same octets.
        self.signed_data == other.signed_data
    }
}

impl Eq for Cert { }

//--- Serialize and Deserialize

impl serde::Serialize for Cert {
    fn serialize<S: serde::Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        base64::encode(self.to_bytes().as_ref()).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Cert {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D
    ) -> Result<Self, D::Error> {
        use serde::de;

        let string = String::deserialize(deserializer)?;
        let decoded = base64::decode(&string).map_err(de::Error::custom)?;
        Cert::decode(Bytes::from(decoded)).map_err(de::Error::custom)
    }
}


//------------ TbsCert -------------------------------------------------------

/// The data of a certificate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TbsCert {
    /// The serial number.
    serial_number: Serial,

    /// The name of the issuer. Not meaningful in the protocol.
    issuer: Name,

    /// The validity of the certificate.
    validity: Validity,

    /// The name of the subject. Not meaningful in the protocol.
    subject: Name,

    /// Information about the public key of this certificate.
    subject_public_key_info: PublicKey,

    /// Basic Constraints.
    ///
    /// Indicates whether the extension is present and, if so, whether
    /// the `cA` boolean is set.
    basic_ca: Option<bool>,

    /// Subject Key Identifier, if the extension is present.
    subject_key_id: Option<KeyIdentifier>,

    /// Authority Key Identifier, if the extension is present.
    authority_key_id: Option<KeyIdentifier>,
}

/// # Data Access
///
impl TbsCert {
    pub fn serial_number(&self) -> &Serial {
        &self.serial_number
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    /// Returns a reference to the certificate’s public key.
    pub fn subject_public_key_info(&self) -> &PublicKey {
        &self.subject_public_key_info
    }

    /// Returns whether the Basic Constraints extension is present and
    /// what it says.
    pub fn basic_ca(&self) -> Option<bool> {
        self.basic_ca
    }

    /// Returns the Subject Key Identifier extension value, if present.
    pub fn subject_key_identifier(&self) -> Option<KeyIdentifier> {
        self.subject_key_id
    }

    pub fn authority_key_identifier(&self) -> Option<KeyIdentifier> {
        self.authority_key_id
    }
}

/// # Decoding and Encoding
///
impl TbsCert {
    /// Parses the content of a TBSCertificate sequence.
    ///
    /// Only version 3 certificates are accepted, since the extensions
    /// carrying the key identifiers require it. Extensions other than
    /// Basic Constraints and the two key identifiers are skipped; the
    /// certificates exchanged here are poorly profiled in the wild and
    /// may carry things like key usage, which are unambiguous in this
    /// context anyway.
    fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            // version [0] EXPLICIT. v3 is encoded as integer 2.
            cons.take_constructed_if(Tag::CTX_0, |cons| cons.skip_u8_if(2))?;

            let serial_number = Serial::take_from(cons)?;
            let _sig = SignatureAlgorithm::x509_take_from(cons)?;
            let issuer = Name::take_from(cons)?;
            let validity = Validity::take_from(cons)?;
            let subject = Name::take_from(cons)?;
            let subject_public_key_info = PublicKey::take_from(cons)?;

            let mut basic_ca = None;
            let mut subject_key_id = None;
            let mut authority_key_id = None;

            cons.take_opt_constructed_if(Tag::CTX_3, |cons| {
                cons.take_sequence(|cons| {
                    while let Some(()) = cons.take_opt_sequence(|cons| {
                        let id = Oid::take_from(cons)?;
                        let _critical =
                            cons.take_opt_bool()?.unwrap_or(false);
                        let value = OctetString::take_from(cons)?;
                        Mode::Der.decode(value.into_source(), |cons| {
                            if id == oid::CE_BASIC_CONSTRAINTS {
                                Self::take_basic_constraints(
                                    cons, &mut basic_ca
                                )
                            }
                            else if id == oid::CE_SUBJECT_KEY_IDENTIFIER {
                                Self::take_subject_key_identifier(
                                    cons, &mut subject_key_id
                                )
                            }
                            else if id == oid::CE_AUTHORITY_KEY_IDENTIFIER {
                                Self::take_authority_key_identifier(
                                    cons, &mut authority_key_id
                                )
                            }
                            else {
                                cons.skip_all()
                            }
                        }).map_err(DecodeError::convert)?;
                        Ok(())
                    })? { }
                    Ok(())
                })
            })?;

            Ok(TbsCert {
                serial_number,
                issuer,
                validity,
                subject,
                subject_public_key_info,
                basic_ca,
                subject_key_id,
                authority_key_id,
            })
        })
    }

    /// Parses the Basic Constraints extension.
    fn take_basic_constraints<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        basic_ca: &mut Option<bool>,
    ) -> Result<(), DecodeError<S::Error>> {
        if basic_ca.is_some() {
            Err(cons.content_err("duplicate Basic Constraints extension"))
        }
        else {
            cons.take_sequence(|cons| {
                *basic_ca = Some(cons.take_opt_bool()?.unwrap_or(false));
                // A pathLenConstraint is irrelevant here but permitted.
                cons.take_opt_u64()?;
                Ok(())
            })
        }
    }

    /// Parses the Subject Key Identifier extension.
    fn take_subject_key_identifier<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        subject_key_id: &mut Option<KeyIdentifier>,
    ) -> Result<(), DecodeError<S::Error>> {
        if subject_key_id.is_some() {
            Err(cons.content_err(
                "duplicate Subject Key Identifier extension"
            ))
        }
        else {
            *subject_key_id = Some(KeyIdentifier::take_from(cons)?);
            Ok(())
        }
    }

    /// Parses the Authority Key Identifier extension.
    fn take_authority_key_identifier<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        authority_key_id: &mut Option<KeyIdentifier>,
    ) -> Result<(), DecodeError<S::Error>> {
        if authority_key_id.is_some() {
            Err(cons.content_err(
                "duplicate Authority Key Identifier extension"
            ))
        }
        else {
            *authority_key_id = Some(
                cons.take_sequence(|cons| {
                    let octets = cons.take_value_if(
                        Tag::CTX_0, OctetString::from_content
                    )?;
                    let id = KeyIdentifier::try_from(
                        octets.to_bytes().as_ref()
                    ).map_err(|err| cons.content_err(err))?;
                    // Issuer and serial may trail the key identifier.
                    cons.skip_all()?;
                    Ok(id)
                })?
            );
            Ok(())
        }
    }

    /// Returns an encoder for the value.
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            encode::sequence_as(Tag::CTX_0, 2.encode()), // version v3
            self.serial_number.encode_ref(),
            SignatureAlgorithm::default().x509_encode(),
            self.issuer.encode_ref(),
            self.validity.encode(),
            self.subject.encode_ref(),
            self.subject_public_key_info.encode_ref(),
            // extensions [3]
            encode::sequence_as(
                Tag::CTX_3,
                encode::sequence((
                    self.basic_ca.map(|ca| {
                        encode_extension(
                            &oid::CE_BASIC_CONSTRAINTS, true,
                            encode::sequence(
                                if ca { Some(ca.encode()) } else { None }
                            ),
                        )
                    }),
                    self.subject_key_id.as_ref().map(|ski| {
                        encode_extension(
                            &oid::CE_SUBJECT_KEY_IDENTIFIER, false,
                            ski.encode_ref(),
                        )
                    }),
                    self.authority_key_id.as_ref().map(|aki| {
                        encode_extension(
                            &oid::CE_AUTHORITY_KEY_IDENTIFIER, false,
                            encode::sequence(aki.encode_ref_as(Tag::CTX_0)),
                        )
                    }),
                )),
            ),
        ))
    }
}

/// # Creation and Conversion
///
impl TbsCert {
    /// Creates certificate data to be signed with the `Signer` trait.
    fn new(
        serial_number: Serial,
        validity: Validity,
        issuing_key: &PublicKey,
        subject_key: &PublicKey,
    ) -> TbsCert {
        let self_signed = issuing_key == subject_key;
        TbsCert {
            serial_number,
            issuer: Name::from_pub_key(issuing_key),
            validity,
            subject: Name::from_pub_key(subject_key),
            subject_public_key_info: subject_key.clone(),
            basic_ca: if self_signed { Some(true) } else { None },
            subject_key_id: Some(subject_key.key_identifier()),
            authority_key_id: if self_signed {
                None
            }
            else {
                Some(issuing_key.key_identifier())
            },
        }
    }

    /// Converts the value into a signed certificate.
    fn into_cert<S: Signer>(
        self,
        signer: &S,
        key: &S::KeyId,
    ) -> Result<Cert, SigningError<S::Error>> {
        let data = Captured::from_values(Mode::Der, self.encode_ref());
        let signature = signer.sign(
            key, SignatureAlgorithm::default(), &data
        )?;
        Ok(Cert {
            signed_data: SignedData::new(data, signature),
            tbs: self,
        })
    }
}


//============ Tests =========================================================

#[cfg(all(test, feature = "softkeys"))]
mod signer_test {
    use super::*;
    use crate::crypto::softsigner::OpenSslSigner;
    use crate::crypto::PublicKeyFormat;
    use crate::x509::Time;

    fn validity() -> Validity {
        Validity::new(
            Time::utc(2021, 1, 1, 0, 0, 0),
            Time::utc(2031, 1, 1, 0, 0, 0),
        )
    }

    #[test]
    fn build_and_reparse_ta_cert() {
        let signer = OpenSslSigner::new();
        let key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let cert = Cert::new_ta(validity(), &key, &signer).unwrap();

        assert!(!cert.is_ee());
        let decoded = Cert::decode(cert.to_bytes()).unwrap();
        assert_eq!(cert, decoded);
        assert_eq!(decoded.basic_ca(), Some(true));
        decoded.verify_signature(
            &signer.get_key_info(&key).unwrap()
        ).unwrap();
    }

    #[test]
    fn build_and_reparse_ee_cert() {
        let signer = OpenSslSigner::new();
        let ca_key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let ee_key_id =
            signer.create_key(PublicKeyFormat::default()).unwrap();
        let ee_key = signer.get_key_info(&ee_key_id).unwrap();

        let cert = Cert::new_ee(
            &ee_key, validity(), &ca_key, &signer
        ).unwrap();
        let decoded = Cert::decode(cert.to_bytes()).unwrap();

        assert!(decoded.is_ee());
        assert_eq!(decoded.basic_ca(), None);
        assert_eq!(
            decoded.subject_key_identifier().unwrap(),
            ee_key.key_identifier()
        );
        assert_eq!(
            decoded.authority_key_identifier().unwrap(),
            signer.get_key_info(&ca_key).unwrap().key_identifier()
        );
        decoded.verify_signature(
            &signer.get_key_info(&ca_key).unwrap()
        ).unwrap();
    }

    #[test]
    fn serde_round_trip() {
        let signer = OpenSslSigner::new();
        let key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let cert = Cert::new_ta(validity(), &key, &signer).unwrap();

        let json = serde_json::to_string(&cert).unwrap();
        let back: Cert = serde_json::from_str(&json).unwrap();
        assert_eq!(cert, back);
    }
}
