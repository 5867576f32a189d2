//! The certificate revocation list embedded in provisioning messages.
//!
//! Every provisioning CMS object must carry exactly one CRL issued by the
//! signing CA, covering the embedded EE certificate. What extensions such
//! a CRL carries is rather under-specified, so parsing takes what it
//! understands (authority key identifier and CRL number) and skips the
//! rest.

use bcder::{decode, encode};
use bcder::{Captured, Mode, OctetString, Oid, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bcder::encode::PrimitiveContent;
use bytes::Bytes;
use crate::crypto::{
    KeyIdentifier, PublicKey, SignatureAlgorithm, Signer, SigningError,
    VerificationError,
};
use crate::oid;
use crate::x509::{encode_extension, Name, Serial, SignedData, Time};


//------------ Crl -----------------------------------------------------------

/// A certificate revocation list.
#[derive(Clone, Debug)]
pub struct Crl {
    /// The outer structure of the CRL.
    signed_data: SignedData,

    /// The payload of the CRL.
    tbs: TbsCrl,
}

/// # Creation
///
impl Crl {
    /// Creates a CRL for inclusion in a new CMS object.
    ///
    /// The list is empty: the EE certificates it would cover are one-off
    /// keys that never need revoking. All times and the CRL number are
    /// injected by the caller so that building is reproducible.
    pub fn create<S: Signer>(
        this_update: Time,
        next_update: Time,
        crl_number: Serial,
        issuing_key_id: &S::KeyId,
        signer: &S,
    ) -> Result<Self, SigningError<S::Error>> {
        let issuing_key = signer.get_key_info(issuing_key_id)?;
        let tbs = TbsCrl {
            signature: SignatureAlgorithm::default(),
            issuer: Name::from_pub_key(&issuing_key),
            this_update,
            next_update,
            revoked_certs: RevokedCertificates::empty(),
            authority_key_id: Some(issuing_key.key_identifier()),
            crl_number: Some(crl_number),
        };
        let data = Captured::from_values(Mode::Der, tbs.encode_ref());
        let signature = signer.sign(
            issuing_key_id, tbs.signature, &data
        )?;
        Ok(Crl {
            signed_data: SignedData::new(data, signature),
            tbs,
        })
    }
}

/// # Decoding and Encoding
///
impl Crl {
    /// Decodes a source as a certificate revocation list.
    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    /// Takes an encoded CRL from the beginning of a constructed value.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    /// Parses the content of a CertificateList sequence.
    pub fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let signed_data = SignedData::from_constructed(cons)?;
        let tbs = signed_data.data().clone().decode(
            TbsCrl::take_from
        ).map_err(DecodeError::convert)?;
        Ok(Self { signed_data, tbs })
    }

    /// Returns a value encoder for a reference to the CRL.
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        self.signed_data.encode_ref()
    }

    /// Returns a captured encoding of the CRL.
    pub fn to_captured(&self) -> Captured {
        Captured::from_values(Mode::Der, self.encode_ref())
    }

    pub fn to_bytes(&self) -> Bytes {
        self.to_captured().into_bytes()
    }
}

/// # Inspection
///
impl Crl {
    pub fn this_update(&self) -> Time {
        self.tbs.this_update
    }

    pub fn next_update(&self) -> Time {
        self.tbs.next_update
    }

    pub fn authority_key_identifier(&self) -> Option<KeyIdentifier> {
        self.tbs.authority_key_id
    }

    /// Returns whether the given serial number is on the list.
    pub fn contains(&self, serial: &Serial) -> bool {
        self.tbs.revoked_certs.contains(serial)
    }

    /// Verifies the CRL’s signature against the given public key.
    pub fn verify_signature(
        &self, public_key: &PublicKey
    ) -> Result<(), VerificationError> {
        self.signed_data.verify_signature(public_key)
    }
}

//--- PartialEq and Eq

impl PartialEq for Crl {
    fn eq(&self, other: &Self) -> bool {
        self.signed_data == other.signed_data
    }
}

impl Eq for Crl { }


//------------ TbsCrl --------------------------------------------------------

/// The payload of a CRL.
#[derive(Clone, Debug)]
struct TbsCrl {
    /// The algorithm used for signing. Must be RSA with SHA-256.
    signature: SignatureAlgorithm,

    /// The name of the issuer. Matches the subject of the issuing cert.
    issuer: Name,

    /// The time this version of the CRL was created.
    this_update: Time,

    /// The time the next version of the CRL is likely to be created.
    next_update: Time,

    /// The list of revoked certificates.
    revoked_certs: RevokedCertificates,

    /// Authority Key Identifier, may be included.
    authority_key_id: Option<KeyIdentifier>,

    /// CRL number, may be included.
    crl_number: Option<Serial>,
}

impl TbsCrl {
    /// Takes a TBSCertList value from the beginning of a constructed
    /// value.
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            // version. Technically optional, but the extensions demand
            // v2, encoded as integer 1.
            cons.skip_u8_if(1)?;
            let signature = SignatureAlgorithm::x509_take_from(cons)?;
            let issuer = Name::take_from(cons)?;
            let this_update = Time::take_from(cons)?;
            let next_update = Time::take_from(cons)?;
            let revoked_certs = RevokedCertificates::take_from(cons)?;

            let mut authority_key_id = None;
            let mut crl_number = None;
            cons.take_opt_constructed_if(Tag::CTX_0, |cons| {
                cons.take_sequence(|cons| {
                    while let Some(()) = cons.take_opt_sequence(|cons| {
                        let id = Oid::take_from(cons)?;
                        let _critical =
                            cons.take_opt_bool()?.unwrap_or(false);
                        let value = OctetString::take_from(cons)?;
                        Mode::Der.decode(value.into_source(), |cons| {
                            if id == oid::CE_AUTHORITY_KEY_IDENTIFIER {
                                Self::take_authority_key_identifier(
                                    cons, &mut authority_key_id
                                )
                            }
                            else if id == oid::CE_CRL_NUMBER {
                                Self::take_crl_number(cons, &mut crl_number)
                            }
                            else {
                                // The profile is silent on other
                                // extensions. Skip them.
                                cons.skip_all()
                            }
                        }).map_err(DecodeError::convert)
                    })? { }
                    Ok(())
                })
            })?;

            Ok(TbsCrl {
                signature,
                issuer,
                this_update,
                next_update,
                revoked_certs,
                authority_key_id,
                crl_number,
            })
        })
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
                    cons.skip_all()?;
                    Ok(id)
                })?
            );
            Ok(())
        }
    }

    /// Parses the CRL Number extension.
    fn take_crl_number<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        crl_number: &mut Option<Serial>,
    ) -> Result<(), DecodeError<S::Error>> {
        if crl_number.is_some() {
            Err(cons.content_err("duplicate CRL Number extension"))
        }
        else {
            *crl_number = Some(Serial::take_from(cons)?);
            Ok(())
        }
    }

    /// Returns a value encoder for a reference to this value.
    fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            1.encode(), // version v2
            self.signature.x509_encode(),
            self.issuer.encode_ref(),
            self.this_update.encode_varied(),
            self.next_update.encode_varied(),
            self.revoked_certs.encode_ref(),
            encode::sequence_as(Tag::CTX_0,
                encode::sequence((
                    self.authority_key_id.as_ref().map(|aki| {
                        encode_extension(
                            &oid::CE_AUTHORITY_KEY_IDENTIFIER, false,
                            encode::sequence(aki.encode_ref_as(Tag::CTX_0))
                        )
                    }),
                    self.crl_number.as_ref().map(|number| {
                        encode_extension(
                            &oid::CE_CRL_NUMBER, false,
                            number.encode_ref()
                        )
                    }),
                ))
            )
        ))
    }
}


//------------ RevokedCertificates -------------------------------------------

/// The list of revoked certificates.
///
/// Wraps the captured encoding of the list. Whether a serial number is on
/// the list is answered by walking the capture on demand; the lists seen
/// here are empty or nearly so.
#[derive(Clone, Debug)]
struct RevokedCertificates(Captured);

impl RevokedCertificates {
    /// Creates an empty list.
    fn empty() -> Self {
        RevokedCertificates(Captured::empty(Mode::Der))
    }

    /// Takes a revoked certificates list from the beginning of a value.
    ///
    /// The whole field is optional and must be left out when empty.
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let res = cons.take_opt_sequence(|cons| {
            cons.capture(|cons| {
                while CrlEntry::take_opt_from(cons)?.is_some() { }
                Ok(())
            })
        })?;
        Ok(RevokedCertificates(match res {
            Some(res) => res,
            None => Captured::empty(Mode::Der),
        }))
    }

    fn contains(&self, serial: &Serial) -> bool {
        let mut captured = self.0.clone();
        while let Ok(Some(entry)) = captured.decode_partial(
            |cons| CrlEntry::take_opt_from(cons)
        ) {
            if entry.user_certificate == *serial {
                return true
            }
        }
        false
    }

    fn encode_ref(&self) -> impl encode::Values + '_ {
        if self.0.as_slice().is_empty() {
            None
        }
        else {
            Some(encode::sequence(&self.0))
        }
    }
}


//------------ CrlEntry ------------------------------------------------------

/// An entry in the revoked certificates list.
#[derive(Clone, Debug)]
struct CrlEntry {
    /// The serial number of the revoked certificate.
    user_certificate: Serial,

    /// The time of revocation.
    #[allow(dead_code)]
    revocation_date: Time,
}

impl CrlEntry {
    /// Takes an optional CRL entry from the beginning of a value.
    fn take_opt_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let entry = CrlEntry {
                user_certificate: Serial::take_from(cons)?,
                revocation_date: Time::take_from(cons)?,
            };
            // Entry extensions are permitted by the specification but
            // carry nothing useful here.
            cons.take_opt_sequence(|cons| cons.skip_all())?;
            Ok(entry)
        })
    }
}


//============ Tests =========================================================

#[cfg(all(test, feature = "softkeys"))]
mod signer_test {
    use super::*;
    use crate::crypto::softsigner::OpenSslSigner;
    use crate::crypto::PublicKeyFormat;

    #[test]
    fn create_and_reparse() {
        let signer = OpenSslSigner::new();
        let key = signer.create_key(PublicKeyFormat::default()).unwrap();

        let crl = Crl::create(
            Time::utc(2021, 2, 1, 0, 0, 0),
            Time::utc(2021, 2, 2, 0, 0, 0),
            Serial::from(17_u64),
            &key,
            &signer,
        ).unwrap();

        let decoded = Crl::decode(crl.to_bytes()).unwrap();
        assert_eq!(crl, decoded);
        assert_eq!(
            decoded.this_update(), Time::utc(2021, 2, 1, 0, 0, 0)
        );
        assert_eq!(
            decoded.authority_key_identifier().unwrap(),
            signer.get_key_info(&key).unwrap().key_identifier()
        );
        assert!(!decoded.contains(&Serial::from(12_u64)));
        decoded.verify_signature(
            &signer.get_key_info(&key).unwrap()
        ).unwrap();
    }

    #[test]
    fn identical_inputs_give_identical_bytes() {
        let signer = OpenSslSigner::new();
        let key = signer.create_key(PublicKeyFormat::default()).unwrap();

        let build = || {
            Crl::create(
                Time::utc(2021, 2, 1, 0, 0, 0),
                Time::utc(2021, 2, 2, 0, 0, 0),
                Serial::from(17_u64),
                &key,
                &signer,
            ).unwrap().to_bytes()
        };
        assert_eq!(build(), build());
    }
}
