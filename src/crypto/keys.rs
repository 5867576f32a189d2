//! Types and parameters of keys.

use std::{error, fmt, io, str};
use std::convert::TryFrom;
use std::str::FromStr;
use bcder::{decode, encode};
use bcder::{BitString, Mode, OctetString, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bcder::encode::{PrimitiveContent, Values};
use bcder::Unsigned;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use ring::signature;
use ring::signature::VerificationAlgorithm;
use untrusted::Input;
use crate::oid;
use super::digest::sha1_digest;
use super::signature::Signature;


//------------ PublicKeyFormat -----------------------------------------------

/// The format of public keys used by the protocol.
///
/// All certificates involved in provisioning carry RSA keys, nominally of
/// 2048 bits. As that is the one and only choice, this type is a
/// zero-sized struct for the time being.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PublicKeyFormat;

/// # ASN.1 Algorithm Identifiers
///
/// The format of the public key is identified in certificates through an
/// algorithm identifier. The object identifier must be `rsaEncryption`
/// with NULL parameters; an absent parameter field is generously accepted
/// when parsing.
impl PublicKeyFormat {
    /// Takes and returns an algorithm identifier.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        oid::RSA_ENCRYPTION.skip_if(cons)?;
        cons.take_opt_null()?;
        Ok(PublicKeyFormat)
    }

    /// Provides an encoder for the algorithm identifier.
    pub fn encode(self) -> impl encode::Values {
        encode::sequence((
            oid::RSA_ENCRYPTION.encode(),
            ().encode(),
        ))
    }
}


//------------ PublicKey -----------------------------------------------------

/// A public key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicKey {
    algorithm: PublicKeyFormat,
    bits: BitString,
}

impl PublicKey {
    pub fn algorithm(&self) -> PublicKeyFormat {
        self.algorithm
    }

    /// Returns the key’s bits, i.e., the DER-encoded `RSAPublicKey`.
    pub fn bits(&self) -> &[u8] {
        // The bit string of an RSA key is derived from DER-encoded data
        // and therefore always octet-aligned.
        self.bits.octet_slice().unwrap_or(b"")
    }

    /// Returns the key identifier for this key.
    ///
    /// The identifier is the SHA-1 hash over the key’s bits.
    pub fn key_identifier(&self) -> KeyIdentifier {
        KeyIdentifier::try_from(
            sha1_digest(self.bits()).as_ref()
        ).unwrap() // SHA-1 produces exactly 20 octets.
    }

    /// Returns the size of the RSA modulus in bits.
    ///
    /// Returns `None` if the key’s bits don’t parse as an `RSAPublicKey`.
    pub fn key_size(&self) -> Option<usize> {
        let modulus = Mode::Der.decode(self.bits().into_source(), |cons| {
            cons.take_sequence(|cons| {
                let modulus = Unsigned::take_from(cons)?;
                let _exponent = Unsigned::take_from(cons)?;
                Ok(modulus)
            })
        }).ok()?;
        let bits: &[u8] = modulus.as_ref();
        let bits = match bits.split_first() {
            Some((0, rest)) => rest,
            _ => bits,
        };
        let first = *bits.first()?;
        Some(bits.len() * 8 - first.leading_zeros() as usize)
    }

    /// Verifies a signature over `message` using this public key.
    pub fn verify(
        &self, message: &[u8], signature: &Signature
    ) -> Result<(), VerificationError> {
        signature::RSA_PKCS1_2048_8192_SHA256.verify(
            Input::from(self.bits()),
            Input::from(message),
            Input::from(signature.value().as_ref())
        ).map_err(|_| VerificationError)
    }
}

/// # As `SubjectPublicKeyInfo`
///
/// Public keys are included in X.509 certificates as
/// `SubjectPublicKeyInfo` structures. As these contain the same
/// information as `PublicKey`, it can be decoded from and encoded to such
/// sequences.
impl PublicKey {
    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            Ok(PublicKey {
                algorithm: PublicKeyFormat::take_from(cons)?,
                bits: BitString::take_from(cons)?,
            })
        })
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            self.algorithm.encode(),
            self.bits.encode_ref(),
        ))
    }

    /// Returns the DER-encoded `SubjectPublicKeyInfo` as bytes.
    pub fn to_info_bytes(&self) -> Bytes {
        self.encode_ref().to_captured(Mode::Der).into_bytes()
    }
}


//------------ KeyIdentifier -------------------------------------------------

/// A key identifier.
///
/// This is the SHA-1 hash over the public key’s bits. On the wire it
/// appears in two disguises: as an OCTET STRING in certificate extensions
/// and the CMS signer identifier, and as URL-safe Base64 without padding
/// in the `ski` attribute of a revocation payload.
#[derive(Clone, Copy, Eq, Hash)]
pub struct KeyIdentifier([u8; 20]);

impl KeyIdentifier {
    /// Creates a new identifier for the given key.
    pub fn from_public_key(key: &PublicKey) -> Self {
        key.key_identifier()
    }

    /// Returns an octet slice of the key identifier’s value.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Returns an octet array with the hex representation of the value.
    pub fn into_hex(self) -> [u8; 40] {
        let mut res = [0u8; 40];
        for (pos, ch) in self.0.iter().enumerate() {
            res[pos * 2] = hexdig(ch >> 4);
            res[pos * 2 + 1] = hexdig(ch & 0x0F);
        }
        res
    }

    /// Returns the URL-safe Base64 form used in XML `ski` attributes.
    ///
    /// Whether the peers pad is not entirely settled; emitting without
    /// padding is what everyone accepts.
    pub fn to_encoded_string(self) -> String {
        base64::encode_config(self.as_slice(), base64::URL_SAFE_NO_PAD)
    }

    /// Parses the URL-safe Base64 form used in XML `ski` attributes.
    pub fn from_encoded_str(s: &str) -> Result<Self, RepresentationError> {
        let bytes = base64::decode_config(s, base64::URL_SAFE_NO_PAD)
            .map_err(|_| RepresentationError)?;
        Self::try_from(bytes.as_slice())
    }

    /// Takes an encoded key identifier from a constructed value.
    ///
    /// ```text
    /// KeyIdentifier ::= OCTET STRING
    /// ```
    ///
    /// The content of the octet string needs to be a SHA-1 hash, so it
    /// must be exactly 20 octets long.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let octets = OctetString::take_from(cons)?;
        Self::try_from(octets.to_bytes().as_ref()).map_err(|err| {
            cons.content_err(err)
        })
    }
}

fn hexdig(ch: u8) -> u8 {
    if ch < 0xa { ch + b'0' }
    else { ch - 0xa + b'a' }
}


//--- TryFrom and FromStr

impl<'a> TryFrom<&'a [u8]> for KeyIdentifier {
    type Error = RepresentationError;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        TryFrom::try_from(value)
            .map(KeyIdentifier)
            .map_err(|_| RepresentationError)
    }
}

impl FromStr for KeyIdentifier {
    type Err = RepresentationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != 40 || !value.is_ascii() {
            return Err(RepresentationError)
        }
        let mut res = KeyIdentifier(Default::default());
        for (pos, ch) in value.as_bytes().chunks(2).enumerate() {
            let ch = unsafe { str::from_utf8_unchecked(ch) };
            res.0[pos] = u8::from_str_radix(ch, 16)
                .map_err(|_| RepresentationError)?;
        }
        Ok(res)
    }
}


//--- AsRef

impl AsRef<[u8]> for KeyIdentifier {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<T: AsRef<[u8]>> PartialEq<T> for KeyIdentifier {
    fn eq(&self, other: &T) -> bool {
        self.0.as_ref().eq(other.as_ref())
    }
}


//--- Display and Debug

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let hex = self.into_hex();
        let hex = unsafe { str::from_utf8_unchecked(&hex) };
        f.write_str(hex)
    }
}

impl fmt::Debug for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KeyIdentifier({})", self)
    }
}


//--- PrimitiveContent

impl PrimitiveContent for KeyIdentifier {
    const TAG: Tag = Tag::OCTET_STRING;

    fn encoded_len(&self, _mode: Mode) -> usize {
        20
    }

    fn write_encoded<W: io::Write>(
        &self, _mode: Mode, target: &mut W
    ) -> Result<(), io::Error> {
        target.write_all(&self.0)
    }
}


//--- Serialize and Deserialize

impl serde::Serialize for KeyIdentifier {
    fn serialize<S: serde::Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for KeyIdentifier {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D
    ) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        KeyIdentifier::from_str(&string).map_err(serde::de::Error::custom)
    }
}


//------------ VerificationError ---------------------------------------------

/// A signature did not verify.
///
/// No further information is provided on purpose.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VerificationError;

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("signature verification failed")
    }
}

impl error::Error for VerificationError { }


//------------ RepresentationError -------------------------------------------

/// A source value is not correctly formed for converting into a value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RepresentationError;

impl fmt::Display for RepresentationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("wrong representation format")
    }
}

impl error::Error for RepresentationError { }

impl From<RepresentationError> for bcder::decode::ContentError {
    fn from(_: RepresentationError) -> Self {
        bcder::decode::ContentError::from_static("invalid key identifier")
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_id() -> KeyIdentifier {
        let mut bytes = [0u8; 20];
        for (pos, item) in bytes.iter_mut().enumerate() {
            *item = pos as u8;
        }
        KeyIdentifier::try_from(bytes.as_ref()).unwrap()
    }

    #[test]
    fn hex_round_trip() {
        let id = test_id();
        let hex = id.to_string();
        assert_eq!(hex, "000102030405060708090a0b0c0d0e0f10111213");
        assert_eq!(KeyIdentifier::from_str(&hex).unwrap(), id);
    }

    #[test]
    fn encoded_string_round_trip() {
        let id = test_id();
        let encoded = id.to_encoded_string();
        assert_eq!(encoded, "AAECAwQFBgcICQoLDA0ODxAREhM");
        assert_eq!(KeyIdentifier::from_encoded_str(&encoded).unwrap(), id);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(KeyIdentifier::try_from(b"too short".as_ref()).is_err());
        assert!(KeyIdentifier::from_encoded_str("AAEC").is_err());
    }

    #[test]
    fn serde_round_trip() {
        let id = test_id();
        let json = serde_json::to_string(&id).unwrap();
        let back: KeyIdentifier = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
