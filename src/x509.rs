//! Types common to all things X.509.

use std::{error, fmt, io, ops, str};
use std::str::FromStr;
use bcder::{decode, encode};
use bcder::{BitString, Captured, ConstOid, Mode, OctetString, Oid, Tag};
use bcder::decode::{ContentError, DecodeError, IntoSource, Source};
use bcder::encode::PrimitiveContent;
use bcder::Unsigned;
use bytes::Bytes;
use chrono::{DateTime, Datelike, LocalResult, TimeZone, Timelike, Utc};
use crate::crypto::{
    PublicKey, Signature, SignatureAlgorithm, VerificationError,
};
use crate::oid;


//------------ Functions -----------------------------------------------------

/// Returns an encoder for a single certificate or CRL extension.
pub fn encode_extension<V: encode::Values>(
    extension_id: &'static ConstOid,
    critical: bool,
    content: V
) -> impl encode::Values {
    encode::sequence((
        extension_id.encode(),
        if critical { Some(true.encode()) } else { None },
        OctetString::encode_wrapped(Mode::Der, content)
    ))
}


//------------ Name ----------------------------------------------------------

/// An X.501 name as used in issuer and subject fields.
///
/// Names don’t carry meaning in the protocol, so the captured encoding is
/// kept without interpreting it beyond a structural walk.
#[derive(Clone, Debug)]
pub struct Name(Captured);

impl Name {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.capture(|cons| {
            cons.take_sequence(|cons| { // RDNSequence
                while let Some(()) = cons.take_opt_set(|cons| {
                    let mut empty_set = true;
                    while let Some(()) = cons.take_opt_sequence(|cons| {
                        empty_set = false;
                        Oid::skip_in(cons)?;
                        if cons.skip_one()?.is_none() {
                            return Err(cons.content_err("invalid name"))
                        }
                        Ok(())
                    })? { }
                    if empty_set {
                        return Err(cons.content_err(
                            "empty relative distinguished name"
                        ))
                    }
                    Ok(())
                })? { }
                Ok(())
            })
        }).map(Name)
    }

    /// Derives a name from a public key.
    ///
    /// Names of the certificates exchanged here are not meaningful; using
    /// the hex form of the key identifier as the common name guarantees
    /// uniqueness without requiring configuration.
    pub fn from_pub_key(key_info: &PublicKey) -> Self {
        let enc = key_info.key_identifier().into_hex();
        let values = encode::sequence(
            encode::set(
                encode::sequence((
                    oid::AT_COMMON_NAME.encode(),
                    enc.encode_as(Tag::PRINTABLE_STRING),
                ))
            )
        );
        Name(Captured::from_values(Mode::Der, values))
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        &self.0
    }
}

//--- PartialEq and Eq

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl Eq for Name { }


//------------ Serial --------------------------------------------------------

/// A certificate serial number.
///
/// Stored as the minimal big-endian unsigned integer value.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Serial(Bytes);

impl Serial {
    /// Creates a serial number from its big-endian value.
    ///
    /// Leading zero octets are stripped; an all-zero slice becomes the
    /// serial number zero.
    pub fn from_slice(slice: &[u8]) -> Self {
        let start = slice.iter().position(|&ch| ch != 0)
            .unwrap_or(slice.len().saturating_sub(1));
        Serial(Bytes::copy_from_slice(&slice[start..]))
    }

    /// Creates a random serial number of twenty octets of randomness.
    pub fn random<S: crate::crypto::Signer>(
        signer: &S
    ) -> Result<Self, S::Error> {
        let mut res = [0u8; 20];
        signer.rand(&mut res)?;
        res[0] |= 0x01; // never zero, never stripped to nothing
        res[0] &= 0x7F;
        Ok(Self::from_slice(&res))
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        Unsigned::take_from(cons).map(|value| Self::from_slice(value.as_ref()))
    }
}

impl From<u64> for Serial {
    fn from(value: u64) -> Self {
        Self::from_slice(value.to_be_bytes().as_ref())
    }
}

//--- PrimitiveContent

impl PrimitiveContent for Serial {
    const TAG: Tag = Tag::INTEGER;

    fn encoded_len(&self, _mode: Mode) -> usize {
        if self.0.is_empty() {
            1
        }
        else if self.0[0] & 0x80 != 0 {
            self.0.len() + 1
        }
        else {
            self.0.len()
        }
    }

    fn write_encoded<W: io::Write>(
        &self, _mode: Mode, target: &mut W
    ) -> Result<(), io::Error> {
        if self.0.is_empty() {
            return target.write_all(&[0])
        }
        if self.0[0] & 0x80 != 0 {
            target.write_all(&[0])?;
        }
        target.write_all(self.0.as_ref())
    }
}


//------------ SignedData ----------------------------------------------------

/// The outer structure of anything signed the X.509 way: the captured
/// to-be-signed data, the signature algorithm, and the signature.
#[derive(Clone, Debug)]
pub struct SignedData {
    data: Captured,
    signature: Signature,
}

impl SignedData {
    pub fn new(data: Captured, signature: Signature) -> Self {
        SignedData { data, signature }
    }

    pub fn data(&self) -> &Captured {
        &self.data
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    pub fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        Ok(SignedData {
            data: cons.capture_one()?,
            signature: Signature::new(
                SignatureAlgorithm::x509_take_from(cons)?,
                BitString::take_from(cons)?.octet_bytes()
            )
        })
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            &self.data,
            self.signature.algorithm().x509_encode(),
            SignatureValueContent(self).encode(),
        ))
    }

    pub fn verify_signature(
        &self, public_key: &PublicKey
    ) -> Result<(), VerificationError> {
        public_key.verify(self.data.as_ref(), &self.signature)
    }
}

//--- PartialEq and Eq

impl PartialEq for SignedData {
    fn eq(&self, other: &Self) -> bool {
        self.data.as_slice() == other.data.as_slice()
            && self.signature == other.signature
    }
}

impl Eq for SignedData { }


#[derive(Clone, Copy, Debug)]
struct SignatureValueContent<'a>(&'a SignedData);

impl<'a> PrimitiveContent for SignatureValueContent<'a> {
    const TAG: Tag = Tag::BIT_STRING;

    fn encoded_len(&self, _: Mode) -> usize {
        self.0.signature.value().len() + 1
    }

    fn write_encoded<W: io::Write>(
        &self, _: Mode, target: &mut W
    ) -> Result<(), io::Error> {
        target.write_all(&[0u8])?;
        target.write_all(self.0.signature.value().as_ref())
    }
}


//------------ Time ----------------------------------------------------------

/// A point in time.
///
/// Wraps a `chrono` UTC time and adds the two DER spellings RFC 5280
/// prescribes: UTCTime for the years 1950–2049, GeneralizedTime outside
/// that range.
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd,
    serde::Deserialize, serde::Serialize,
)]
pub struct Time(DateTime<Utc>);

impl Time {
    pub fn new(time: DateTime<Utc>) -> Self {
        Time(time)
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn utc(
        year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32
    ) -> Self {
        // The inputs in this crate are either compile-time constants or
        // have been range-checked when parsed.
        match Utc.with_ymd_and_hms(year, month, day, hour, min, sec) {
            LocalResult::Single(time) => Time(time),
            _ => Time(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive(|tag, prim| {
            match tag {
                Tag::UTC_TIME => {
                    // RFC 5280 requires the format YYMMDDHHMMSSZ.
                    let year = read_two_char(prim)? as i32;
                    let year = if year >= 50 { year + 1900 }
                               else { year + 2000 };
                    let res = (
                        year,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                    );
                    if prim.take_u8()? != b'Z' {
                        return Err(prim.content_err("malformed time value"))
                    }
                    Self::from_parts(res).map_err(|err| {
                        prim.content_err(err)
                    })
                }
                Tag::GENERALIZED_TIME => {
                    // RFC 5280 requires the format YYYYMMDDHHMMSSZ.
                    let res = (
                        read_four_char(prim)? as i32,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                        read_two_char(prim)?,
                    );
                    if prim.take_u8()? != b'Z' {
                        return Err(prim.content_err("malformed time value"))
                    }
                    Self::from_parts(res).map_err(|err| {
                        prim.content_err(err)
                    })
                }
                _ => Err(prim.content_err("malformed time value"))
            }
        })
    }

    fn from_parts(
        parts: (i32, u32, u32, u32, u32, u32)
    ) -> Result<Self, ContentError> {
        match Utc.with_ymd_and_hms(
            parts.0, parts.1, parts.2, parts.3, parts.4, parts.5
        ) {
            LocalResult::Single(time) => Ok(Time(time)),
            _ => Err(ContentError::from_static("malformed time value"))
        }
    }

    pub fn encode_varied(self) -> impl encode::Values {
        if self.year() < 1950 || self.year() > 2049 {
            (None, Some(GeneralizedTime(self).encode()))
        }
        else {
            (Some(UtcTime(self).encode()), None)
        }
    }
}

//--- Deref, AsRef, From

impl ops::Deref for Time {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<DateTime<Utc>> for Time {
    fn as_ref(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(time: DateTime<Utc>) -> Self {
        Time(time)
    }
}

impl From<Time> for DateTime<Utc> {
    fn from(time: Time) -> Self {
        time.0
    }
}

impl FromStr for Time {
    type Err = chrono::format::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FromStr::from_str(s).map(Time)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "{}",
            self.0.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        )
    }
}


fn read_two_char<S: decode::Source>(
    source: &mut S
) -> Result<u32, DecodeError<S::Error>> {
    let mut s = [0u8; 2];
    s[0] = source.take_u8()?;
    s[1] = source.take_u8()?;
    let s = match str::from_utf8(&s[..]) {
        Ok(s) => s,
        Err(_) => return Err(source.content_err("malformed time value"))
    };
    u32::from_str(s).map_err(|_| source.content_err("malformed time value"))
}

fn read_four_char<S: decode::Source>(
    source: &mut S
) -> Result<u32, DecodeError<S::Error>> {
    let mut s = [0u8; 4];
    for ch in &mut s {
        *ch = source.take_u8()?;
    }
    let s = match str::from_utf8(&s[..]) {
        Ok(s) => s,
        Err(_) => return Err(source.content_err("malformed time value"))
    };
    u32::from_str(s).map_err(|_| source.content_err("malformed time value"))
}


//------------ UtcTime and GeneralizedTime -----------------------------------

struct UtcTime(Time);

impl PrimitiveContent for UtcTime {
    const TAG: Tag = Tag::UTC_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        13 // yyMMddhhmmssZ
    }

    fn write_encoded<W: io::Write>(
        &self, _: Mode, target: &mut W
    ) -> Result<(), io::Error> {
        write!(
            target, "{:02}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year() % 100, self.0.month(), self.0.day(),
            self.0.hour(), self.0.minute(), self.0.second()
        )
    }
}

struct GeneralizedTime(Time);

impl PrimitiveContent for GeneralizedTime {
    const TAG: Tag = Tag::GENERALIZED_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        15 // yyyyMMddhhmmssZ
    }

    fn write_encoded<W: io::Write>(
        &self, _: Mode, target: &mut W
    ) -> Result<(), io::Error> {
        write!(
            target, "{:04}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year(), self.0.month(), self.0.day(),
            self.0.hour(), self.0.minute(), self.0.second()
        )
    }
}


//------------ Validity ------------------------------------------------------

/// The validity period of a certificate.
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq,
    serde::Deserialize, serde::Serialize,
)]
pub struct Validity {
    not_before: Time,
    not_after: Time,
}

impl Validity {
    /// Creates a validity period.
    ///
    /// If the two times arrive in the wrong order they are swapped, so
    /// `not_before <= not_after` always holds.
    pub fn new(not_before: Time, not_after: Time) -> Self {
        if not_before <= not_after {
            Validity { not_before, not_after }
        }
        else {
            Validity { not_before: not_after, not_after: not_before }
        }
    }

    pub fn not_before(self) -> Time {
        self.not_before
    }

    pub fn not_after(self) -> Time {
        self.not_after
    }

    /// Returns whether `when` falls within the period.
    pub fn contains(self, when: Time) -> bool {
        self.not_before <= when && when <= self.not_after
    }

    pub fn verify_at(self, now: Time) -> Result<(), ValidityPeriodError> {
        if now < self.not_before {
            Err(ValidityPeriodError::too_new())
        }
        else if now > self.not_after {
            Err(ValidityPeriodError::too_old())
        }
        else {
            Ok(())
        }
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            Ok(Validity::new(
                Time::take_from(cons)?,
                Time::take_from(cons)?,
            ))
        })
    }

    pub fn encode(self) -> impl encode::Values {
        encode::sequence((
            self.not_before.encode_varied(),
            self.not_after.encode_varied(),
        ))
    }
}


//------------ ValidityPeriodError -------------------------------------------

/// An object is outside of its period of validity.
#[derive(Clone, Copy, Debug)]
pub struct ValidityPeriodError {
    /// Is the object too new? It is too old otherwise.
    too_new: bool,
}

impl ValidityPeriodError {
    fn too_new() -> Self {
        ValidityPeriodError { too_new: true }
    }

    fn too_old() -> Self {
        ValidityPeriodError { too_new: false }
    }
}

impl fmt::Display for ValidityPeriodError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(
            if self.too_new { "object is not yet valid" }
            else { "object has expired" }
        )
    }
}

impl error::Error for ValidityPeriodError { }


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bcder::encode::Values;

    fn decode_time(data: &[u8]) -> Time {
        decode::Constructed::decode(
            data, Mode::Der, Time::take_from
        ).unwrap()
    }

    fn encode_time(time: Time) -> Vec<u8> {
        let mut target = Vec::new();
        time.encode_varied().write_encoded(
            Mode::Der, &mut target
        ).unwrap();
        target
    }

    #[test]
    fn utc_time_round_trip() {
        let time = Time::utc(2021, 2, 18, 11, 59, 30);
        let encoded = encode_time(time);
        assert_eq!(&encoded, b"\x17\x0d210218115930Z");
        assert_eq!(decode_time(&encoded), time);
    }

    #[test]
    fn generalized_time_round_trip() {
        let time = Time::utc(2052, 1, 1, 0, 0, 0);
        let encoded = encode_time(time);
        assert_eq!(&encoded, b"\x18\x0f20520101000000Z");
        assert_eq!(decode_time(&encoded), time);
    }

    #[test]
    fn validity_orders_endpoints() {
        let early = Time::utc(2020, 1, 1, 0, 0, 0);
        let late = Time::utc(2021, 1, 1, 0, 0, 0);
        let validity = Validity::new(late, early);
        assert_eq!(validity.not_before(), early);
        assert_eq!(validity.not_after(), late);
        assert!(validity.contains(Time::utc(2020, 6, 1, 0, 0, 0)));
        assert!(!validity.contains(Time::utc(2021, 6, 1, 0, 0, 0)));
    }

    #[test]
    fn serial_encoding() {
        let mut target = Vec::new();
        Serial::from(0x10203u64).encode().write_encoded(
            Mode::Der, &mut target
        ).unwrap();
        assert_eq!(target, b"\x02\x03\x01\x02\x03");

        let mut target = Vec::new();
        Serial::from_slice(b"\x81\x02\x03").encode().write_encoded(
            Mode::Der, &mut target
        ).unwrap();
        assert_eq!(target, b"\x02\x04\x00\x81\x02\x03");

        let mut target = Vec::new();
        Serial::from(0u64).encode().write_encoded(
            Mode::Der, &mut target
        ).unwrap();
        assert_eq!(target, b"\x02\x01\x00");
    }

    #[test]
    fn serial_decoding() {
        let serial = decode::Constructed::decode(
            b"\x02\x03\x01\x02\x03".as_ref(),
            Mode::Der, Serial::take_from
        ).unwrap();
        assert_eq!(serial, Serial::from(0x10203u64));
    }
}
