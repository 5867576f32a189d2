//! The signed attributes of a provisioning CMS object.

use bcder::{encode, Captured, Mode, OctetString, Oid, Tag};
use bcder::encode::PrimitiveContent;
use bytes::Bytes;
use crate::crypto::Digest;
use crate::oid;
use crate::x509::Time;


//------------ SignedAttrs ---------------------------------------------------

/// The DER-encoded content of the `signedAttrs` field.
///
/// A value of this type holds the captured encodings of the attribute
/// sequences, without the tag and length of the surrounding set. This is
/// the form needed most often: the signature is calculated over the
/// attributes re-tagged as a SET OF, while the message embeds them under
/// the implicit `[0]` tag.
#[derive(Clone, Debug)]
pub struct SignedAttrs(Captured);

impl SignedAttrs {
    /// Creates the signed attributes from their component values.
    ///
    /// The signing time is optional only so that test code can produce
    /// objects that lack it; regular construction always provides it.
    pub fn new(
        content_type: &Oid<impl AsRef<[u8]>>,
        message_digest: &MessageDigest,
        signing_time: Option<Time>,
    ) -> Self {
        let mut attrs = vec![
            Captured::from_values(Mode::Der, encode::sequence((
                oid::CONTENT_TYPE.encode(),
                encode::set(content_type.encode_ref()),
            ))),
            Captured::from_values(Mode::Der, encode::sequence((
                oid::MESSAGE_DIGEST.encode(),
                encode::set(message_digest.encode_ref()),
            ))),
        ];
        if let Some(signing_time) = signing_time {
            attrs.push(Captured::from_values(Mode::Der, encode::sequence((
                oid::SIGNING_TIME.encode(),
                encode::set(signing_time.encode_varied()),
            ))));
        }

        // In DER, the values of a SET OF are ordered by their encoded
        // octets.
        attrs.sort_by(|left, right| {
            left.as_slice().cmp(right.as_slice())
        });

        let mut res = Captured::builder(Mode::Der);
        for attr in &attrs {
            res.extend(attr);
        }
        SignedAttrs(res.freeze())
    }

    /// Creates a value from the already encoded attribute sequences.
    pub fn from_captured(captured: Captured) -> Self {
        SignedAttrs(captured)
    }

    /// Returns an encoder for the field as it appears in the signer info.
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence_as(Tag::CTX_0, &self.0)
    }

    /// Creates the octets the signature is calculated over.
    ///
    /// For the signature, the implicit `[0]` tag is replaced with the
    /// explicit SET OF tag, see RFC 5652, section 5.4.
    pub fn encode_verify(&self) -> Vec<u8> {
        let len = self.0.as_slice().len();
        let mut res = Vec::with_capacity(len + 4);
        res.push(0x31); // SET
        if len < 128 {
            res.push(len as u8)
        }
        else if len < 0x10000 {
            res.push(2);
            res.push((len >> 8) as u8);
            res.push(len as u8);
        }
        else {
            // The attributes are two OIDs, a hash, and a time. If they
            // measure 64k, something has gone badly enough to stop.
            panic!("overly long signed attributes");
        }
        res.extend_from_slice(self.0.as_slice());
        res
    }
}

impl AsRef<[u8]> for SignedAttrs {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}


//------------ MessageDigest -------------------------------------------------

/// The value of a message digest attribute.
#[derive(Clone, Debug)]
pub struct MessageDigest(Bytes);

impl MessageDigest {
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        OctetString::encode_slice(self.0.as_ref())
    }
}

impl From<OctetString> for MessageDigest {
    fn from(src: OctetString) -> Self {
        MessageDigest(src.into_bytes())
    }
}

impl From<Digest> for MessageDigest {
    fn from(digest: Digest) -> Self {
        MessageDigest(Bytes::copy_from_slice(digest.as_ref()))
    }
}

impl AsRef<[u8]> for MessageDigest {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DigestAlgorithm;

    #[test]
    fn attributes_are_der_set_ordered() {
        let digest = MessageDigest::from(
            DigestAlgorithm::sha256().digest(b"content")
        );
        let attrs = SignedAttrs::new(
            &Oid(oid::PROTOCOL_CONTENT_TYPE.0),
            &digest,
            Some(Time::utc(2021, 2, 18, 11, 59, 30)),
        );

        // Re-split the encoding at the attribute sequence boundaries and
        // check ordering of the raw encodings.
        let data = attrs.as_ref();
        let mut items = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            assert_eq!(data[pos], 0x30);
            let len = data[pos + 1] as usize;
            assert!(len < 128);
            items.push(&data[pos..pos + 2 + len]);
            pos += 2 + len;
        }
        assert_eq!(items.len(), 3);
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(items, sorted);
    }

    #[test]
    fn verify_encoding_is_a_set() {
        let digest = MessageDigest::from(
            DigestAlgorithm::sha256().digest(b"content")
        );
        let attrs = SignedAttrs::new(
            &Oid(oid::PROTOCOL_CONTENT_TYPE.0), &digest, None
        );
        let verify = attrs.encode_verify();
        assert_eq!(verify[0], 0x31);
        assert_eq!(verify[1] as usize, attrs.as_ref().len());
        assert_eq!(&verify[2..], attrs.as_ref());
    }
}
