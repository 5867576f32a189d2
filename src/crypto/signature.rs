//! Signature algorithms and operations.

use bcder::{decode, encode};
use bcder::decode::DecodeError;
use bcder::encode::PrimitiveContent;
use bcder::{Oid, Tag};
use bytes::Bytes;
use crate::oid;


//------------ SignatureAlgorithm --------------------------------------------

/// The signature algorithm of the provisioning protocol.
///
/// Only RSA PKCS #1 v1.5 with SHA-256 is allowed. Sadly, it is spelled
/// differently in different places: X.509 structures (certificates and
/// CRLs) use `sha256WithRSAEncryption`, while the CMS signer info uses
/// plain `rsaEncryption`, with `sha256WithRSAEncryption` to be accepted
/// when reading. The functions in this type come in `x509_` and `cms_`
/// pairs accordingly.
///
/// The algorithm parameters must be NULL but may be absent when reading.
/// The type keeps track of which representation was seen so re-encoding
/// decisions can be made deliberately; constructed values always carry
/// the NULL.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SignatureAlgorithm {
    /// Was a NULL parameter field present?
    has_parameter: bool,
}

impl SignatureAlgorithm {
    /// Takes the algorithm identifier used in X.509 signed structures.
    pub fn x509_take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            oid::SHA256_WITH_RSA_ENCRYPTION.skip_if(cons)?;
            let has_parameter = cons.take_opt_primitive_if(
                Tag::NULL, |_| Ok(())
            )?.is_some();
            Ok(SignatureAlgorithm { has_parameter })
        })
    }

    /// Takes the algorithm identifier used in the CMS signer info.
    pub fn cms_take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let alg = Oid::take_from(cons)?;
            if alg != oid::RSA_ENCRYPTION
                && alg != oid::SHA256_WITH_RSA_ENCRYPTION
            {
                return Err(cons.content_err("invalid signature algorithm"))
            }
            let has_parameter = cons.take_opt_primitive_if(
                Tag::NULL, |_| Ok(())
            )?.is_some();
            Ok(SignatureAlgorithm { has_parameter })
        })
    }

    /// Provides an encoder for X.509 structures.
    pub fn x509_encode(self) -> impl encode::Values {
        encode::sequence((
            oid::SHA256_WITH_RSA_ENCRYPTION.encode(),
            ().encode(),
        ))
    }

    /// Provides an encoder for the CMS signer info.
    pub fn cms_encode(self) -> impl encode::Values {
        encode::sequence((
            oid::RSA_ENCRYPTION.encode(),
            ().encode(),
        ))
    }
}

impl Default for SignatureAlgorithm {
    fn default() -> Self {
        SignatureAlgorithm { has_parameter: true }
    }
}


//------------ Signature -----------------------------------------------------

/// A signature together with its algorithm.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Signature {
    algorithm: SignatureAlgorithm,
    value: Bytes,
}

impl Signature {
    pub fn new(algorithm: SignatureAlgorithm, value: Bytes) -> Self {
        Signature { algorithm, value }
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn unwrap(self) -> (SignatureAlgorithm, Bytes) {
        (self.algorithm, self.value)
    }
}
