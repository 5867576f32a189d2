//! Cryptographic primitives used by the protocol.
//!
//! The provisioning profile pins everything down: SHA-256 digests, RSA
//! PKCS #1 v1.5 signatures, 2048 bit keys. The types here reflect that
//! rigidity rather than offering generality nobody can use.

pub use self::digest::{Digest, DigestAlgorithm};
pub use self::keys::{
    KeyIdentifier, PublicKey, PublicKeyFormat, VerificationError,
};
pub use self::signature::{Signature, SignatureAlgorithm};
pub use self::signer::{KeyError, Signer, SigningError};

pub mod digest;
pub mod keys;
pub mod signature;
pub mod signer;
#[cfg(feature = "softkeys")] pub mod softsigner;
