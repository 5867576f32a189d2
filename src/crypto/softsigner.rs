//! A signer atop the OpenSSL library.
//!
//! Because this adds a dependency on the OpenSSL libraries, it is gated
//! behind the `softkeys` feature. It is needed by anyone who actually
//! creates provisioning messages, since the protocol demands a fresh
//! one-off RSA key per CMS object, but not for validating received
//! ones.

use std::io;
use std::sync::RwLock;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use ring::rand;
use ring::rand::SecureRandom;
use slab::Slab;
use super::keys::{PublicKey, PublicKeyFormat};
use super::signature::{Signature, SignatureAlgorithm};
use super::signer::{KeyError, Signer, SigningError};

const RSA_BITS: u32 = 2048;


//------------ OpenSslSigner -------------------------------------------------

/// An OpenSSL-based signer.
///
/// Keeps its keys in memory.
pub struct OpenSslSigner {
    keys: RwLock<Slab<KeyPair>>,
    rng: rand::SystemRandom,
}

impl OpenSslSigner {
    pub fn new() -> OpenSslSigner {
        OpenSslSigner {
            keys: RwLock::new(Slab::new()),
            rng: rand::SystemRandom::new(),
        }
    }

    /// Loads a DER-encoded RSA private key into the signer.
    pub fn key_from_der(&self, der: &[u8]) -> Result<KeyId, io::Error> {
        self.insert(KeyPair::from_der(der)?)
    }

    /// Loads a PEM-encoded RSA private key into the signer.
    pub fn key_from_pem(&self, pem: &[u8]) -> Result<KeyId, io::Error> {
        self.insert(KeyPair::from_pem(pem)?)
    }

    fn insert(&self, key: KeyPair) -> Result<KeyId, io::Error> {
        let mut keys = self.keys.write().map_err(|_| {
            io::Error::new(io::ErrorKind::Other, "poisoned key store")
        })?;
        Ok(KeyId(keys.insert(key)))
    }
}

impl Signer for OpenSslSigner {
    type KeyId = KeyId;
    type Error = io::Error;

    fn create_key(
        &self, _algorithm: PublicKeyFormat
    ) -> Result<Self::KeyId, Self::Error> {
        self.insert(KeyPair::new()?)
    }

    fn get_key_info(
        &self, id: &Self::KeyId
    ) -> Result<PublicKey, KeyError<Self::Error>> {
        let keys = self.keys.read().map_err(|_| {
            KeyError::Signer(
                io::Error::new(io::ErrorKind::Other, "poisoned key store")
            )
        })?;
        match keys.get(id.0) {
            Some(key) => key.get_key_info().map_err(KeyError::Signer),
            None => Err(KeyError::KeyNotFound),
        }
    }

    fn destroy_key(
        &self, key: &Self::KeyId
    ) -> Result<(), KeyError<Self::Error>> {
        let mut keys = self.keys.write().map_err(|_| {
            KeyError::Signer(
                io::Error::new(io::ErrorKind::Other, "poisoned key store")
            )
        })?;
        if keys.contains(key.0) {
            keys.remove(key.0);
            Ok(())
        }
        else {
            Err(KeyError::KeyNotFound)
        }
    }

    fn sign<D: AsRef<[u8]> + ?Sized>(
        &self,
        key: &Self::KeyId,
        algorithm: SignatureAlgorithm,
        data: &D
    ) -> Result<Signature, SigningError<Self::Error>> {
        let keys = self.keys.read().map_err(|_| {
            SigningError::Signer(
                io::Error::new(io::ErrorKind::Other, "poisoned key store")
            )
        })?;
        match keys.get(key.0) {
            Some(key) => {
                key.sign(algorithm, data.as_ref()).map_err(Into::into)
            }
            None => Err(SigningError::KeyNotFound)
        }
    }

    fn sign_one_off<D: AsRef<[u8]> + ?Sized>(
        &self,
        algorithm: SignatureAlgorithm,
        data: &D
    ) -> Result<(Signature, PublicKey), Self::Error> {
        let key = KeyPair::new()?;
        let info = key.get_key_info()?;
        let sig = key.sign(algorithm, data.as_ref())?;
        Ok((sig, info))
    }

    fn rand(&self, target: &mut [u8]) -> Result<(), Self::Error> {
        self.rng.fill(target).map_err(|_| {
            io::Error::new(io::ErrorKind::Other, "rng error")
        })
    }
}

impl Default for OpenSslSigner {
    fn default() -> Self {
        Self::new()
    }
}


//------------ KeyId ---------------------------------------------------------

/// This signer’s key identifier.
//
//  We wrap this in a newtype so that people won’t start mucking about
//  with the integers.
#[derive(Clone, Copy, Debug)]
pub struct KeyId(usize);


//------------ KeyPair -------------------------------------------------------

/// A key pair kept by the signer.
struct KeyPair(PKey<Private>);

impl KeyPair {
    fn new() -> Result<Self, io::Error> {
        let rsa = Rsa::generate(RSA_BITS)?;
        let pkey = PKey::from_rsa(rsa)?;
        Ok(KeyPair(pkey))
    }

    fn from_der(der: &[u8]) -> Result<Self, io::Error> {
        let res = PKey::private_key_from_der(der)?;
        if res.bits() != RSA_BITS {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("invalid key length {}", res.bits())
            ))
        }
        Ok(KeyPair(res))
    }

    fn from_pem(pem: &[u8]) -> Result<Self, io::Error> {
        let res = PKey::private_key_from_pem(pem)?;
        if res.bits() != RSA_BITS {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("invalid key length {}", res.bits())
            ))
        }
        Ok(KeyPair(res))
    }

    fn get_key_info(&self) -> Result<PublicKey, io::Error> {
        // Issues unwrapping here indicate a bug in the OpenSSL library,
        // there is no way to recover.
        let der = self.0.rsa().unwrap().public_key_to_der()?;
        PublicKey::decode(der.as_ref()).map_err(|err| {
            io::Error::new(io::ErrorKind::Other, err.to_string())
        })
    }

    fn sign(
        &self, _algorithm: SignatureAlgorithm, data: &[u8]
    ) -> Result<Signature, io::Error> {
        let mut signer = ::openssl::sign::Signer::new(
            MessageDigest::sha256(), &self.0
        )?;
        signer.update(data)?;
        Ok(Signature::new(
            SignatureAlgorithm::default(),
            signer.sign_to_vec()?.into()
        ))
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_sign_delete() {
        let signer = OpenSslSigner::new();
        let key = signer.create_key(PublicKeyFormat::default()).unwrap();
        let data = b"foobar";
        let info = signer.get_key_info(&key).unwrap();
        assert_eq!(info.key_size(), Some(2048));
        let _ = signer.sign(
            &key, SignatureAlgorithm::default(), data
        ).unwrap();
        signer.destroy_key(&key).unwrap();
        assert!(matches!(
            signer.get_key_info(&key), Err(KeyError::KeyNotFound)
        ));
    }

    #[test]
    fn one_off_signature_verifies() {
        let signer = OpenSslSigner::new();
        let data = b"foobar";
        let (sig, key) = signer.sign_one_off(
            SignatureAlgorithm::default(), data
        ).unwrap();
        key.verify(data, &sig).unwrap();
    }
}
