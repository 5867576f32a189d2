//! The RPKI provisioning protocol, also known as up-down.
//!
//! In the _Resource Public Key Infrastructure_ (RPKI), a certificate
//! authority issues resource certificates to its child CAs through the
//! provisioning protocol: the child lists available resource classes,
//! requests certificates, and revokes keys; the parent answers. Each
//! exchange is an XML payload wrapped into a CMS SignedData object,
//! signed with a one-off EE certificate that travels inside the CMS.
//!
//! This crate implements both halves of that wire format:
//!
//! * the [`payload`] module maps the seven payload variants to and from
//!   their canonical XML form, and
//! * the [`cms`] module parses, validates and builds the CMS envelope,
//!   enforcing the exact profile the protocol demands while collecting
//!   every deviation in a [`validation::ValidationResult`] rather than
//!   stopping at the first.
//!
//! Everything else in the crate (certificates, CRLs, keys, the DER
//! plumbing) exists in support of these two. Transport, key storage and
//! issuance policy are out of scope.
//!
//! Creating messages needs keys and signatures and therefore the
//! `softkeys` feature, which provides an OpenSSL-backed signer and is
//! enabled by default. Without it the crate can still parse and
//! validate everything it receives.

pub mod cert;
pub mod cms;
pub mod crl;
pub mod crypto;
pub mod oid;
pub mod payload;
pub mod resources;
pub mod validation;
pub mod x509;
pub mod xml;

pub use self::cms::{
    CmsBuilderError, ProvisioningCmsObject, ProvisioningCmsObjectBuilder,
    ProvisioningCmsObjectParser, ProvisioningCmsObjectParserError,
};
pub use self::payload::{Message, Payload, PayloadType};
pub use self::validation::{
    ValidationCheck, ValidationLocation, ValidationResult, ValidationStatus,
};
