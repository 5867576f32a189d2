//! The CMS envelope of provisioning messages.
//!
//! Messages travel as RFC 5652 SignedData objects profiled down hard:
//! version 3, SHA-256, a single one-off EE certificate, a single CRL, a
//! single signer identified by key identifier, three signed attributes
//! and nothing unsigned. The [`parser`] checks all of that while
//! accumulating findings, the [`builder`] produces objects the parser
//! accepts.

pub use self::builder::{CmsBuilderError, ProvisioningCmsObjectBuilder};
pub use self::parser::{
    ProvisioningCmsObject, ProvisioningCmsObjectParser,
    ProvisioningCmsObjectParserError,
};

pub mod builder;
pub mod parser;

mod sigattr;
