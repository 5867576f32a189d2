//! Resource sets as they appear on the wire.
//!
//! The provisioning payloads carry AS number and IP prefix sets as
//! comma-separated attribute strings. Interpreting the individual items is
//! the business of the resource-extension codec used during certificate
//! construction and therefore outside this crate; here the sets are opaque
//! items with a canonical wire form: sorted, comma-separated, no
//! whitespace, and never emitted as an empty string.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};


//------------ ResourceBlocks ------------------------------------------------

/// A set of resource items of one kind.
///
/// Items are kept sorted, which makes the emitted form canonical
/// independent of the order they arrived or were added in.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct ResourceBlocks {
    items: Vec<String>,
}

impl ResourceBlocks {
    /// Creates an empty set.
    pub fn empty() -> Self {
        ResourceBlocks::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    /// Adds an item to the set.
    pub fn push(&mut self, item: &str) -> Result<(), ResourceSetError> {
        let item = Self::check_item(item)?;
        match self.items.binary_search_by(|other| other.as_str().cmp(item)) {
            Ok(_) => Ok(()), // already present
            Err(pos) => {
                self.items.insert(pos, item.into());
                Ok(())
            }
        }
    }

    /// Returns whether every item of `other` is also in `self`.
    pub fn contains(&self, other: &ResourceBlocks) -> bool {
        other.iter().all(|item| {
            self.items.binary_search_by(
                |mine| mine.as_str().cmp(item)
            ).is_ok()
        })
    }

    fn check_item(item: &str) -> Result<&str, ResourceSetError> {
        let item = item.trim_matches(|c: char| c.is_ascii_whitespace());
        if item.is_empty() {
            return Err(ResourceSetError::Empty)
        }
        if !item.bytes().all(
            |ch| ch.is_ascii_graphic() && ch != b',' && ch != b'"'
        ) {
            return Err(ResourceSetError::BadCharacter)
        }
        Ok(item)
    }
}

impl FromStr for ResourceBlocks {
    type Err = ResourceSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut res = ResourceBlocks::empty();
        for item in s.split(',') {
            res.push(item)?;
        }
        Ok(res)
    }
}

impl fmt::Display for ResourceBlocks {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for item in &self.items {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(item)?;
            first = false;
        }
        Ok(())
    }
}

//--- Serialize and Deserialize

impl Serialize for ResourceBlocks {
    fn serialize<S: Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceBlocks {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D
    ) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        if string.is_empty() {
            return Ok(ResourceBlocks::empty())
        }
        ResourceBlocks::from_str(&string).map_err(serde::de::Error::custom)
    }
}


//------------ ResourceSet ---------------------------------------------------

/// The resources of one resource class: AS numbers, IPv4 and IPv6 space.
///
/// Any of the three kinds may be empty. Empty kinds are simply not present
/// in the wire representation.
#[derive(
    Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize
)]
pub struct ResourceSet {
    #[serde(default, skip_serializing_if = "ResourceBlocks::is_empty")]
    asn: ResourceBlocks,

    #[serde(default, skip_serializing_if = "ResourceBlocks::is_empty")]
    ipv4: ResourceBlocks,

    #[serde(default, skip_serializing_if = "ResourceBlocks::is_empty")]
    ipv6: ResourceBlocks,
}

impl ResourceSet {
    pub fn new(
        asn: ResourceBlocks, ipv4: ResourceBlocks, ipv6: ResourceBlocks
    ) -> Self {
        ResourceSet { asn, ipv4, ipv6 }
    }

    pub fn asn(&self) -> &ResourceBlocks {
        &self.asn
    }

    pub fn ipv4(&self) -> &ResourceBlocks {
        &self.ipv4
    }

    pub fn ipv6(&self) -> &ResourceBlocks {
        &self.ipv6
    }

    pub fn set_asn(&mut self, asn: ResourceBlocks) {
        self.asn = asn;
    }

    pub fn set_ipv4(&mut self, ipv4: ResourceBlocks) {
        self.ipv4 = ipv4;
    }

    pub fn set_ipv6(&mut self, ipv6: ResourceBlocks) {
        self.ipv6 = ipv6;
    }

    /// The kinds that are present, for emission as optional attributes.
    pub fn asn_opt(&self) -> Option<&ResourceBlocks> {
        if self.asn.is_empty() { None } else { Some(&self.asn) }
    }

    pub fn ipv4_opt(&self) -> Option<&ResourceBlocks> {
        if self.ipv4.is_empty() { None } else { Some(&self.ipv4) }
    }

    pub fn ipv6_opt(&self) -> Option<&ResourceBlocks> {
        if self.ipv6.is_empty() { None } else { Some(&self.ipv6) }
    }
}


//------------ RequestResourceLimit ------------------------------------------

/// The scope of resources a child asks to have certified.
///
/// By default there are no limits: the child wants everything the parent
/// is willing to give. A limit set for one kind restricts that kind only.
#[derive(
    Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize
)]
pub struct RequestResourceLimit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    asn: Option<ResourceBlocks>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    ipv4: Option<ResourceBlocks>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    ipv6: Option<ResourceBlocks>,
}

impl RequestResourceLimit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.asn.is_none() && self.ipv4.is_none() && self.ipv6.is_none()
    }

    pub fn with_asn(&mut self, asn: ResourceBlocks) {
        self.asn = Some(asn);
    }

    pub fn with_ipv4(&mut self, ipv4: ResourceBlocks) {
        self.ipv4 = Some(ipv4);
    }

    pub fn with_ipv6(&mut self, ipv6: ResourceBlocks) {
        self.ipv6 = Some(ipv6);
    }

    pub fn asn(&self) -> Option<&ResourceBlocks> {
        self.asn.as_ref()
    }

    pub fn ipv4(&self) -> Option<&ResourceBlocks> {
        self.ipv4.as_ref()
    }

    pub fn ipv6(&self) -> Option<&ResourceBlocks> {
        self.ipv6.as_ref()
    }
}


//------------ ResourceSetError ----------------------------------------------

/// A resource set attribute string was not well-formed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceSetError {
    /// An item between commas was empty.
    Empty,

    /// An item contained whitespace or a non-printable character.
    BadCharacter,
}

impl fmt::Display for ResourceSetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ResourceSetError::Empty => "empty resource set item",
            ResourceSetError::BadCharacter => {
                "invalid character in resource set item"
            }
        })
    }
}

impl std::error::Error for ResourceSetError { }


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_and_dedups() {
        let blocks = ResourceBlocks::from_str("AS3,AS1,AS2,AS1").unwrap();
        assert_eq!(blocks.to_string(), "AS1,AS2,AS3");
    }

    #[test]
    fn accepts_prefixes_and_ranges() {
        let blocks = ResourceBlocks::from_str(
            "10.0.0.0/8,192.168.0.0-192.168.1.255"
        ).unwrap();
        assert_eq!(
            blocks.to_string(), "10.0.0.0/8,192.168.0.0-192.168.1.255"
        );
    }

    #[test]
    fn rejects_empty_and_bad_items() {
        assert_eq!(
            ResourceBlocks::from_str(""), Err(ResourceSetError::Empty)
        );
        assert_eq!(
            ResourceBlocks::from_str("AS1,,AS2"), Err(ResourceSetError::Empty)
        );
        assert_eq!(
            ResourceBlocks::from_str("AS 1"),
            Err(ResourceSetError::BadCharacter)
        );
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let blocks = ResourceBlocks::from_str(" AS2 , AS1 ").unwrap();
        assert_eq!(blocks.to_string(), "AS1,AS2");
    }

    #[test]
    fn containment() {
        let all = ResourceBlocks::from_str("AS1,AS2,AS3").unwrap();
        let some = ResourceBlocks::from_str("AS2").unwrap();
        assert!(all.contains(&some));
        assert!(!some.contains(&all));
        assert!(all.contains(&ResourceBlocks::empty()));
    }

    #[test]
    fn empty_kinds_are_absent() {
        let mut set = ResourceSet::default();
        assert!(set.asn_opt().is_none());
        set.set_asn(ResourceBlocks::from_str("AS1").unwrap());
        assert_eq!(set.asn_opt().unwrap().to_string(), "AS1");
    }

    #[test]
    fn serde_round_trip() {
        let mut limit = RequestResourceLimit::new();
        limit.with_ipv4(ResourceBlocks::from_str("10.0.0.0/8").unwrap());
        let json = serde_json::to_string(&limit).unwrap();
        let back: RequestResourceLimit =
            serde_json::from_str(&json).unwrap();
        assert_eq!(limit, back);
    }
}
