//! Accumulating validation of received objects.
//!
//! Conformance checking of a provisioning CMS object must not stop at the
//! first defect: an operator diagnosing a misbehaving peer needs to see
//! every deviation in one pass. The [`ValidationResult`] type collects the
//! outcome of each individual check under the location of the object being
//! examined. Checks never panic and never abort parsing by themselves;
//! callers use the returned boolean to decide whether follow-up checks
//! still make sense.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;


//------------ Check keys ----------------------------------------------------
//
// The stable string keys under which the CMS parser and payload codec
// record their checks. These are part of the public API: callers match on
// them when triaging a failed parse.

pub const CMS_DATA_PARSING: &str = "cms.data.parsing";
pub const CMS_SIGNED_DATA_VERSION: &str = "cms.signeddata.version";
pub const CMS_SIGNED_DATA_DIGEST_ALGORITHM: &str =
    "cms.signeddata.digest.algorithm";
pub const CMS_CONTENT_TYPE: &str = "cms.content.type";
pub const CMS_CONTENT_PARSING: &str = "cms.content.parsing";
pub const GET_CERTS_AND_CRLS: &str = "get.certs.and.crls";
pub const CERT_IS_X509CERT: &str = "cert.is.x509cert";
pub const CERT_IS_EE_CERT: &str = "cert.is.ee.cert";
pub const CERT_HAS_SKI: &str = "cert.has.ski";
pub const CERT_KEY_SIZE: &str = "cert.key.size";
pub const ONLY_ONE_EE_CERT_ALLOWED: &str = "only.one.ee.cert.allowed";
pub const ONLY_ONE_CRL_ALLOWED: &str = "only.one.crl.allowed";
pub const CRL_IS_X509CRL: &str = "crl.is.x509crl";
pub const GET_SIGNER_INFO: &str = "get.signer.info";
pub const ONLY_ONE_SIGNER: &str = "only.one.signer";
pub const CMS_SIGNER_INFO_VERSION: &str = "cms.signer.info.version";
pub const CMS_SIGNER_INFO_SKI: &str = "cms.signer.info.ski";
pub const CMS_SIGNER_INFO_SKI_ONLY: &str = "cms.signer.info.ski.only";
pub const CMS_SIGNER_INFO_DIGEST_ALGORITHM: &str =
    "cms.signer.info.digest.algorithm";
pub const SIGNED_ATTRS_PRESENT: &str = "signed.attrs.present";
pub const CONTENT_TYPE_ATTR_PRESENT: &str = "content.type.attr.present";
pub const CONTENT_TYPE_VALUE_COUNT: &str = "content.type.value.count";
pub const CONTENT_TYPE_VALUE: &str = "content.type.value";
pub const MSG_DIGEST_ATTR_PRESENT: &str = "msg.digest.attr.present";
pub const MSG_DIGEST_VALUE_COUNT: &str = "msg.digest.value.count";
pub const SIGNING_TIME_ATTR_PRESENT: &str = "signing.time.attr.present";
pub const ONLY_ONE_SIGNING_TIME_ATTR: &str = "only.one.signing.time.attr";
pub const ENCRYPTION_ALGORITHM: &str = "encryption.algorithm";
pub const SIGNATURE_VERIFICATION: &str = "signature.verification";
pub const UNSIGNED_ATTRS_OMITTED: &str = "unsigned.attrs.omitted";
pub const PAYLOAD_VERSION: &str = "payload.version";
pub const PAYLOAD_TYPE_UNKNOWN: &str = "payload.type.unknown";


//------------ ValidationLocation --------------------------------------------

/// The location of the object under validation.
///
/// This is an opaque label, typically the URI or file name the object was
/// retrieved from. Checks recorded in a [`ValidationResult`] attach to the
/// location current at the time of recording.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ValidationLocation(Arc<str>);

impl ValidationLocation {
    pub fn new(name: &str) -> Self {
        ValidationLocation(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ValidationLocation {
    fn from(name: &str) -> Self {
        ValidationLocation::new(name)
    }
}

impl From<String> for ValidationLocation {
    fn from(name: String) -> Self {
        ValidationLocation(name.into())
    }
}

impl fmt::Display for ValidationLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}


//------------ ValidationStatus ----------------------------------------------

/// The outcome of a single validation check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationStatus {
    Pass,
    Warn,
    Fail,
}

impl ValidationStatus {
    pub fn is_fail(self) -> bool {
        matches!(self, ValidationStatus::Fail)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ValidationStatus::Pass => "pass",
            ValidationStatus::Warn => "warning",
            ValidationStatus::Fail => "failure",
        })
    }
}


//------------ ValidationCheck -----------------------------------------------

/// One recorded check: a stable key, the status, and optional parameters
/// describing what was actually found.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationCheck {
    key: &'static str,
    status: ValidationStatus,
    params: Vec<String>,
}

impl ValidationCheck {
    fn new(key: &'static str, status: ValidationStatus) -> Self {
        ValidationCheck { key, status, params: Vec::new() }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl fmt::Display for ValidationCheck {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}]", self.key, self.status)?;
        for param in &self.params {
            write!(f, " '{}'", param)?;
        }
        Ok(())
    }
}


//------------ ValidationResult ----------------------------------------------

/// The accumulated outcomes of all checks run so far.
///
/// A result is created once per parse, pointed at a location via
/// [`set_location`][Self::set_location] and then threaded through every
/// check. Checks are kept in the order they were recorded.
#[derive(Clone, Debug)]
pub struct ValidationResult {
    current: ValidationLocation,
    checks: Vec<(ValidationLocation, ValidationCheck)>,
    failures: HashMap<ValidationLocation, usize>,
}

impl ValidationResult {
    /// Creates an empty result for the given initial location.
    pub fn new(location: impl Into<ValidationLocation>) -> Self {
        ValidationResult {
            current: location.into(),
            checks: Vec::new(),
            failures: HashMap::new(),
        }
    }

    /// Points the result at a new location.
    ///
    /// All subsequently recorded checks attach to this location.
    pub fn set_location(&mut self, location: impl Into<ValidationLocation>) {
        self.current = location.into();
    }

    pub fn current_location(&self) -> &ValidationLocation {
        &self.current
    }

    /// Records a pass or fail for `key` depending on `condition`.
    ///
    /// Returns `condition` so the caller can gate follow-up checks without
    /// early-return gymnastics.
    pub fn reject_if_false(
        &mut self, condition: bool, key: &'static str
    ) -> bool {
        if condition {
            self.record(ValidationStatus::Pass, key, Vec::new())
        }
        else {
            self.record(ValidationStatus::Fail, key, Vec::new())
        }
        condition
    }

    /// Like [`reject_if_false`][Self::reject_if_false] with diagnostic
    /// parameters attached to the check.
    pub fn reject_if_false_with(
        &mut self, condition: bool, key: &'static str,
        params: impl IntoIterator<Item = String>,
    ) -> bool {
        let status = if condition { ValidationStatus::Pass }
                     else { ValidationStatus::Fail };
        self.record(status, key, params.into_iter().collect());
        condition
    }

    /// Records a fail for `key` if `value` is absent.
    ///
    /// Returns whether the value was present.
    pub fn reject_if_none<T>(
        &mut self, value: Option<&T>, key: &'static str
    ) -> bool {
        self.reject_if_false(value.is_some(), key)
    }

    /// Records a warning for `key` if `condition` does not hold.
    ///
    /// Warnings never count as failures.
    pub fn warn_if_false(
        &mut self, condition: bool, key: &'static str
    ) -> bool {
        if condition {
            self.record(ValidationStatus::Pass, key, Vec::new())
        }
        else {
            self.record(ValidationStatus::Warn, key, Vec::new())
        }
        condition
    }

    fn record(
        &mut self, status: ValidationStatus, key: &'static str,
        params: Vec<String>,
    ) {
        if status.is_fail() {
            *self.failures.entry(self.current.clone()).or_insert(0) += 1;
        }
        let mut check = ValidationCheck::new(key, status);
        check.params = params;
        self.checks.push((self.current.clone(), check));
    }

    /// Returns whether any location has recorded a failure.
    pub fn has_failures(&self) -> bool {
        self.failures.values().any(|count| *count > 0)
    }

    /// Returns whether the current location has recorded a failure.
    pub fn has_failure_for_current_location(&self) -> bool {
        self.failures.get(&self.current).map_or(false, |count| *count > 0)
    }

    /// Returns the failed checks recorded for the current location.
    pub fn failures_for_current_location(&self) -> Vec<ValidationCheck> {
        self.checks_for_current_location()
            .filter(|check| check.status().is_fail())
            .cloned().collect()
    }

    /// Returns an iterator over all checks for the current location.
    pub fn checks_for_current_location(
        &self
    ) -> impl Iterator<Item = &ValidationCheck> {
        self.checks.iter().filter_map(move |(location, check)| {
            if *location == self.current {
                Some(check)
            }
            else {
                None
            }
        })
    }

    /// Returns an iterator over all checks with their locations.
    pub fn iter(
        &self
    ) -> impl Iterator<Item = (&ValidationLocation, &ValidationCheck)> {
        self.checks.iter().map(|(location, check)| (location, check))
    }

    /// Returns the number of recorded checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        ValidationResult::new("")
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (location, check) in self.iter() {
            if check.status().is_fail() {
                writeln!(f, "{}: {}", location, check)?;
            }
        }
        Ok(())
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order_and_counts_failures() {
        let mut result = ValidationResult::new("rsync://host/a.cms");
        assert!(result.reject_if_false(true, CMS_DATA_PARSING));
        assert!(!result.reject_if_false(false, CMS_SIGNED_DATA_VERSION));
        assert!(!result.reject_if_false(false, CMS_CONTENT_TYPE));

        assert!(result.has_failures());
        assert!(result.has_failure_for_current_location());
        let failures = result.failures_for_current_location();
        assert_eq!(
            failures.iter().map(|c| c.key()).collect::<Vec<_>>(),
            [CMS_SIGNED_DATA_VERSION, CMS_CONTENT_TYPE]
        );
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn warnings_are_not_failures() {
        let mut result = ValidationResult::new("loc");
        result.warn_if_false(false, CERT_KEY_SIZE);
        assert!(!result.has_failures());
        assert_eq!(
            result.checks_for_current_location().next().map(|c| c.status()),
            Some(ValidationStatus::Warn)
        );
    }

    #[test]
    fn failures_are_per_location() {
        let mut result = ValidationResult::new("first");
        result.reject_if_false(false, CMS_DATA_PARSING);
        result.set_location("second");
        result.reject_if_false(true, CMS_DATA_PARSING);

        assert!(result.has_failures());
        assert!(!result.has_failure_for_current_location());
        assert!(result.failures_for_current_location().is_empty());
    }

    #[test]
    fn reject_if_none() {
        let mut result = ValidationResult::new("loc");
        assert!(result.reject_if_none(Some(&1u8), GET_SIGNER_INFO));
        assert!(!result.reject_if_none(None::<&u8>, GET_CERTS_AND_CRLS));
        assert!(result.has_failure_for_current_location());
    }

    #[test]
    fn check_parameters_shown_in_display() {
        let mut result = ValidationResult::new("loc");
        result.reject_if_false_with(
            false, CMS_SIGNED_DATA_DIGEST_ALGORITHM,
            ["1.3.14.3.2.26".into()]
        );
        let report = result.to_string();
        assert!(report.contains(CMS_SIGNED_DATA_DIGEST_ALGORITHM));
        assert!(report.contains("1.3.14.3.2.26"));
    }
}
