//! Per-request context.

use std::collections::HashMap;

use crate::{EnrollId, Error};

/// Context carried through the service and storage layers for the
/// life of one HTTP request.
///
/// Constructed at ingress with the decoded client certificate and the
/// URL query parameters; the enrollment id is installed exactly once
/// when the service's setup step runs the normalizer.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Resolved enrollment id, once the normalizer has run.
    pub enroll_id: Option<EnrollId>,

    /// DER-encoded client certificate, when one was presented.
    pub certificate: Option<Vec<u8>>,

    /// Raw URL query parameters from ingress.
    pub params: HashMap<String, String>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the resolved enrollment id, returning the resolved
    /// request passed down to storage.
    pub fn with_enroll_id(mut self, id: EnrollId) -> Self {
        self.enroll_id = Some(id);
        self
    }

    pub fn with_certificate(mut self, cert: Vec<u8>) -> Self {
        self.certificate = Some(cert);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The resolved enrollment id, or `InvalidEnrollment` when the
    /// normalizer has not run.
    pub fn enroll_id(&self) -> Result<&EnrollId, Error> {
        self.enroll_id
            .as_ref()
            .ok_or_else(|| Error::InvalidEnrollment("enrollment id not resolved".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EnrollType;

    #[test]
    fn unresolved_request_errors() {
        assert!(matches!(
            Request::new().enroll_id(),
            Err(Error::InvalidEnrollment(_))
        ));
    }

    #[test]
    fn resolved_request() {
        let req = Request::new().with_enroll_id(EnrollId {
            enroll_type: EnrollType::Device,
            id: "AAA".into(),
            parent_id: None,
        });
        assert_eq!(req.enroll_id().unwrap().id, "AAA");
    }
}
