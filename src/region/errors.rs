//! Region adapter errors
//!
//! Every adapter failure is classified once, at the boundary:
//! - Transient: network or throttling; the caller retries with backoff
//! - Permanent: the region rejected the request; the member is marked FAILED

use crate::group::RegionId;
use thiserror::Error;

pub type RegionResult<T> = Result<T, RegionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("transient failure in {region}: {message}")]
    Transient { region: RegionId, message: String },

    #[error("permanent failure in {region}: {message}")]
    Permanent { region: RegionId, message: String },
}

impl RegionError {
    pub fn transient(region: &RegionId, message: impl Into<String>) -> Self {
        Self::Transient {
            region: region.clone(),
            message: message.into(),
        }
    }

    pub fn permanent(region: &RegionId, message: impl Into<String>) -> Self {
        Self::Permanent {
            region: region.clone(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn region(&self) -> &RegionId {
        match self {
            Self::Transient { region, .. } | Self::Permanent { region, .. } => region,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient { message, .. } | Self::Permanent { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let region = RegionId::new("us-west-2").unwrap();
        let transient = RegionError::transient(&region, "throttled");
        let permanent = RegionError::permanent(&region, "quota exceeded");

        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
        assert_eq!(permanent.region(), &region);
        assert_eq!(permanent.message(), "quota exceeded");
        assert_eq!(
            permanent.to_string(),
            "permanent failure in us-west-2: quota exceeded"
        );
    }
}
