//! Error types shared by the Namf procedures
//!
//! [`SendError`] covers the outbound NGAP, NAS and SBI paths,
//! [`NamfHandlerError`] the inbound requests. Every handler error maps to
//! exactly one HTTP status.

use hyper::StatusCode;
use thiserror::Error;

use crate::models::ProblemDetails;
use crate::sbi_path::SbiError;
use crate::sdm_change::SdmChangeError;

/// Failure to hand a message to an outbound transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The NG signalling connection no longer exists
    #[error("UE [{0}] has no NG signalling connection")]
    RanUeGone(u64),

    /// The UE or session context no longer exists
    #[error("{0} context already removed")]
    ContextGone(&'static str),

    /// The transport towards the peer is closed
    #[error("transport closed: {0}")]
    TransportClosed(String),

    /// Message could not be encoded
    #[error("Failed to build {0}")]
    Build(&'static str),

    /// NF discovery or request construction failed
    #[error("SBI request failed: {0}")]
    Sbi(String),
}

pub type SendResult<T> = Result<T, SendError>;

/// Inbound Namf request failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamfHandlerError {
    /// Missing or malformed field, disallowed value
    #[error("{0}")]
    BadRequest(String),

    /// Unknown UE or session
    #[error("{0}")]
    NotFound(String),

    /// Method not served on the resource
    #[error("Invalid HTTP method [{0}]")]
    MethodNotAllowed(String),

    /// Failure notification target could not be resolved
    #[error(transparent)]
    Sbi(#[from] SbiError),

    /// Subscriber-data change could not be applied
    #[error(transparent)]
    SdmChange(#[from] SdmChangeError),

    /// Outbound signalling could not be sent
    #[error(transparent)]
    Send(#[from] SendError),
}

impl NamfHandlerError {
    /// HTTP status of the error response
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Sbi(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::SdmChange(SdmChangeError::UeNotFound(_)) => StatusCode::NOT_FOUND,
            Self::SdmChange(_) => StatusCode::BAD_REQUEST,
            Self::Send(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Problem details body of the error response
    pub fn problem_details(&self) -> ProblemDetails {
        let status = self.status();
        ProblemDetails::with_status(status.as_u16())
            .with_title(status.canonical_reason().unwrap_or("Error"))
            .with_detail(&self.to_string())
    }
}

pub type NamfHandlerResult<T> = Result<T, NamfHandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            NamfHandlerError::BadRequest("No N2 SM Content".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            NamfHandlerError::NotFound("Context not found".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            NamfHandlerError::from(SbiError::ClientLimit(4)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            NamfHandlerError::from(SdmChangeError::UeNotFound("imsi-1".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            NamfHandlerError::from(SendError::RanUeGone(1)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_problem_details() {
        let problem = NamfHandlerError::NotFound("Context not found".into()).problem_details();
        assert_eq!(problem.status, Some(404));
        assert_eq!(problem.title.as_deref(), Some("Not Found"));
        assert_eq!(problem.detail.as_deref(), Some("Context not found"));
    }
}
