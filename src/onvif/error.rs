//! ONVIF error taxonomy and SOAP fault mapping.
//!
//! Every failure a handler can produce maps to a SOAP 1.2 fault code
//! (`Sender` for client mistakes, `Receiver` for server failures), an ONVIF
//! subcode, an English reason, and an HTTP status. Facade errors are
//! converted at the handler boundary; raw hardware or config errors never
//! reach the dispatcher.

use thiserror::Error;

use super::soap::build_soap_fault;

/// Result type for ONVIF operations.
pub type OnvifResult<T> = Result<T, OnvifError>;

/// SOAP 1.2 fault code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// Client mistake (`s:Sender`).
    Sender,
    /// Server failure (`s:Receiver`).
    Receiver,
}

impl FaultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultCode::Sender => "s:Sender",
            FaultCode::Receiver => "s:Receiver",
        }
    }
}

/// ONVIF operation errors.
#[derive(Debug, Clone, Error)]
pub enum OnvifError {
    /// Missing or malformed parameters.
    #[error("invalid argument ({subcode}): {reason}")]
    InvalidArg { subcode: String, reason: String },

    /// Unknown service, operation, or token.
    #[error("not found: {0}")]
    NotFound(String),

    /// Allocation exhausted.
    #[error("out of memory: {0}")]
    Memory(String),

    /// Socket or syscall failure while serving the request.
    #[error("I/O error: {0}")]
    Io(String),

    /// Malformed XML or SOAP structure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Required ONVIF namespace missing from the envelope.
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Operation not implemented by the addressed service.
    #[error("action not supported: {0}")]
    ActionNotSupported(String),

    /// A facade exceeded its time budget.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Hardware-level failure reported by a facade.
    #[error("hardware failure: {0}")]
    HardwareFailure(String),

    /// Authentication required but absent or wrong.
    #[error("not authorized")]
    NotAuthorized,

    /// Anything else; includes caught handler panics.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OnvifError {
    /// Shorthand for an invalid-argument fault.
    pub fn invalid_arg(subcode: impl Into<String>, reason: impl Into<String>) -> Self {
        OnvifError::InvalidArg {
            subcode: subcode.into(),
            reason: reason.into(),
        }
    }

    /// Missing required argument.
    pub fn missing_arg(name: &str) -> Self {
        OnvifError::InvalidArg {
            subcode: "InvalidArgVal".to_string(),
            reason: format!("required argument '{}' is missing", name),
        }
    }

    /// Out-of-range argument.
    pub fn out_of_range(
        name: &str,
        min: impl std::fmt::Display,
        max: impl std::fmt::Display,
    ) -> Self {
        OnvifError::InvalidArg {
            subcode: "InvalidArgVal".to_string(),
            reason: format!("'{}' must be between {} and {}", name, min, max),
        }
    }

    /// The SOAP fault code for this error.
    pub fn fault_code(&self) -> FaultCode {
        match self {
            OnvifError::InvalidArg { .. }
            | OnvifError::NotFound(_)
            | OnvifError::Parse(_)
            | OnvifError::InvalidNamespace(_)
            | OnvifError::ActionNotSupported(_)
            | OnvifError::NotAuthorized => FaultCode::Sender,
            OnvifError::Memory(_)
            | OnvifError::Io(_)
            | OnvifError::Timeout(_)
            | OnvifError::HardwareFailure(_)
            | OnvifError::Internal(_) => FaultCode::Receiver,
        }
    }

    /// The HTTP status carried alongside the fault.
    pub fn http_status(&self) -> u16 {
        match self {
            OnvifError::NotAuthorized => 401,
            OnvifError::InvalidArg { .. }
            | OnvifError::Parse(_)
            | OnvifError::InvalidNamespace(_) => 400,
            // ONVIF clients expect 200 + Sender fault for unknown
            // operations and tokens.
            OnvifError::NotFound(_) | OnvifError::ActionNotSupported(_) => 200,
            OnvifError::Memory(_)
            | OnvifError::Io(_)
            | OnvifError::Timeout(_)
            | OnvifError::HardwareFailure(_)
            | OnvifError::Internal(_) => 500,
        }
    }

    fn fault_details(&self) -> (&'static str, String) {
        match self {
            OnvifError::InvalidArg { subcode, reason } => {
                ("ter:InvalidArgVal", format!("{}: {}", subcode, reason))
            }
            OnvifError::NotFound(what) => ("ter:NotFound", what.clone()),
            OnvifError::Memory(msg) => ("ter:OutOfMemory", msg.clone()),
            OnvifError::Io(msg) => ("ter:SystemError", msg.clone()),
            OnvifError::Parse(msg) => ("ter:WellFormed", msg.clone()),
            OnvifError::InvalidNamespace(msg) => ("ter:WellFormed", msg.clone()),
            OnvifError::ActionNotSupported(action) => (
                "ter:ActionNotSupported",
                format!("action '{}' is not supported", action),
            ),
            OnvifError::Timeout(msg) => ("ter:SystemError", msg.clone()),
            OnvifError::HardwareFailure(msg) => ("ter:HardwareFailure", msg.clone()),
            OnvifError::NotAuthorized => (
                "ter:NotAuthorized",
                "the action requires authentication".to_string(),
            ),
            OnvifError::Internal(msg) => ("ter:InternalError", msg.clone()),
        }
    }

    /// Render the full SOAP fault envelope for this error.
    pub fn to_soap_fault(&self) -> String {
        let (subcode, reason) = self.fault_details();
        build_soap_fault(self.fault_code().as_str(), subcode, &reason, None)
    }
}

impl From<crate::platform::HardwareError> for OnvifError {
    fn from(err: crate::platform::HardwareError) -> Self {
        use crate::platform::HardwareError;
        match err {
            HardwareError::Timeout => OnvifError::Timeout("hardware operation".to_string()),
            HardwareError::InvalidParameter(msg) => OnvifError::invalid_arg("InvalidArgVal", msg),
            HardwareError::NotSupported(msg) => OnvifError::ActionNotSupported(msg),
            other => OnvifError::HardwareFailure(other.to_string()),
        }
    }
}

impl From<crate::config::ConfigError> for OnvifError {
    fn from(err: crate::config::ConfigError) -> Self {
        OnvifError::Internal(format!("configuration: {}", err))
    }
}
