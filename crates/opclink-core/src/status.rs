//! OPC UA status codes.
//!
//! A status code is a 32-bit value whose top two bits encode severity
//! (00 = good, 01 = uncertain, 10 = bad). Only the codes the session
//! lifecycle actually inspects are named here; everything else still
//! round-trips through [`StatusCode`] untouched.

use std::fmt;

/// A 32-bit OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u32);

impl StatusCode {
    /// Operation succeeded.
    pub const GOOD: Self = Self(0x0000_0000);
    /// An unexpected error occurred.
    pub const BAD_UNEXPECTED_ERROR: Self = Self(0x8001_0000);
    /// An internal error occurred as a result of a programming or
    /// configuration error.
    pub const BAD_INTERNAL_ERROR: Self = Self(0x8002_0000);
    /// The operation timed out.
    pub const BAD_TIMEOUT: Self = Self(0x800A_0000);
    /// The server does not support the requested service.
    pub const BAD_SERVICE_UNSUPPORTED: Self = Self(0x800B_0000);
    /// An error occurred verifying security.
    pub const BAD_SECURITY_CHECKS_FAILED: Self = Self(0x8013_0000);
    /// The specified secure channel is no longer valid.
    pub const BAD_SECURE_CHANNEL_ID_INVALID: Self = Self(0x8022_0000);
    /// The session id is not valid.
    pub const BAD_SESSION_ID_INVALID: Self = Self(0x8025_0000);
    /// The session was closed by the client.
    pub const BAD_SESSION_CLOSED: Self = Self(0x8026_0000);
    /// The session cannot be used because its activation has not
    /// completed.
    pub const BAD_SESSION_NOT_ACTIVATED: Self = Self(0x8027_0000);
    /// The subscription id is not valid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: Self = Self(0x8028_0000);
    /// The requested operation is not supported.
    pub const BAD_NOT_SUPPORTED: Self = Self(0x803D_0000);
    /// The requested operation is not implemented.
    pub const BAD_NOT_IMPLEMENTED: Self = Self(0x8040_0000);
    /// The security token request type is not valid.
    pub const BAD_REQUEST_TYPE_INVALID: Self = Self(0x8053_0000);
    /// The secure channel id is unknown at the transport level.
    pub const BAD_TCP_SECURE_CHANNEL_UNKNOWN: Self = Self(0x8085_0000);
    /// The server is out of service.
    pub const BAD_OUT_OF_SERVICE: Self = Self(0x808D_0000);
    /// The connection attempt was rejected by the remote endpoint.
    pub const BAD_CONNECTION_REJECTED: Self = Self(0x80AC_0000);
    /// The network connection has been closed.
    pub const BAD_CONNECTION_CLOSED: Self = Self(0x80AE_0000);

    /// Construct a status code from its raw 32-bit value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw 32-bit value.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Severity bits indicate success (top two bits `00`).
    pub const fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0x0000_0000
    }

    /// Severity bits indicate failure (top two bits `10`).
    pub const fn is_bad(self) -> bool {
        self.0 & 0xC000_0000 == 0x8000_0000
    }

    /// The status reports that the session itself is no longer usable.
    ///
    /// A service fault with one of these codes while a session is active
    /// means the server has discarded or invalidated the session; the only
    /// recovery is to reconnect and reactivate or recreate.
    pub fn is_session_error(self) -> bool {
        matches!(
            self,
            Self::BAD_SESSION_CLOSED | Self::BAD_SESSION_ID_INVALID | Self::BAD_SESSION_NOT_ACTIVATED
        )
    }

    /// The status reports that the underlying secure channel is no longer
    /// valid, even though the session may still exist server-side.
    pub fn is_secure_channel_error(self) -> bool {
        matches!(
            self,
            Self::BAD_SECURE_CHANNEL_ID_INVALID
                | Self::BAD_SECURITY_CHECKS_FAILED
                | Self::BAD_TCP_SECURE_CHANNEL_UNKNOWN
                | Self::BAD_REQUEST_TYPE_INVALID
        )
    }

    /// The status means the server does not implement the requested
    /// service at all (as opposed to the request failing).
    pub fn is_service_unsupported(self) -> bool {
        matches!(
            self,
            Self::BAD_NOT_IMPLEMENTED
                | Self::BAD_NOT_SUPPORTED
                | Self::BAD_OUT_OF_SERVICE
                | Self::BAD_SERVICE_UNSUPPORTED
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn severity_bits() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::GOOD.is_bad());

        assert!(StatusCode::BAD_TIMEOUT.is_bad());
        assert!(!StatusCode::BAD_TIMEOUT.is_good());

        // Uncertain severity is neither good nor bad
        let uncertain = StatusCode::new(0x4000_0000);
        assert!(!uncertain.is_good());
        assert!(!uncertain.is_bad());
    }

    #[test]
    fn session_error_classification() {
        assert!(StatusCode::BAD_SESSION_CLOSED.is_session_error());
        assert!(StatusCode::BAD_SESSION_ID_INVALID.is_session_error());
        assert!(StatusCode::BAD_SESSION_NOT_ACTIVATED.is_session_error());

        assert!(!StatusCode::BAD_TIMEOUT.is_session_error());
        assert!(!StatusCode::BAD_SECURE_CHANNEL_ID_INVALID.is_session_error());
    }

    #[test]
    fn secure_channel_error_classification() {
        assert!(StatusCode::BAD_SECURE_CHANNEL_ID_INVALID.is_secure_channel_error());
        assert!(StatusCode::BAD_SECURITY_CHECKS_FAILED.is_secure_channel_error());
        assert!(StatusCode::BAD_TCP_SECURE_CHANNEL_UNKNOWN.is_secure_channel_error());
        assert!(StatusCode::BAD_REQUEST_TYPE_INVALID.is_secure_channel_error());

        assert!(!StatusCode::BAD_SESSION_CLOSED.is_secure_channel_error());
    }

    #[test]
    fn service_unsupported_classification() {
        assert!(StatusCode::BAD_NOT_IMPLEMENTED.is_service_unsupported());
        assert!(StatusCode::BAD_NOT_SUPPORTED.is_service_unsupported());
        assert!(StatusCode::BAD_OUT_OF_SERVICE.is_service_unsupported());
        assert!(StatusCode::BAD_SERVICE_UNSUPPORTED.is_service_unsupported());

        assert!(!StatusCode::BAD_TIMEOUT.is_service_unsupported());
        assert!(!StatusCode::BAD_INTERNAL_ERROR.is_service_unsupported());
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(StatusCode::BAD_TIMEOUT.to_string(), "0x800A0000");
        assert_eq!(StatusCode::GOOD.to_string(), "0x00000000");
    }

    proptest! {
        /// Severity follows the top two bits for any raw code: `00` is
        /// good, `10` is bad, and the two never overlap.
        #[test]
        fn severity_follows_the_top_two_bits(raw in any::<u32>()) {
            let status = StatusCode::new(raw);

            prop_assert_eq!(status.is_good(), raw >> 30 == 0b00);
            prop_assert_eq!(status.is_bad(), raw >> 30 == 0b10);
            prop_assert!(!(status.is_good() && status.is_bad()));
        }

        /// Every named fault class is a subset of bad severity.
        #[test]
        fn fault_classes_imply_bad_severity(raw in any::<u32>()) {
            let status = StatusCode::new(raw);

            if status.is_session_error()
                || status.is_secure_channel_error()
                || status.is_service_unsupported()
            {
                prop_assert!(status.is_bad());
            }
        }
    }
}
