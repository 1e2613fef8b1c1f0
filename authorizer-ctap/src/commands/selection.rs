//! authenticatorSelection command
//!
//! Lets a platform with several authenticators attached find out which ones
//! answer CTAP2. Touch confirmation happens on the platform side, so the
//! command is acknowledged right away.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.1-ps-20210615/fido-client-to-authenticator-protocol-v2.1-ps-20210615.html#authenticatorSelection>

use crate::status::Result;

/// Handle authenticatorSelection command
pub fn handle() -> Result<Vec<u8>> {
    Ok(Vec::new())
}
