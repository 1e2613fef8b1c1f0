//! authenticatorGetNextAssertion command
//!
//! Every getAssertion settles on a single credential, either by the user
//! picking one or by a preceding preflight, so there is never a next
//! assertion to hand out. The command is acknowledged with an empty body.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.0-ps-20190130/fido-client-to-authenticator-protocol-v2.0-ps-20190130.html#authenticatorGetNextAssertion>

use crate::status::Result;

/// Handle authenticatorGetNextAssertion command
pub fn handle() -> Result<Vec<u8>> {
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body() {
        assert_eq!(handle(), Ok(Vec::new()));
    }
}
