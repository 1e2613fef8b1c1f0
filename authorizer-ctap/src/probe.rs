//! Platform capability probes
//!
//! Browsers and operating systems send throwaway registrations to find out
//! whether an authenticator is present, or to let the user pick a device.
//! These must never leave a credential behind.

/// (rp id, user name) pairs used by platform probes during makeCredential
const MAKE_CREDENTIAL_PROBES: [(&str, &str); 2] =
    [(".dummy", "dummy"), ("SelectDevice", "SelectDevice")];

/// (application, challenge) fill bytes of U2F presence probes
const U2F_PROBES: [(u8, u8); 2] = [(0x41, 0x42), (0x00, 0x00)];

/// A CTAP2 makeCredential sent only to discover or select the device
pub fn is_probe_make_credential(rp_id: &str, user_name: Option<&str>) -> bool {
    let Some(user_name) = user_name else {
        return false;
    };
    MAKE_CREDENTIAL_PROBES
        .iter()
        .any(|(rp, user)| *rp == rp_id && *user == user_name)
}

/// A U2F register sent with a bogus application and challenge
pub fn is_probe_u2f(application: &[u8], challenge: &[u8]) -> bool {
    application.len() == 32
        && challenge.len() == 32
        && U2F_PROBES.iter().any(|(app, chal)| {
            application.iter().all(|b| b == app) && challenge.iter().all(|b| b == chal)
        })
}
