//! Completion notifications for the host UI
//!
//! Every method has an empty default so a host implements only what it
//! needs. Notifications are delivered after the response was sent, outside
//! the transaction manager's lock.

/// Notified when a CTAP2 operation succeeded
pub trait WebAuthnListener: Send + Sync {
    fn on_make_credential(&self) {}

    fn on_get_assertion(&self) {}
}

/// Notified when a U2F operation was released after the user confirmed it
pub trait U2fListener: Send + Sync {
    fn on_u2f_register(&self) {}

    fn on_u2f_authenticate(&self) {}
}

/// Something a listener is told about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    MakeCredential,
    GetAssertion,
    U2fRegister,
    U2fAuthenticate,
}
