//! Lifecycle events broadcast to the surrounding application (the UI layer
//! subscribes; this crate only emits).

/// Connection and handshake lifecycle. `MessageTampered` fires when a message
/// fails signature verification under the rejecting policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    ConnectionError(String),
    KeySharingStarted,
    KeyShared,
    KeyShareFailed,
    ConnectionAccepted,
    MessageTampered,
}
