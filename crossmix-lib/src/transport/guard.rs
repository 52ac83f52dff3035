//! Cleanup guard for sessions that fail before they start playing.

use log::warn;

use super::Transport;

/// Returns the transport to `Idle` unless the session reached `Playing`.
pub(super) struct SessionGuard<'a> {
    transport: &'a Transport,
    session: u64,
    armed: bool,
}

impl<'a> SessionGuard<'a> {
    pub(super) fn new(transport: &'a Transport, session: u64) -> Self {
        Self {
            transport,
            session,
            armed: true,
        }
    }

    /// The session is live; leave it alone.
    pub(super) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.transport.abandon(self.session) {
            warn!("session {} abandoned before playback", self.session);
        }
    }
}
