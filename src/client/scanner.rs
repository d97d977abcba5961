//! Raw advertisement scanner handle.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::proto::command::Command;
use crate::proto::event::AdvertisementPacket;

use super::Shared;

/// A registered raw-advertisement listener.
///
/// Advertisements arrive on [`next`](Self::next) until [`stop`](Self::stop)
/// is called or the handle is dropped; either deregisters the scan id, so
/// late advertisements for it are dropped by the engine.
pub struct ButtonScanner {
    pub(super) scan_id: u32,
    pub(super) advertisements: mpsc::UnboundedReceiver<AdvertisementPacket>,
    pub(super) shared: Arc<Shared>,
    pub(super) stopped: bool,
}

impl ButtonScanner {
    pub fn scan_id(&self) -> u32 {
        self.scan_id
    }

    /// Waits for the next advertisement. Returns `None` after the scanner
    /// stopped or the connection closed.
    pub async fn next(&mut self) -> Option<AdvertisementPacket> {
        self.advertisements.recv().await
    }

    /// Deregisters the scanner and tells the server to stop forwarding
    /// advertisements for this scan id.
    pub fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        self.shared.remove_scanner_route(self.scan_id);
        self.shared
            .send_fire_and_forget(Command::RemoveScanner { scan_id: self.scan_id })
    }
}

impl Drop for ButtonScanner {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
