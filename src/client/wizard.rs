//! Scan wizard handle: the guided flow for pairing a new button.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::bdaddr::Bdaddr;
use crate::error::{FlicError, Result};
use crate::proto::command::Command;
use crate::proto::enums::ScanWizardResult;

use super::Shared;

/// Progress notifications while a wizard run is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanWizardEvent {
    /// A private button was heard. The user must hold it for 7 seconds to
    /// make it public before the wizard can continue.
    FoundPrivateButton,
    /// A public candidate was found; the server now tries to connect it.
    FoundPublicButton { bd_addr: Bdaddr, name: String },
    /// The current candidate connected and the server starts pairing it.
    ButtonConnected { bd_addr: Bdaddr, name: String },
}

/// Terminal result of a wizard run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanWizardOutcome {
    pub result: ScanWizardResult,
    /// Every button that reached the connected stage during this run, in
    /// the order it connected. The server may retry candidates, so the
    /// list can hold more than one entry even for a single run.
    pub connected: Vec<(Bdaddr, String)>,
}

/// A running scan wizard.
///
/// Consume progress with [`next_event`](Self::next_event) and the final
/// outcome with [`wait`](Self::wait). Cancellation is advisory: the run
/// resolves only when the server's completed event arrives, so a caller
/// that cancels should still `wait` (with its own timeout).
pub struct ScanWizard {
    pub(super) scan_wizard_id: u32,
    pub(super) events: mpsc::UnboundedReceiver<ScanWizardEvent>,
    pub(super) done: Option<oneshot::Receiver<Result<ScanWizardOutcome>>>,
    pub(super) shared: Arc<Shared>,
}

impl ScanWizard {
    pub fn scan_wizard_id(&self) -> u32 {
        self.scan_wizard_id
    }

    /// Waits for the next progress event. Returns `None` once the wizard
    /// completed or the connection closed.
    pub async fn next_event(&mut self) -> Option<ScanWizardEvent> {
        self.events.recv().await
    }

    /// Waits for the wizard to complete. May be called once.
    pub async fn wait(&mut self) -> Result<ScanWizardOutcome> {
        match self.done.take() {
            Some(rx) => rx.await.map_err(|_| FlicError::Disconnected)?,
            None => Err(FlicError::Disconnected),
        }
    }

    /// Asks the server to cancel the run. If the wizard already completed
    /// on the server side, that completion wins and is what `wait`
    /// resolves with; otherwise completion arrives as cancelled-by-user.
    pub fn cancel(&self) -> Result<()> {
        self.shared.send_fire_and_forget(Command::CancelScanWizard {
            scan_wizard_id: self.scan_wizard_id,
        })
    }
}
