//! Connection channel handles.
//!
//! A channel is a client-held request for event delivery about one
//! button's connection lifecycle. The handle routes whatever press
//! granularity the server decides to emit; it does not pick one.

use tokio::sync::mpsc;

use crate::bdaddr::Bdaddr;
use crate::error::Result;
use crate::proto::command::Command;
use crate::proto::enums::{
    ClickType, ConnectionStatus, DisconnectReason, LatencyMode, RemovedReason,
};

use super::Shared;
use std::sync::Arc;

/// Applied when the button connects and no explicit timeout was given.
pub const DEFAULT_AUTO_DISCONNECT_TIME: i16 = 511;

/// Which of the four press-granularity opcodes carried a button event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEventKind {
    UpOrDown,
    ClickOrHold,
    SingleOrDoubleClick,
    SingleOrDoubleClickOrHold,
}

/// Everything the server can deliver through an open connection channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    ConnectionStatusChanged {
        connection_status: ConnectionStatus,
        /// Only meaningful when the status is `Disconnected`.
        disconnect_reason: DisconnectReason,
    },
    /// The channel was removed at the server. This is the last event a
    /// channel will ever deliver.
    Removed {
        reason: RemovedReason,
    },
    Button {
        kind: ButtonEventKind,
        click_type: ClickType,
        was_queued: bool,
        /// Seconds since the press happened, when it was queued while the
        /// button was disconnected.
        time_diff: u32,
    },
}

/// An open connection channel, confirmed by the server.
///
/// Returned by [`FlicClient::open_connection_channel`] only after the
/// server acknowledged the request, so a handle never exists for a
/// rejected channel.
///
/// [`FlicClient::open_connection_channel`]: super::FlicClient::open_connection_channel
pub struct ButtonConnectionChannel {
    pub(super) conn_id: u32,
    pub(super) bd_addr: Bdaddr,
    pub(super) latency_mode: LatencyMode,
    pub(super) auto_disconnect_time: i16,
    pub(super) events: mpsc::UnboundedReceiver<ChannelEvent>,
    pub(super) shared: Arc<Shared>,
}

impl ButtonConnectionChannel {
    pub fn conn_id(&self) -> u32 {
        self.conn_id
    }

    pub fn bd_addr(&self) -> Bdaddr {
        self.bd_addr
    }

    pub fn latency_mode(&self) -> LatencyMode {
        self.latency_mode
    }

    pub fn auto_disconnect_time(&self) -> i16 {
        self.auto_disconnect_time
    }

    /// Waits for the next event on this channel. Returns `None` once the
    /// channel has been removed at the server or the connection is gone.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Changes the latency mode. A value equal to the current one is a
    /// local no-op and sends nothing.
    pub fn set_latency_mode(&mut self, latency_mode: LatencyMode) -> Result<()> {
        if latency_mode == self.latency_mode {
            return Ok(());
        }
        self.latency_mode = latency_mode;
        self.send_mode_parameters()
    }

    /// Changes the auto disconnect time, applied the next time the button
    /// connects. A value equal to the current one is a local no-op.
    pub fn set_auto_disconnect_time(&mut self, auto_disconnect_time: i16) -> Result<()> {
        if auto_disconnect_time == self.auto_disconnect_time {
            return Ok(());
        }
        self.auto_disconnect_time = auto_disconnect_time;
        self.send_mode_parameters()
    }

    fn send_mode_parameters(&self) -> Result<()> {
        self.shared.send_fire_and_forget(Command::ChangeModeParameters {
            conn_id: self.conn_id,
            latency_mode: self.latency_mode,
            auto_disconnect_time: self.auto_disconnect_time,
        })
    }

    /// Asks the server to remove this channel. Deregistration happens when
    /// the server's removed event arrives, not at send time; the final
    /// [`ChannelEvent::Removed`] is still delivered.
    pub fn close(&self) -> Result<()> {
        self.shared
            .send_fire_and_forget(Command::RemoveConnectionChannel { conn_id: self.conn_id })
    }
}
