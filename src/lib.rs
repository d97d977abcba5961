//! Client library for the flicd button server.
//!
//! flicd owns the Bluetooth radio and exposes buttons over a TCP protocol
//! of length-prefixed, opcode-tagged frames. This crate implements that
//! protocol: connect a [`FlicClient`], then scan for buttons, open
//! connection channels to receive presses, or run a [`ScanWizard`] to
//! pair a new one.
//!
//! ```no_run
//! use flic_client::{FlicClient, LatencyMode, DEFAULT_AUTO_DISCONNECT_TIME, DEFAULT_PORT};
//!
//! # async fn run() -> flic_client::Result<()> {
//! let client = FlicClient::connect("localhost", DEFAULT_PORT).await?;
//!
//! let info = client.get_info().await?;
//! for bd_addr in info.verified_buttons {
//!     let mut channel = client
//!         .open_connection_channel(bd_addr, LatencyMode::Normal, DEFAULT_AUTO_DISCONNECT_TIME)
//!         .await?;
//!     tokio::spawn(async move {
//!         while let Some(event) = channel.next_event().await {
//!             println!("{:?}", event);
//!         }
//!     });
//! }
//! # Ok(())
//! # }
//! ```

mod bdaddr;
mod client;
mod error;
mod proto;

pub use bdaddr::Bdaddr;
pub use client::{
    ButtonConnectionChannel, ButtonEventKind, ButtonScanner, ChannelEvent, FlicClient,
    ScanWizard, ScanWizardEvent, ScanWizardOutcome, ServerNotification,
    DEFAULT_AUTO_DISCONNECT_TIME, DEFAULT_PORT,
};
pub use error::{FlicError, Result};
pub use proto::enums::{
    BdAddrType, BluetoothControllerState, ClickType, ConnectionStatus,
    CreateConnectionChannelError, DisconnectReason, LatencyMode, RemovedReason,
    ScanWizardResult,
};
pub use proto::event::{AdvertisementPacket, ButtonInfo, GetInfoResponse};
