//! Connection engine for the flicd server protocol.
//!
//! One engine instance owns one TCP connection. A single spawned reader
//! task is the only point that reads from the socket; a single spawned
//! writer task is the only point that writes, fed whole frames through a
//! queue so concurrent callers can never interleave partial writes.
//! Callers correlate with responses through pending-request tables shared
//! between them and the reader task.

mod channel;
mod scanner;
mod wizard;

pub use channel::{
    ButtonConnectionChannel, ButtonEventKind, ChannelEvent, DEFAULT_AUTO_DISCONNECT_TIME,
};
pub use scanner::ButtonScanner;
pub use wizard::{ScanWizard, ScanWizardEvent, ScanWizardOutcome};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::bdaddr::Bdaddr;
use crate::error::{FlicError, Result};
use crate::proto::command::Command;
use crate::proto::enums::{
    BluetoothControllerState, ConnectionStatus, CreateConnectionChannelError, LatencyMode,
};
use crate::proto::event::{AdvertisementPacket, ButtonInfo, Event, GetInfoResponse};
use crate::proto::packet::{read_packet, write_packet, Packet};

/// Default flicd listening port.
pub const DEFAULT_PORT: u16 = 5551;

/// Server-wide notifications not tied to any handle, delivered to every
/// subscriber of [`FlicClient::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotification {
    /// A button completed verification at the server (by any client).
    NewVerifiedButton { bd_addr: Bdaddr },
    NoSpaceForNewConnection { max_concurrently_connected_buttons: u8 },
    GotSpaceForNewConnection { max_concurrently_connected_buttons: u8 },
    BluetoothControllerStateChange { state: BluetoothControllerState },
    ButtonDeleted { bd_addr: Bdaddr, deleted_by_this_client: bool },
}

/// Per-id-class counter, scoped to one engine instance so separate engines
/// never share id sequences.
struct IdGen {
    next: AtomicU32,
}

impl IdGen {
    fn new() -> Self {
        IdGen { next: AtomicU32::new(1) }
    }

    fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

enum WriterMsg {
    Frame(Packet),
    Shutdown,
}

type ResponseSlot<T> = oneshot::Sender<Result<T>>;

/// A channel request waiting for the server's ack. The event route is
/// created up front and moved into the routing table atomically with the
/// ack, so no status event can fall between ack and registration.
struct PendingChannel {
    resp: ResponseSlot<ConnectionStatus>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

struct WizardState {
    events: mpsc::UnboundedSender<ScanWizardEvent>,
    done: ResponseSlot<ScanWizardOutcome>,
    candidate: Option<(Bdaddr, String)>,
    connected: Vec<(Bdaddr, String)>,
}

/// All mutable correlation state, shared between caller tasks and the
/// reader task. The lock is only ever held for map operations, never
/// across an await.
#[derive(Default)]
struct Pending {
    closed: bool,
    get_info: VecDeque<ResponseSlot<GetInfoResponse>>,
    button_info: HashMap<Bdaddr, ResponseSlot<ButtonInfo>>,
    delete_button: HashMap<Bdaddr, ResponseSlot<bool>>,
    create_channel: HashMap<u32, PendingChannel>,
    pings: HashMap<u32, ResponseSlot<()>>,
    scanners: HashMap<u32, mpsc::UnboundedSender<AdvertisementPacket>>,
    channels: HashMap<u32, mpsc::UnboundedSender<ChannelEvent>>,
    wizards: HashMap<u32, WizardState>,
}

pub(crate) struct Shared {
    pending: Mutex<Pending>,
    closed: AtomicBool,
    writer: mpsc::UnboundedSender<WriterMsg>,
    reader_stop: Mutex<Option<oneshot::Sender<()>>>,
    notifications: broadcast::Sender<ServerNotification>,
    conn_ids: IdGen,
    scan_ids: IdGen,
    wizard_ids: IdGen,
    ping_ids: IdGen,
}

impl Shared {
    /// Queues a frame for a request that expects a response. Fails when
    /// the connection is known closed.
    fn send_command(&self, command: Command) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FlicError::Disconnected);
        }
        self.writer
            .send(WriterMsg::Frame(command.to_packet()))
            .map_err(|_| FlicError::Disconnected)
    }

    /// Queues a fire-and-forget frame. Sending on a known-closed
    /// connection is an idempotent no-op.
    pub(crate) fn send_fire_and_forget(&self, command: Command) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            debug!("dropping send on closed connection (opcode {})", command.opcode());
            return Ok(());
        }
        // The writer only goes away on shutdown, which means known-closed.
        let _ = self.writer.send(WriterMsg::Frame(command.to_packet()));
        Ok(())
    }

    pub(crate) fn remove_scanner_route(&self, scan_id: u32) {
        self.pending.lock().unwrap().scanners.remove(&scan_id);
    }

    /// Tears the connection down exactly once: stops the writer, marks
    /// the engine closed and fails every pending request.
    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.writer.send(WriterMsg::Shutdown);
        if let Some(stop) = self.reader_stop.lock().unwrap().take() {
            let _ = stop.send(());
        }

        let mut pending = self.pending.lock().unwrap();
        pending.closed = true;

        for slot in pending.get_info.drain(..) {
            let _ = slot.send(Err(FlicError::Disconnected));
        }
        for (_, slot) in pending.button_info.drain() {
            let _ = slot.send(Err(FlicError::Disconnected));
        }
        for (_, slot) in pending.delete_button.drain() {
            let _ = slot.send(Err(FlicError::Disconnected));
        }
        for (_, chan) in pending.create_channel.drain() {
            let _ = chan.resp.send(Err(FlicError::Disconnected));
        }
        for (_, slot) in pending.pings.drain() {
            let _ = slot.send(Err(FlicError::Disconnected));
        }
        for (_, wizard) in pending.wizards.drain() {
            let _ = wizard.done.send(Err(FlicError::Disconnected));
        }
        // Dropping the routes ends the corresponding event streams.
        pending.scanners.clear();
        pending.channels.clear();

        info!("connection engine shut down");
    }

    /// Routes one decoded event to its pending slot, registered handle or
    /// broadcast subscribers. Events nothing is waiting for are dropped.
    fn dispatch(&self, event: Event) {
        let mut pending = self.pending.lock().unwrap();

        match event {
            Event::AdvertisementPacket { scan_id, packet } => {
                if let Some(route) = pending.scanners.get(&scan_id) {
                    let _ = route.send(packet);
                } else {
                    debug!("dropping advertisement for unknown scan id {}", scan_id);
                }
            }

            Event::CreateConnectionChannelResponse { conn_id, error, connection_status } => {
                if let Some(chan) = pending.create_channel.remove(&conn_id) {
                    if error == CreateConnectionChannelError::NoError {
                        pending.channels.insert(conn_id, chan.events);
                        let _ = chan.resp.send(Ok(connection_status));
                    } else {
                        let _ = chan
                            .resp
                            .send(Err(FlicError::CreateConnectionChannelFailed(error)));
                    }
                } else {
                    warn!("channel response for unknown conn id {}", conn_id);
                }
            }

            Event::ConnectionStatusChanged { conn_id, connection_status, disconnect_reason } => {
                if let Some(route) = pending.channels.get(&conn_id) {
                    let _ = route.send(ChannelEvent::ConnectionStatusChanged {
                        connection_status,
                        disconnect_reason,
                    });
                } else {
                    debug!("status change for unknown conn id {}", conn_id);
                }
            }

            Event::ConnectionChannelRemoved { conn_id, removed_reason } => {
                // The server-side removal is what deregisters the channel.
                if let Some(route) = pending.channels.remove(&conn_id) {
                    let _ = route.send(ChannelEvent::Removed { reason: removed_reason });
                } else {
                    debug!("removal for unknown conn id {}", conn_id);
                }
            }

            Event::ButtonUpOrDown(e) => {
                route_button_event(&pending, ButtonEventKind::UpOrDown, e);
            }
            Event::ButtonClickOrHold(e) => {
                route_button_event(&pending, ButtonEventKind::ClickOrHold, e);
            }
            Event::ButtonSingleOrDoubleClick(e) => {
                route_button_event(&pending, ButtonEventKind::SingleOrDoubleClick, e);
            }
            Event::ButtonSingleOrDoubleClickOrHold(e) => {
                route_button_event(&pending, ButtonEventKind::SingleOrDoubleClickOrHold, e);
            }

            Event::NewVerifiedButton { bd_addr } => {
                let _ = self
                    .notifications
                    .send(ServerNotification::NewVerifiedButton { bd_addr });
            }

            Event::GetInfoResponse(info) => {
                // No id on the wire; responses match requests in send order.
                if let Some(slot) = pending.get_info.pop_front() {
                    let _ = slot.send(Ok(info));
                } else {
                    warn!("get-info response with no pending request");
                }
            }

            Event::NoSpaceForNewConnection { max_concurrently_connected_buttons } => {
                let _ = self.notifications.send(ServerNotification::NoSpaceForNewConnection {
                    max_concurrently_connected_buttons,
                });
            }

            Event::GotSpaceForNewConnection { max_concurrently_connected_buttons } => {
                let _ = self.notifications.send(ServerNotification::GotSpaceForNewConnection {
                    max_concurrently_connected_buttons,
                });
            }

            Event::BluetoothControllerStateChange { state } => {
                let _ = self
                    .notifications
                    .send(ServerNotification::BluetoothControllerStateChange { state });
            }

            Event::PingResponse { ping_id } => {
                if let Some(slot) = pending.pings.remove(&ping_id) {
                    let _ = slot.send(Ok(()));
                } else {
                    debug!("ping response for unknown ping id {}", ping_id);
                }
            }

            Event::GetButtonInfoResponse { bd_addr, info } => {
                if let Some(slot) = pending.button_info.remove(&bd_addr) {
                    let _ = slot.send(Ok(info));
                } else {
                    warn!("button info response for {} with no pending request", bd_addr);
                }
            }

            Event::ScanWizardFoundPrivateButton { scan_wizard_id } => {
                if let Some(wizard) = pending.wizards.get_mut(&scan_wizard_id) {
                    let _ = wizard.events.send(ScanWizardEvent::FoundPrivateButton);
                }
            }

            Event::ScanWizardFoundPublicButton { scan_wizard_id, bd_addr, name } => {
                if let Some(wizard) = pending.wizards.get_mut(&scan_wizard_id) {
                    wizard.candidate = Some((bd_addr, name.clone()));
                    let _ = wizard
                        .events
                        .send(ScanWizardEvent::FoundPublicButton { bd_addr, name });
                }
            }

            Event::ScanWizardButtonConnected { scan_wizard_id } => {
                if let Some(wizard) = pending.wizards.get_mut(&scan_wizard_id) {
                    // Promote the current candidate; the server may cycle
                    // through found/connected several times per run.
                    if let Some((bd_addr, name)) = wizard.candidate.take() {
                        wizard.connected.push((bd_addr, name.clone()));
                        let _ = wizard
                            .events
                            .send(ScanWizardEvent::ButtonConnected { bd_addr, name });
                    } else {
                        warn!(
                            "wizard {} reported a connection without a candidate",
                            scan_wizard_id
                        );
                    }
                }
            }

            Event::ScanWizardCompleted { scan_wizard_id, result } => {
                if let Some(wizard) = pending.wizards.remove(&scan_wizard_id) {
                    let _ = wizard.done.send(Ok(ScanWizardOutcome {
                        result,
                        connected: wizard.connected,
                    }));
                } else {
                    debug!("completion for unknown wizard id {}", scan_wizard_id);
                }
            }

            Event::ButtonDeleted { bd_addr, deleted_by_this_client } => {
                if let Some(slot) = pending.delete_button.remove(&bd_addr) {
                    let _ = slot.send(Ok(deleted_by_this_client));
                }
                let _ = self.notifications.send(ServerNotification::ButtonDeleted {
                    bd_addr,
                    deleted_by_this_client,
                });
            }
        }
    }
}

fn route_button_event(pending: &Pending, kind: ButtonEventKind, e: crate::proto::event::ButtonEvent) {
    if let Some(route) = pending.channels.get(&e.conn_id) {
        let _ = route.send(ChannelEvent::Button {
            kind,
            click_type: e.click_type,
            was_queued: e.was_queued,
            time_diff: e.time_diff,
        });
    } else {
        debug!("button event for unknown conn id {}", e.conn_id);
    }
}

/// Client for one connection to a flicd server.
///
/// Created connected by [`connect`](Self::connect). Once disconnected,
/// for any reason, the instance is spent; connect a new one to resume.
#[derive(Clone)]
pub struct FlicClient {
    shared: Arc<Shared>,
}

impl FlicClient {
    /// Opens the TCP connection and starts the background reader and
    /// writer tasks.
    pub async fn connect(host: &str, port: u16) -> Result<FlicClient> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(FlicError::Connect)?;
        stream.set_nodelay(true).map_err(FlicError::Connect)?;

        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: TcpStream) -> FlicClient {
        let (read_half, write_half) = stream.into_split();

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (notifications, _) = broadcast::channel(128);

        let shared = Arc::new(Shared {
            pending: Mutex::new(Pending::default()),
            closed: AtomicBool::new(false),
            writer: writer_tx,
            reader_stop: Mutex::new(Some(stop_tx)),
            notifications,
            conn_ids: IdGen::new(),
            scan_ids: IdGen::new(),
            wizard_ids: IdGen::new(),
            ping_ids: IdGen::new(),
        });

        tokio::spawn(writer_task(write_half, writer_rx, Arc::clone(&shared)));
        tokio::spawn(reader_task(read_half, stop_rx, Arc::clone(&shared)));

        FlicClient { shared }
    }

    /// Whether the connection has been torn down.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Closes the connection. Every pending request resolves with
    /// [`FlicError::Disconnected`]; idempotent.
    pub fn disconnect(&self) {
        self.shared.shutdown();
    }

    /// Subscribes to server-wide notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerNotification> {
        self.shared.notifications.subscribe()
    }

    /// Fetches controller state, the server's own address and capacity
    /// counters, plus the list of verified buttons. Responses carry no
    /// correlation id; they resolve strictly in request order.
    pub async fn get_info(&self) -> Result<GetInfoResponse> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().unwrap();
            if pending.closed {
                return Err(FlicError::Disconnected);
            }
            pending.get_info.push_back(tx);
        }

        self.shared.send_command(Command::GetInfo)?;
        rx.await.map_err(|_| FlicError::Disconnected)?
    }

    /// Fetches stored metadata for one button. At most one request per
    /// address may be in flight.
    pub async fn get_button_info(&self, bd_addr: Bdaddr) -> Result<ButtonInfo> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().unwrap();
            if pending.closed {
                return Err(FlicError::Disconnected);
            }
            if pending.button_info.contains_key(&bd_addr) {
                return Err(FlicError::DuplicateRequest(bd_addr));
            }
            pending.button_info.insert(bd_addr, tx);
        }

        self.shared.send_command(Command::GetButtonInfo { bd_addr })?;
        rx.await.map_err(|_| FlicError::Disconnected)?
    }

    /// Registers a raw advertisement scanner.
    pub fn create_scanner(&self) -> Result<ButtonScanner> {
        let scan_id = self.shared.scan_ids.next();
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut pending = self.shared.pending.lock().unwrap();
            if pending.closed {
                return Err(FlicError::Disconnected);
            }
            pending.scanners.insert(scan_id, tx);
        }

        self.shared.send_command(Command::CreateScanner { scan_id })?;

        Ok(ButtonScanner {
            scan_id,
            advertisements: rx,
            shared: Arc::clone(&self.shared),
            stopped: false,
        })
    }

    /// Requests a connection channel to a button and waits for the
    /// server's verdict. On success the channel is registered for event
    /// routing and its handle returned; on rejection the id is discarded
    /// and [`FlicError::CreateConnectionChannelFailed`] raised.
    pub async fn open_connection_channel(
        &self,
        bd_addr: Bdaddr,
        latency_mode: LatencyMode,
        auto_disconnect_time: i16,
    ) -> Result<ButtonConnectionChannel> {
        let conn_id = self.shared.conn_ids.next();
        let (tx, rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        {
            let mut pending = self.shared.pending.lock().unwrap();
            if pending.closed {
                return Err(FlicError::Disconnected);
            }
            pending
                .create_channel
                .insert(conn_id, PendingChannel { resp: tx, events: events_tx });
        }

        self.shared.send_command(Command::CreateConnectionChannel {
            conn_id,
            bd_addr,
            latency_mode,
            auto_disconnect_time,
        })?;

        // Resolved by the dispatcher, which registers the event route
        // atomically with a successful ack.
        let _status = rx.await.map_err(|_| FlicError::Disconnected)??;

        Ok(ButtonConnectionChannel {
            conn_id,
            bd_addr,
            latency_mode,
            auto_disconnect_time,
            events: events_rx,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Removes all connection channels to a button, across every client
    /// of this server.
    pub fn force_disconnect(&self, bd_addr: Bdaddr) -> Result<()> {
        self.shared.send_fire_and_forget(Command::ForceDisconnect { bd_addr })
    }

    /// Deletes a button from the server and waits for the confirmation
    /// event. Returns whether the deletion was attributed to this client.
    /// At most one delete per address may be in flight.
    pub async fn delete_button(&self, bd_addr: Bdaddr) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().unwrap();
            if pending.closed {
                return Err(FlicError::Disconnected);
            }
            if pending.delete_button.contains_key(&bd_addr) {
                return Err(FlicError::DuplicateRequest(bd_addr));
            }
            pending.delete_button.insert(bd_addr, tx);
        }

        self.shared.send_command(Command::DeleteButton { bd_addr })?;
        rx.await.map_err(|_| FlicError::Disconnected)?
    }

    /// Liveness probe. Resolves when the matching ping response arrives;
    /// the engine applies no timeout of its own, so callers that want one
    /// wrap this in `tokio::time::timeout`.
    pub async fn ping(&self) -> Result<()> {
        let ping_id = self.shared.ping_ids.next();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().unwrap();
            if pending.closed {
                return Err(FlicError::Disconnected);
            }
            pending.pings.insert(ping_id, tx);
        }

        self.shared.send_command(Command::Ping { ping_id })?;
        rx.await.map_err(|_| FlicError::Disconnected)?
    }

    /// Starts a scan wizard run for pairing a new button.
    pub fn create_scan_wizard(&self) -> Result<ScanWizard> {
        let scan_wizard_id = self.shared.wizard_ids.next();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().unwrap();
            if pending.closed {
                return Err(FlicError::Disconnected);
            }
            pending.wizards.insert(
                scan_wizard_id,
                WizardState {
                    events: events_tx,
                    done: done_tx,
                    candidate: None,
                    connected: Vec::new(),
                },
            );
        }

        self.shared.send_command(Command::CreateScanWizard { scan_wizard_id })?;

        Ok(ScanWizard {
            scan_wizard_id,
            events: events_rx,
            done: Some(done_rx),
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Single socket-write point. Frames arrive whole through the queue, so
/// no partial write can ever interleave with another caller's frame.
async fn writer_task(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<WriterMsg>,
    shared: Arc<Shared>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            WriterMsg::Frame(packet) => {
                if let Err(e) = write_packet(&mut write_half, &packet).await {
                    error!("socket write failed: {}", e);
                    shared.shutdown();
                    break;
                }
            }
            WriterMsg::Shutdown => {
                debug!("writer task stopping");
                break;
            }
        }
    }
}

/// Single socket-read point: frames in, decoded events dispatched. Any
/// framing or decode failure is fatal to the connection, since the stream
/// cannot be resynchronized after a bad frame.
async fn reader_task(
    mut read_half: OwnedReadHalf,
    mut stop: oneshot::Receiver<()>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            result = read_packet(&mut read_half) => match result {
                Ok(Some(packet)) => match Event::parse(&packet) {
                    Ok(event) => {
                        debug!("received {}", event.opcode_name());
                        shared.dispatch(event);
                    }
                    Err(e) => {
                        error!(
                            "failed to decode event packet (opcode {}): {}",
                            packet.opcode, e
                        );
                        break;
                    }
                },
                Ok(None) => {
                    info!("server closed the connection");
                    break;
                }
                Err(e) => {
                    error!("socket read failed: {}", e);
                    break;
                }
            },

            _ = &mut stop => {
                debug!("reader task stopping");
                break;
            }
        }
    }

    shared.shutdown();
}
