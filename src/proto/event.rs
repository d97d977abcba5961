//! Inbound events and their wire decoding.
//!
//! The first byte of every frame is the event opcode; the rest is the
//! payload handed to the matching decoder. Decoders are pure functions of
//! the payload and fail on underrun or unknown discriminants.

use uuid::Uuid;

use crate::bdaddr::Bdaddr;
use crate::error::{FlicError, Result};
use crate::proto::enums::{
    BdAddrType, BluetoothControllerState, ClickType, ConnectionStatus,
    CreateConnectionChannelError, DisconnectReason, RemovedReason, ScanWizardResult,
};
use crate::proto::packet::Packet;

/// A raw advertisement heard by a scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementPacket {
    pub bd_addr: Bdaddr,
    pub name: String,
    pub rssi: i8,
    pub is_private: bool,
    pub already_verified: bool,
    pub already_connected_to_this_device: bool,
    pub already_connected_to_other_device: bool,
}

/// Response to a get-info request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetInfoResponse {
    pub bluetooth_controller_state: BluetoothControllerState,
    pub my_bd_addr: Bdaddr,
    pub my_bd_addr_type: BdAddrType,
    pub max_pending_connections: u8,
    pub max_concurrently_connected_buttons: i16,
    pub current_pending_connections: u8,
    pub currently_no_space_for_new_connection: bool,
    pub verified_buttons: Vec<Bdaddr>,
}

/// Stored metadata about one verified button.
///
/// Servers running the older protocol revision only send the UUID; the
/// remaining fields then decode as absent/zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ButtonInfo {
    pub uuid: Option<Uuid>,
    pub color: Option<String>,
    pub serial_number: Option<String>,
    pub flic_version: u8,
    pub firmware_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    AdvertisementPacket {
        scan_id: u32,
        packet: AdvertisementPacket,
    },
    CreateConnectionChannelResponse {
        conn_id: u32,
        error: CreateConnectionChannelError,
        connection_status: ConnectionStatus,
    },
    ConnectionStatusChanged {
        conn_id: u32,
        connection_status: ConnectionStatus,
        disconnect_reason: DisconnectReason,
    },
    ConnectionChannelRemoved {
        conn_id: u32,
        removed_reason: RemovedReason,
    },
    ButtonUpOrDown(ButtonEvent),
    ButtonClickOrHold(ButtonEvent),
    ButtonSingleOrDoubleClick(ButtonEvent),
    ButtonSingleOrDoubleClickOrHold(ButtonEvent),
    NewVerifiedButton {
        bd_addr: Bdaddr,
    },
    GetInfoResponse(GetInfoResponse),
    NoSpaceForNewConnection {
        max_concurrently_connected_buttons: u8,
    },
    GotSpaceForNewConnection {
        max_concurrently_connected_buttons: u8,
    },
    BluetoothControllerStateChange {
        state: BluetoothControllerState,
    },
    PingResponse {
        ping_id: u32,
    },
    GetButtonInfoResponse {
        bd_addr: Bdaddr,
        info: ButtonInfo,
    },
    ScanWizardFoundPrivateButton {
        scan_wizard_id: u32,
    },
    ScanWizardFoundPublicButton {
        scan_wizard_id: u32,
        bd_addr: Bdaddr,
        name: String,
    },
    ScanWizardButtonConnected {
        scan_wizard_id: u32,
    },
    ScanWizardCompleted {
        scan_wizard_id: u32,
        result: ScanWizardResult,
    },
    ButtonDeleted {
        bd_addr: Bdaddr,
        deleted_by_this_client: bool,
    },
}

/// Press details shared by the four button event opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub conn_id: u32,
    pub click_type: ClickType,
    pub was_queued: bool,
    pub time_diff: u32,
}

impl Event {
    pub fn parse(packet: &Packet) -> Result<Event> {
        let mut r = crate::proto::payload::PayloadReader::new(&packet.payload);

        let event = match packet.opcode {
            0 => Event::AdvertisementPacket {
                scan_id: r.read_u32()?,
                packet: AdvertisementPacket {
                    bd_addr: r.read_bdaddr()?,
                    name: r.read_string()?,
                    rssi: r.read_i8()?,
                    is_private: r.read_bool()?,
                    already_verified: r.read_bool()?,
                    already_connected_to_this_device: r.read_bool()?,
                    already_connected_to_other_device: r.read_bool()?,
                },
            },
            1 => Event::CreateConnectionChannelResponse {
                conn_id: r.read_u32()?,
                error: r.read_enum()?,
                connection_status: r.read_enum()?,
            },
            2 => Event::ConnectionStatusChanged {
                conn_id: r.read_u32()?,
                connection_status: r.read_enum()?,
                disconnect_reason: r.read_enum()?,
            },
            3 => Event::ConnectionChannelRemoved {
                conn_id: r.read_u32()?,
                removed_reason: r.read_enum()?,
            },
            4 => Event::ButtonUpOrDown(parse_button_event(&mut r)?),
            5 => Event::ButtonClickOrHold(parse_button_event(&mut r)?),
            6 => Event::ButtonSingleOrDoubleClick(parse_button_event(&mut r)?),
            7 => Event::ButtonSingleOrDoubleClickOrHold(parse_button_event(&mut r)?),
            8 => Event::NewVerifiedButton {
                bd_addr: r.read_bdaddr()?,
            },
            9 => {
                let bluetooth_controller_state = r.read_enum()?;
                let my_bd_addr = r.read_bdaddr()?;
                let my_bd_addr_type = r.read_enum()?;
                let max_pending_connections = r.read_u8()?;
                let max_concurrently_connected_buttons = r.read_i16()?;
                let current_pending_connections = r.read_u8()?;
                let currently_no_space_for_new_connection = r.read_bool()?;

                let count = r.read_u16()? as usize;
                let mut verified_buttons = Vec::with_capacity(count);
                for _ in 0..count {
                    verified_buttons.push(r.read_bdaddr()?);
                }

                Event::GetInfoResponse(GetInfoResponse {
                    bluetooth_controller_state,
                    my_bd_addr,
                    my_bd_addr_type,
                    max_pending_connections,
                    max_concurrently_connected_buttons,
                    current_pending_connections,
                    currently_no_space_for_new_connection,
                    verified_buttons,
                })
            }
            10 => Event::NoSpaceForNewConnection {
                max_concurrently_connected_buttons: r.read_u8()?,
            },
            11 => Event::GotSpaceForNewConnection {
                max_concurrently_connected_buttons: r.read_u8()?,
            },
            12 => Event::BluetoothControllerStateChange {
                state: r.read_enum()?,
            },
            13 => Event::PingResponse {
                ping_id: r.read_u32()?,
            },
            14 => {
                let bd_addr = r.read_bdaddr()?;
                let info = parse_button_info(&mut r)?;
                Event::GetButtonInfoResponse { bd_addr, info }
            }
            15 => Event::ScanWizardFoundPrivateButton {
                scan_wizard_id: r.read_u32()?,
            },
            16 => Event::ScanWizardFoundPublicButton {
                scan_wizard_id: r.read_u32()?,
                bd_addr: r.read_bdaddr()?,
                name: r.read_string()?,
            },
            17 => Event::ScanWizardButtonConnected {
                scan_wizard_id: r.read_u32()?,
            },
            18 => Event::ScanWizardCompleted {
                scan_wizard_id: r.read_u32()?,
                result: r.read_enum()?,
            },
            19 => Event::ButtonDeleted {
                bd_addr: r.read_bdaddr()?,
                deleted_by_this_client: r.read_bool()?,
            },
            other => {
                return Err(FlicError::MalformedPayload(format!(
                    "unknown event opcode {}",
                    other
                )))
            }
        };

        Ok(event)
    }
}

fn parse_button_event(r: &mut crate::proto::payload::PayloadReader<'_>) -> Result<ButtonEvent> {
    Ok(ButtonEvent {
        conn_id: r.read_u32()?,
        click_type: r.read_enum()?,
        was_queued: r.read_bool()?,
        time_diff: r.read_u32()?,
    })
}

/// The UUID block is mandatory; everything after it only exists in the
/// newer protocol revision, so an exhausted payload means "absent".
fn parse_button_info(r: &mut crate::proto::payload::PayloadReader<'_>) -> Result<ButtonInfo> {
    let uuid_bytes: [u8; 16] = r
        .read_bytes(16)?
        .try_into()
        .map_err(|_| FlicError::UnexpectedEndOfPayload)?;

    let uuid = if uuid_bytes == [0; 16] {
        None
    } else {
        Some(Uuid::from_bytes(uuid_bytes))
    };

    if r.remaining() == 0 {
        return Ok(ButtonInfo { uuid, ..Default::default() });
    }

    let color = r.read_string()?;
    let serial_number = r.read_string()?;
    let flic_version = r.read_u8()?;
    let firmware_version = r.read_u32()?;

    Ok(ButtonInfo {
        uuid,
        color: (!color.is_empty()).then_some(color),
        serial_number: (!serial_number.is_empty()).then_some(serial_number),
        flic_version,
        firmware_version,
    })
}

impl Event {
    /// Variant name for log lines, cheaper than a full `Debug` render.
    pub(crate) fn opcode_name(&self) -> &'static str {
        match self {
            Event::AdvertisementPacket { .. } => "AdvertisementPacket",
            Event::CreateConnectionChannelResponse { .. } => "CreateConnectionChannelResponse",
            Event::ConnectionStatusChanged { .. } => "ConnectionStatusChanged",
            Event::ConnectionChannelRemoved { .. } => "ConnectionChannelRemoved",
            Event::ButtonUpOrDown(_) => "ButtonUpOrDown",
            Event::ButtonClickOrHold(_) => "ButtonClickOrHold",
            Event::ButtonSingleOrDoubleClick(_) => "ButtonSingleOrDoubleClick",
            Event::ButtonSingleOrDoubleClickOrHold(_) => "ButtonSingleOrDoubleClickOrHold",
            Event::NewVerifiedButton { .. } => "NewVerifiedButton",
            Event::GetInfoResponse(_) => "GetInfoResponse",
            Event::NoSpaceForNewConnection { .. } => "NoSpaceForNewConnection",
            Event::GotSpaceForNewConnection { .. } => "GotSpaceForNewConnection",
            Event::BluetoothControllerStateChange { .. } => "BluetoothControllerStateChange",
            Event::PingResponse { .. } => "PingResponse",
            Event::GetButtonInfoResponse { .. } => "GetButtonInfoResponse",
            Event::ScanWizardFoundPrivateButton { .. } => "ScanWizardFoundPrivateButton",
            Event::ScanWizardFoundPublicButton { .. } => "ScanWizardFoundPublicButton",
            Event::ScanWizardButtonConnected { .. } => "ScanWizardButtonConnected",
            Event::ScanWizardCompleted { .. } => "ScanWizardCompleted",
            Event::ButtonDeleted { .. } => "ButtonDeleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::payload::PayloadWriter;

    fn string_slot(s: &str) -> Vec<u8> {
        let mut buf = vec![s.len() as u8];
        buf.extend_from_slice(s.as_bytes());
        buf.resize(1 + 16, 0);
        buf
    }

    #[test]
    fn test_advertisement_packet() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&42u32.to_le_bytes());
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        payload.extend_from_slice(&string_slot("kitchen"));
        payload.push((-60i8) as u8);
        payload.extend_from_slice(&[0, 1, 0, 1]);

        let event = Event::parse(&Packet::new(0, payload)).unwrap();
        match event {
            Event::AdvertisementPacket { scan_id, packet } => {
                assert_eq!(scan_id, 42);
                assert_eq!(packet.bd_addr, Bdaddr::new([1, 2, 3, 4, 5, 6]));
                assert_eq!(packet.name, "kitchen");
                assert_eq!(packet.rssi, -60);
                assert!(!packet.is_private);
                assert!(packet.already_verified);
                assert!(!packet.already_connected_to_this_device);
                assert!(packet.already_connected_to_other_device);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_create_connection_channel_response() {
        let mut w = PayloadWriter::new();
        w.write_u32(9);
        w.write_u8(1); // MaxPendingConnectionsReached
        w.write_u8(0); // Disconnected

        let event = Event::parse(&Packet::new(1, w.into_bytes())).unwrap();
        assert_eq!(
            event,
            Event::CreateConnectionChannelResponse {
                conn_id: 9,
                error: CreateConnectionChannelError::MaxPendingConnectionsReached,
                connection_status: ConnectionStatus::Disconnected,
            }
        );
    }

    #[test]
    fn test_button_event_opcodes_share_layout() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&3u32.to_le_bytes());
        payload.push(5); // ButtonHold
        payload.push(1);
        payload.extend_from_slice(&120u32.to_le_bytes());

        let expected = ButtonEvent {
            conn_id: 3,
            click_type: ClickType::ButtonHold,
            was_queued: true,
            time_diff: 120,
        };

        for opcode in 4..=7 {
            let event = Event::parse(&Packet::new(opcode, payload.clone())).unwrap();
            let inner = match event {
                Event::ButtonUpOrDown(e)
                | Event::ButtonClickOrHold(e)
                | Event::ButtonSingleOrDoubleClick(e)
                | Event::ButtonSingleOrDoubleClickOrHold(e) => e,
                other => panic!("unexpected event {:?}", other),
            };
            assert_eq!(inner, expected);
        }
    }

    #[test]
    fn test_get_info_response_with_verified_buttons() {
        let mut payload = Vec::new();
        payload.push(2); // Attached
        payload.extend_from_slice(&[9, 8, 7, 6, 5, 4]);
        payload.push(0); // Public
        payload.push(4);
        payload.extend_from_slice(&10i16.to_le_bytes());
        payload.push(1);
        payload.push(0);
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&[1, 1, 1, 1, 1, 1]);
        payload.extend_from_slice(&[2, 2, 2, 2, 2, 2]);

        let event = Event::parse(&Packet::new(9, payload)).unwrap();
        match event {
            Event::GetInfoResponse(info) => {
                assert_eq!(
                    info.bluetooth_controller_state,
                    BluetoothControllerState::Attached
                );
                assert_eq!(info.my_bd_addr, Bdaddr::new([9, 8, 7, 6, 5, 4]));
                assert_eq!(info.max_concurrently_connected_buttons, 10);
                assert_eq!(
                    info.verified_buttons,
                    vec![Bdaddr::new([1; 6]), Bdaddr::new([2; 6])]
                );
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_button_info_new_revision() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        payload.extend_from_slice(&[0xAB; 16]);
        payload.extend_from_slice(&string_slot("black"));
        payload.extend_from_slice(&string_slot("BF12-003"));
        payload.push(2);
        payload.extend_from_slice(&0x0102u32.to_le_bytes());

        let event = Event::parse(&Packet::new(14, payload)).unwrap();
        match event {
            Event::GetButtonInfoResponse { bd_addr, info } => {
                assert_eq!(bd_addr, Bdaddr::new([1, 2, 3, 4, 5, 6]));
                assert_eq!(info.uuid, Some(Uuid::from_bytes([0xAB; 16])));
                assert_eq!(info.color.as_deref(), Some("black"));
                assert_eq!(info.serial_number.as_deref(), Some("BF12-003"));
                assert_eq!(info.flic_version, 2);
                assert_eq!(info.firmware_version, 0x0102);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_button_info_old_revision_stops_after_uuid() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        payload.extend_from_slice(&[0xAB; 16]);

        let event = Event::parse(&Packet::new(14, payload)).unwrap();
        match event {
            Event::GetButtonInfoResponse { info, .. } => {
                assert_eq!(info.uuid, Some(Uuid::from_bytes([0xAB; 16])));
                assert_eq!(info.color, None);
                assert_eq!(info.serial_number, None);
                assert_eq!(info.flic_version, 0);
                assert_eq!(info.firmware_version, 0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_button_info_all_zero_uuid_is_unknown() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        payload.extend_from_slice(&[0; 16]);

        let event = Event::parse(&Packet::new(14, payload)).unwrap();
        match event {
            Event::GetButtonInfoResponse { info, .. } => assert_eq!(info.uuid, None),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_button_info_empty_strings_are_absent() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        payload.extend_from_slice(&[0xAB; 16]);
        payload.extend_from_slice(&string_slot(""));
        payload.extend_from_slice(&string_slot(""));
        payload.push(1);
        payload.extend_from_slice(&7u32.to_le_bytes());

        let event = Event::parse(&Packet::new(14, payload)).unwrap();
        match event {
            Event::GetButtonInfoResponse { info, .. } => {
                assert_eq!(info.color, None);
                assert_eq!(info.serial_number, None);
                assert_eq!(info.flic_version, 1);
                assert_eq!(info.firmware_version, 7);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_truncated_uuid_fails() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        payload.extend_from_slice(&[0xAB; 10]);

        assert!(matches!(
            Event::parse(&Packet::new(14, payload)),
            Err(FlicError::UnexpectedEndOfPayload)
        ));
    }

    #[test]
    fn test_scan_wizard_completed() {
        let mut w = PayloadWriter::new();
        w.write_u32(5);
        w.write_u8(1); // CancelledByUser

        let event = Event::parse(&Packet::new(18, w.into_bytes())).unwrap();
        assert_eq!(
            event,
            Event::ScanWizardCompleted {
                scan_wizard_id: 5,
                result: ScanWizardResult::CancelledByUser,
            }
        );
    }

    #[test]
    fn test_unknown_opcode_fails() {
        assert!(matches!(
            Event::parse(&Packet::new(20, vec![])),
            Err(FlicError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_short_payload_fails() {
        assert!(matches!(
            Event::parse(&Packet::new(13, vec![1, 2])),
            Err(FlicError::UnexpectedEndOfPayload)
        ));
    }
}
