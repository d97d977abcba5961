//! Outbound commands and their wire encoding.
//!
//! Each variant maps to one opcode and a fixed payload layout. Correlation
//! ids (connection, scan, scan wizard, ping) are allocated by the engine
//! before the command is built, so a command always carries its final id.

use crate::bdaddr::Bdaddr;
use crate::proto::enums::LatencyMode;
use crate::proto::packet::Packet;
use crate::proto::payload::PayloadWriter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetInfo,
    CreateScanner {
        scan_id: u32,
    },
    RemoveScanner {
        scan_id: u32,
    },
    CreateConnectionChannel {
        conn_id: u32,
        bd_addr: Bdaddr,
        latency_mode: LatencyMode,
        auto_disconnect_time: i16,
    },
    RemoveConnectionChannel {
        conn_id: u32,
    },
    ForceDisconnect {
        bd_addr: Bdaddr,
    },
    ChangeModeParameters {
        conn_id: u32,
        latency_mode: LatencyMode,
        auto_disconnect_time: i16,
    },
    Ping {
        ping_id: u32,
    },
    GetButtonInfo {
        bd_addr: Bdaddr,
    },
    CreateScanWizard {
        scan_wizard_id: u32,
    },
    CancelScanWizard {
        scan_wizard_id: u32,
    },
    DeleteButton {
        bd_addr: Bdaddr,
    },
}

impl Command {
    pub fn opcode(&self) -> u8 {
        match self {
            Command::GetInfo => 0,
            Command::CreateScanner { .. } => 1,
            Command::RemoveScanner { .. } => 2,
            Command::CreateConnectionChannel { .. } => 3,
            Command::RemoveConnectionChannel { .. } => 4,
            Command::ForceDisconnect { .. } => 5,
            Command::ChangeModeParameters { .. } => 6,
            Command::Ping { .. } => 7,
            Command::GetButtonInfo { .. } => 8,
            Command::CreateScanWizard { .. } => 9,
            Command::CancelScanWizard { .. } => 10,
            Command::DeleteButton { .. } => 11,
        }
    }

    pub fn to_packet(&self) -> Packet {
        let mut w = PayloadWriter::new();

        match *self {
            Command::GetInfo => {}
            Command::CreateScanner { scan_id } | Command::RemoveScanner { scan_id } => {
                w.write_u32(scan_id);
            }
            Command::CreateConnectionChannel {
                conn_id,
                bd_addr,
                latency_mode,
                auto_disconnect_time,
            } => {
                w.write_u32(conn_id);
                w.write_bdaddr(bd_addr);
                w.write_u8(latency_mode as u8);
                w.write_i16(auto_disconnect_time);
            }
            Command::RemoveConnectionChannel { conn_id } => {
                w.write_u32(conn_id);
            }
            Command::ForceDisconnect { bd_addr }
            | Command::GetButtonInfo { bd_addr }
            | Command::DeleteButton { bd_addr } => {
                w.write_bdaddr(bd_addr);
            }
            Command::ChangeModeParameters {
                conn_id,
                latency_mode,
                auto_disconnect_time,
            } => {
                w.write_u32(conn_id);
                w.write_u8(latency_mode as u8);
                w.write_i16(auto_disconnect_time);
            }
            Command::Ping { ping_id } => {
                w.write_u32(ping_id);
            }
            Command::CreateScanWizard { scan_wizard_id }
            | Command::CancelScanWizard { scan_wizard_id } => {
                w.write_u32(scan_wizard_id);
            }
        }

        Packet::new(self.opcode(), w.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcodes() {
        let addr = Bdaddr::BLANK;
        let cases: Vec<(Command, u8)> = vec![
            (Command::GetInfo, 0),
            (Command::CreateScanner { scan_id: 1 }, 1),
            (Command::RemoveScanner { scan_id: 1 }, 2),
            (
                Command::CreateConnectionChannel {
                    conn_id: 1,
                    bd_addr: addr,
                    latency_mode: LatencyMode::Normal,
                    auto_disconnect_time: 511,
                },
                3,
            ),
            (Command::RemoveConnectionChannel { conn_id: 1 }, 4),
            (Command::ForceDisconnect { bd_addr: addr }, 5),
            (
                Command::ChangeModeParameters {
                    conn_id: 1,
                    latency_mode: LatencyMode::Normal,
                    auto_disconnect_time: 511,
                },
                6,
            ),
            (Command::Ping { ping_id: 1 }, 7),
            (Command::GetButtonInfo { bd_addr: addr }, 8),
            (Command::CreateScanWizard { scan_wizard_id: 1 }, 9),
            (Command::CancelScanWizard { scan_wizard_id: 1 }, 10),
            (Command::DeleteButton { bd_addr: addr }, 11),
        ];

        for (command, opcode) in cases {
            assert_eq!(command.opcode(), opcode, "{:?}", command);
        }
    }

    #[test]
    fn test_get_info_has_empty_payload() {
        assert!(Command::GetInfo.to_packet().payload.is_empty());
    }

    #[test]
    fn test_create_connection_channel_layout() {
        let packet = Command::CreateConnectionChannel {
            conn_id: 0x01020304,
            bd_addr: Bdaddr::new([1, 2, 3, 4, 5, 6]),
            latency_mode: LatencyMode::High,
            auto_disconnect_time: 511,
        }
        .to_packet();

        assert_eq!(packet.opcode, 3);
        assert_eq!(
            packet.payload,
            vec![0x04, 0x03, 0x02, 0x01, 1, 2, 3, 4, 5, 6, 2, 0xFF, 0x01]
        );
    }

    #[test]
    fn test_change_mode_parameters_layout() {
        let packet = Command::ChangeModeParameters {
            conn_id: 7,
            latency_mode: LatencyMode::Low,
            auto_disconnect_time: -1,
        }
        .to_packet();

        assert_eq!(packet.opcode, 6);
        assert_eq!(packet.payload, vec![7, 0, 0, 0, 1, 0xFF, 0xFF]);
    }

    #[test]
    fn test_address_keyed_commands_layout() {
        let addr = Bdaddr::new([0x12, 0x34, 0x56, 0x78, 0x90, 0xAA]);
        let packet = Command::DeleteButton { bd_addr: addr }.to_packet();

        assert_eq!(packet.opcode, 11);
        assert_eq!(packet.payload, vec![0x12, 0x34, 0x56, 0x78, 0x90, 0xAA]);
    }

    #[test]
    fn test_ping_layout() {
        let packet = Command::Ping { ping_id: 0xDEADBEEF }.to_packet();
        assert_eq!(packet.opcode, 7);
        assert_eq!(packet.payload, vec![0xEF, 0xBE, 0xAD, 0xDE]);
    }
}
