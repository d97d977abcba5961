//! Wire-level enums, one byte each on the wire.
//!
//! Values and names follow the flicd protocol documentation. Decoding an
//! unknown discriminant is a malformed payload, never a silent fallback.

use crate::error::FlicError;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident = $value:expr),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value),+
        }

        impl TryFrom<u8> for $name {
            type Error = FlicError;

            fn try_from(value: u8) -> Result<Self, FlicError> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(FlicError::MalformedPayload(format!(
                        "invalid {} value {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

wire_enum! {
    /// Whether a connection channel request was accepted by the server.
    CreateConnectionChannelError {
        NoError = 0,
        MaxPendingConnectionsReached = 1,
    }
}

wire_enum! {
    /// Connection state of a button, as seen through a connection channel.
    ConnectionStatus {
        Disconnected = 0,
        Connected = 1,
        Ready = 2,
    }
}

wire_enum! {
    /// Why a button disconnected. Only meaningful together with
    /// [`ConnectionStatus::Disconnected`].
    DisconnectReason {
        Unspecified = 0,
        ConnectionEstablishmentFailed = 1,
        TimedOut = 2,
        BondingKeysMismatch = 3,
    }
}

wire_enum! {
    /// Why a connection channel was removed at the server.
    RemovedReason {
        RemovedByThisClient = 0,
        ForceDisconnectedByThisClient = 1,
        ForceDisconnectedByOtherClient = 2,
        ButtonIsPrivate = 3,
        VerifyTimeout = 4,
        InternetBackendError = 5,
        InvalidData = 6,
        CouldntLoadDevice = 7,
        DeletedByThisClient = 8,
        DeletedByOtherClient = 9,
        ButtonBelongsToOtherPartner = 10,
        DeletedFromButton = 11,
    }
}

wire_enum! {
    /// Press classification carried by button events. Which values can
    /// appear depends on the event opcode the server chose.
    ClickType {
        ButtonDown = 0,
        ButtonUp = 1,
        ButtonClick = 2,
        ButtonSingleClick = 3,
        ButtonDoubleClick = 4,
        ButtonHold = 5,
    }
}

wire_enum! {
    BdAddrType {
        Public = 0,
        Random = 1,
    }
}

wire_enum! {
    /// Scanning/connection latency trade-off for a connection channel.
    LatencyMode {
        Normal = 0,
        Low = 1,
        High = 2,
    }
}

wire_enum! {
    /// Terminal outcome of a scan wizard run.
    ScanWizardResult {
        Success = 0,
        CancelledByUser = 1,
        FailedTimeout = 2,
        ButtonIsPrivate = 3,
        BluetoothUnavailable = 4,
        InternetBackendError = 5,
        InvalidData = 6,
        ButtonBelongsToOtherPartner = 7,
        ButtonAlreadyConnectedToOtherDevice = 8,
    }
}

wire_enum! {
    /// State of the Bluetooth controller the server drives.
    BluetoothControllerState {
        Detached = 0,
        Resetting = 1,
        Attached = 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_discriminants() {
        assert_eq!(ConnectionStatus::try_from(2).unwrap(), ConnectionStatus::Ready);
        assert_eq!(LatencyMode::Low as u8, 1);
        assert_eq!(
            RemovedReason::try_from(11).unwrap(),
            RemovedReason::DeletedFromButton
        );
        assert_eq!(
            ScanWizardResult::try_from(8).unwrap(),
            ScanWizardResult::ButtonAlreadyConnectedToOtherDevice
        );
    }

    #[test]
    fn test_unknown_discriminant_is_malformed() {
        assert!(matches!(
            ConnectionStatus::try_from(3),
            Err(FlicError::MalformedPayload(_))
        ));
        assert!(matches!(
            ClickType::try_from(200),
            Err(FlicError::MalformedPayload(_))
        ));
    }
}
