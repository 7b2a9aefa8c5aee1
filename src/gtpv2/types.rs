use serde::{Deserialize, Serialize};

pub const GTPV2_VERSION: u8 = 2;
pub const GTPC_PORT: u16 = 2123;
pub const GTPU_PORT: u16 = 2152;

/// Declares a wire code enum with an `Unknown` arm and both `u8` conversions.
macro_rules! wire_codes {
    (
        $(#[$meta:meta])*
        $name:ident { $( $variant:ident = $code:literal ),* $(,)? }
    ) => {
        $(#[$meta])*
        pub enum $name {
            $( $variant, )*
            Unknown(u8),
        }

        impl From<u8> for $name {
            fn from(value: u8) -> Self {
                match value {
                    $( $code => $name::$variant, )*
                    v => $name::Unknown(v),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $code, )*
                    $name::Unknown(v) => v,
                }
            }
        }
    };
}

wire_codes! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    MessageType {
        EchoRequest = 1,
        EchoResponse = 2,
        VersionNotSupportedIndication = 3,
        CreateSessionRequest = 32,
        CreateSessionResponse = 33,
        ModifyBearerRequest = 34,
        ModifyBearerResponse = 35,
        DeleteSessionRequest = 36,
        DeleteSessionResponse = 37,
        CreateBearerRequest = 95,
        CreateBearerResponse = 96,
        UpdateBearerRequest = 97,
        UpdateBearerResponse = 98,
        DeleteBearerRequest = 99,
        DeleteBearerResponse = 100,
        ReleaseAccessBearersRequest = 170,
        ReleaseAccessBearersResponse = 171,
        DownlinkDataNotification = 176,
        DownlinkDataNotificationAcknowledge = 177,
    }
}

impl MessageType {
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            MessageType::EchoResponse
                | MessageType::CreateSessionResponse
                | MessageType::ModifyBearerResponse
                | MessageType::DeleteSessionResponse
                | MessageType::CreateBearerResponse
                | MessageType::UpdateBearerResponse
                | MessageType::DeleteBearerResponse
                | MessageType::ReleaseAccessBearersResponse
                | MessageType::DownlinkDataNotificationAcknowledge
        )
    }

    pub fn response_type(&self) -> Option<MessageType> {
        match self {
            MessageType::EchoRequest
            | MessageType::CreateSessionRequest
            | MessageType::ModifyBearerRequest
            | MessageType::DeleteSessionRequest
            | MessageType::CreateBearerRequest
            | MessageType::UpdateBearerRequest
            | MessageType::DeleteBearerRequest
            | MessageType::ReleaseAccessBearersRequest
            | MessageType::DownlinkDataNotification => {
                Some(MessageType::from(u8::from(*self) + 1))
            }
            _ => None,
        }
    }
}

wire_codes! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    IeType {
        Imsi = 1,
        Cause = 2,
        Recovery = 3,
        Apn = 71,
        Ambr = 72,
        EpsBearerId = 73,
        IpAddress = 74,
        Mei = 75,
        Msisdn = 76,
        Indication = 77,
        Pco = 78,
        Paa = 79,
        BearerQos = 80,
        RatType = 82,
        ServingNetwork = 83,
        BearerTft = 84,
        Uli = 86,
        FullyQualifiedTeid = 87,
        DelayValue = 92,
        BearerContext = 93,
        ChargingId = 94,
        ChargingCharacteristics = 95,
        PdnType = 99,
        Pti = 100,
        PdnConnection = 109,
        UeTimeZone = 114,
        ApnRestriction = 127,
        SelectionMode = 128,
        ChangeReportingAction = 131,
        FqCsid = 132,
        NodeType = 135,
        Fqdn = 136,
        NodeFeatures = 152,
        OverloadControlInformation = 180,
        LoadControlInformation = 181,
        RemoteUeContext = 191,
        ScefPdnConnection = 195,
        PrivateExtension = 255,
    }
}

impl Default for IeType {
    fn default() -> Self {
        IeType::Unknown(0)
    }
}

impl IeType {
    pub fn is_grouped(&self) -> bool {
        matches!(
            self,
            IeType::BearerContext
                | IeType::PdnConnection
                | IeType::OverloadControlInformation
                | IeType::LoadControlInformation
                | IeType::RemoteUeContext
                | IeType::ScefPdnConnection
        )
    }
}

wire_codes! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    Cause {
        LocalDetach = 2,
        CompleteDetach = 3,
        RatChangedFrom3gppToNon3gpp = 4,
        IsrDeactivation = 5,
        PdnReconnectionToThisApnDisallowed = 7,
        RequestAccepted = 16,
        RequestAcceptedPartially = 17,
        NewPdnTypeDueToNetworkPreference = 18,
        NewPdnTypeDueToSingleAddressBearerOnly = 19,
        ContextNotFound = 64,
        InvalidMessageFormat = 65,
        VersionNotSupportedByNextPeer = 66,
        InvalidLength = 67,
        ServiceNotSupported = 68,
        MandatoryIeIncorrect = 69,
        MandatoryIeMissing = 70,
        SystemFailure = 72,
        NoResourcesAvailable = 73,
        MissingOrUnknownApn = 78,
        PreferredPdnTypeNotSupported = 83,
        AllDynamicAddressesAreOccupied = 84,
        UserAuthenticationFailed = 92,
        UeNotResponding = 87,
        RequestRejected = 94,
        RemotePeerNotResponding = 100,
        ConditionalIeMissing = 103,
    }
}

wire_codes! {
    /// F-TEID interface type: the role a TEID plays on a given reference point.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    InterfaceType {
        S1uEnodebGtpu = 0,
        S1uSgwGtpu = 1,
        S12RncGtpu = 2,
        S12SgwGtpu = 3,
        S5S8SgwGtpu = 4,
        S5S8PgwGtpu = 5,
        S5S8SgwGtpc = 6,
        S5S8PgwGtpc = 7,
        S11MmeGtpc = 10,
        S11S4SgwGtpc = 11,
        S10MmeGtpc = 12,
        S3MmeGtpc = 13,
        S3SgsnGtpc = 14,
        S4SgsnGtpu = 15,
        S4SgwGtpu = 16,
        S4SgsnGtpc = 17,
        S11MmeGtpu = 38,
        S11SgwGtpu = 39,
    }
}

pub const RAT_TYPE_EUTRAN: u8 = 6;

pub const PDN_TYPE_IPV4: u8 = 1;
pub const PDN_TYPE_IPV6: u8 = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_codes() {
        assert_eq!(MessageType::from(32), MessageType::CreateSessionRequest);
        assert_eq!(u8::from(MessageType::DeleteSessionResponse), 37);
        assert_eq!(MessageType::from(250), MessageType::Unknown(250));
        assert_eq!(u8::from(MessageType::Unknown(250)), 250);
    }

    #[test]
    fn test_response_pairing() {
        assert_eq!(
            MessageType::CreateSessionRequest.response_type(),
            Some(MessageType::CreateSessionResponse)
        );
        assert_eq!(
            MessageType::ReleaseAccessBearersRequest.response_type(),
            Some(MessageType::ReleaseAccessBearersResponse)
        );
        assert!(MessageType::ModifyBearerResponse.is_response());
        assert!(!MessageType::ModifyBearerRequest.is_response());
        assert_eq!(MessageType::EchoResponse.response_type(), None);
    }

    #[test]
    fn test_grouped_types() {
        assert!(IeType::BearerContext.is_grouped());
        assert!(IeType::from(109).is_grouped());
        assert!(!IeType::FullyQualifiedTeid.is_grouped());
        assert!(!IeType::Unknown(93 + 100).is_grouped());
    }

    #[test]
    fn test_cause_codes() {
        assert_eq!(Cause::from(16), Cause::RequestAccepted);
        assert_eq!(u8::from(Cause::ContextNotFound), 64);
        assert_eq!(u8::from(Cause::ServiceNotSupported), 68);
        assert_eq!(Cause::from(200), Cause::Unknown(200));
    }

    #[test]
    fn test_interface_type_codes() {
        assert_eq!(InterfaceType::from(10), InterfaceType::S11MmeGtpc);
        assert_eq!(u8::from(InterfaceType::S11S4SgwGtpc), 11);
        assert_eq!(InterfaceType::from(40), InterfaceType::Unknown(40));
    }
}
