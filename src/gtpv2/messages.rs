use super::ie::Ie;
use super::pool::{Pool, Recyclable, Recycler};
use super::types::{IeType, MessageType};

pub trait IeSlot: Default {
    fn claim(&mut self, ie: Ie) -> Option<Ie>;

    fn collect<'a>(&'a self, out: &mut Vec<&'a Ie>);

    fn release_into(&mut self, recycler: &Recycler);
}

impl IeSlot for Option<Ie> {
    fn claim(&mut self, ie: Ie) -> Option<Ie> {
        if self.is_some() {
            return Some(ie);
        }
        *self = Some(ie);
        None
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Ie>) {
        if let Some(ie) = self {
            out.push(ie);
        }
    }

    fn release_into(&mut self, recycler: &Recycler) {
        recycler.release_opt(self.take());
    }
}

impl IeSlot for Vec<Ie> {
    fn claim(&mut self, ie: Ie) -> Option<Ie> {
        self.push(ie);
        None
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Ie>) {
        out.extend(self.iter());
    }

    fn release_into(&mut self, recycler: &Recycler) {
        for ie in self.drain(..) {
            recycler.release(ie);
        }
    }
}

pub trait MessageBody: Recyclable {
    const MESSAGE_TYPE: MessageType;

    fn accept(&mut self, ie: Ie);

    /// Populated IEs in emission order: arrival order for a decoded body,
    /// field order with `additional_ies` last for one built locally.
    fn ies(&self) -> Vec<&Ie>;
}

/// Replays `order`, a list of field indexes recorded as IEs arrived, over
/// the per-field IE lists. IEs that are not covered by `order` (added after
/// decoding) follow in field order.
fn arrival_order<'a>(fields: Vec<Vec<&'a Ie>>, order: &[u8]) -> Vec<&'a Ie> {
    let mut cursors = vec![0usize; fields.len()];
    let mut out = Vec::with_capacity(fields.iter().map(Vec::len).sum());
    for &slot in order {
        let slot = usize::from(slot);
        if let Some(ie) = fields.get(slot).and_then(|f| f.get(cursors[slot])) {
            out.push(*ie);
            cursors[slot] += 1;
        }
    }
    for (field, cursor) in fields.iter().zip(cursors) {
        out.extend(field.iter().skip(cursor).copied());
    }
    out
}

macro_rules! gtp_message {
    (
        $(#[$meta:meta])*
        $name:ident => $msg_type:ident, $pool:ident {
            $( $field:ident : $slot:ty = ($ie_type:ident, $instance:expr) ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name {
            $( pub $field: $slot, )*
            pub additional_ies: Vec<Ie>,
            wire_order: Vec<u8>,
        }

        impl MessageBody for $name {
            const MESSAGE_TYPE: MessageType = MessageType::$msg_type;

            fn accept(&mut self, ie: Ie) {
                let key = (ie.ie_type, ie.instance());
                let mut slot = 0u8;
                $(
                    if key == (IeType::$ie_type, $instance) {
                        match self.$field.claim(ie) {
                            None => self.wire_order.push(slot),
                            Some(extra) => self.keep_additional(extra),
                        }
                        return;
                    }
                    slot += 1;
                )*
                debug_assert_eq!(slot, Self::ADDITIONAL_SLOT);
                self.keep_additional(ie);
            }

            fn ies(&self) -> Vec<&Ie> {
                let mut fields: Vec<Vec<&Ie>> = Vec::new();
                $(
                    let mut field = Vec::new();
                    self.$field.collect(&mut field);
                    fields.push(field);
                )*
                fields.push(self.additional_ies.iter().collect());
                arrival_order(fields, &self.wire_order)
            }
        }

        impl $name {
            const ADDITIONAL_SLOT: u8 = [$( stringify!($field) ),*].len() as u8;

            fn keep_additional(&mut self, ie: Ie) {
                self.additional_ies.push(ie);
                self.wire_order.push(Self::ADDITIONAL_SLOT);
            }
        }

        impl Recyclable for $name {
            fn pool(recycler: &Recycler) -> &Pool<Self> {
                &recycler.messages.$pool
            }

            fn reset(&mut self, recycler: &Recycler) {
                $( self.$field.release_into(recycler); )*
                for ie in self.additional_ies.drain(..) {
                    recycler.release(ie);
                }
                self.wire_order.clear();
            }
        }
    };
}

gtp_message! {
    EchoRequest => EchoRequest, echo_requests {
        recovery: Option<Ie> = (Recovery, 0),
        sending_node_features: Option<Ie> = (NodeFeatures, 0),
    }
}

gtp_message! {
    EchoResponse => EchoResponse, echo_responses {
        recovery: Option<Ie> = (Recovery, 0),
        sending_node_features: Option<Ie> = (NodeFeatures, 0),
    }
}

gtp_message! {
    CreateSessionRequest => CreateSessionRequest, create_session_requests {
        imsi: Option<Ie> = (Imsi, 0),
        msisdn: Option<Ie> = (Msisdn, 0),
        mei: Option<Ie> = (Mei, 0),
        uli: Option<Ie> = (Uli, 0),
        serving_network: Option<Ie> = (ServingNetwork, 0),
        rat_type: Option<Ie> = (RatType, 0),
        indication: Option<Ie> = (Indication, 0),
        sender_fteid_c: Option<Ie> = (FullyQualifiedTeid, 0),
        pgw_s5s8_fteid_c: Option<Ie> = (FullyQualifiedTeid, 1),
        apn: Option<Ie> = (Apn, 0),
        selection_mode: Option<Ie> = (SelectionMode, 0),
        pdn_type: Option<Ie> = (PdnType, 0),
        paa: Option<Ie> = (Paa, 0),
        apn_restriction: Option<Ie> = (ApnRestriction, 0),
        ambr: Option<Ie> = (Ambr, 0),
        bearer_contexts_to_be_created: Vec<Ie> = (BearerContext, 0),
        bearer_contexts_to_be_removed: Vec<Ie> = (BearerContext, 1),
        recovery: Option<Ie> = (Recovery, 0),
        ue_time_zone: Option<Ie> = (UeTimeZone, 0),
        charging_characteristics: Option<Ie> = (ChargingCharacteristics, 0),
        pco: Option<Ie> = (Pco, 0),
    }
}

gtp_message! {
    CreateSessionResponse => CreateSessionResponse, create_session_responses {
        cause: Option<Ie> = (Cause, 0),
        change_reporting_action: Option<Ie> = (ChangeReportingAction, 0),
        sender_fteid_c: Option<Ie> = (FullyQualifiedTeid, 0),
        pgw_s5s8_fteid_c: Option<Ie> = (FullyQualifiedTeid, 1),
        paa: Option<Ie> = (Paa, 0),
        apn_restriction: Option<Ie> = (ApnRestriction, 0),
        ambr: Option<Ie> = (Ambr, 0),
        linked_ebi: Option<Ie> = (EpsBearerId, 0),
        pco: Option<Ie> = (Pco, 0),
        bearer_contexts_created: Vec<Ie> = (BearerContext, 0),
        bearer_contexts_marked_for_removal: Vec<Ie> = (BearerContext, 1),
        recovery: Option<Ie> = (Recovery, 0),
        pgw_fqcsid: Option<Ie> = (FqCsid, 0),
        sgw_fqcsid: Option<Ie> = (FqCsid, 1),
    }
}

gtp_message! {
    ModifyBearerRequest => ModifyBearerRequest, modify_bearer_requests {
        mei: Option<Ie> = (Mei, 0),
        uli: Option<Ie> = (Uli, 0),
        serving_network: Option<Ie> = (ServingNetwork, 0),
        rat_type: Option<Ie> = (RatType, 0),
        indication: Option<Ie> = (Indication, 0),
        sender_fteid_c: Option<Ie> = (FullyQualifiedTeid, 0),
        ambr: Option<Ie> = (Ambr, 0),
        delay_value: Option<Ie> = (DelayValue, 0),
        bearer_contexts_to_be_modified: Vec<Ie> = (BearerContext, 0),
        bearer_contexts_to_be_removed: Vec<Ie> = (BearerContext, 1),
        recovery: Option<Ie> = (Recovery, 0),
        ue_time_zone: Option<Ie> = (UeTimeZone, 0),
    }
}

gtp_message! {
    ModifyBearerResponse => ModifyBearerResponse, modify_bearer_responses {
        cause: Option<Ie> = (Cause, 0),
        msisdn: Option<Ie> = (Msisdn, 0),
        linked_ebi: Option<Ie> = (EpsBearerId, 0),
        apn_restriction: Option<Ie> = (ApnRestriction, 0),
        pco: Option<Ie> = (Pco, 0),
        bearer_contexts_modified: Vec<Ie> = (BearerContext, 0),
        bearer_contexts_marked_for_removal: Vec<Ie> = (BearerContext, 1),
        change_reporting_action: Option<Ie> = (ChangeReportingAction, 0),
        recovery: Option<Ie> = (Recovery, 0),
        indication: Option<Ie> = (Indication, 0),
    }
}

gtp_message! {
    DeleteSessionRequest => DeleteSessionRequest, delete_session_requests {
        cause: Option<Ie> = (Cause, 0),
        linked_ebi: Option<Ie> = (EpsBearerId, 0),
        uli: Option<Ie> = (Uli, 0),
        indication: Option<Ie> = (Indication, 0),
        pco: Option<Ie> = (Pco, 0),
        originating_node: Option<Ie> = (NodeType, 0),
        sender_fteid_c: Option<Ie> = (FullyQualifiedTeid, 0),
        ue_time_zone: Option<Ie> = (UeTimeZone, 0),
    }
}

gtp_message! {
    DeleteSessionResponse => DeleteSessionResponse, delete_session_responses {
        cause: Option<Ie> = (Cause, 0),
        recovery: Option<Ie> = (Recovery, 0),
        pco: Option<Ie> = (Pco, 0),
        indication: Option<Ie> = (Indication, 0),
    }
}

gtp_message! {
    CreateBearerRequest => CreateBearerRequest, create_bearer_requests {
        pti: Option<Ie> = (Pti, 0),
        linked_ebi: Option<Ie> = (EpsBearerId, 0),
        pco: Option<Ie> = (Pco, 0),
        bearer_contexts: Vec<Ie> = (BearerContext, 0),
    }
}

gtp_message! {
    CreateBearerResponse => CreateBearerResponse, create_bearer_responses {
        cause: Option<Ie> = (Cause, 0),
        bearer_contexts: Vec<Ie> = (BearerContext, 0),
        recovery: Option<Ie> = (Recovery, 0),
        pco: Option<Ie> = (Pco, 0),
    }
}

gtp_message! {
    ReleaseAccessBearersRequest => ReleaseAccessBearersRequest, release_access_bearers_requests {
        list_of_rabs: Vec<Ie> = (EpsBearerId, 0),
        originating_node: Option<Ie> = (NodeType, 0),
        indication: Option<Ie> = (Indication, 0),
    }
}

gtp_message! {
    ReleaseAccessBearersResponse => ReleaseAccessBearersResponse, release_access_bearers_responses {
        cause: Option<Ie> = (Cause, 0),
        recovery: Option<Ie> = (Recovery, 0),
        indication: Option<Ie> = (Indication, 0),
    }
}
