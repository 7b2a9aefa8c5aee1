use super::error::{GtpError, Result};
use super::header::Header;
use super::ie::Ie;
use super::messages::*;
use super::pool::Recycler;
use super::types::MessageType;
use bytes::{Buf, Bytes, BytesMut};

macro_rules! message_bodies {
    ($($variant:ident),* $(,)?) => {
        /// Decoded body of a message. Types without a typed structure keep
        /// their IEs in wire order.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum Body {
            $( $variant($variant), )*
            Generic(Vec<Ie>),
        }

        impl Body {
            fn for_type(message_type: MessageType, recycler: &Recycler) -> Self {
                match message_type {
                    $( MessageType::$variant => Body::$variant(recycler.get()), )*
                    _ => Body::Generic(recycler.get_ie_slice()),
                }
            }

            fn accept(&mut self, ie: Ie) {
                match self {
                    $( Body::$variant(m) => m.accept(ie), )*
                    Body::Generic(ies) => ies.push(ie),
                }
            }

            pub fn ies(&self) -> Vec<&Ie> {
                match self {
                    $( Body::$variant(m) => m.ies(), )*
                    Body::Generic(ies) => ies.iter().collect(),
                }
            }

            fn release(self, recycler: &Recycler) {
                match self {
                    $( Body::$variant(m) => recycler.release(m), )*
                    Body::Generic(ies) => recycler.release_ie_slice(ies),
                }
            }
        }

        $(
            impl From<$variant> for Body {
                fn from(m: $variant) -> Self {
                    Body::$variant(m)
                }
            }
        )*
    };
}

message_bodies!(
    EchoRequest,
    EchoResponse,
    CreateSessionRequest,
    CreateSessionResponse,
    ModifyBearerRequest,
    ModifyBearerResponse,
    DeleteSessionRequest,
    DeleteSessionResponse,
    CreateBearerRequest,
    CreateBearerResponse,
    ReleaseAccessBearersRequest,
    ReleaseAccessBearersResponse,
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub body: Body,
}

impl Message {
    pub fn new<B>(recycler: &Recycler, body: B, teid: Option<u32>, sequence_number: u32) -> Self
    where
        B: MessageBody + Into<Body>,
    {
        Self::with_header(recycler, B::MESSAGE_TYPE, body.into(), teid, sequence_number)
    }

    pub fn generic(
        recycler: &Recycler,
        message_type: MessageType,
        ies: Vec<Ie>,
        teid: Option<u32>,
        sequence_number: u32,
    ) -> Self {
        Self::with_header(recycler, message_type, Body::Generic(ies), teid, sequence_number)
    }

    fn with_header(
        recycler: &Recycler,
        message_type: MessageType,
        body: Body,
        teid: Option<u32>,
        sequence_number: u32,
    ) -> Self {
        let mut header = recycler.get_header();
        header.version = super::types::GTPV2_VERSION;
        header.message_type = message_type;
        header.teid = teid;
        header.sequence_number = sequence_number & 0x00ff_ffff;
        Self { header, body }
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    pub fn sequence_number(&self) -> u32 {
        self.header.sequence_number
    }

    pub fn teid(&self) -> u32 {
        self.header.teid_or_zero()
    }

    pub fn encode(&self) -> Result<BytesMut> {
        encode_message(self)
    }

    pub fn release(self, recycler: &Recycler) {
        release_message(self, recycler)
    }
}

/// Decodes one message. On failure everything decoded so far has already
/// been returned to the pool.
pub fn decode_message(data: Bytes, recycler: &Recycler) -> Result<Message> {
    let mut buf = data;
    let header = Header::parse(&mut buf)?;

    let payload_len = match header.payload_len() {
        Ok(len) if len <= buf.remaining() => len,
        Ok(len) => {
            recycler.release_header(header);
            return Err(GtpError::malformed(format!(
                "message declares {} body octets, have {}",
                len,
                buf.remaining()
            )));
        }
        Err(e) => {
            recycler.release_header(header);
            return Err(e);
        }
    };
    let mut payload = buf.split_to(payload_len);

    let mut body = Body::for_type(header.message_type, recycler);
    while payload.has_remaining() {
        match Ie::decode(&mut payload, recycler) {
            Ok(ie) => body.accept(ie),
            Err(e) => {
                body.release(recycler);
                recycler.release_header(header);
                return Err(e);
            }
        }
    }

    Ok(Message { header, body })
}

/// Encodes the header, with its length recomputed, followed by every
/// populated IE in emission order. Fails when the body or any IE does not
/// fit its 16-bit length field.
pub fn encode_message(msg: &Message) -> Result<BytesMut> {
    let ies = msg.body.ies();
    let payload_len: usize = ies.iter().map(|ie| ie.encoded_len()).sum();

    let mut header = msg.header.clone();
    header.set_payload_len(payload_len)?;

    let mut buf = BytesMut::with_capacity(header.header_len() + payload_len);
    header.encode(&mut buf);
    for ie in ies {
        ie.encode(&mut buf)?;
    }
    Ok(buf)
}

pub fn release_message(msg: Message, recycler: &Recycler) {
    recycler.release_header(msg.header);
    msg.body.release(recycler);
}
