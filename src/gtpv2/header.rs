use super::error::{GtpError, Result};
use super::types::{MessageType, GTPV2_VERSION};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Octets covered by the length field's exclusion: flags, type and length.
pub const HEADER_PREAMBLE_LEN: usize = 4;
pub const HEADER_LEN_WITH_TEID: usize = 12;
pub const HEADER_LEN_WITHOUT_TEID: usize = 8;

const FLAG_PIGGYBACK: u8 = 0x10;
const FLAG_TEID: u8 = 0x08;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub piggybacked: bool,
    pub message_type: MessageType,
    /// Octets following the first four, as carried on the wire.
    pub length: u16,
    pub teid: Option<u32>,
    pub sequence_number: u32,
    pub spare: u8,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            version: 0,
            piggybacked: false,
            message_type: MessageType::Unknown(0),
            length: 0,
            teid: None,
            sequence_number: 0,
            spare: 0,
        }
    }
}

impl Header {
    pub fn new(message_type: MessageType, teid: Option<u32>, sequence_number: u32) -> Self {
        Self {
            version: GTPV2_VERSION,
            piggybacked: false,
            message_type,
            length: 0,
            teid,
            sequence_number: sequence_number & 0x00ff_ffff,
            spare: 0,
        }
    }

    pub fn parse(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < HEADER_LEN_WITHOUT_TEID {
            return Err(GtpError::malformed(format!(
                "header needs {} octets, have {}",
                HEADER_LEN_WITHOUT_TEID,
                buf.remaining()
            )));
        }

        let flags = buf.get_u8();
        let version = (flags >> 5) & 0x07;
        if version != GTPV2_VERSION {
            return Err(GtpError::InvalidVersion(version));
        }
        let piggybacked = (flags & FLAG_PIGGYBACK) != 0;
        let teid_present = (flags & FLAG_TEID) != 0;

        let message_type = MessageType::from(buf.get_u8());
        let length = buf.get_u16();

        let teid = if teid_present {
            if buf.remaining() < 8 {
                return Err(GtpError::malformed(format!(
                    "header with TEID needs 8 more octets, have {}",
                    buf.remaining()
                )));
            }
            Some(buf.get_u32())
        } else {
            None
        };

        let sequence_number = buf.get_uint(3) as u32;
        let spare = buf.get_u8();

        Ok(Self {
            version,
            piggybacked,
            message_type,
            length,
            teid,
            sequence_number,
            spare,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let flags = (self.version << 5)
            | (if self.piggybacked { FLAG_PIGGYBACK } else { 0x00 })
            | (if self.teid.is_some() { FLAG_TEID } else { 0x00 });

        buf.put_u8(flags);
        buf.put_u8(self.message_type.into());
        buf.put_u16(self.length);

        if let Some(teid) = self.teid {
            buf.put_u32(teid);
        }

        buf.put_uint(u64::from(self.sequence_number & 0x00ff_ffff), 3);
        buf.put_u8(self.spare);
    }

    pub fn header_len(&self) -> usize {
        if self.teid.is_some() {
            HEADER_LEN_WITH_TEID
        } else {
            HEADER_LEN_WITHOUT_TEID
        }
    }

    pub fn set_payload_len(&mut self, payload_len: usize) -> Result<()> {
        let length = self.header_len() - HEADER_PREAMBLE_LEN + payload_len;
        self.length = u16::try_from(length).map_err(|_| {
            GtpError::malformed(format!("message body of {} octets does not fit the length field", payload_len))
        })?;
        Ok(())
    }

    pub fn payload_len(&self) -> Result<usize> {
        let covered = self.header_len() - HEADER_PREAMBLE_LEN;
        (self.length as usize)
            .checked_sub(covered)
            .ok_or_else(|| GtpError::malformed(format!("length {} shorter than header", self.length)))
    }

    pub fn teid_or_zero(&self) -> u32 {
        self.teid.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parse_without_teid() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x40);
        buf.put_u8(1);
        buf.put_u16(4);
        buf.put_uint(12345, 3);
        buf.put_u8(0);

        let mut bytes = buf.freeze();
        let header = Header::parse(&mut bytes).unwrap();

        assert_eq!(header.version, 2);
        assert_eq!(header.message_type, MessageType::EchoRequest);
        assert_eq!(header.length, 4);
        assert_eq!(header.sequence_number, 12345);
        assert_eq!(header.teid, None);
        assert_eq!(header.payload_len().unwrap(), 0);
    }

    #[test]
    fn test_header_parse_with_teid() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x48);
        buf.put_u8(33);
        buf.put_u16(8);
        buf.put_u32(0x1122_3344);
        buf.put_uint(0xabcdef, 3);
        buf.put_u8(0);

        let mut bytes = buf.freeze();
        let header = Header::parse(&mut bytes).unwrap();

        assert_eq!(header.message_type, MessageType::CreateSessionResponse);
        assert_eq!(header.teid, Some(0x1122_3344));
        assert_eq!(header.sequence_number, 0xabcdef);
        assert_eq!(header.header_len(), HEADER_LEN_WITH_TEID);
    }

    #[test]
    fn test_header_rejects_version_one() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x20);
        buf.put_u8(1);
        buf.put_u16(4);
        buf.put_uint(1, 3);
        buf.put_u8(0);

        let mut bytes = buf.freeze();
        assert!(matches!(Header::parse(&mut bytes), Err(GtpError::InvalidVersion(1))));
    }

    #[test]
    fn test_header_truncated_teid() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x48);
        buf.put_u8(32);
        buf.put_u16(8);
        buf.put_u32(0x1234);

        let mut bytes = buf.freeze();
        assert!(matches!(Header::parse(&mut bytes), Err(GtpError::Malformed(_))));
    }

    #[test]
    fn test_header_encode_decode() {
        let mut original = Header::new(MessageType::ModifyBearerRequest, Some(0xdead_beef), 0x01_0203);
        original.set_payload_len(20).unwrap();
        let mut buf = BytesMut::new();
        original.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN_WITH_TEID);

        let mut bytes = buf.freeze();
        let decoded = Header::parse(&mut bytes).unwrap();

        assert_eq!(original, decoded);
        assert_eq!(decoded.payload_len().unwrap(), 20);
    }

    #[test]
    fn test_oversized_body_rejected() {
        let mut header = Header::new(MessageType::EchoRequest, Some(1), 1);
        assert!(header.set_payload_len(65535 - 8).is_ok());
        assert_eq!(header.length, 65535);
        assert!(matches!(header.set_payload_len(65535 - 7), Err(GtpError::Malformed(_))));
        assert_eq!(header.length, 65535);
    }

    #[test]
    fn test_sequence_number_is_24_bits() {
        let header = Header::new(MessageType::EchoRequest, None, 0xff12_3456);
        assert_eq!(header.sequence_number, 0x12_3456);
    }
}
