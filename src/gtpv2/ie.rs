use super::error::{GtpError, Result};
use super::pool::Recycler;
use super::types::{Cause, IeType, InterfaceType};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const IE_HEADER_LEN: usize = 4;
/// Deepest grouped-IE nesting accepted from the wire.
pub const MAX_IE_DEPTH: usize = 8;

const FTEID_V4: u8 = 0x80;
const FTEID_V6: u8 = 0x40;

/// A single information element. Grouped types keep their content in
/// `child_ies` and leave `payload` empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ie {
    pub ie_type: IeType,
    pub length: u16,
    spare_instance: u8,
    pub payload: Vec<u8>,
    pub child_ies: Vec<Ie>,
}

impl Ie {
    pub fn new(ie_type: IeType, instance: u8, payload: &[u8]) -> Self {
        let mut ie = Ie {
            ie_type,
            length: 0,
            spare_instance: instance & 0x0f,
            payload: payload.to_vec(),
            child_ies: Vec::new(),
        };
        ie.refresh_length();
        ie
    }

    pub fn grouped(ie_type: IeType, instance: u8, child_ies: Vec<Ie>) -> Self {
        let mut ie = Ie {
            ie_type,
            length: 0,
            spare_instance: instance & 0x0f,
            payload: Vec::new(),
            child_ies,
        };
        ie.refresh_length();
        ie
    }

    pub fn with_instance(mut self, instance: u8) -> Self {
        self.set_instance(instance);
        self
    }

    pub fn instance(&self) -> u8 {
        self.spare_instance & 0x0f
    }

    pub fn set_instance(&mut self, instance: u8) {
        self.spare_instance = (self.spare_instance & 0xf0) | (instance & 0x0f);
    }

    pub fn is_grouped(&self) -> bool {
        self.ie_type.is_grouped()
    }

    pub fn decode(buf: &mut Bytes, recycler: &Recycler) -> Result<Self> {
        Self::decode_nested(buf, recycler, 0)
    }

    fn decode_nested(buf: &mut Bytes, recycler: &Recycler, depth: usize) -> Result<Self> {
        if depth > MAX_IE_DEPTH {
            return Err(GtpError::RecursionLimit(MAX_IE_DEPTH));
        }
        if buf.remaining() < IE_HEADER_LEN {
            return Err(GtpError::malformed(format!(
                "IE header needs {} octets, have {}",
                IE_HEADER_LEN,
                buf.remaining()
            )));
        }

        let ie_type = IeType::from(buf.get_u8());
        let length = buf.get_u16();
        let spare_instance = buf.get_u8();

        if buf.remaining() < length as usize {
            return Err(GtpError::malformed(format!(
                "{:?} declares {} octets, have {}",
                ie_type,
                length,
                buf.remaining()
            )));
        }
        let mut value = buf.split_to(length as usize);

        let mut ie = recycler.get_ie();
        ie.ie_type = ie_type;
        ie.length = length;
        ie.spare_instance = spare_instance;

        if ie_type.is_grouped() {
            let mut children = recycler.get_ie_slice();
            while value.has_remaining() {
                match Self::decode_nested(&mut value, recycler, depth + 1) {
                    Ok(child) => children.push(child),
                    Err(e) => {
                        ie.child_ies = children;
                        recycler.release_ie(ie);
                        return Err(e);
                    }
                }
            }
            ie.child_ies = children;
        } else {
            ie.payload.extend_from_slice(&value);
        }

        Ok(ie)
    }

    /// Fails without writing anything when the value does not fit the
    /// 16-bit length field. A grouped IE is always at least as long as any
    /// of its children, so an oversized child is caught at the outermost IE.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let value_len = self.value_len();
        let length = u16::try_from(value_len).map_err(|_| {
            GtpError::malformed(format!("{:?} value of {} octets exceeds 65535", self.ie_type, value_len))
        })?;
        buf.reserve(IE_HEADER_LEN + value_len);
        buf.put_u8(self.ie_type.into());
        buf.put_u16(length);
        buf.put_u8(self.spare_instance);
        if self.is_grouped() {
            for child in &self.child_ies {
                child.encode(buf)?;
            }
        } else {
            buf.put_slice(&self.payload);
        }
        Ok(())
    }

    pub fn value_len(&self) -> usize {
        if self.is_grouped() {
            self.child_ies.iter().map(Ie::encoded_len).sum()
        } else {
            self.payload.len()
        }
    }

    pub fn encoded_len(&self) -> usize {
        IE_HEADER_LEN + self.value_len()
    }

    pub fn refresh_length(&mut self) {
        for child in &mut self.child_ies {
            child.refresh_length();
        }
        self.length = clamp_len(self.value_len());
    }

    pub fn add_child(&mut self, child: Ie) {
        self.child_ies.push(child);
        self.length = clamp_len(self.value_len());
    }

    pub fn child(&self, ie_type: IeType, instance: u8) -> Option<&Ie> {
        self.child_ies
            .iter()
            .find(|c| c.ie_type == ie_type && c.instance() == instance)
    }

    pub(crate) fn clear(&mut self) {
        self.ie_type = IeType::default();
        self.length = 0;
        self.spare_instance = 0;
        self.payload.clear();
    }

    fn expect_type(&self, expected: IeType) -> Result<()> {
        if self.ie_type != expected {
            return Err(GtpError::WrongIeType {
                expected,
                actual: self.ie_type,
            });
        }
        Ok(())
    }

    fn expect_len(&self, need: usize) -> Result<()> {
        if self.payload.len() < need {
            return Err(GtpError::PayloadTooShort {
                ie_type: self.ie_type,
                need,
                have: self.payload.len(),
            });
        }
        Ok(())
    }
}

// Builders

impl Ie {
    pub fn new_imsi(imsi: &str) -> Result<Self> {
        Ok(Ie::new(IeType::Imsi, 0, &encode_tbcd(imsi)?))
    }

    pub fn new_msisdn(msisdn: &str) -> Result<Self> {
        Ok(Ie::new(IeType::Msisdn, 0, &encode_tbcd(msisdn)?))
    }

    pub fn new_cause(cause: Cause) -> Self {
        Ie::new(IeType::Cause, 0, &[cause.into(), 0x00])
    }

    pub fn new_recovery(restart_counter: u8) -> Self {
        Ie::new(IeType::Recovery, 0, &[restart_counter])
    }

    pub fn new_eps_bearer_id(ebi: u8) -> Self {
        Ie::new(IeType::EpsBearerId, 0, &[ebi & 0x0f])
    }

    pub fn new_rat_type(rat_type: u8) -> Self {
        Ie::new(IeType::RatType, 0, &[rat_type])
    }

    pub fn new_pdn_type(pdn_type: u8) -> Self {
        Ie::new(IeType::PdnType, 0, &[pdn_type & 0x07])
    }

    pub fn new_selection_mode(mode: u8) -> Self {
        Ie::new(IeType::SelectionMode, 0, &[mode & 0x03])
    }

    pub fn new_ambr(uplink: u32, downlink: u32) -> Self {
        let mut buf = BytesMut::with_capacity(8);
        buf.put_u32(uplink);
        buf.put_u32(downlink);
        Ie::new(IeType::Ambr, 0, &buf)
    }

    pub fn new_ip_address(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => Ie::new(IeType::IpAddress, 0, &v4.octets()),
            IpAddr::V6(v6) => Ie::new(IeType::IpAddress, 0, &v6.octets()),
        }
    }

    pub fn new_paa_ipv4(addr: Ipv4Addr) -> Self {
        let mut payload = Vec::with_capacity(5);
        payload.push(super::types::PDN_TYPE_IPV4);
        payload.extend_from_slice(&addr.octets());
        Ie::new(IeType::Paa, 0, &payload)
    }

    pub fn new_apn(apn: &str) -> Self {
        let mut payload = Vec::with_capacity(apn.len() + 1);
        for label in apn.split('.').filter(|l| !l.is_empty()) {
            payload.push(label.len() as u8);
            payload.extend_from_slice(label.as_bytes());
        }
        Ie::new(IeType::Apn, 0, &payload)
    }

    pub fn new_fteid(
        interface_type: InterfaceType,
        teid: u32,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    ) -> Self {
        let mut flags = u8::from(interface_type) & 0x3f;
        if ipv4.is_some() {
            flags |= FTEID_V4;
        }
        if ipv6.is_some() {
            flags |= FTEID_V6;
        }

        let mut buf = BytesMut::with_capacity(25);
        buf.put_u8(flags);
        buf.put_u32(teid);
        if let Some(v4) = ipv4 {
            buf.put_slice(&v4.octets());
        }
        if let Some(v6) = ipv6 {
            buf.put_slice(&v6.octets());
        }
        Ie::new(IeType::FullyQualifiedTeid, 0, &buf)
    }

    /// Bearer-level QoS. Bit rates are 40-bit values in kbps.
    pub fn new_bearer_qos(qos: &BearerQos) -> Self {
        let mut buf = BytesMut::with_capacity(22);
        let mut arp = (qos.priority_level & 0x0f) << 2;
        if qos.pre_emption_capability {
            arp |= 0x40;
        }
        if qos.pre_emption_vulnerability {
            arp |= 0x01;
        }
        buf.put_u8(arp);
        buf.put_u8(qos.qci);
        for rate in [qos.mbr_uplink, qos.mbr_downlink, qos.gbr_uplink, qos.gbr_downlink] {
            buf.put_uint(rate & 0xff_ffff_ffff, 5);
        }
        Ie::new(IeType::BearerQos, 0, &buf)
    }

    pub fn new_bearer_context(child_ies: Vec<Ie>) -> Self {
        Ie::grouped(IeType::BearerContext, 0, child_ies)
    }
}

// Accessors

impl Ie {
    pub fn cause(&self) -> Result<Cause> {
        self.expect_type(IeType::Cause)?;
        self.expect_len(1)?;
        Ok(Cause::from(self.payload[0]))
    }

    pub fn recovery(&self) -> Result<u8> {
        self.expect_type(IeType::Recovery)?;
        self.expect_len(1)?;
        Ok(self.payload[0])
    }

    pub fn eps_bearer_id(&self) -> Result<u8> {
        self.expect_type(IeType::EpsBearerId)?;
        self.expect_len(1)?;
        Ok(self.payload[0] & 0x0f)
    }

    pub fn rat_type(&self) -> Result<u8> {
        self.expect_type(IeType::RatType)?;
        self.expect_len(1)?;
        Ok(self.payload[0])
    }

    pub fn pdn_type(&self) -> Result<u8> {
        match self.ie_type {
            IeType::PdnType | IeType::Paa => {
                self.expect_len(1)?;
                Ok(self.payload[0] & 0x07)
            }
            actual => Err(GtpError::WrongIeType {
                expected: IeType::PdnType,
                actual,
            }),
        }
    }

    pub fn ambr(&self) -> Result<(u32, u32)> {
        self.expect_type(IeType::Ambr)?;
        self.expect_len(8)?;
        let mut value = &self.payload[..];
        Ok((value.get_u32(), value.get_u32()))
    }

    pub fn imsi(&self) -> Result<String> {
        self.expect_type(IeType::Imsi)?;
        self.expect_len(1)?;
        Ok(decode_tbcd(&self.payload))
    }

    pub fn msisdn(&self) -> Result<String> {
        self.expect_type(IeType::Msisdn)?;
        self.expect_len(1)?;
        Ok(decode_tbcd(&self.payload))
    }

    pub fn apn(&self) -> Result<String> {
        self.expect_type(IeType::Apn)?;
        let mut labels = Vec::new();
        let mut rest = &self.payload[..];
        while let Some((&len, tail)) = rest.split_first() {
            let len = len as usize;
            if tail.len() < len {
                return Err(GtpError::PayloadTooShort {
                    ie_type: self.ie_type,
                    need: self.payload.len() - tail.len() + len,
                    have: self.payload.len(),
                });
            }
            labels.push(String::from_utf8_lossy(&tail[..len]).into_owned());
            rest = &tail[len..];
        }
        Ok(labels.join("."))
    }

    pub fn teid(&self) -> Result<u32> {
        self.expect_type(IeType::FullyQualifiedTeid)?;
        self.expect_len(5)?;
        let mut value = &self.payload[1..5];
        Ok(value.get_u32())
    }

    pub fn interface_type(&self) -> Result<InterfaceType> {
        self.expect_type(IeType::FullyQualifiedTeid)?;
        self.expect_len(1)?;
        Ok(InterfaceType::from(self.payload[0] & 0x3f))
    }

    /// Address carried by an IP Address, PAA or F-TEID IE. When an F-TEID or
    /// PAA is dual-stack, the IPv4 address is returned.
    pub fn ip_address(&self) -> Result<IpAddr> {
        match self.ie_type {
            IeType::IpAddress => match self.payload.len() {
                4 => Ok(IpAddr::V4(ipv4_at(&self.payload, 0))),
                16 => Ok(IpAddr::V6(ipv6_at(&self.payload, 0))),
                have => Err(GtpError::PayloadTooShort {
                    ie_type: self.ie_type,
                    need: if have < 4 { 4 } else { 16 },
                    have,
                }),
            },
            IeType::FullyQualifiedTeid => {
                self.expect_len(5)?;
                let flags = self.payload[0];
                if flags & FTEID_V4 != 0 {
                    self.expect_len(9)?;
                    Ok(IpAddr::V4(ipv4_at(&self.payload, 5)))
                } else if flags & FTEID_V6 != 0 {
                    self.expect_len(21)?;
                    Ok(IpAddr::V6(ipv6_at(&self.payload, 5)))
                } else {
                    Err(GtpError::PayloadTooShort {
                        ie_type: self.ie_type,
                        need: 9,
                        have: self.payload.len(),
                    })
                }
            }
            IeType::Paa => {
                self.expect_len(1)?;
                match self.payload[0] & 0x07 {
                    super::types::PDN_TYPE_IPV4 => {
                        self.expect_len(5)?;
                        Ok(IpAddr::V4(ipv4_at(&self.payload, 1)))
                    }
                    super::types::PDN_TYPE_IPV6 => {
                        self.expect_len(18)?;
                        Ok(IpAddr::V6(ipv6_at(&self.payload, 2)))
                    }
                    _ => {
                        self.expect_len(22)?;
                        Ok(IpAddr::V4(ipv4_at(&self.payload, 18)))
                    }
                }
            }
            actual => Err(GtpError::WrongIeType {
                expected: IeType::IpAddress,
                actual,
            }),
        }
    }

    pub fn bearer_qos(&self) -> Result<BearerQos> {
        self.expect_type(IeType::BearerQos)?;
        self.expect_len(22)?;
        let mut value = &self.payload[..];
        let arp = value.get_u8();
        let qci = value.get_u8();
        Ok(BearerQos {
            pre_emption_capability: arp & 0x40 != 0,
            priority_level: (arp >> 2) & 0x0f,
            pre_emption_vulnerability: arp & 0x01 != 0,
            qci,
            mbr_uplink: value.get_uint(5),
            mbr_downlink: value.get_uint(5),
            gbr_uplink: value.get_uint(5),
            gbr_downlink: value.get_uint(5),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BearerQos {
    pub pre_emption_capability: bool,
    pub priority_level: u8,
    pub pre_emption_vulnerability: bool,
    pub qci: u8,
    pub mbr_uplink: u64,
    pub mbr_downlink: u64,
    pub gbr_uplink: u64,
    pub gbr_downlink: u64,
}

/// Lengths past the field width saturate here; `encode` rejects them.
fn clamp_len(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

fn ipv4_at(payload: &[u8], offset: usize) -> Ipv4Addr {
    let mut octets = [0u8; 4];
    octets.copy_from_slice(&payload[offset..offset + 4]);
    Ipv4Addr::from(octets)
}

fn ipv6_at(payload: &[u8], offset: usize) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&payload[offset..offset + 16]);
    Ipv6Addr::from(octets)
}

/// Packs decimal digits two per octet, low nibble first, padding with 0xf.
pub fn encode_tbcd(digits: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity((digits.len() + 1) / 2);
    let mut nibbles = digits.chars().map(|c| {
        c.to_digit(10)
            .map(|d| d as u8)
            .ok_or_else(|| GtpError::malformed(format!("non-decimal digit {:?} in {:?}", c, digits)))
    });
    while let Some(low) = nibbles.next() {
        let low = low?;
        let high = match nibbles.next() {
            Some(high) => high?,
            None => 0x0f,
        };
        out.push((high << 4) | low);
    }
    Ok(out)
}

pub fn decode_tbcd(octets: &[u8]) -> String {
    let mut out = String::with_capacity(octets.len() * 2);
    for octet in octets {
        for nibble in [octet & 0x0f, octet >> 4] {
            if nibble > 9 {
                return out;
            }
            out.push(char::from(b'0' + nibble));
        }
    }
    out
}
