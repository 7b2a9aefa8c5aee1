use crate::gtpv2::error::{GtpError, Result};
use crate::gtpv2::types::InterfaceType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// EBI given to the default bearer until the peer assigns one.
pub const DEFAULT_EBI: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Create request sent, response not yet validated.
    Pending,
    Active,
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bearer {
    pub ebi: u8,
    pub subscriber_ip: Option<IpAddr>,
    teids: HashMap<InterfaceType, u32>,
}

impl Bearer {
    pub fn new(ebi: u8) -> Self {
        Self {
            ebi,
            subscriber_ip: None,
            teids: HashMap::new(),
        }
    }

    pub fn add_teid(&mut self, role: InterfaceType, teid: u32) {
        self.teids.insert(role, teid);
    }

    pub fn get_teid(&self, role: InterfaceType) -> Result<u32> {
        self.teids
            .get(&role)
            .copied()
            .ok_or(GtpError::TeidNotFound(role))
    }

    pub fn teids(&self) -> impl Iterator<Item = (InterfaceType, u32)> + '_ {
        self.teids.iter().map(|(role, teid)| (*role, *teid))
    }
}

/// One subscriber's state toward a peer. The first bearer is the default one
/// and always exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub imsi: String,
    pub peer_addr: SocketAddr,
    pub state: SessionState,
    teids: HashMap<InterfaceType, u32>,
    bearers: Vec<Bearer>,
}

impl Session {
    pub fn new(imsi: impl Into<String>, peer_addr: SocketAddr) -> Self {
        Self {
            imsi: imsi.into(),
            peer_addr,
            state: SessionState::Pending,
            teids: HashMap::new(),
            bearers: vec![Bearer::new(DEFAULT_EBI)],
        }
    }

    pub fn add_teid(&mut self, role: InterfaceType, teid: u32) {
        self.teids.insert(role, teid);
    }

    pub fn get_teid(&self, role: InterfaceType) -> Result<u32> {
        self.teids
            .get(&role)
            .copied()
            .ok_or(GtpError::TeidNotFound(role))
    }

    pub fn default_bearer(&self) -> &Bearer {
        &self.bearers[0]
    }

    pub fn default_bearer_mut(&mut self) -> &mut Bearer {
        &mut self.bearers[0]
    }

    pub fn bearer(&self, ebi: u8) -> Option<&Bearer> {
        self.bearers.iter().find(|b| b.ebi == ebi)
    }

    pub fn bearer_mut(&mut self, ebi: u8) -> Option<&mut Bearer> {
        self.bearers.iter_mut().find(|b| b.ebi == ebi)
    }

    /// Adds a dedicated bearer, or replaces the bearer with the same EBI.
    pub fn add_bearer(&mut self, bearer: Bearer) {
        match self.bearer_mut(bearer.ebi) {
            Some(existing) => *existing = bearer,
            None => self.bearers.push(bearer),
        }
    }

    pub fn bearers(&self) -> &[Bearer] {
        &self.bearers
    }

    pub fn activate(&mut self) -> Result<()> {
        if self.state == SessionState::Released {
            return Err(GtpError::SessionNotFound);
        }
        self.state = SessionState::Active;
        Ok(())
    }

    pub fn release(&mut self) {
        self.state = SessionState::Released;
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }
}
