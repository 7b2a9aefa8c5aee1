use crate::gtpv2::error::{GtpError, Result};
use crate::gtpv2::types::InterfaceType;
use crate::types::session::Session;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;

/// Only the session-level TEID for the local role indexes a session.
/// Every path that touches both maps takes the session entry first.
#[derive(Debug)]
pub struct SessionDirectory {
    sessions: DashMap<String, Session>,
    by_teid: DashMap<(u32, SocketAddr), String>,
    local_interface: InterfaceType,
}

impl SessionDirectory {
    pub fn new(local_interface: InterfaceType) -> Self {
        Self {
            sessions: DashMap::new(),
            by_teid: DashMap::new(),
            local_interface,
        }
    }

    pub fn add_session(&self, session: Session) -> Result<()> {
        match self.sessions.entry(session.imsi.clone()) {
            Entry::Occupied(_) => Err(GtpError::SessionExists(session.imsi)),
            Entry::Vacant(slot) => {
                if let Some(key) = self.key_of(&session) {
                    self.by_teid.insert(key, session.imsi.clone());
                }
                slot.insert(session);
                Ok(())
            }
        }
    }

    /// Snapshot of the session holding `teid` toward `peer`.
    pub fn get_session_by_teid(&self, teid: u32, peer: SocketAddr) -> Result<Session> {
        let imsi = self
            .by_teid
            .get(&(teid, peer))
            .map(|entry| entry.value().clone())
            .ok_or(GtpError::SessionNotFound)?;
        self.get_session_by_imsi(&imsi)
    }

    pub fn get_session_by_imsi(&self, imsi: &str) -> Result<Session> {
        self.sessions
            .get(imsi)
            .map(|entry| entry.value().clone())
            .ok_or(GtpError::SessionNotFound)
    }

    pub fn has_session(&self, imsi: &str) -> bool {
        self.sessions.contains_key(imsi)
    }

    /// Runs `update_fn` with the session locked, then brings the TEID index
    /// in line with whatever local TEIDs it added or dropped.
    pub fn update_session<F, R>(&self, imsi: &str, update_fn: F) -> Result<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut entry = self
            .sessions
            .get_mut(imsi)
            .ok_or(GtpError::SessionNotFound)?;
        let session = entry.value_mut();

        let before = self.key_of(session);
        let result = update_fn(session);
        let after = self.key_of(session);

        if before != after {
            if let Some(key) = before {
                self.by_teid.remove_if(&key, |_, owner| owner == imsi);
            }
            if let Some(key) = after {
                self.by_teid.insert(key, session.imsi.clone());
            }
        }

        Ok(result)
    }

    pub fn remove_session(&self, imsi: &str) -> Option<Session> {
        let (_, session) = self.sessions.remove(imsi)?;
        if let Some(key) = self.key_of(&session) {
            self.by_teid.remove_if(&key, |_, owner| owner == imsi);
        }
        Some(session)
    }

    fn key_of(&self, session: &Session) -> Option<(u32, SocketAddr)> {
        session
            .get_teid(self.local_interface)
            .ok()
            .map(|teid| (teid, session.peer_addr))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: InterfaceType = InterfaceType::S11MmeGtpc;

    fn peer() -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 2], 2123))
    }

    fn session(imsi: &str, local_teid: u32) -> Session {
        let mut s = Session::new(imsi, peer());
        s.add_teid(LOCAL, local_teid);
        s
    }

    #[test]
    fn test_session_directory() {
        let dir = SessionDirectory::new(LOCAL);
        dir.add_session(session("001010000000001", 1)).unwrap();

        assert!(dir.has_session("001010000000001"));
        assert_eq!(dir.session_count(), 1);
        assert_eq!(dir.get_session_by_teid(1, peer()).unwrap().imsi, "001010000000001");

        let other_peer = SocketAddr::from(([10, 0, 0, 3], 2123));
        assert!(matches!(
            dir.get_session_by_teid(1, other_peer),
            Err(GtpError::SessionNotFound)
        ));

        assert!(matches!(
            dir.add_session(session("001010000000001", 2)),
            Err(GtpError::SessionExists(_))
        ));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = SessionDirectory::new(LOCAL);
        dir.add_session(session("001010000000001", 1)).unwrap();

        assert!(dir.remove_session("001010000000001").is_some());
        assert!(dir.remove_session("001010000000001").is_none());
        assert_eq!(dir.session_count(), 0);
        assert!(matches!(
            dir.get_session_by_teid(1, peer()),
            Err(GtpError::SessionNotFound)
        ));
    }

    #[test]
    fn test_update_reindexes_local_teids() {
        let dir = SessionDirectory::new(LOCAL);
        dir.add_session(session("001010000000001", 1)).unwrap();

        let ebi = dir
            .update_session("001010000000001", |s| {
                s.add_teid(LOCAL, 9);
                s.add_teid(InterfaceType::S11S4SgwGtpc, 77);
                s.default_bearer().ebi
            })
            .unwrap();
        assert_eq!(ebi, 5);

        assert!(dir.get_session_by_teid(1, peer()).is_err());
        assert_eq!(dir.get_session_by_teid(9, peer()).unwrap().imsi, "001010000000001");
        // Peer-assigned TEIDs are not lookup keys.
        assert!(dir.get_session_by_teid(77, peer()).is_err());
    }

    #[test]
    fn test_bearer_teids_are_not_keys() {
        let dir = SessionDirectory::new(LOCAL);
        dir.add_session(session("001010000000001", 1)).unwrap();
        dir.add_session(session("001010000000002", 2)).unwrap();

        dir.update_session("001010000000002", |s| {
            s.default_bearer_mut().add_teid(LOCAL, 1);
        })
        .unwrap();
        assert_eq!(dir.get_session_by_teid(1, peer()).unwrap().imsi, "001010000000001");

        dir.remove_session("001010000000002");
        assert_eq!(dir.get_session_by_teid(1, peer()).unwrap().imsi, "001010000000001");
    }

    #[test]
    fn test_update_missing_session() {
        let dir = SessionDirectory::new(LOCAL);
        let result = dir.update_session("001010000000009", |s| s.activate());
        assert!(matches!(result, Err(GtpError::SessionNotFound)));
    }

    #[test]
    fn test_concurrent_sessions() {
        let dir = std::sync::Arc::new(SessionDirectory::new(LOCAL));
        let workers: Vec<_> = (0..8u32)
            .map(|i| {
                let dir = dir.clone();
                std::thread::spawn(move || {
                    let imsi = format!("00101000000000{}", i);
                    dir.add_session(session(&imsi, 100 + i)).unwrap();
                    dir.update_session(&imsi, |s| s.add_teid(LOCAL, 200 + i)).unwrap();
                    assert_eq!(dir.get_session_by_teid(200 + i, peer()).unwrap().imsi, imsi);
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(dir.session_count(), 8);
        assert!(dir.get_session_by_teid(100, peer()).is_err());
    }
}
