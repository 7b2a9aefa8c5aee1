use super::error::{GtpError, Result};
use super::handlers;
use super::ie::{BearerQos, Ie};
use super::messages::{
    CreateSessionRequest, DeleteSessionRequest, EchoRequest, ModifyBearerRequest,
};
use super::pool::Recycler;
use super::registry::{decode_message, Message};
use super::retry::{PendingRequest, RequestTracker};
use super::teid_pool::TeidPool;
use super::types::{
    InterfaceType, MessageType, GTPC_PORT, PDN_TYPE_IPV4, RAT_TYPE_EUTRAN,
};
use crate::types::session::{Session, SessionState, DEFAULT_EBI};
use crate::types::session_manager::SessionDirectory;
use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub type Handler = Arc<dyn Fn(&Conn, SocketAddr, &Message) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnhandledPolicy {
    #[default]
    Drop,
    /// Surface `NoHandler` to the caller of `handle`.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Created { imsi: String },
    Modified {
        imsi: String,
        ebi: u8,
        remote: SocketAddr,
        teid: u32,
    },
    Deleted { imsi: String },
    Discarded { imsi: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct ConnConfig {
    pub peer_addr: SocketAddr,
    pub local_ip: Ipv4Addr,
    pub local_interface: InterfaceType,
    pub peer_interface: InterfaceType,
    pub restart_counter: u8,
    pub apn: String,
    pub retry_timeout: Duration,
    pub max_retries: u32,
    pub unhandled: UnhandledPolicy,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            peer_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, GTPC_PORT)),
            local_ip: Ipv4Addr::LOCALHOST,
            local_interface: InterfaceType::S11MmeGtpc,
            peer_interface: InterfaceType::S11S4SgwGtpc,
            restart_counter: 0,
            apn: "internet".to_string(),
            retry_timeout: super::retry::DEFAULT_RETRY_TIMEOUT,
            max_retries: super::retry::MAX_RETRIES,
            unhandled: UnhandledPolicy::Drop,
        }
    }
}

pub struct ConnHandles {
    pub outbound: mpsc::UnboundedReceiver<(Bytes, SocketAddr)>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

pub struct Conn {
    config: ConnConfig,
    sessions: SessionDirectory,
    handlers: RwLock<HashMap<MessageType, Handler>>,
    recycler: Arc<Recycler>,
    teids: TeidPool,
    sequence: AtomicU32,
    tracker: RequestTracker,
    outbound: mpsc::UnboundedSender<(Bytes, SocketAddr)>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Conn {
    pub fn new(config: ConnConfig, recycler: Arc<Recycler>) -> (Self, ConnHandles) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let conn = Self {
            sessions: SessionDirectory::new(config.local_interface),
            config,
            handlers: RwLock::new(HashMap::new()),
            recycler,
            teids: TeidPool::new(),
            sequence: AtomicU32::new(1),
            tracker: RequestTracker::new(),
            outbound: outbound_tx,
            events: events_tx,
        };
        handlers::register_defaults(&conn);

        (
            conn,
            ConnHandles {
                outbound: outbound_rx,
                events: events_rx,
            },
        )
    }

    pub fn register_handler<F>(&self, message_type: MessageType, handler: F)
    where
        F: Fn(&Conn, SocketAddr, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.write().insert(message_type, Arc::new(handler));
    }

    pub fn config(&self) -> &ConnConfig {
        &self.config
    }

    pub fn recycler(&self) -> &Recycler {
        &self.recycler
    }

    pub fn sessions(&self) -> &SessionDirectory {
        &self.sessions
    }

    pub fn get_session_by_teid(&self, teid: u32, peer: SocketAddr) -> Result<Session> {
        self.sessions.get_session_by_teid(teid, peer)
    }

    pub fn get_session_by_imsi(&self, imsi: &str) -> Result<Session> {
        self.sessions.get_session_by_imsi(imsi)
    }

    pub fn update_session<F, R>(&self, imsi: &str, update_fn: F) -> Result<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        self.sessions.update_session(imsi, update_fn)
    }

    /// Removes a session and returns the TEID allocated for it. Bearer-level
    /// TEIDs came from the peer and are never handed to the allocator.
    /// Removing an absent session is a no-op.
    pub fn remove_session(&self, imsi: &str) -> Option<Session> {
        let mut session = self.sessions.remove_session(imsi)?;
        if let Ok(teid) = session.get_teid(self.config.local_interface) {
            self.teids.release(teid);
        }
        session.release();
        Some(session)
    }

    pub fn pending_requests(&self) -> usize {
        self.tracker.len()
    }

    fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session event dropped, no listener");
        }
    }

    pub(crate) fn transmit(&self, data: Bytes, peer: SocketAddr) -> Result<()> {
        self.outbound.send((data, peer)).map_err(|_| {
            GtpError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "outbound channel closed",
            ))
        })
    }

    /// Encodes and sends a response. The message is returned to the pool.
    pub fn send_response(&self, msg: Message, peer: SocketAddr) -> Result<()> {
        let encoded = msg.encode();
        debug!(
            "Sending {:?} seq {} to {}",
            msg.message_type(),
            msg.sequence_number(),
            peer
        );
        msg.release(&self.recycler);
        self.transmit(encoded?.freeze(), peer)
    }

    fn send_request(&self, msg: Message, peer: SocketAddr, imsi: Option<&str>) -> Result<u32> {
        let seq = msg.sequence_number();
        let message_type = msg.message_type();
        let encoded = msg.encode();
        msg.release(&self.recycler);
        let data = encoded?.freeze();

        let mut pending = PendingRequest::new(data.clone(), peer, message_type)
            .with_timeout(self.config.retry_timeout, self.config.max_retries);
        if let Some(imsi) = imsi {
            pending = pending.with_imsi(imsi);
        }
        self.tracker.add_request(seq, pending);

        debug!("Sending {:?} seq {} to {}", message_type, seq, peer);
        if let Err(e) = self.transmit(data, peer) {
            self.tracker.remove_request(seq, peer);
            return Err(e);
        }
        Ok(seq)
    }

    /// Decodes one datagram and runs it through its handler. Pooled objects
    /// are released once the handler returns.
    pub fn handle(&self, data: Bytes, peer: SocketAddr) -> Result<()> {
        let msg = decode_message(data, &self.recycler)?;
        debug!(
            "Received {:?} seq {} teid {:#x} from {}",
            msg.message_type(),
            msg.sequence_number(),
            msg.teid(),
            peer
        );
        let result = self.dispatch(peer, &msg);
        msg.release(&self.recycler);
        result
    }

    fn dispatch(&self, peer: SocketAddr, msg: &Message) -> Result<()> {
        let message_type = msg.message_type();

        let request = if message_type.is_response() {
            match self
                .tracker
                .match_response(msg.sequence_number(), peer, message_type)
            {
                Some(request) => Some(request),
                None => {
                    warn!(
                        "Dropping unmatched {:?} seq {} from {}",
                        message_type,
                        msg.sequence_number(),
                        peer
                    );
                    return Ok(());
                }
            }
        } else {
            None
        };

        let handler = self.handlers.read().get(&message_type).cloned();
        let result = match handler {
            Some(handler) => (*handler)(self, peer, msg),
            None => match self.config.unhandled {
                UnhandledPolicy::Drop => {
                    warn!("No handler for {:?} from {}, dropping", message_type, peer);
                    Ok(())
                }
                UnhandledPolicy::Reject => Err(GtpError::NoHandler(message_type)),
            },
        };

        // A create that could not be applied leaves nothing behind.
        if let (Err(e), Some(request)) = (&result, &request) {
            if request.message_type == MessageType::CreateSessionRequest {
                if let Some(imsi) = &request.imsi {
                    self.discard_pending(imsi, &e.to_string());
                }
            }
        }

        result
    }

    fn discard_pending(&self, imsi: &str, reason: &str) {
        let pending = matches!(
            self.sessions.get_session_by_imsi(imsi),
            Ok(s) if s.state == SessionState::Pending
        );
        if pending && self.remove_session(imsi).is_some() {
            warn!("Discarded session for subscriber {}: {}", imsi, reason);
            self.publish(SessionEvent::Discarded {
                imsi: imsi.to_string(),
                reason: reason.to_string(),
            });
        }
    }

    pub fn create_session(&self, imsi: &str) -> Result<u32> {
        let imsi_ie = Ie::new_imsi(imsi)?;
        if self.sessions.has_session(imsi) {
            return Err(GtpError::SessionExists(imsi.to_string()));
        }

        let local_teid = self.teids.allocate()?;
        let mut session = Session::new(imsi, self.config.peer_addr);
        session.add_teid(self.config.local_interface, local_teid);
        if let Err(e) = self.sessions.add_session(session) {
            self.teids.release(local_teid);
            return Err(e);
        }

        let mut req: CreateSessionRequest = self.recycler.get();
        req.imsi = Some(imsi_ie);
        req.rat_type = Some(Ie::new_rat_type(RAT_TYPE_EUTRAN));
        req.sender_fteid_c = Some(Ie::new_fteid(
            self.config.local_interface,
            local_teid,
            Some(self.config.local_ip),
            None,
        ));
        req.apn = Some(Ie::new_apn(&self.config.apn));
        req.selection_mode = Some(Ie::new_selection_mode(0));
        req.pdn_type = Some(Ie::new_pdn_type(PDN_TYPE_IPV4));
        req.paa = Some(Ie::new_paa_ipv4(Ipv4Addr::UNSPECIFIED));
        req.ambr = Some(Ie::new_ambr(100_000, 100_000));
        req.recovery = Some(Ie::new_recovery(self.config.restart_counter));
        req.bearer_contexts_to_be_created.push(Ie::new_bearer_context(vec![
            Ie::new_eps_bearer_id(DEFAULT_EBI),
            Ie::new_bearer_qos(&BearerQos {
                pre_emption_capability: true,
                priority_level: 15,
                pre_emption_vulnerability: true,
                qci: 9,
                ..BearerQos::default()
            }),
        ]));

        let msg = Message::new(&self.recycler, req, Some(0), self.next_sequence());
        match self.send_request(msg, self.config.peer_addr, Some(imsi)) {
            Ok(seq) => {
                info!("Create Session Request sent for subscriber {}", imsi);
                Ok(seq)
            }
            Err(e) => {
                self.remove_session(imsi);
                Err(e)
            }
        }
    }

    /// Peer-assigned control TEID of an established session. A session still
    /// waiting on its create response is treated as absent.
    fn peer_teid(&self, session: &Session) -> Result<u32> {
        session
            .get_teid(self.config.peer_interface)
            .map_err(|_| GtpError::SessionNotFound)
    }

    /// Sends a Modify Bearer Request binding the default bearer to the eNB's
    /// S1-U endpoint.
    pub fn modify_bearer(&self, imsi: &str, enb_teid: u32, enb_ip: Ipv4Addr) -> Result<u32> {
        let session = self.sessions.get_session_by_imsi(imsi)?;
        let peer_teid = self.peer_teid(&session)?;
        let ebi = session.default_bearer().ebi;

        self.sessions.update_session(imsi, |s| {
            s.default_bearer_mut()
                .add_teid(InterfaceType::S1uEnodebGtpu, enb_teid)
        })?;

        let mut req: ModifyBearerRequest = self.recycler.get();
        req.bearer_contexts_to_be_modified.push(Ie::new_bearer_context(vec![
            Ie::new_eps_bearer_id(ebi),
            Ie::new_fteid(InterfaceType::S1uEnodebGtpu, enb_teid, Some(enb_ip), None),
        ]));

        let msg = Message::new(&self.recycler, req, Some(peer_teid), self.next_sequence());
        self.send_request(msg, session.peer_addr, Some(imsi))
    }

    pub fn delete_session(&self, imsi: &str) -> Result<u32> {
        let session = self.sessions.get_session_by_imsi(imsi)?;
        let peer_teid = self.peer_teid(&session)?;

        let mut req: DeleteSessionRequest = self.recycler.get();
        req.linked_ebi = Some(Ie::new_eps_bearer_id(session.default_bearer().ebi));
        if let Ok(local_teid) = session.get_teid(self.config.local_interface) {
            req.sender_fteid_c = Some(Ie::new_fteid(
                self.config.local_interface,
                local_teid,
                Some(self.config.local_ip),
                None,
            ));
        }

        let msg = Message::new(&self.recycler, req, Some(peer_teid), self.next_sequence());
        self.send_request(msg, session.peer_addr, Some(imsi))
    }

    pub fn echo(&self, peer: SocketAddr) -> Result<u32> {
        let mut req: EchoRequest = self.recycler.get();
        req.recovery = Some(Ie::new_recovery(self.config.restart_counter));
        let msg = Message::new(&self.recycler, req, None, self.next_sequence());
        self.send_request(msg, peer, None)
    }

    /// Retransmits overdue requests and gives up on exhausted ones. An
    /// abandoned create discards its pending session.
    pub fn poll_timeouts(&self) -> Result<()> {
        let sweep = self.tracker.check_timeouts();

        for request in sweep.retransmit {
            debug!(
                "Retransmitting {:?} to {} (attempt {})",
                request.message_type, request.peer_addr, request.retry_count
            );
            self.transmit(request.data, request.peer_addr)?;
        }

        for ((seq, peer), request) in sweep.expired {
            warn!(
                "{:?} seq {} to {} got no response",
                request.message_type, seq, peer
            );
            if request.message_type == MessageType::CreateSessionRequest {
                if let Some(imsi) = &request.imsi {
                    self.discard_pending(imsi, "no response from peer");
                }
            }
        }

        Ok(())
    }

    pub(crate) fn data_path_endpoint(addr: IpAddr) -> SocketAddr {
        SocketAddr::new(addr, super::types::GTPU_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtpv2::messages::{CreateSessionResponse, EchoResponse, ModifyBearerResponse};
    use crate::gtpv2::pool::PoolConfig;
    use crate::gtpv2::registry::Body;
    use crate::gtpv2::types::Cause;

    const IMSI: &str = "001010000000001";

    fn peer() -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 2], GTPC_PORT))
    }

    fn conn_with(config: ConnConfig) -> (Conn, ConnHandles) {
        Conn::new(
            ConnConfig {
                peer_addr: peer(),
                local_ip: Ipv4Addr::new(10, 0, 0, 1),
                ..config
            },
            Arc::new(Recycler::new(&PoolConfig::default())),
        )
    }

    fn conn() -> (Conn, ConnHandles) {
        conn_with(ConnConfig::default())
    }

    fn sent(handles: &mut ConnHandles, recycler: &Recycler) -> Message {
        let (data, _) = handles.outbound.try_recv().unwrap();
        decode_message(data, recycler).unwrap()
    }

    #[test]
    fn test_create_session_sends_request() {
        let (conn, mut handles) = conn();
        let seq = conn.create_session(IMSI).unwrap();

        let (data, dest) = handles.outbound.try_recv().unwrap();
        assert_eq!(dest, peer());
        let msg = decode_message(data, conn.recycler()).unwrap();
        assert_eq!(msg.message_type(), MessageType::CreateSessionRequest);
        assert_eq!(msg.sequence_number(), seq);
        assert_eq!(msg.header.teid, Some(0));

        let session = conn.get_session_by_imsi(IMSI).unwrap();
        assert_eq!(session.state, SessionState::Pending);
        let local_teid = session.get_teid(InterfaceType::S11MmeGtpc).unwrap();

        match &msg.body {
            Body::CreateSessionRequest(req) => {
                assert_eq!(req.imsi.as_ref().unwrap().imsi().unwrap(), IMSI);
                let fteid = req.sender_fteid_c.as_ref().unwrap();
                assert_eq!(fteid.teid().unwrap(), local_teid);
                assert_eq!(fteid.interface_type().unwrap(), InterfaceType::S11MmeGtpc);
                assert_eq!(fteid.ip_address().unwrap(), IpAddr::from([10, 0, 0, 1]));
                assert_eq!(req.apn.as_ref().unwrap().apn().unwrap(), "internet");
                assert_eq!(req.bearer_contexts_to_be_created.len(), 1);
            }
            other => panic!("unexpected body {:?}", other),
        }

        assert_eq!(conn.get_session_by_teid(local_teid, peer()).unwrap().imsi, IMSI);
        assert_eq!(conn.pending_requests(), 1);
        assert!(matches!(conn.create_session(IMSI), Err(GtpError::SessionExists(_))));
    }

    #[test]
    fn test_create_session_rejects_bad_imsi() {
        let (conn, _handles) = conn();
        assert!(matches!(conn.create_session("0010x"), Err(GtpError::Malformed(_))));
        assert_eq!(conn.sessions().session_count(), 0);
    }

    #[test]
    fn test_echo_request_is_answered() {
        let (conn, mut handles) = conn_with(ConnConfig {
            restart_counter: 7,
            ..ConnConfig::default()
        });
        let mut req = EchoRequest::default();
        req.recovery = Some(Ie::new_recovery(3));
        let data = Message::new(conn.recycler(), req, None, 0x42).encode().unwrap().freeze();

        conn.handle(data, peer()).unwrap();

        let rsp = sent(&mut handles, conn.recycler());
        assert_eq!(rsp.message_type(), MessageType::EchoResponse);
        assert_eq!(rsp.sequence_number(), 0x42);
        match &rsp.body {
            Body::EchoResponse(body) => {
                assert_eq!(body.recovery.as_ref().unwrap().recovery().unwrap(), 7)
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_echo_round_trip_clears_pending() {
        let (conn, mut handles) = conn();
        let seq = conn.echo(peer()).unwrap();
        let _ = sent(&mut handles, conn.recycler());
        assert_eq!(conn.pending_requests(), 1);

        let mut rsp = EchoResponse::default();
        rsp.recovery = Some(Ie::new_recovery(1));
        let data = Message::new(conn.recycler(), rsp, None, seq).encode().unwrap().freeze();
        conn.handle(data, peer()).unwrap();
        assert_eq!(conn.pending_requests(), 0);
    }

    #[test]
    fn test_unmatched_response_dropped() {
        let (conn, _handles) = conn();
        let mut rsp = ModifyBearerResponse::default();
        rsp.cause = Some(Ie::new_cause(Cause::RequestAccepted));
        let data = Message::new(conn.recycler(), rsp, Some(1), 99).encode().unwrap().freeze();
        assert!(conn.handle(data, peer()).is_ok());
    }

    #[test]
    fn test_unhandled_policy() {
        let data = Message::new(
            &Recycler::new(&PoolConfig::default()),
            crate::gtpv2::messages::CreateBearerRequest::default(),
            Some(1),
            5,
        )
        .encode()
        .unwrap()
        .freeze();

        let (conn, _handles) = conn();
        assert!(conn.handle(data.clone(), peer()).is_ok());

        let (conn, _handles) = conn_with(ConnConfig {
            unhandled: UnhandledPolicy::Reject,
            ..ConnConfig::default()
        });
        assert!(matches!(
            conn.handle(data, peer()),
            Err(GtpError::NoHandler(MessageType::CreateBearerRequest))
        ));
    }

    #[test]
    fn test_registered_handler_replaces_default() {
        let (conn, _handles) = conn();
        conn.register_handler(MessageType::EchoRequest, |_, _, msg| {
            Err(GtpError::UnexpectedMessage(msg.message_type()))
        });
        let data = Message::new(conn.recycler(), EchoRequest::default(), None, 1)
            .encode()
            .unwrap()
            .freeze();
        assert!(matches!(
            conn.handle(data, peer()),
            Err(GtpError::UnexpectedMessage(MessageType::EchoRequest))
        ));
    }

    #[test]
    fn test_malformed_datagram() {
        let (conn, _handles) = conn();
        let err = conn.handle(Bytes::from_static(&[0x48, 0x01]), peer()).unwrap_err();
        assert!(matches!(err, GtpError::Malformed(_)));
    }

    #[test]
    fn test_timeouts_retransmit_then_discard() {
        let (conn, mut handles) = conn_with(ConnConfig {
            retry_timeout: Duration::ZERO,
            max_retries: 1,
            ..ConnConfig::default()
        });
        conn.create_session(IMSI).unwrap();
        let (first, _) = handles.outbound.try_recv().unwrap();
        let local_teid = conn
            .get_session_by_imsi(IMSI)
            .unwrap()
            .get_teid(InterfaceType::S11MmeGtpc)
            .unwrap();

        conn.poll_timeouts().unwrap();
        let (again, dest) = handles.outbound.try_recv().unwrap();
        assert_eq!(again, first);
        assert_eq!(dest, peer());
        assert!(conn.get_session_by_imsi(IMSI).is_ok());

        conn.poll_timeouts().unwrap();
        assert!(handles.outbound.try_recv().is_err());
        assert!(matches!(conn.get_session_by_imsi(IMSI), Err(GtpError::SessionNotFound)));
        assert!(conn.get_session_by_teid(local_teid, peer()).is_err());
        assert_eq!(conn.pending_requests(), 0);
        assert!(matches!(
            handles.events.try_recv().unwrap(),
            SessionEvent::Discarded { .. }
        ));

        // The TEID went back to the allocator and the IMSI can start over.
        conn.create_session(IMSI).unwrap();
    }

    #[test]
    fn test_modify_and_delete_need_peer_teid() {
        let (conn, _handles) = conn();
        conn.create_session(IMSI).unwrap();
        assert!(matches!(
            conn.modify_bearer(IMSI, 1, Ipv4Addr::new(192, 168, 0, 10)),
            Err(GtpError::SessionNotFound)
        ));
        assert!(matches!(conn.delete_session(IMSI), Err(GtpError::SessionNotFound)));
        assert!(matches!(
            conn.delete_session("001010000000002"),
            Err(GtpError::SessionNotFound)
        ));
    }

    #[test]
    fn test_peer_signalled_teid_cannot_take_over_lookup() {
        let (conn, mut handles) = conn();
        let first = "001010000000001";
        let second = "001010000000002";
        conn.create_session(first).unwrap();
        let seq = conn.create_session(second).unwrap();
        let _ = handles.outbound.try_recv();
        let _ = handles.outbound.try_recv();

        let local = |imsi: &str| {
            conn.get_session_by_imsi(imsi)
                .unwrap()
                .get_teid(InterfaceType::S11MmeGtpc)
                .unwrap()
        };
        let (first_teid, second_teid) = (local(first), local(second));

        // The second session's bearer context echoes the first session's TEID.
        let mut rsp = CreateSessionResponse::default();
        rsp.cause = Some(Ie::new_cause(Cause::RequestAccepted));
        rsp.sender_fteid_c = Some(Ie::new_fteid(InterfaceType::S11S4SgwGtpc, 0x99, None, None));
        rsp.bearer_contexts_created.push(Ie::new_bearer_context(vec![
            Ie::new_eps_bearer_id(5),
            Ie::new_fteid(InterfaceType::S11MmeGtpc, first_teid, None, None),
        ]));
        let data = Message::new(conn.recycler(), rsp, Some(second_teid), seq)
            .encode()
            .unwrap()
            .freeze();
        conn.handle(data, peer()).unwrap();

        assert_eq!(conn.get_session_by_teid(first_teid, peer()).unwrap().imsi, first);
        assert_eq!(conn.get_session_by_teid(second_teid, peer()).unwrap().imsi, second);
        assert_eq!(conn.teids.in_use(), 2);

        conn.remove_session(second).unwrap();
        assert_eq!(conn.get_session_by_teid(first_teid, peer()).unwrap().imsi, first);
        assert_eq!(conn.teids.in_use(), 1);
        assert!(conn.get_session_by_teid(second_teid, peer()).is_err());
    }

    #[test]
    fn test_remove_session_is_idempotent() {
        let (conn, _handles) = conn();
        conn.create_session(IMSI).unwrap();
        let removed = conn.remove_session(IMSI).unwrap();
        assert_eq!(removed.state, SessionState::Released);
        assert!(conn.remove_session(IMSI).is_none());
    }
}
