use super::conn::{Conn, SessionEvent};
use super::error::{GtpError, Result};
use super::ie::Ie;
use super::messages::EchoResponse;
use super::registry::{Body, Message};
use super::types::{Cause, IeType, InterfaceType, MessageType};
use crate::types::session::{Bearer, Session, SessionState};
use log::{debug, info, warn};
use std::net::{IpAddr, SocketAddr};

pub fn register_defaults(conn: &Conn) {
    conn.register_handler(MessageType::EchoRequest, echo_request);
    conn.register_handler(MessageType::EchoResponse, echo_response);
    conn.register_handler(MessageType::CreateSessionResponse, create_session_response);
    conn.register_handler(MessageType::ModifyBearerResponse, modify_bearer_response);
    conn.register_handler(MessageType::DeleteSessionResponse, delete_session_response);
}

#[derive(Debug, Default)]
struct BearerUpdate {
    ebi: Option<u8>,
    teids: Vec<(InterfaceType, u32, Option<IpAddr>)>,
}

impl BearerUpdate {
    /// Walks the children of a bearer context. Only instance 0 F-TEIDs are
    /// taken; anything else is skipped.
    fn read(ctx: &Ie, require_address: bool) -> Result<Self> {
        let mut update = BearerUpdate::default();
        for child in &ctx.child_ies {
            match child.ie_type {
                IeType::EpsBearerId => update.ebi = Some(child.eps_bearer_id()?),
                IeType::FullyQualifiedTeid if child.instance() == 0 => {
                    let role = child.interface_type()?;
                    let teid = child.teid()?;
                    let addr = if require_address {
                        Some(child.ip_address()?)
                    } else {
                        child.ip_address().ok()
                    };
                    update.teids.push((role, teid, addr));
                }
                _ => {}
            }
        }
        Ok(update)
    }

    fn apply(&self, bearer: &mut Bearer) {
        if let Some(ebi) = self.ebi {
            bearer.ebi = ebi;
        }
        for (role, teid, _) in &self.teids {
            bearer.add_teid(*role, *teid);
        }
    }

    fn endpoint(&self) -> Option<(SocketAddr, u32)> {
        self.teids
            .last()
            .and_then(|(_, teid, addr)| addr.map(|a| (Conn::data_path_endpoint(a), *teid)))
    }
}

fn check_cause(message_type: MessageType, cause: Option<&Ie>, imsi: &str) -> Result<()> {
    let cause = cause.ok_or_else(|| GtpError::missing(IeType::Cause))?.cause()?;
    if cause != Cause::RequestAccepted {
        warn!("{:?} for subscriber {} rejected: {:?}", message_type, imsi, cause);
        return Err(GtpError::CauseNotOk {
            message_type,
            cause,
            imsi: imsi.to_string(),
        });
    }
    Ok(())
}

/// A session still waiting on its create response cannot be modified or
/// deleted by the peer yet.
fn require_established(conn: &Conn, session: &Session) -> Result<()> {
    if session.state == SessionState::Pending
        && session.get_teid(conn.config().peer_interface).is_err()
    {
        return Err(GtpError::SessionNotFound);
    }
    Ok(())
}

pub fn echo_request(conn: &Conn, peer: SocketAddr, msg: &Message) -> Result<()> {
    let mut rsp: EchoResponse = conn.recycler().get();
    rsp.recovery = Some(Ie::new_recovery(conn.config().restart_counter));
    let reply = Message::new(conn.recycler(), rsp, None, msg.sequence_number());
    conn.send_response(reply, peer)
}

pub fn echo_response(_conn: &Conn, peer: SocketAddr, msg: &Message) -> Result<()> {
    if let Body::EchoResponse(rsp) = &msg.body {
        if let Some(recovery) = &rsp.recovery {
            debug!("Echo Response from {}, restart counter {}", peer, recovery.recovery()?);
        }
    }
    Ok(())
}

pub fn create_session_response(conn: &Conn, peer: SocketAddr, msg: &Message) -> Result<()> {
    let rsp = match &msg.body {
        Body::CreateSessionResponse(rsp) => rsp,
        _ => return Err(GtpError::UnexpectedMessage(msg.message_type())),
    };
    let session = conn.get_session_by_teid(msg.teid(), peer)?;

    check_cause(msg.message_type(), rsp.cause.as_ref(), &session.imsi)?;

    let sender = rsp
        .sender_fteid_c
        .as_ref()
        .ok_or_else(|| GtpError::missing(IeType::FullyQualifiedTeid))?;
    let peer_role = sender.interface_type()?;
    let peer_teid = sender.teid()?;
    let subscriber_ip = rsp.paa.as_ref().map(Ie::ip_address).transpose()?;

    let (first, rest) = rsp
        .bearer_contexts_created
        .split_first()
        .ok_or_else(|| GtpError::missing(IeType::BearerContext))?;
    let default_update = BearerUpdate::read(first, false)?;
    let dedicated = rest
        .iter()
        .map(|ctx| BearerUpdate::read(ctx, false))
        .collect::<Result<Vec<_>>>()?;

    let local_teid = session.get_teid(conn.config().local_interface)?;

    conn.update_session(&session.imsi, |s| {
        s.add_teid(peer_role, peer_teid);
        let bearer = s.default_bearer_mut();
        if subscriber_ip.is_some() {
            bearer.subscriber_ip = subscriber_ip;
        }
        default_update.apply(bearer);
        for update in &dedicated {
            if let Some(ebi) = update.ebi {
                let mut bearer = s.bearer(ebi).cloned().unwrap_or_else(|| Bearer::new(ebi));
                update.apply(&mut bearer);
                s.add_bearer(bearer);
            }
        }
        s.activate()
    })??;

    info!(
        "Session created with {} for subscriber {}: peer TEID {:#x}, local TEID {:#x}",
        peer, session.imsi, peer_teid, local_teid
    );
    conn.publish(SessionEvent::Created {
        imsi: session.imsi.clone(),
    });
    Ok(())
}

pub fn modify_bearer_response(conn: &Conn, peer: SocketAddr, msg: &Message) -> Result<()> {
    let rsp = match &msg.body {
        Body::ModifyBearerResponse(rsp) => rsp,
        _ => return Err(GtpError::UnexpectedMessage(msg.message_type())),
    };
    let session = conn.get_session_by_teid(msg.teid(), peer)?;
    require_established(conn, &session)?;

    check_cause(msg.message_type(), rsp.cause.as_ref(), &session.imsi)?;

    if rsp.bearer_contexts_modified.is_empty() {
        return Err(GtpError::missing(IeType::BearerContext));
    }
    let default_ebi = session.default_bearer().ebi;
    let updates = rsp
        .bearer_contexts_modified
        .iter()
        .map(|ctx| {
            let update = BearerUpdate::read(ctx, true)?;
            Ok((update.ebi.unwrap_or(default_ebi), update))
        })
        .collect::<Result<Vec<_>>>()?;

    conn.update_session(&session.imsi, |s| {
        if let Some((ebi, _)) = updates.iter().find(|(ebi, _)| s.bearer(*ebi).is_none()) {
            return Err(GtpError::BearerNotFound(*ebi));
        }
        for (ebi, update) in &updates {
            if let Some(bearer) = s.bearer_mut(*ebi) {
                update.apply(bearer);
            }
        }
        Ok(())
    })??;

    for (ebi, update) in &updates {
        info!("Bearer {} modified with {} for subscriber {}", ebi, peer, session.imsi);
        if let Some((remote, teid)) = update.endpoint() {
            conn.publish(SessionEvent::Modified {
                imsi: session.imsi.clone(),
                ebi: *ebi,
                remote,
                teid,
            });
        }
    }
    Ok(())
}

pub fn delete_session_response(conn: &Conn, peer: SocketAddr, msg: &Message) -> Result<()> {
    let session = conn.get_session_by_teid(msg.teid(), peer)?;
    require_established(conn, &session)?;

    if let Body::DeleteSessionResponse(rsp) = &msg.body {
        if let Some(Ok(cause)) = rsp.cause.as_ref().map(Ie::cause) {
            if cause != Cause::RequestAccepted {
                warn!(
                    "Delete Session for subscriber {} answered with {:?}, removing anyway",
                    session.imsi, cause
                );
            }
        }
    }

    conn.remove_session(&session.imsi);
    info!("Session deleted with {} for subscriber {}", peer, session.imsi);
    conn.publish(SessionEvent::Deleted {
        imsi: session.imsi.clone(),
    });
    Ok(())
}
