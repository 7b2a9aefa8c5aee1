use super::conn::Conn;
use super::error::Result;
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const MAX_PACKET_SIZE: usize = 65535;

/// UDP front end for a [`Conn`]: one task per inbound datagram, one task
/// draining the engine's outbound queue.
pub struct GtpcServer {
    socket: Arc<UdpSocket>,
    conn: Arc<Conn>,
}

impl GtpcServer {
    pub async fn bind(addr: SocketAddr, conn: Arc<Conn>) -> Result<Self> {
        info!("Binding GTPv2-C server to {}", addr);
        let socket = UdpSocket::bind(addr).await?;
        info!("GTPv2-C server listening on {}", socket.local_addr()?);

        Ok(Self {
            socket: Arc::new(socket),
            conn,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn spawn_outbound(
        &self,
        mut outbound: mpsc::UnboundedReceiver<(Bytes, SocketAddr)>,
    ) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            while let Some((data, peer)) = outbound.recv().await {
                if let Err(e) = socket.send_to(&data, peer).await {
                    error!("Failed to send {} bytes to {}: {}", data.len(), peer, e);
                }
            }
            debug!("Outbound queue closed");
        })
    }

    pub fn spawn_timeouts(&self, period: Duration) -> JoinHandle<()> {
        let conn = Arc::clone(&self.conn);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = conn.poll_timeouts() {
                    error!("Timeout sweep failed: {}", e);
                    break;
                }
            }
        })
    }

    pub async fn run(&self) -> Result<()> {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, peer_addr)) => {
                    let data = Bytes::copy_from_slice(&buf[..len]);
                    debug!("Received {} bytes from {}", len, peer_addr);

                    let conn = Arc::clone(&self.conn);
                    tokio::spawn(async move {
                        if let Err(e) = conn.handle(data, peer_addr) {
                            warn!("Error handling message from {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error receiving packet: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtpv2::conn::ConnConfig;
    use crate::gtpv2::ie::Ie;
    use crate::gtpv2::messages::EchoRequest;
    use crate::gtpv2::pool::Recycler;
    use crate::gtpv2::registry::{decode_message, Body, Message};
    use crate::gtpv2::types::MessageType;

    #[tokio::test]
    async fn test_echo_over_udp() {
        let (conn, handles) = Conn::new(
            ConnConfig {
                restart_counter: 9,
                ..ConnConfig::default()
            },
            Arc::new(Recycler::default()),
        );
        let server = GtpcServer::bind("127.0.0.1:0".parse().unwrap(), Arc::new(conn))
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        server.spawn_outbound(handles.outbound);
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let recycler = Recycler::default();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut req = EchoRequest::default();
        req.recovery = Some(Ie::new_recovery(1));
        let data = Message::new(&recycler, req, None, 5).encode().unwrap();
        client.send_to(&data, server_addr).await.unwrap();

        let mut buf = [0u8; 1500];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, server_addr);

        let rsp = decode_message(Bytes::copy_from_slice(&buf[..len]), &recycler).unwrap();
        assert_eq!(rsp.message_type(), MessageType::EchoResponse);
        assert_eq!(rsp.sequence_number(), 5);
        match &rsp.body {
            Body::EchoResponse(body) => {
                assert_eq!(body.recovery.as_ref().unwrap().recovery().unwrap(), 9)
            }
            other => panic!("unexpected body {:?}", other),
        }
    }
}
