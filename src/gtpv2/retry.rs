use super::types::MessageType;
use bytes::Bytes;
use dashmap::DashMap;
use log::{debug, warn};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(3);
pub const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF_FACTOR: u32 = 2;

pub type RequestKey = (u32, SocketAddr);

#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Encoded request, resent verbatim on retransmission.
    pub data: Bytes,
    pub peer_addr: SocketAddr,
    pub message_type: MessageType,
    pub imsi: Option<String>,
    pub sent_at: Instant,
    pub retry_count: u32,
    pub base_timeout: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl PendingRequest {
    pub fn new(data: Bytes, peer_addr: SocketAddr, message_type: MessageType) -> Self {
        Self {
            data,
            peer_addr,
            message_type,
            imsi: None,
            sent_at: Instant::now(),
            retry_count: 0,
            base_timeout: DEFAULT_RETRY_TIMEOUT,
            timeout: DEFAULT_RETRY_TIMEOUT,
            max_retries: MAX_RETRIES,
        }
    }

    pub fn with_imsi(mut self, imsi: impl Into<String>) -> Self {
        self.imsi = Some(imsi.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration, max_retries: u32) -> Self {
        self.base_timeout = timeout;
        self.timeout = timeout;
        self.max_retries = max_retries;
        self
    }

    pub fn is_timed_out(&self) -> bool {
        self.sent_at.elapsed() >= self.timeout
    }

    pub fn should_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn next_retry(&mut self) {
        self.retry_count += 1;
        self.sent_at = Instant::now();
        self.timeout = self.base_timeout * RETRY_BACKOFF_FACTOR.pow(self.retry_count);
    }
}

#[derive(Debug, Default)]
pub struct TimeoutSweep {
    pub retransmit: Vec<PendingRequest>,
    pub expired: Vec<(RequestKey, PendingRequest)>,
}

#[derive(Debug, Default)]
pub struct RequestTracker {
    pending: DashMap<RequestKey, PendingRequest>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    pub fn add_request(&self, seq_num: u32, request: PendingRequest) {
        let key = (seq_num, request.peer_addr);
        self.pending.insert(key, request);
        debug!("Added pending request with seq_num: {}", seq_num);
    }

    pub fn remove_request(&self, seq_num: u32, peer: SocketAddr) -> Option<PendingRequest> {
        let request = self.pending.remove(&(seq_num, peer)).map(|(_, r)| r);
        if request.is_some() {
            debug!("Removed pending request with seq_num: {}", seq_num);
        }
        request
    }

    /// Claims the request answered by a response of `response_type`. A request
    /// whose reply type does not match stays outstanding.
    pub fn match_response(
        &self,
        seq_num: u32,
        peer: SocketAddr,
        response_type: MessageType,
    ) -> Option<PendingRequest> {
        let key = (seq_num, peer);
        let expected = self
            .pending
            .get(&key)
            .and_then(|r| r.message_type.response_type())?;
        if expected != response_type {
            warn!(
                "Response {:?} seq {} from {} does not answer a {:?}",
                response_type,
                seq_num,
                peer,
                expected
            );
            return None;
        }
        self.remove_request(seq_num, peer)
    }

    pub fn check_timeouts(&self) -> TimeoutSweep {
        let mut sweep = TimeoutSweep::default();
        let mut to_remove = Vec::new();

        for mut entry in self.pending.iter_mut() {
            let key = *entry.key();
            let request = entry.value_mut();
            if !request.is_timed_out() {
                continue;
            }
            if request.should_retry() {
                warn!(
                    "Request {:?} seq {} to {} timed out (attempt {}/{}), will retry",
                    request.message_type,
                    key.0,
                    key.1,
                    request.retry_count + 1,
                    request.max_retries
                );
                request.next_retry();
                sweep.retransmit.push(request.clone());
            } else {
                warn!(
                    "Request {:?} seq {} to {} exceeded max retries ({}), giving up",
                    request.message_type, key.0, key.1, request.max_retries
                );
                to_remove.push(key);
            }
        }

        for key in to_remove {
            if let Some(entry) = self.pending.remove(&key) {
                sweep.expired.push(entry);
            }
        }

        sweep
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
