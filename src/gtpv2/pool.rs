use super::header::Header;
use super::ie::Ie;
use super::messages::{
    CreateBearerRequest, CreateBearerResponse, CreateSessionRequest, CreateSessionResponse,
    DeleteSessionRequest, DeleteSessionResponse, EchoRequest, EchoResponse, ModifyBearerRequest,
    ModifyBearerResponse, ReleaseAccessBearersRequest, ReleaseAccessBearersResponse,
};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneConfig {
    pub capacity: usize,
    pub lanes: usize,
}

impl LaneConfig {
    pub const fn new(capacity: usize, lanes: usize) -> Self {
        Self { capacity, lanes }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_ies")]
    pub ies: LaneConfig,
    #[serde(default = "default_ie_slices")]
    pub ie_slices: LaneConfig,
    #[serde(default = "default_headers")]
    pub headers: LaneConfig,
    #[serde(default = "default_messages")]
    pub messages: LaneConfig,
}

fn default_ies() -> LaneConfig {
    LaneConfig::new(100, 32)
}

fn default_ie_slices() -> LaneConfig {
    LaneConfig::new(100, 4)
}

fn default_headers() -> LaneConfig {
    LaneConfig::new(100, 1)
}

fn default_messages() -> LaneConfig {
    LaneConfig::new(100, 1)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            ies: default_ies(),
            ie_slices: default_ie_slices(),
            headers: default_headers(),
            messages: default_messages(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub allocs: u64,
    pub drops: u64,
    pub gets: u64,
    pub releases: u64,
}

impl std::ops::Add for PoolStats {
    type Output = PoolStats;

    fn add(self, other: PoolStats) -> PoolStats {
        PoolStats {
            allocs: self.allocs + other.allocs,
            drops: self.drops + other.drops,
            gets: self.gets + other.gets,
            releases: self.releases + other.releases,
        }
    }
}

/// Lanes are only ever `try_lock`ed: a busy lane means a fresh allocation on
/// `get` and a dropped object on `release`.
pub struct Pool<T> {
    lanes: Vec<Mutex<Vec<T>>>,
    capacity: usize,
    allocs: AtomicU64,
    drops: AtomicU64,
    gets: AtomicU64,
    releases: AtomicU64,
}

impl<T: Default> Pool<T> {
    pub fn new(config: LaneConfig) -> Self {
        let lanes = (0..config.lanes.max(1))
            .map(|_| Mutex::new(Vec::new()))
            .collect();
        Self {
            lanes,
            capacity: config.capacity,
            allocs: AtomicU64::new(0),
            drops: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    fn pick_lane(&self) -> &Mutex<Vec<T>> {
        let idx = if self.lanes.len() == 1 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.lanes.len())
        };
        &self.lanes[idx]
    }

    pub fn get(&self) -> T {
        self.gets.fetch_add(1, Ordering::Relaxed);
        if let Some(mut lane) = self.pick_lane().try_lock() {
            if let Some(item) = lane.pop() {
                return item;
            }
        }
        self.allocs.fetch_add(1, Ordering::Relaxed);
        T::default()
    }

    /// Hands back an object that has already been reset.
    fn offer(&self, item: T) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        if let Some(mut lane) = self.pick_lane().try_lock() {
            if lane.len() < self.capacity {
                lane.push(item);
                return;
            }
        }
        self.drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocs: self.allocs.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
        }
    }

    pub fn idle(&self) -> usize {
        self.lanes.iter().map(|lane| lane.lock().len()).sum()
    }
}

pub trait Recyclable: Default + Sized {
    fn pool(recycler: &Recycler) -> &Pool<Self>;

    /// Returns every field to its zero value, keeping buffer capacity, and
    /// releases any objects this one owns.
    fn reset(&mut self, recycler: &Recycler);
}

impl Recyclable for Ie {
    fn pool(recycler: &Recycler) -> &Pool<Self> {
        &recycler.ies
    }

    fn reset(&mut self, recycler: &Recycler) {
        self.clear();
        let children = std::mem::take(&mut self.child_ies);
        if children.capacity() > 0 {
            recycler.release(children);
        }
    }
}

impl Recyclable for Vec<Ie> {
    fn pool(recycler: &Recycler) -> &Pool<Self> {
        &recycler.ie_slices
    }

    fn reset(&mut self, recycler: &Recycler) {
        for ie in self.drain(..) {
            recycler.release(ie);
        }
    }
}

impl Recyclable for Header {
    fn pool(recycler: &Recycler) -> &Pool<Self> {
        &recycler.headers
    }

    fn reset(&mut self, _recycler: &Recycler) {
        *self = Header::default();
    }
}

pub struct MessagePools {
    pub(crate) echo_requests: Pool<EchoRequest>,
    pub(crate) echo_responses: Pool<EchoResponse>,
    pub(crate) create_session_requests: Pool<CreateSessionRequest>,
    pub(crate) create_session_responses: Pool<CreateSessionResponse>,
    pub(crate) modify_bearer_requests: Pool<ModifyBearerRequest>,
    pub(crate) modify_bearer_responses: Pool<ModifyBearerResponse>,
    pub(crate) delete_session_requests: Pool<DeleteSessionRequest>,
    pub(crate) delete_session_responses: Pool<DeleteSessionResponse>,
    pub(crate) create_bearer_requests: Pool<CreateBearerRequest>,
    pub(crate) create_bearer_responses: Pool<CreateBearerResponse>,
    pub(crate) release_access_bearers_requests: Pool<ReleaseAccessBearersRequest>,
    pub(crate) release_access_bearers_responses: Pool<ReleaseAccessBearersResponse>,
}

impl MessagePools {
    fn new(config: LaneConfig) -> Self {
        Self {
            echo_requests: Pool::new(config),
            echo_responses: Pool::new(config),
            create_session_requests: Pool::new(config),
            create_session_responses: Pool::new(config),
            modify_bearer_requests: Pool::new(config),
            modify_bearer_responses: Pool::new(config),
            delete_session_requests: Pool::new(config),
            delete_session_responses: Pool::new(config),
            create_bearer_requests: Pool::new(config),
            create_bearer_responses: Pool::new(config),
            release_access_bearers_requests: Pool::new(config),
            release_access_bearers_responses: Pool::new(config),
        }
    }

    fn stats(&self) -> PoolStats {
        self.echo_requests.stats()
            + self.echo_responses.stats()
            + self.create_session_requests.stats()
            + self.create_session_responses.stats()
            + self.modify_bearer_requests.stats()
            + self.modify_bearer_responses.stats()
            + self.delete_session_requests.stats()
            + self.delete_session_responses.stats()
            + self.create_bearer_requests.stats()
            + self.create_bearer_responses.stats()
            + self.release_access_bearers_requests.stats()
            + self.release_access_bearers_responses.stats()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecyclerStats {
    pub ies: PoolStats,
    pub ie_slices: PoolStats,
    pub headers: PoolStats,
    pub messages: PoolStats,
}

pub struct Recycler {
    ies: Pool<Ie>,
    ie_slices: Pool<Vec<Ie>>,
    headers: Pool<Header>,
    pub(crate) messages: MessagePools,
}

impl Recycler {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            ies: Pool::new(config.ies),
            ie_slices: Pool::new(config.ie_slices),
            headers: Pool::new(config.headers),
            messages: MessagePools::new(config.messages),
        }
    }

    pub fn get<T: Recyclable>(&self) -> T {
        T::pool(self).get()
    }

    pub fn release<T: Recyclable>(&self, mut item: T) {
        item.reset(self);
        T::pool(self).offer(item);
    }

    pub fn release_opt<T: Recyclable>(&self, item: Option<T>) {
        if let Some(item) = item {
            self.release(item);
        }
    }

    pub fn get_ie(&self) -> Ie {
        self.get()
    }

    pub fn release_ie(&self, ie: Ie) {
        self.release(ie)
    }

    pub fn get_ie_slice(&self) -> Vec<Ie> {
        self.get()
    }

    /// Releases every IE in the list and then the list itself.
    pub fn release_ie_slice(&self, ies: Vec<Ie>) {
        self.release(ies)
    }

    pub fn get_header(&self) -> Header {
        self.get()
    }

    pub fn release_header(&self, header: Header) {
        self.release(header)
    }

    pub fn stats(&self) -> RecyclerStats {
        RecyclerStats {
            ies: self.ies.stats(),
            ie_slices: self.ie_slices.stats(),
            headers: self.headers.stats(),
            messages: self.messages.stats(),
        }
    }

    pub fn idle_ies(&self) -> usize {
        self.ies.idle()
    }
}

impl Default for Recycler {
    fn default() -> Self {
        Self::new(&PoolConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtpv2::types::{IeType, InterfaceType, MessageType};
    use std::sync::Arc;
    use std::thread;

    fn single_lane(capacity: usize) -> Recycler {
        let lane = LaneConfig::new(capacity, 1);
        Recycler::new(&PoolConfig {
            ies: lane,
            ie_slices: lane,
            headers: lane,
            messages: lane,
        })
    }

    #[test]
    fn test_get_allocates_when_empty() {
        let recycler = single_lane(4);
        let ie = recycler.get_ie();
        assert_eq!(ie, Ie::default());

        let stats = recycler.stats().ies;
        assert_eq!(stats.gets, 1);
        assert_eq!(stats.allocs, 1);
    }

    #[test]
    fn test_released_ie_is_zeroed_and_keeps_capacity() {
        let recycler = single_lane(4);
        let mut ie = recycler.get_ie();
        ie.ie_type = IeType::Apn;
        ie.set_instance(3);
        ie.length = 64;
        ie.payload.extend_from_slice(&[0xaa; 64]);
        let capacity = ie.payload.capacity();
        recycler.release_ie(ie);

        let reused = recycler.get_ie();
        assert_eq!(reused.ie_type, IeType::default());
        assert_eq!(reused.length, 0);
        assert_eq!(reused.instance(), 0);
        assert!(reused.payload.is_empty());
        assert!(reused.child_ies.is_empty());
        assert!(reused.payload.capacity() >= capacity);
        assert_eq!(recycler.stats().ies.allocs, 1);
    }

    #[test]
    fn test_release_grouped_recycles_children() {
        let recycler = single_lane(8);
        let ctx = Ie::new_bearer_context(vec![
            Ie::new_eps_bearer_id(5),
            Ie::new_fteid(InterfaceType::S11MmeGtpc, 1, None, None),
        ]);
        recycler.release_ie(ctx);

        assert_eq!(recycler.idle_ies(), 3);
        assert_eq!(recycler.stats().ie_slices.releases, 1);
        let list: Vec<Ie> = recycler.get_ie_slice();
        assert!(list.is_empty());
        assert!(list.capacity() >= 2);
    }

    #[test]
    fn test_full_lane_drops() {
        let recycler = single_lane(1);
        recycler.release_ie(Ie::new_recovery(1));
        recycler.release_ie(Ie::new_recovery(2));

        let stats = recycler.stats().ies;
        assert_eq!(stats.releases, 2);
        assert_eq!(stats.drops, 1);
        assert_eq!(recycler.idle_ies(), 1);
    }

    #[test]
    fn test_release_none_is_noop() {
        let recycler = single_lane(1);
        recycler.release_opt::<Ie>(None);
        assert_eq!(recycler.stats().ies, PoolStats::default());
    }

    #[test]
    fn test_header_pool_resets() {
        let recycler = single_lane(2);
        let mut header = recycler.get_header();
        header.message_type = MessageType::CreateSessionRequest;
        header.teid = Some(7);
        header.sequence_number = 99;
        recycler.release_header(header);

        assert_eq!(recycler.get_header(), Header::default());
        assert_eq!(recycler.stats().headers.allocs, 1);
    }

    #[test]
    fn test_zero_lanes_clamped() {
        let pool: Pool<Ie> = Pool::new(LaneConfig::new(4, 0));
        let _ = pool.get();
        assert_eq!(pool.stats().allocs, 1);
    }

    #[test]
    fn test_concurrent_get_release() {
        let recycler = Arc::new(Recycler::new(&PoolConfig {
            ies: LaneConfig::new(16, 4),
            ..PoolConfig::default()
        }));

        let workers: Vec<_> = (0..8u8)
            .map(|id| {
                let recycler = Arc::clone(&recycler);
                thread::spawn(move || {
                    for round in 0..1000u32 {
                        let mut ie = recycler.get_ie();
                        assert!(ie.payload.is_empty());
                        assert_eq!(ie.ie_type, IeType::default());
                        ie.ie_type = IeType::Recovery;
                        ie.payload.push(id);
                        ie.payload.extend_from_slice(&round.to_be_bytes());
                        assert_eq!(ie.payload[0], id);
                        recycler.release_ie(ie);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let stats = recycler.stats().ies;
        assert_eq!(stats.gets, 8000);
        assert_eq!(stats.releases, 8000);
        assert!(stats.allocs <= stats.gets);
        assert!(recycler.idle_ies() <= 16 * 4);
    }
}
