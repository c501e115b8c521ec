use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;

/// Caps concurrent inbound connections per client IP. A limit of zero
/// disables the cap.
#[derive(Clone)]
pub struct ClientLimiter {
    max_per_ip: usize,
    counts: Arc<DashMap<IpAddr, usize>>,
}

/// Held for the lifetime of one accepted connection.
pub struct ClientPermit {
    ip: IpAddr,
    counts: Arc<DashMap<IpAddr, usize>>,
}

impl ClientLimiter {
    pub fn new(max_per_ip: usize) -> Self {
        Self {
            max_per_ip,
            counts: Arc::new(DashMap::new()),
        }
    }

    /// Returns `None` when `ip` already holds the maximum number of
    /// connections.
    pub fn try_acquire(&self, ip: IpAddr) -> Option<ClientPermit> {
        let mut count = self.counts.entry(ip).or_insert(0);
        if self.max_per_ip > 0 && *count >= self.max_per_ip {
            return None;
        }
        *count += 1;
        drop(count);

        Some(ClientPermit {
            ip,
            counts: self.counts.clone(),
        })
    }

    pub fn active(&self, ip: IpAddr) -> usize {
        self.counts.get(&ip).map(|c| *c).unwrap_or(0)
    }
}

impl Drop for ClientPermit {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.counts.entry(self.ip) {
            if *entry.get() <= 1 {
                entry.remove();
            } else {
                *entry.get_mut() -= 1;
            }
        }
    }
}
