// SPDX-License-Identifier: MIT
// Copyright(c) 2024 Darek Stojaczyk

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Live connections across all endpoints, keyed by endpoint port
/// and remote IP.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashSet<(u16, IpAddr)>>,
    live: AtomicUsize,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn entries(&self) -> MutexGuard<'_, HashSet<(u16, IpAddr)>> {
        // the set is always left consistent, so a poisoned lock is still usable
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new connection. Returns `None` if the same IP is
    /// already connected to the same endpoint. The entry is removed
    /// when the returned guard is dropped.
    pub fn try_register(self: &Arc<Self>, port: u16, ip: IpAddr) -> Option<RegistryGuard> {
        if !self.entries().insert((port, ip)) {
            return None;
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Some(RegistryGuard {
            registry: self.clone(),
            key: (port, ip),
        })
    }

    pub fn contains(&self, port: u16, ip: IpAddr) -> bool {
        self.entries().contains(&(port, ip))
    }

    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct RegistryGuard {
    registry: Arc<ConnectionRegistry>,
    key: (u16, IpAddr),
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.entries().remove(&self.key);
        self.registry.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn one_per_ip_and_endpoint() {
        let registry = ConnectionRegistry::new();
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        let g1 = registry.try_register(12000, a).unwrap();
        assert!(registry.try_register(12000, a).is_none());
        let g2 = registry.try_register(12001, a).unwrap();
        let g3 = registry.try_register(12000, b).unwrap();
        assert_eq!(registry.live_count(), 3);
        assert!(registry.contains(12000, a));

        drop(g1);
        assert!(!registry.contains(12000, a));
        assert_eq!(registry.live_count(), 2);
        let _g4 = registry.try_register(12000, a).unwrap();

        drop((g2, g3));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn released_on_panic() {
        let registry = ConnectionRegistry::new();
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let r = registry.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = r.try_register(1, ip).unwrap();
            panic!("handler failure");
        }));
        assert!(result.is_err());
        assert_eq!(registry.live_count(), 0);
        assert!(!registry.contains(1, ip));
    }
}
