//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::load_balancer::LoadBalancer;
use crate::registry::InstanceView;

/// Round-robin selector.
/// Keeps one rotation counter per service so unrelated services never
/// share (or contend on) a cursor.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursors: DashMap<String, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_index(&self, service_name: &str) -> usize {
        if let Some(cursor) = self.cursors.get(service_name) {
            return cursor.fetch_add(1, Ordering::Relaxed);
        }
        self.cursors
            .entry(service_name.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed)
    }
}

impl LoadBalancer for RoundRobin {
    fn next_instance(&self, service_name: &str, instances: &[InstanceView]) -> Option<InstanceView> {
        if instances.is_empty() {
            return None;
        }
        let index = self.next_index(service_name) % instances.len();
        Some(instances[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InstanceStatus;

    fn view(id: &str) -> InstanceView {
        InstanceView {
            instance_id: id.into(),
            service_name: "svc".into(),
            host: "127.0.0.1".into(),
            port: 8080,
            status: InstanceStatus::Up,
            last_heartbeat_ago_ms: 0,
            lease_remaining_ms: 30_000,
        }
    }

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let instances = vec![view("a"), view("b")];

        let picks: Vec<_> = (0..4)
            .map(|_| lb.next_instance("svc", &instances).unwrap().instance_id)
            .collect();
        assert_eq!(picks, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_cursor_per_service() {
        let lb = RoundRobin::new();
        let instances = vec![view("a"), view("b")];

        assert_eq!(lb.next_instance("one", &instances).unwrap().instance_id, "a");
        // A different service starts its own rotation.
        assert_eq!(lb.next_instance("two", &instances).unwrap().instance_id, "a");
        assert_eq!(lb.next_instance("one", &instances).unwrap().instance_id, "b");
    }

    #[test]
    fn test_empty_set() {
        let lb = RoundRobin::new();
        assert!(lb.next_instance("svc", &[]).is_none());
    }
}
