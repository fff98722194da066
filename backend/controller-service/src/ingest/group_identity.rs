//! Consumer group identity
//!
//! Kafka splits a topic across every consumer that shares a `group.id`. Each
//! controller instance has to see the full stream so it can serve its own
//! WebSocket clients, so every instance joins a group of its own.

use std::env;
use std::fs;
use uuid::Uuid;

const GROUP_PREFIX: &str = "controller-";

/// Consumer group id for the given instance identity.
pub fn group_id(instance_identity: &str) -> String {
    format!("{GROUP_PREFIX}{instance_identity}")
}

/// Stable identity of the running instance.
///
/// `HOSTNAME` (the pod name under Kubernetes) wins, then the OS host name,
/// then a random token so the instance still gets a group of its own.
pub fn instance_identity() -> String {
    resolve_identity(env::var("HOSTNAME").ok(), read_os_hostname())
}

fn read_os_hostname() -> Option<String> {
    fs::read_to_string("/etc/hostname").ok()
}

fn resolve_identity(env_hostname: Option<String>, os_hostname: Option<String>) -> String {
    [env_hostname, os_hostname]
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_id_format() {
        assert_eq!(group_id("pod-1"), "controller-pod-1");
        assert_eq!(
            group_id("controller-6b8f9c-x2kqp"),
            "controller-controller-6b8f9c-x2kqp"
        );
    }

    #[test]
    fn test_group_id_is_stable_per_identity() {
        assert_eq!(group_id("pod-1"), group_id("pod-1"));
    }

    #[test]
    fn test_group_id_differs_between_instances() {
        assert_ne!(group_id("pod-1"), group_id("pod-2"));
    }

    #[test]
    fn test_identity_prefers_env_hostname() {
        let identity = resolve_identity(Some("pod-a".into()), Some("node-1\n".into()));
        assert_eq!(identity, "pod-a");
    }

    #[test]
    fn test_identity_falls_back_to_os_hostname() {
        let identity = resolve_identity(None, Some("node-1\n".into()));
        assert_eq!(identity, "node-1");

        let identity = resolve_identity(Some("   ".into()), Some("node-2".into()));
        assert_eq!(identity, "node-2");
    }

    #[test]
    fn test_identity_generates_unique_token_without_source() {
        let a = resolve_identity(None, None);
        let b = resolve_identity(None, Some(String::new()));

        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert_ne!(group_id(&a), group_id(&b));
    }
}
