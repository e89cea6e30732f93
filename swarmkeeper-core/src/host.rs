//! Registered hosts as reported by the inventory service
//!
//! The inventory owns these records. Reconciliation only reads them and, as an
//! advisory annotation, toggles the [`MANAGER_LABEL`] to reflect elected role.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label marking a host that was elected manager
pub const MANAGER_LABEL: &str = "manager";

/// A registered machine capable of running a container daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// Inventory identifier
    pub id: String,
    /// Hostname
    #[serde(default)]
    pub hostname: String,
    /// Inventory lifecycle state (e.g. `active`)
    #[serde(default)]
    pub state: String,
    /// Address of the host agent, also used to reach the daemon
    #[serde(default)]
    pub agent_ip_address: String,
    /// Free-form labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Host {
    /// Create a host with no labels
    pub fn new(
        id: impl Into<String>,
        hostname: impl Into<String>,
        agent_ip_address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            hostname: hostname.into(),
            state: "active".to_string(),
            agent_ip_address: agent_ip_address.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Address of the container daemon on this host
    pub fn daemon_address(&self, port: u16) -> String {
        format!("{}:{}", self.agent_ip_address, port)
    }

    /// Whether the host carries the manager label
    pub fn is_labeled_manager(&self) -> bool {
        self.labels.contains_key(MANAGER_LABEL)
    }

    /// Copy of this host with the manager label set
    pub fn with_manager_label(&self) -> Self {
        let mut host = self.clone();
        host.labels.insert(MANAGER_LABEL.to_string(), String::new());
        host
    }

    /// Copy of this host with the manager label removed
    pub fn without_manager_label(&self) -> Self {
        let mut host = self.clone();
        host.labels.remove(MANAGER_LABEL);
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_label_toggles() {
        let host = Host::new("1h1", "node-1", "10.0.0.1");
        assert!(!host.is_labeled_manager());

        let labeled = host.with_manager_label();
        assert!(labeled.is_labeled_manager());
        assert_eq!(labeled.labels.get(MANAGER_LABEL).map(String::as_str), Some(""));

        let unlabeled = labeled.without_manager_label();
        assert!(!unlabeled.is_labeled_manager());
        assert_eq!(unlabeled, host);
    }

    #[test]
    fn daemon_address_uses_agent_ip() {
        let host = Host::new("1h1", "node-1", "10.0.0.1");
        assert_eq!(host.daemon_address(2375), "10.0.0.1:2375");
    }

    #[test]
    fn deserializes_inventory_json() {
        let json = r#"{
            "id": "1h7",
            "hostname": "worker-7",
            "state": "active",
            "agentIpAddress": "10.42.0.7",
            "labels": {"io.rancher.host.os": "linux"},
            "uuid": "ignored"
        }"#;
        let host: Host = serde_json::from_str(json).unwrap();
        assert_eq!(host.id, "1h7");
        assert_eq!(host.agent_ip_address, "10.42.0.7");
        assert_eq!(host.labels.len(), 1);
    }

    #[test]
    fn missing_labels_default_to_empty() {
        let json = r#"{"id": "1h8", "agentIpAddress": "10.42.0.8"}"#;
        let host: Host = serde_json::from_str(json).unwrap();
        assert!(host.labels.is_empty());
        assert!(host.hostname.is_empty());
    }
}
