//! Monitored object identity and dependency edges

use crate::error::VigilError;
use crate::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type NodeId = i64;

/// Type of a monitored object. Anything outside the known inventory
/// types is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Region,
    Datacenter,
    Instance,
    Service,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Region => "region",
            NodeKind::Datacenter => "datacenter",
            NodeKind::Instance => "instance",
            NodeKind::Service => "service",
            NodeKind::Other(name) => name,
        }
    }
}

impl From<String> for NodeKind {
    fn from(name: String) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "region" => NodeKind::Region,
            "datacenter" => NodeKind::Datacenter,
            "instance" => NodeKind::Instance,
            "service" => NodeKind::Service,
            _ => NodeKind::Other(name),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(type, id)` identity of a monitored object, written `type:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub kind: NodeKind,
    pub id: NodeId,
}

impl NodeRef {
    pub fn new(kind: NodeKind, id: NodeId) -> Self {
        Self { kind, id }
    }

    pub fn region(id: NodeId) -> Self {
        Self::new(NodeKind::Region, id)
    }

    pub fn datacenter(id: NodeId) -> Self {
        Self::new(NodeKind::Datacenter, id)
    }

    pub fn instance(id: NodeId) -> Self {
        Self::new(NodeKind::Instance, id)
    }

    pub fn service(id: NodeId) -> Self {
        Self::new(NodeKind::Service, id)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for NodeRef {
    type Err = VigilError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || VigilError::InvalidNodeRef {
            input: input.to_string(),
        };
        let (kind, id) = input.rsplit_once(':').ok_or_else(invalid)?;
        if kind.trim().is_empty() {
            return Err(invalid());
        }
        let id = id.trim().parse::<NodeId>().map_err(|_| invalid())?;
        Ok(NodeRef::new(NodeKind::from(kind.trim().to_string()), id))
    }
}

/// Current derived status of one monitored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNode {
    pub node: NodeRef,
    pub status: Status,
    pub last_updated: DateTime<Utc>,
}

/// Parent/child edge, mirroring a `StatusDependency` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub parent: NodeRef,
    pub child: NodeRef,
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.parent, self.child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_custom_kinds() {
        let instance: NodeRef = "instance:12".parse().unwrap();
        assert_eq!(instance, NodeRef::instance(12));

        let upper: NodeRef = "Datacenter:3".parse().unwrap();
        assert_eq!(upper, NodeRef::datacenter(3));

        let custom: NodeRef = "http-monitor:9".parse().unwrap();
        assert_eq!(custom.kind, NodeKind::Other("http-monitor".to_string()));
        assert_eq!(custom.to_string(), "http-monitor:9");
    }

    #[test]
    fn test_parse_rejects_malformed_refs() {
        for input in ["instance", ":4", "instance:abc", ""] {
            match input.parse::<NodeRef>() {
                Err(VigilError::InvalidNodeRef { input: echoed }) => assert_eq!(echoed, input),
                other => panic!("Expected InvalidNodeRef for {:?}, got {:?}", input, other),
            }
        }
    }

    #[test]
    fn test_kind_serializes_as_plain_string() {
        let json = serde_json::to_value(NodeRef::service(5)).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "service", "id": 5 }));

        let back: NodeRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, NodeRef::service(5));
    }
}
