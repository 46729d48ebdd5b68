//! Endpoint addressing and gadget-scoped global ids.
//!
//! Every cross-entity reference (grab targets, haptic targets, notification
//! targets) is an [`EndpointAddr`]. Sub-objects that live inside a gadget's
//! scene graph (pokers, panels, grabbers, grabbables) are additionally named by
//! a 64-bit [`GlobalId`]: the owning gadget id in the high word and the local
//! node id in the low word.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Gadget-scoped 64-bit id: `(gadget_id << 32) | local_id`.
pub type GlobalId = u64;

/// Read a global id from a payload value: an unsigned integer or its
/// decimal string. Ids past 2^53 arrive as strings over the binary codec.
#[must_use]
pub fn global_id_from_json(value: &Value) -> Option<GlobalId> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub(crate) fn deserialize_global_id<'de, D>(deserializer: D) -> Result<GlobalId, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    global_id_from_json(&value).ok_or_else(|| D::Error::custom(format!("expected global id, got {value}")))
}

pub(crate) fn deserialize_global_ids<'de, D>(deserializer: D) -> Result<Vec<GlobalId>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<Value>::deserialize(deserializer)?
        .iter()
        .map(|value| global_id_from_json(value).ok_or_else(|| D::Error::custom(format!("expected global id, got {value}"))))
        .collect()
}

/// Combine a gadget id and a local node id into a global id.
#[must_use]
pub fn compose(gadget_id: u32, local_id: u32) -> GlobalId {
    (u64::from(gadget_id) << 32) | u64::from(local_id)
}

/// Split a global id back into `(gadget_id, local_id)`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn decompose(global_id: GlobalId) -> (u32, u32) {
    ((global_id >> 32) as u32, global_id as u32)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddrError {
    #[error("endpoint address must have three ':'-separated parts: {0}")]
    Shape(String),
    #[error("unknown endpoint type tag: {0}")]
    UnknownType(String),
    #[error("invalid endpoint number: {0}")]
    Number(String),
}

/// What kind of endpoint an address names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
    #[default]
    Unknown,
    Hub,
    Gadget,
    Node,
    Monitor,
    Renderer,
}

impl EndpointType {
    /// Single-letter tag used by the string form.
    #[must_use]
    pub fn tag(self) -> char {
        match self {
            Self::Unknown => 'U',
            Self::Hub => 'H',
            Self::Gadget => 'G',
            Self::Node => 'N',
            Self::Monitor => 'M',
            Self::Renderer => 'R',
        }
    }

    fn from_tag(tag: &str) -> Result<Self, AddrError> {
        match tag {
            "U" => Ok(Self::Unknown),
            "H" => Ok(Self::Hub),
            "G" => Ok(Self::Gadget),
            "N" => Ok(Self::Node),
            "M" => Ok(Self::Monitor),
            "R" => Ok(Self::Renderer),
            other => Err(AddrError::UnknownType(other.to_owned())),
        }
    }
}

/// Universal address: `{type, endpointId, nodeId}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointAddr {
    #[serde(rename = "type")]
    pub kind: EndpointType,
    pub endpoint_id: u32,
    #[serde(default)]
    pub node_id: u32,
}

impl EndpointAddr {
    #[must_use]
    pub fn new(kind: EndpointType, endpoint_id: u32, node_id: u32) -> Self {
        Self { kind, endpoint_id, node_id }
    }

    /// Address of a node inside a gadget's scene graph.
    #[must_use]
    pub fn node(gadget_id: u32, node_id: u32) -> Self {
        Self::new(EndpointType::Node, gadget_id, node_id)
    }

    /// Recover a node address from a gadget-scoped global id.
    #[must_use]
    pub fn from_global(global_id: GlobalId) -> Self {
        let (gadget_id, node_id) = decompose(global_id);
        Self::node(gadget_id, node_id)
    }

    /// Global id for a node address; `None` for every other endpoint type.
    #[must_use]
    pub fn global_id(&self) -> Option<GlobalId> {
        match self.kind {
            EndpointType::Node => Some(compose(self.endpoint_id, self.node_id)),
            _ => None,
        }
    }
}

impl fmt::Display for EndpointAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind.tag(), self.endpoint_id, self.node_id)
    }
}

impl FromStr for EndpointAddr {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(tag), Some(endpoint), Some(node), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AddrError::Shape(s.to_owned()));
        };
        let kind = EndpointType::from_tag(tag)?;
        let endpoint_id = endpoint
            .parse()
            .map_err(|_| AddrError::Number(endpoint.to_owned()))?;
        let node_id = node
            .parse()
            .map_err(|_| AddrError::Number(node.to_owned()))?;
        Ok(Self { kind, endpoint_id, node_id })
    }
}

#[cfg(test)]
#[path = "addr_test.rs"]
mod tests;
