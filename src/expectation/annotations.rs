//! Effective load balancer options from Service annotations

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Prefix of the controller's Service annotations
pub const ANNOTATION_PREFIX: &str = "kubernetes.bizflycloud.vn/";

/// Wrap backend traffic in the PROXY protocol
pub const PROXY_PROTOCOL_ANNOTATION: &str = "kubernetes.bizflycloud.vn/enable-proxy-protocol";
/// "internal" or "external" VIP network
pub const NETWORK_TYPE_ANNOTATION: &str = "kubernetes.bizflycloud.vn/load-balancer-network-type";
/// Comma-separated `key=value` list restricting which nodes become members
pub const TARGET_NODE_LABELS_ANNOTATION: &str = "kubernetes.bizflycloud.vn/target-node-labels";

/// Network a load balancer VIP is allocated on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Internal,
    External,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" => Ok(Self::Internal),
            "external" => Ok(Self::External),
            other => Err(format!("unknown network type {other:?}")),
        }
    }
}

/// What the annotations mean for the resulting topology
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOptions {
    pub proxy_protocol: bool,
    /// `None` when the annotation is absent; the network type is then not checked
    pub network_type: Option<NetworkType>,
    /// Nodes must carry all of these labels to host members
    pub target_node_labels: BTreeMap<String, String>,
}

impl ServiceOptions {
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Result<Self> {
        let mut options = Self::default();

        if let Some(value) = annotations.get(PROXY_PROTOCOL_ANNOTATION) {
            options.proxy_protocol = parse_bool(value).ok_or_else(|| Error::InvalidAnnotation {
                key: PROXY_PROTOCOL_ANNOTATION.to_string(),
                value: value.clone(),
                reason: "expected true or false".to_string(),
            })?;
        }

        if let Some(value) = annotations.get(NETWORK_TYPE_ANNOTATION) {
            options.network_type =
                Some(value.parse().map_err(|reason| Error::InvalidAnnotation {
                    key: NETWORK_TYPE_ANNOTATION.to_string(),
                    value: value.clone(),
                    reason,
                })?);
        }

        if let Some(value) = annotations.get(TARGET_NODE_LABELS_ANNOTATION) {
            options.target_node_labels =
                parse_label_list(value).map_err(|reason| Error::InvalidAnnotation {
                    key: TARGET_NODE_LABELS_ANNOTATION.to_string(),
                    value: value.clone(),
                    reason,
                })?;
        }

        for key in annotations.keys() {
            let known = [
                PROXY_PROTOCOL_ANNOTATION,
                NETWORK_TYPE_ANNOTATION,
                TARGET_NODE_LABELS_ANNOTATION,
            ];
            if key.starts_with(ANNOTATION_PREFIX) && !known.contains(&key.as_str()) {
                debug!("Annotation {} does not affect the expected topology", key);
            }
        }

        Ok(options)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Parse `env=staging,zone=hn-1` into a label map
fn parse_label_list(value: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    let mut labels = BTreeMap::new();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, val) = pair
            .split_once('=')
            .ok_or_else(|| format!("{pair:?} is not key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("{pair:?} has an empty key"));
        }
        labels.insert(key.to_string(), val.trim().to_string());
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_without_annotations() {
        let options = ServiceOptions::from_annotations(&BTreeMap::new()).unwrap();
        assert_eq!(options, ServiceOptions::default());
    }

    #[test]
    fn test_all_annotations() {
        let options = ServiceOptions::from_annotations(&annotations(&[
            (PROXY_PROTOCOL_ANNOTATION, "true"),
            (NETWORK_TYPE_ANNOTATION, "Internal"),
            (TARGET_NODE_LABELS_ANNOTATION, "env=staging, zone = hn-1"),
        ]))
        .unwrap();

        assert!(options.proxy_protocol);
        assert_eq!(options.network_type, Some(NetworkType::Internal));
        assert_eq!(options.target_node_labels.len(), 2);
        assert_eq!(options.target_node_labels["env"], "staging");
        assert_eq!(options.target_node_labels["zone"], "hn-1");
    }

    #[test]
    fn test_unrelated_annotations_ignored() {
        let options = ServiceOptions::from_annotations(&annotations(&[(
            "service.beta.kubernetes.io/aws-load-balancer-type",
            "nlb",
        )]))
        .unwrap();
        assert!(!options.proxy_protocol);
    }

    #[test]
    fn test_invalid_values() {
        let err = ServiceOptions::from_annotations(&annotations(&[(
            PROXY_PROTOCOL_ANNOTATION,
            "maybe",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("enable-proxy-protocol"));

        let err = ServiceOptions::from_annotations(&annotations(&[(
            NETWORK_TYPE_ANNOTATION,
            "dmz",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("unknown network type"));

        let err = ServiceOptions::from_annotations(&annotations(&[(
            TARGET_NODE_LABELS_ANNOTATION,
            "env",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("not key=value"));
    }
}
