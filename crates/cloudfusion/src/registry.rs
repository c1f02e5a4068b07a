//! Service descriptors and the method → action table.

use crate::signing::SignatureVersion;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static facts about one service endpoint family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Call-site name, part of every cache identity key.
    pub name: String,
    /// Sent as the `Version` parameter.
    pub api_version: String,
    pub default_host: String,
    pub default_signature_version: SignatureVersion,
}

impl ServiceDescriptor {
    pub fn new(name: &str, api_version: &str, default_host: &str) -> Self {
        Self {
            name: name.to_string(),
            api_version: api_version.to_string(),
            default_host: default_host.to_string(),
            default_signature_version: SignatureVersion::V2,
        }
    }

    pub fn with_signature_version(mut self, version: SignatureVersion) -> Self {
        self.default_signature_version = version;
        self
    }

    /// Registry of `actions`, each signed with this service's default version.
    pub fn operations(&self, actions: &[&str]) -> OperationRegistry {
        OperationRegistry::from_actions(actions, self.default_signature_version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Wire action name, e.g. `ListDomains`.
    pub action: String,
    pub signature_version: SignatureVersion,
}

#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, OperationSpec>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every action under its snake_case method name.
    pub fn from_actions(actions: &[&str], signature_version: SignatureVersion) -> Self {
        let mut registry = Self::new();
        for action in actions {
            registry.register(&snake_case(action), action, signature_version);
        }
        registry
    }

    pub fn register(&mut self, method: &str, action: &str, signature_version: SignatureVersion) {
        self.operations.insert(
            method.to_string(),
            OperationSpec {
                action: action.to_string(),
                signature_version,
            },
        );
    }

    pub fn get(&self, method: &str) -> Option<&OperationSpec> {
        self.operations.get(method)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// `DescribeDBInstances` → `describe_db_instances`.
pub fn snake_case(action: &str) -> String {
    let chars: Vec<char> = action.chars().collect();
    let mut out = String::with_capacity(action.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}
