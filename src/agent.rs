//! Simulation actors.
//!
//! Lightweight value type for the offline simulation path. Agents have no
//! connection to a hardware run.

use std::collections::HashMap;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_NAME_PREFIX: &str = "agent_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub position: Point3<f64>,
    /// Free-form attributes.
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Agent {
    /// Creates an agent named `prefix` followed by a random v4 UUID.
    pub fn new(
        prefix: &str,
        position: Point3<f64>,
        attributes: Option<HashMap<String, serde_json::Value>>,
    ) -> Self {
        Self {
            name: format!("{prefix}{}", Uuid::new_v4()),
            position,
            attributes: attributes.unwrap_or_default(),
        }
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_PREFIX, Point3::origin(), None)
    }
}
