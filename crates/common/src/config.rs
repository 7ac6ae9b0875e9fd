use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Partition count for generated sink topics.
    pub sink_partitions: u32,
    /// Prefix for substrate application ids and generated sink names.
    pub app_id_prefix: String,
    /// Suffix appended to state-store names of stateful operators.
    pub state_store_suffix: String,
    /// Offset reset policy handed to the substrate for new consumers.
    pub auto_offset_reset: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sink_partitions: 4,
            app_id_prefix: "csql_".to_string(),
            state_store_suffix: "_states".to_string(),
            auto_offset_reset: "earliest".to_string(),
        }
    }
}
