use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PdqError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Which worker kinds participate in compute-node-preferring capture.
pub enum SchedulingPolicy {
    /// Only the (capped, rotated) compute-node window is usable.
    #[default]
    ComputeNodesOnly,
    /// The compute-node window followed by every available data node.
    AllNodes,
}

impl FromStr for SchedulingPolicy {
    type Err = PdqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compute_nodes_only" => Ok(Self::ComputeNodesOnly),
            "all_nodes" => Ok(Self::AllNodes),
            other => Err(PdqError::InvalidConfig(format!(
                "unknown scheduling policy '{other}' (expected compute_nodes_only|all_nodes)"
            ))),
        }
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ComputeNodesOnly => write!(f, "COMPUTE_NODES_ONLY"),
            Self::AllNodes => write!(f, "ALL_NODES"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Deployment mode; decides which round-robin cursor family is used.
pub enum RunMode {
    /// Single-tenant: one process-wide compute-node cursor.
    #[default]
    SharedNothing,
    /// Multi-tenant shared storage: one compute-node cursor per resource scope.
    SharedData,
}

impl RunMode {
    pub fn is_multi_tenant(&self) -> bool {
        matches!(self, RunMode::SharedData)
    }
}

impl FromStr for RunMode {
    type Err = PdqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared_nothing" => Ok(Self::SharedNothing),
            "shared_data" => Ok(Self::SharedData),
            other => Err(PdqError::InvalidConfig(format!(
                "unknown run mode '{other}' (expected shared_nothing|shared_data)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Per-sink-kind divisor applied to the average core count when adaptive
/// sink DOP is enabled.
pub struct SinkDopDivisors {
    pub insert: u32,
    pub update: u32,
    pub delete: u32,
}

impl Default for SinkDopDivisors {
    fn default() -> Self {
        Self {
            insert: 3,
            update: 3,
            delete: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
/// Process-wide scheduler configuration.
pub struct SchedulerConfig {
    /// Deployment mode (selects the compute-node cursor family).
    pub run_mode: RunMode,
    /// Adaptive sink DOP divisors.
    pub sink_dop_divisors: SinkDopDivisors,
    /// Core count reported when no data node has published hardware stats.
    pub default_hardware_cores: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::SharedNothing,
            sink_dop_divisors: SinkDopDivisors::default(),
            default_hardware_cores: 1,
        }
    }
}

impl SchedulerConfig {
    /// Build from defaults overridden by `PDQ_*` process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides_from(|k| env::var(k).ok())
    }

    /// Apply overrides from an arbitrary key lookup (environment-shaped keys).
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.run_mode = parse_or(&lookup, "PDQ_RUN_MODE", self.run_mode)?;
        self.sink_dop_divisors.insert = parse_or(
            &lookup,
            "PDQ_INSERT_SINK_DOP_DIVISOR",
            self.sink_dop_divisors.insert,
        )?;
        self.sink_dop_divisors.update = parse_or(
            &lookup,
            "PDQ_UPDATE_SINK_DOP_DIVISOR",
            self.sink_dop_divisors.update,
        )?;
        self.sink_dop_divisors.delete = parse_or(
            &lookup,
            "PDQ_DELETE_SINK_DOP_DIVISOR",
            self.sink_dop_divisors.delete,
        )?;
        self.default_hardware_cores = parse_or(
            &lookup,
            "PDQ_DEFAULT_HARDWARE_CORES",
            self.default_hardware_cores,
        )?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.sink_dop_divisors;
        if d.insert == 0 || d.update == 0 || d.delete == 0 {
            return Err(PdqError::InvalidConfig(format!(
                "sink dop divisors must be positive (insert={}, update={}, delete={})",
                d.insert, d.update, d.delete
            )));
        }
        if self.default_hardware_cores == 0 {
            return Err(PdqError::InvalidConfig(
                "default_hardware_cores must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
/// Per-session knobs consumed by worker capture and parallelism planning.
pub struct SessionVariables {
    /// Pipeline execution engine switch.
    pub enable_pipeline_engine: bool,
    /// Explicit pipeline DOP; `0` means "derive from hardware".
    pub pipeline_dop: i32,
    /// Explicit fragment instance count.
    pub parallel_exec_instance_num: i32,
    /// Derive table-sink DOP from hardware instead of the instance count.
    pub enable_adaptive_sink_dop: bool,
    /// Upper bound for hardware-derived DOP; `<= 0` disables the clamp.
    pub max_pipeline_dop: i32,
    /// Prefer compute nodes over data nodes for compute-bound fragments.
    pub prefer_compute_node: bool,
    /// Cap on compute nodes used by one query; `<= 0` means unlimited.
    pub num_used_compute_nodes: i32,
    /// Which worker kinds participate when compute nodes are preferred.
    pub computation_fragment_scheduling_policy: SchedulingPolicy,
}

impl Default for SessionVariables {
    fn default() -> Self {
        Self {
            enable_pipeline_engine: true,
            pipeline_dop: 0,
            parallel_exec_instance_num: 1,
            enable_adaptive_sink_dop: false,
            max_pipeline_dop: 64,
            prefer_compute_node: false,
            num_used_compute_nodes: -1,
            computation_fragment_scheduling_policy: SchedulingPolicy::ComputeNodesOnly,
        }
    }
}

impl SessionVariables {
    /// Apply `PDQ_*` process environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|k| env::var(k).ok())
    }

    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.enable_pipeline_engine = parse_or(
            &lookup,
            "PDQ_ENABLE_PIPELINE_ENGINE",
            self.enable_pipeline_engine,
        )?;
        self.pipeline_dop = parse_or(&lookup, "PDQ_PIPELINE_DOP", self.pipeline_dop)?;
        self.parallel_exec_instance_num = parse_or(
            &lookup,
            "PDQ_PARALLEL_EXEC_INSTANCE_NUM",
            self.parallel_exec_instance_num,
        )?;
        self.enable_adaptive_sink_dop = parse_or(
            &lookup,
            "PDQ_ENABLE_ADAPTIVE_SINK_DOP",
            self.enable_adaptive_sink_dop,
        )?;
        self.max_pipeline_dop = parse_or(&lookup, "PDQ_MAX_PIPELINE_DOP", self.max_pipeline_dop)?;
        self.prefer_compute_node = parse_or(
            &lookup,
            "PDQ_PREFER_COMPUTE_NODE",
            self.prefer_compute_node,
        )?;
        self.num_used_compute_nodes = parse_or(
            &lookup,
            "PDQ_NUM_USED_COMPUTE_NODES",
            self.num_used_compute_nodes,
        )?;
        self.computation_fragment_scheduling_policy = parse_or(
            &lookup,
            "PDQ_COMPUTATION_FRAGMENT_SCHEDULING_POLICY",
            self.computation_fragment_scheduling_policy,
        )?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallel_exec_instance_num < 1 {
            return Err(PdqError::InvalidConfig(format!(
                "parallel_exec_instance_num must be >= 1, got {}",
                self.parallel_exec_instance_num
            )));
        }
        if self.pipeline_dop < 0 {
            return Err(PdqError::InvalidConfig(format!(
                "pipeline_dop must be >= 0, got {}",
                self.pipeline_dop
            )));
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| PdqError::InvalidConfig(format!("{key}='{raw}': {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn session_overrides_apply_and_validate() {
        let vars = SessionVariables::default()
            .with_overrides_from(lookup_from(&[
                ("PDQ_PIPELINE_DOP", "4"),
                ("PDQ_PARALLEL_EXEC_INSTANCE_NUM", "8"),
                ("PDQ_PREFER_COMPUTE_NODE", "true"),
                ("PDQ_COMPUTATION_FRAGMENT_SCHEDULING_POLICY", "ALL_NODES"),
            ]))
            .expect("overrides");
        assert_eq!(vars.pipeline_dop, 4);
        assert_eq!(vars.parallel_exec_instance_num, 8);
        assert!(vars.prefer_compute_node);
        assert_eq!(
            vars.computation_fragment_scheduling_policy,
            SchedulingPolicy::AllNodes
        );
    }

    #[test]
    fn unparseable_override_is_invalid_config() {
        let err = SessionVariables::default()
            .with_overrides_from(lookup_from(&[("PDQ_MAX_PIPELINE_DOP", "many")]))
            .expect_err("bad value");
        assert!(matches!(err, PdqError::InvalidConfig(_)));
        assert!(err.to_string().contains("PDQ_MAX_PIPELINE_DOP"));
    }

    #[test]
    fn zero_instance_num_is_rejected() {
        let vars = SessionVariables {
            parallel_exec_instance_num: 0,
            ..SessionVariables::default()
        };
        assert!(matches!(vars.validate(), Err(PdqError::InvalidConfig(_))));
    }

    #[test]
    fn zero_sink_divisor_is_rejected() {
        let err = SchedulerConfig::default()
            .with_overrides_from(lookup_from(&[("PDQ_UPDATE_SINK_DOP_DIVISOR", "0")]))
            .expect_err("zero divisor");
        assert!(err.to_string().contains("update=0"));
    }

    #[test]
    fn run_mode_override_selects_multi_tenant() {
        let cfg = SchedulerConfig::default()
            .with_overrides_from(lookup_from(&[("PDQ_RUN_MODE", "shared_data")]))
            .expect("run mode");
        assert!(cfg.run_mode.is_multi_tenant());
    }

    #[test]
    fn session_json_fills_missing_fields_with_defaults() {
        let vars: SessionVariables =
            serde_json::from_str(r#"{"pipeline_dop": 2, "computation_fragment_scheduling_policy": "ALL_NODES"}"#)
                .expect("json");
        assert_eq!(vars.pipeline_dop, 2);
        assert_eq!(vars.parallel_exec_instance_num, 1);
        assert_eq!(vars.max_pipeline_dop, 64);
        assert_eq!(
            vars.computation_fragment_scheduling_policy,
            SchedulingPolicy::AllNodes
        );
    }
}
