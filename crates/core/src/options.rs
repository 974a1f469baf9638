//! Process-wide operator options, injected at startup and immutable after.

/// Cluster-wide defaults supplied to the workload syncer and to spec
/// defaulting. Built once by the host process and shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Options {
    /// Image used when a cluster does not pin one.
    pub default_image: String,
    /// Minimum CPU request stamped on containers without one.
    pub cpu_floor: String,
    /// Minimum memory request stamped on containers without one.
    pub memory_floor: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            default_image: "ghcr.io/converge/db:8.0.36".to_string(),
            cpu_floor: "100m".to_string(),
            memory_floor: "256Mi".to_string(),
        }
    }
}
