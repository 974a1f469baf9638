//! Spec normalization applied before any syncer runs.

use crate::{DbClusterSpec, Options};

/// Fill unset spec fields from the operator options. Pure and idempotent:
/// applying twice yields the same spec as applying once.
pub fn set_defaults(spec: &mut DbClusterSpec, opts: &Options) {
    if spec.replicas.is_none() {
        spec.replicas = Some(1);
    }
    if spec.image.as_deref().map_or(true, str::is_empty) {
        spec.image = Some(opts.default_image.clone());
    }
    let sizing = spec.resources.get_or_insert_with(Default::default);
    if sizing.cpu.is_none() {
        sizing.cpu = Some(opts.cpu_floor.clone());
    }
    if sizing.memory.is_none() {
        sizing.memory = Some(opts.memory_floor.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_unset_fields() {
        let opts = Options::default();
        let mut spec = DbClusterSpec::default();
        set_defaults(&mut spec, &opts);
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(spec.image.as_deref(), Some(opts.default_image.as_str()));
        let sizing = spec.resources.expect("sizing defaulted");
        assert_eq!(sizing.cpu.as_deref(), Some(opts.cpu_floor.as_str()));
    }

    #[test]
    fn keeps_user_values() {
        let opts = Options::default();
        let mut spec = DbClusterSpec {
            replicas: Some(5),
            image: Some("registry.local/db:9".into()),
            ..Default::default()
        };
        set_defaults(&mut spec, &opts);
        assert_eq!(spec.replicas, Some(5));
        assert_eq!(spec.image.as_deref(), Some("registry.local/db:9"));
    }

    #[test]
    fn idempotent() {
        let opts = Options::default();
        let mut once = DbClusterSpec::default();
        set_defaults(&mut once, &opts);
        let mut twice = once.clone();
        set_defaults(&mut twice, &opts);
        assert_eq!(serde_json::to_value(&once).ok(), serde_json::to_value(&twice).ok());
    }
}
