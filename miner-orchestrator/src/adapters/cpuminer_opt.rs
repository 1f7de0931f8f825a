use super::common;
use super::Adapter;
use crate::model::{WorkerDefinition, WorkerMetrics};

/// cpuminer-opt CLI: `cpuminer -a <algo> -o <pool> -u <wallet> -p <pass>
/// -t <n> <extra_args...>`. No donate-level concept, unlike XMRig.
pub struct CpuMinerOptAdapter;

impl Adapter for CpuMinerOptAdapter {
    fn build_args(&self, def: &WorkerDefinition) -> Vec<String> {
        let mut args = common::base_args(def);
        args.extend(def.extra_args.iter().cloned());
        args
    }

    fn parse_line(&self, line: &str, metrics: &mut WorkerMetrics) {
        common::parse_hashrate_and_shares(line, metrics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_argv_without_donate_level() {
        let def = WorkerDefinition {
            id: "w2".into(),
            kind: "cpuminer-opt".into(),
            executable: "/usr/bin/cpuminer".into(),
            enabled: true,
            algo: Some("yespower".into()),
            pool_url: Some("pool.example:4444".into()),
            wallet: Some("wallet".into()),
            password: None,
            threads: Some(crate::model::Threads::Count(2)),
            donate_level: None,
            nice: None,
            cpu_affinity: vec![],
            extra_args: vec![],
            env: Default::default(),
        };
        let args = CpuMinerOptAdapter.build_args(&def);
        assert_eq!(
            args,
            vec!["-a", "yespower", "-o", "pool.example:4444", "-u", "wallet", "-t", "2"]
        );
    }

    #[test]
    fn parses_inline_share_and_rate_line() {
        let mut metrics = WorkerMetrics::new("w2");
        CpuMinerOptAdapter.parse_line(
            "[2023-01-01] accepted: 1/1 (diff 0.01), 2.50 kH/s",
            &mut metrics,
        );
        assert_eq!(metrics.hashrate_hs, Some(2500.0));
        assert_eq!(metrics.accepted, Some(1));
        assert_eq!(metrics.rejected, Some(0));
    }
}
