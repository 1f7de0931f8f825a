use super::common;
use super::Adapter;
use crate::model::{WorkerDefinition, WorkerMetrics};

/// XMRig-family CLI: `xmrig -a <algo> -o <pool> -u <wallet> -p <pass> -t <n>
/// --donate-level <n> <extra_args...>`.
pub struct XmrigAdapter;

impl Adapter for XmrigAdapter {
    fn build_args(&self, def: &WorkerDefinition) -> Vec<String> {
        let mut args = common::base_args(def);
        if let Some(donate) = def.donate_level {
            args.push("--donate-level".into());
            args.push(donate.to_string());
        }
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
    fn builds_full_argv() {
        let def = WorkerDefinition {
            id: "w1".into(),
            kind: "xmrig".into(),
            executable: "/usr/bin/xmrig".into(),
            enabled: true,
            algo: Some("rx/0".into()),
            pool_url: Some("pool.example:3333".into()),
            wallet: Some("48abc".into()),
            password: Some("x".into()),
            threads: Some(crate::model::Threads::Count(4)),
            donate_level: Some(1),
            nice: None,
            cpu_affinity: vec![],
            extra_args: vec!["--tls".into()],
            env: Default::default(),
        };
        let args = XmrigAdapter.build_args(&def);
        assert_eq!(
            args,
            vec![
                "-a", "rx/0", "-o", "pool.example:3333", "-u", "48abc", "-p", "x", "-t", "4",
                "--donate-level", "1", "--tls",
            ]
        );
    }

    #[test]
    fn auto_threads_omits_flag() {
        let mut def = sample();
        def.threads = Some(crate::model::Threads::Auto);
        let args = XmrigAdapter.build_args(&def);
        assert!(!args.contains(&"-t".to_string()));
    }

    #[test]
    fn parses_kilohash_rate() {
        let mut metrics = WorkerMetrics::new("w1");
        XmrigAdapter.parse_line("speed 2.50 kH/s  max 2.60 kH/s", &mut metrics);
        assert_eq!(metrics.hashrate_hs, Some(2500.0));
    }

    #[test]
    fn parses_accepted_rejected_shares() {
        let mut metrics = WorkerMetrics::new("w1");
        XmrigAdapter.parse_line("accepted: 7/10 (70%)", &mut metrics);
        assert_eq!(metrics.accepted, Some(7));
        assert_eq!(metrics.rejected, Some(3));
    }

    fn sample() -> WorkerDefinition {
        WorkerDefinition {
            id: "w1".into(),
            kind: "xmrig".into(),
            executable: "/usr/bin/xmrig".into(),
            enabled: true,
            algo: None,
            pool_url: None,
            wallet: None,
            password: None,
            threads: None,
            donate_level: None,
            nice: None,
            cpu_affinity: vec![],
            extra_args: vec![],
            env: Default::default(),
        }
    }
}
