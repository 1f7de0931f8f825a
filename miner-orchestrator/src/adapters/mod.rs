//! Worker-type adapters: argv construction and stdout/stderr line parsing.
//!
//! Each miner binary speaks its own log dialect; an adapter hides that
//! behind a common trait so `worker_instance` never special-cases a type.

pub mod cpuminer_opt;
pub mod xmrig;

use crate::error::SupervisorError;
use crate::model::WorkerDefinition;

/// Behavior that differs per worker binary type.
pub trait Adapter: Send + Sync {
    /// Builds the argv (excluding the executable itself, which the caller
    /// prepends) for spawning this worker.
    fn build_args(&self, def: &WorkerDefinition) -> Vec<String>;

    /// Parses one line of stdout/stderr, updating `hashrate_hs` /
    /// `accepted` / `rejected` in place when the line carries new data.
    fn parse_line(&self, line: &str, metrics: &mut crate::model::WorkerMetrics);
}

pub fn for_type(kind: &str) -> Result<Box<dyn Adapter>, SupervisorError> {
    match kind {
        "xmrig" => Ok(Box::new(xmrig::XmrigAdapter)),
        "cpuminer-opt" | "cpuminer_opt" => Ok(Box::new(cpuminer_opt::CpuMinerOptAdapter)),
        other => Err(SupervisorError::UnsupportedType(other.to_string())),
    }
}

/// Shared by both adapters: XMRig and cpuminer-opt report hashrate as
/// `<number> <unit>/s` and shares as `accepted: <n>/<total>`.
pub(crate) mod common {
    use std::sync::LazyLock;

    use regex::Regex;

    use crate::model::WorkerMetrics;

    static HASHRATE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\d+\.?\d*)\s*(H|kH|MH|GH)/s").unwrap());
    static SHARES_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)accepted:\s*(\d+)/(\d+)").unwrap());

    pub fn parse_hashrate_and_shares(line: &str, metrics: &mut WorkerMetrics) {
        if let Some(caps) = HASHRATE_RE.captures(line) {
            let value: f64 = caps[1].parse().unwrap_or(0.0);
            let scale = match &caps[2] {
                "H" => 1.0,
                "kH" => 1e3,
                "MH" => 1e6,
                "GH" => 1e9,
                _ => 1.0,
            };
            metrics.hashrate_hs = Some(value * scale);
        }
        if line.to_lowercase().contains("accepted") {
            if let Some(caps) = SHARES_RE.captures(line) {
                let accepted: u64 = caps[1].parse().unwrap_or(0);
                let total: u64 = caps[2].parse().unwrap_or(0);
                metrics.accepted = Some(accepted);
                metrics.rejected = Some(total.saturating_sub(accepted));
            }
        }
    }

    /// Shared argv prefix both adapters build: algo/pool/wallet/password/
    /// threads, then per-adapter extras, then passthrough extra_args.
    pub fn base_args(def: &crate::model::WorkerDefinition) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(algo) = &def.algo {
            args.push("-a".into());
            args.push(algo.clone());
        }
        if let Some(pool) = &def.pool_url {
            args.push("-o".into());
            args.push(pool.clone());
        }
        if let Some(wallet) = &def.wallet {
            args.push("-u".into());
            args.push(wallet.clone());
        }
        if let Some(password) = &def.password {
            args.push("-p".into());
            args.push(password.clone());
        }
        if let Some(threads) = &def.threads {
            if let Some(count) = threads.as_count() {
                args.push("-t".into());
                args.push(count.to_string());
            }
        }
        args
    }
}
