//! Fault actions and their parameter records.
//!
//! Every chaos kind carries exactly one `Action`; the variant selects the
//! dispatcher and carries the parameters that dispatcher needs. Variants are
//! tagged by the `action` field of the chaos spec.

use serde::{Deserialize, Serialize};

use crate::chaos::clock;
use crate::dns;
use crate::error::ValidationError;
use crate::faultserver;
use crate::models::{ChaosKind, PodSelectorSpec};
use crate::orchestrator::scheduler::parse_duration;
use crate::pb::chaosdaemon::{Netem, Tbf};
use crate::pb::chaosfs;

fn invalid(name: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidParameter {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn parse_ratio(name: &str, raw: &str) -> Result<f32, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.parse::<f32>()
        .map_err(|e| invalid(name, format!("parse {} field error: {}", name, e)))
}

// ============================================================================
// ACTION SUM TYPE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    PodKill(PodKillParams),
    PodFailure,
    ContainerKill,
    PodNotReady,
    Netem(NetworkParams),
    Delay(NetworkParams),
    Loss(NetworkParams),
    Duplicate(NetworkParams),
    Corrupt(NetworkParams),
    Bandwidth(BandwidthParams),
    Partition(PartitionParams),
    IoDelay(IoParams),
    IoErrno(IoParams),
    IoMixed(IoParams),
    Stress(StressParams),
    TimeOffset(TimeParams),
    DnsError(DnsParams),
    DnsRandom(DnsParams),
}

impl Action {
    /// Wire name of the action, as recorded on pod records.
    pub fn name(&self) -> &'static str {
        match self {
            Action::PodKill(_) => "pod-kill",
            Action::PodFailure => "pod-failure",
            Action::ContainerKill => "container-kill",
            Action::PodNotReady => "pod-not-ready",
            Action::Netem(_) => "netem",
            Action::Delay(_) => "delay",
            Action::Loss(_) => "loss",
            Action::Duplicate(_) => "duplicate",
            Action::Corrupt(_) => "corrupt",
            Action::Bandwidth(_) => "bandwidth",
            Action::Partition(_) => "partition",
            Action::IoDelay(_) => "io-delay",
            Action::IoErrno(_) => "io-errno",
            Action::IoMixed(_) => "io-mixed",
            Action::Stress(_) => "stress",
            Action::TimeOffset(_) => "time-offset",
            Action::DnsError(_) => "dns-error",
            Action::DnsRandom(_) => "dns-random",
        }
    }

    /// The chaos kind this action belongs to.
    pub fn kind(&self) -> ChaosKind {
        match self {
            Action::PodKill(_) | Action::PodFailure | Action::ContainerKill | Action::PodNotReady => {
                ChaosKind::PodChaos
            }
            Action::Netem(_)
            | Action::Delay(_)
            | Action::Loss(_)
            | Action::Duplicate(_)
            | Action::Corrupt(_)
            | Action::Bandwidth(_)
            | Action::Partition(_) => ChaosKind::NetworkChaos,
            Action::IoDelay(_) | Action::IoErrno(_) | Action::IoMixed(_) => ChaosKind::IoChaos,
            Action::Stress(_) => ChaosKind::StressChaos,
            Action::TimeOffset(_) => ChaosKind::TimeChaos,
            Action::DnsError(_) | Action::DnsRandom(_) => ChaosKind::DnsChaos,
        }
    }

    /// Finalizer keys carry a `source`/`target` prefix.
    pub fn is_directional(&self) -> bool {
        matches!(self, Action::Partition(_))
    }

    pub fn validate(&self, kind: ChaosKind) -> Result<(), ValidationError> {
        if self.kind() != kind {
            return Err(ValidationError::UnsupportedAction {
                kind: kind.to_string(),
                action: self.name().to_string(),
            });
        }

        match self {
            Action::PodKill(p) => {
                if p.grace_period < 0 {
                    return Err(invalid("gracePeriod", "must not be negative"));
                }
                Ok(())
            }
            Action::PodFailure | Action::ContainerKill | Action::PodNotReady => Ok(()),
            Action::Netem(p)
            | Action::Delay(p)
            | Action::Loss(p)
            | Action::Duplicate(p)
            | Action::Corrupt(p) => {
                self.netem()?;
                p.validate_target()
            }
            Action::Bandwidth(p) => {
                p.to_tbf()?;
                Ok(())
            }
            Action::Partition(p) => p.validate(),
            Action::IoDelay(p) | Action::IoErrno(p) | Action::IoMixed(p) => {
                self.fault_request(p).map(|_| ())
            }
            Action::Stress(p) => p.stress_args().map(|_| ()),
            Action::TimeOffset(p) => {
                p.offset()?;
                p.clock_mask()?;
                Ok(())
            }
            Action::DnsError(p) | Action::DnsRandom(p) => p.validate(),
        }
    }

    /// Netem block for netem-family actions. Single-stressor actions use only
    /// their own block; `netem` merges every block present.
    pub fn netem(&self) -> Result<Netem, ValidationError> {
        let missing = |field: &str| invalid(field, format!("{} is required by action {}", field, self.name()));
        match self {
            Action::Delay(p) => p.delay.as_ref().ok_or_else(|| missing("delay"))?.to_netem(),
            Action::Loss(p) => p.loss.as_ref().ok_or_else(|| missing("loss"))?.to_netem(),
            Action::Duplicate(p) => p
                .duplicate
                .as_ref()
                .ok_or_else(|| missing("duplicate"))?
                .to_netem(),
            Action::Corrupt(p) => p
                .corrupt
                .as_ref()
                .ok_or_else(|| missing("corrupt"))?
                .to_netem(),
            Action::Netem(p) => p.merged_netem(),
            _ => Err(invalid(
                "action",
                format!("{} is not a netem action", self.name()),
            )),
        }
    }

    /// Fault-server request for io chaos actions.
    pub fn fault_request(&self, p: &IoParams) -> Result<chaosfs::Request, ValidationError> {
        let (want_delay, want_errno) = match self {
            Action::IoDelay(_) => (true, false),
            Action::IoErrno(_) => (false, true),
            Action::IoMixed(_) => (true, true),
            _ => {
                return Err(invalid(
                    "action",
                    format!("{} is not an io action", self.name()),
                ))
            }
        };
        p.to_request(want_delay, want_errno)
    }
}

// ============================================================================
// POD ACTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PodKillParams {
    /// Seconds; zero deletes immediately.
    pub grace_period: i64,
}

// ============================================================================
// NETWORK ACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    To,
    From,
    Both,
}

/// Conversion of one emulation block into a netem request.
pub trait NetemSpec {
    fn to_netem(&self) -> Result<Netem, ValidationError>;
}

/// Conversion of a bandwidth block into a token-bucket request.
pub trait TbfSpec {
    fn to_tbf(&self) -> Result<Tbf, ValidationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DelaySpec {
    pub latency: String,
    pub jitter: String,
    pub correlation: String,
}

impl NetemSpec for DelaySpec {
    fn to_netem(&self) -> Result<Netem, ValidationError> {
        let latency = parse_duration(&self.latency)?;
        let jitter = if self.jitter.trim().is_empty() {
            chrono::Duration::zero()
        } else {
            parse_duration(&self.jitter)?
        };
        let micros = |d: chrono::Duration, name: &str| -> Result<u32, ValidationError> {
            d.num_microseconds()
                .and_then(|us| u32::try_from(us).ok())
                .ok_or_else(|| invalid(name, "out of range"))
        };
        Ok(Netem {
            time_us: micros(latency, "latency")?,
            jitter_us: micros(jitter, "jitter")?,
            delay_corr: parse_ratio("correlation", &self.correlation)?,
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LossSpec {
    pub loss: String,
    pub correlation: String,
}

impl NetemSpec for LossSpec {
    fn to_netem(&self) -> Result<Netem, ValidationError> {
        Ok(Netem {
            loss: parse_ratio("loss", &self.loss)?,
            loss_corr: parse_ratio("correlation", &self.correlation)?,
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DuplicateSpec {
    pub duplicate: String,
    pub correlation: String,
}

impl NetemSpec for DuplicateSpec {
    fn to_netem(&self) -> Result<Netem, ValidationError> {
        Ok(Netem {
            duplicate: parse_ratio("duplicate", &self.duplicate)?,
            duplicate_corr: parse_ratio("correlation", &self.correlation)?,
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CorruptSpec {
    pub corrupt: String,
    pub correlation: String,
}

impl NetemSpec for CorruptSpec {
    fn to_netem(&self) -> Result<Netem, ValidationError> {
        Ok(Netem {
            corrupt: parse_ratio("corrupt", &self.corrupt)?,
            corrupt_corr: parse_ratio("correlation", &self.correlation)?,
            ..Default::default()
        })
    }
}

/// Field-wise merge; the numerically greater value wins.
pub fn merge_netem(a: Netem, b: Netem) -> Netem {
    Netem {
        time_us: a.time_us.max(b.time_us),
        jitter_us: a.jitter_us.max(b.jitter_us),
        delay_corr: a.delay_corr.max(b.delay_corr),
        limit: a.limit.max(b.limit),
        loss: a.loss.max(b.loss),
        loss_corr: a.loss_corr.max(b.loss_corr),
        duplicate: a.duplicate.max(b.duplicate),
        duplicate_corr: a.duplicate_corr.max(b.duplicate_corr),
        corrupt: a.corrupt.max(b.corrupt),
        corrupt_corr: a.corrupt_corr.max(b.corrupt_corr),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<DelaySpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss: Option<LossSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<DuplicateSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrupt: Option<CorruptSpec>,
    pub direction: Direction,
    /// Restrict the emulation to traffic towards these pods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<PodSelectorSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_targets: Vec<String>,
}

impl NetworkParams {
    fn blocks(&self) -> Vec<&dyn NetemSpec> {
        let mut blocks: Vec<&dyn NetemSpec> = Vec::new();
        if let Some(d) = &self.delay {
            blocks.push(d);
        }
        if let Some(l) = &self.loss {
            blocks.push(l);
        }
        if let Some(d) = &self.duplicate {
            blocks.push(d);
        }
        if let Some(c) = &self.corrupt {
            blocks.push(c);
        }
        blocks
    }

    /// Merge every present emulation block into one request.
    pub fn merged_netem(&self) -> Result<Netem, ValidationError> {
        let blocks = self.blocks();
        if blocks.is_empty() {
            return Err(invalid(
                "netem",
                "at least one is required from delay, loss, duplicate, corrupt",
            ));
        }
        blocks
            .into_iter()
            .try_fold(Netem::default(), |acc, b| {
                Ok::<_, ValidationError>(merge_netem(acc, b.to_netem()?))
            })
    }

    /// Traffic filtering is active when a target selector or external
    /// targets are given.
    pub fn is_filtered(&self) -> bool {
        self.target.is_some() || !self.external_targets.is_empty()
    }

    fn validate_target(&self) -> Result<(), ValidationError> {
        if self.direction != Direction::To && self.target.is_none() {
            return Err(invalid(
                "direction",
                "from/both require a target selector",
            ));
        }
        Ok(())
    }
}

/// Convert `<n><unit>` with unit in {bps, kbps, mbps, gbps, tbps} into
/// bytes per second using 1024-based multipliers.
pub fn convert_unit_to_bytes(raw: &str) -> Result<u64, ValidationError> {
    let s = raw.trim().to_ascii_lowercase();
    let units = ["tbps", "gbps", "mbps", "kbps", "bps"];
    for (i, unit) in units.iter().enumerate() {
        if let Some(number) = s.strip_suffix(unit) {
            let n: u64 = number
                .trim()
                .parse()
                .map_err(|e| invalid("rate", format!("parse rate field error: {}", e)))?;
            let shift = (units.len() - 1 - i) as u32;
            return n
                .checked_mul(1024u64.pow(shift))
                .ok_or_else(|| invalid("rate", "overflow"));
        }
    }
    Err(invalid("rate", format!("invalid unit in {:?}", raw)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BandwidthParams {
    pub rate: String,
    pub limit: u32,
    pub buffer: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peakrate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minburst: Option<u32>,
}

impl TbfSpec for BandwidthParams {
    fn to_tbf(&self) -> Result<Tbf, ValidationError> {
        if self.limit == 0 {
            return Err(invalid("limit", "must be greater than zero"));
        }
        if self.buffer == 0 {
            return Err(invalid("buffer", "must be greater than zero"));
        }
        Ok(Tbf {
            rate_bps: convert_unit_to_bytes(&self.rate)?,
            limit: self.limit,
            buffer: self.buffer,
            peakrate: self.peakrate.unwrap_or(0),
            minburst: self.minburst.unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PartitionParams {
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<PodSelectorSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_targets: Vec<String>,
}

impl PartitionParams {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.target.is_none() && self.external_targets.is_empty() {
            return Err(invalid(
                "target",
                "partition requires a target selector or external targets",
            ));
        }
        if self.direction != Direction::To && self.target.is_none() {
            return Err(invalid(
                "direction",
                "external targets only support direction to",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// IO ACTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IoParams {
    /// Filesystem methods to hook; empty means every method.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    /// Regex over the accessed path; empty matches everything.
    pub path: String,
    pub percent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<String>,
    /// Unset picks a random errno per call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<u32>,
    /// Fault server address; defaults to `<podIP>:<fault server port>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    /// Sidecar injection config requested on the target namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_name: Option<String>,
}

impl Default for IoParams {
    fn default() -> Self {
        IoParams {
            methods: Vec::new(),
            path: String::new(),
            percent: 100,
            delay: None,
            errno: None,
            addr: None,
            config_name: None,
        }
    }
}

impl IoParams {
    fn to_request(&self, want_delay: bool, want_errno: bool) -> Result<chaosfs::Request, ValidationError> {
        if self.percent == 0 || self.percent > 100 {
            return Err(invalid("percent", "must be in (0, 100]"));
        }
        for m in &self.methods {
            if !faultserver::METHODS.contains(&m.as_str()) {
                return Err(invalid("methods", format!("unknown method {:?}", m)));
            }
        }
        if !self.path.is_empty() {
            regex::Regex::new(&self.path).map_err(|e| invalid("path", e.to_string()))?;
        }

        let delay_us = if want_delay {
            let raw = self
                .delay
                .as_deref()
                .ok_or_else(|| invalid("delay", "required by delay actions"))?;
            let d = parse_duration(raw)?;
            d.num_microseconds()
                .and_then(|us| u32::try_from(us).ok())
                .ok_or_else(|| invalid("delay", "must be a non-negative duration below 71m"))?
        } else {
            0
        };

        let (errno, random) = if want_errno {
            match self.errno {
                Some(e) => (e, false),
                None => (0, true),
            }
        } else {
            (0, false)
        };

        Ok(chaosfs::Request {
            methods: self.methods.clone(),
            errno,
            random,
            pct: self.percent,
            path: self.path.clone(),
            delay_us,
        })
    }
}

// ============================================================================
// STRESS ACTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CpuStressor {
    pub workers: u32,
    /// Percentage of each CPU to load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryStressor {
    pub workers: u32,
    /// `N%` of available memory or a size such as `256MB`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Stressors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuStressor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryStressor>,
}

/// Parse a memory size (`B`, `KB`, `MB`, `GB`, `TB`, decimal) into bytes.
pub fn parse_size(raw: &str) -> Result<u64, ValidationError> {
    let s = raw.trim().to_ascii_uppercase();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| invalid("size", format!("invalid size {:?}", raw)))?;
    let multiplier: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "KB" | "K" => 1e3,
        "MB" | "M" => 1e6,
        "GB" | "G" => 1e9,
        "TB" | "T" => 1e12,
        other => return Err(invalid("size", format!("unknown unit {:?}", other))),
    };
    Ok((value * multiplier) as u64)
}

impl Stressors {
    /// Render as a stress-ng argument string.
    pub fn normalize(&self) -> Result<String, ValidationError> {
        let mut parts: Vec<String> = Vec::new();

        if let Some(mem) = &self.memory {
            if mem.workers == 0 {
                return Err(invalid("memory.workers", "must be greater than zero"));
            }
            parts.push(format!("--vm {} --vm-keep", mem.workers));
            if let Some(size) = mem.size.as_deref().filter(|s| !s.trim().is_empty()) {
                let size = size.trim();
                let bytes = if let Some(pct) = size.strip_suffix('%') {
                    let n: u32 = pct
                        .trim()
                        .parse()
                        .map_err(|_| invalid("memory.size", format!("invalid percentage {:?}", size)))?;
                    if n == 0 || n > 100 {
                        return Err(invalid("memory.size", "percentage must be in (0, 100]"));
                    }
                    format!("{}%", n)
                } else {
                    format!("{}b", parse_size(size)?)
                };
                parts.push(format!("--vm-bytes {}", bytes));
            }
        }

        if let Some(cpu) = &self.cpu {
            if cpu.workers == 0 {
                return Err(invalid("cpu.workers", "must be greater than zero"));
            }
            parts.push(format!("--cpu {}", cpu.workers));
            if let Some(load) = cpu.load {
                if load > 100 {
                    return Err(invalid("cpu.load", "must be in [0, 100]"));
                }
                parts.push(format!("--cpu-load {}", load));
            }
            for method in &cpu.methods {
                parts.push(format!("--cpu-method {}", method));
            }
        }

        Ok(parts.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StressParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stressors: Option<Stressors>,
    /// Raw stress-ng arguments; overrides `stressors` when non-empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stressng_stressors: Option<String>,
}

impl StressParams {
    pub fn stress_args(&self) -> Result<String, ValidationError> {
        if let Some(raw) = self.stressng_stressors.as_deref().map(str::trim) {
            if !raw.is_empty() {
                return Ok(raw.to_string());
            }
        }
        let args = match &self.stressors {
            Some(s) => s.normalize()?,
            None => String::new(),
        };
        if args.is_empty() {
            return Err(invalid(
                "stressors",
                "one of stressors and stressngStressors is required",
            ));
        }
        Ok(args)
    }
}

// ============================================================================
// TIME ACTIONS
// ============================================================================

fn default_clock_ids() -> Vec<String> {
    vec!["CLOCK_REALTIME".to_string()]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeParams {
    pub time_offset: String,
    #[serde(default = "default_clock_ids")]
    pub clock_ids: Vec<String>,
}

impl TimeParams {
    pub fn new(time_offset: impl Into<String>) -> Self {
        TimeParams {
            time_offset: time_offset.into(),
            clock_ids: default_clock_ids(),
        }
    }

    /// `(sec, nsec)` of the offset, both truncated toward zero.
    pub fn offset(&self) -> Result<(i64, i64), ValidationError> {
        let d = parse_duration(&self.time_offset)?;
        let sec = d.num_seconds();
        let nsec = (d - chrono::Duration::seconds(sec))
            .num_nanoseconds()
            .unwrap_or(0);
        Ok((sec, nsec))
    }

    pub fn clock_mask(&self) -> Result<u64, ValidationError> {
        clock::encode_clock_ids(&self.clock_ids)
    }
}

// ============================================================================
// DNS ACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DnsScope {
    Outer,
    Inner,
    #[default]
    All,
}

impl DnsScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsScope::Outer => "outer",
            DnsScope::Inner => "inner",
            DnsScope::All => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsParams {
    #[serde(rename = "domainNamePatterns", skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
    pub scope: DnsScope,
}

impl DnsParams {
    fn validate(&self) -> Result<(), ValidationError> {
        for p in &self.patterns {
            dns::validate_pattern(p)?;
        }
        Ok(())
    }
}
