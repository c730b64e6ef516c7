//! Config-value parsing helpers.
//!
//! Ported from the teacher's `dslab_iaas::core::config::options` module: a "value[options]"
//! mini-grammar used there to parametrize placement algorithms from a YAML string, reused here to
//! parametrize balloon types and scheduling classes the same way.

use std::collections::{BTreeSet, HashMap};

use topology::CpuId;

use crate::error::ConfigError;

/// Parses a config value string, which consists of a name and an optional bracketed options
/// string. Example: `BestFitThreshold[threshold=0.8]` splits into `BestFitThreshold` and
/// `Some("threshold=0.8")`.
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.split_once('[') {
        Some((name, rest)) => (name.to_string(), Some(rest.replace(']', ""))),
        None => (config_str.to_string(), None),
    }
}

/// Parses a comma-separated `key=value` options string into a map.
///
/// # Examples
///
/// ```
/// use policy_core::config::parse_options;
///
/// let options = parse_options("threshold=0.8,mode=strict");
/// assert_eq!(options.get("threshold").unwrap(), "0.8");
/// assert_eq!(options.get("mode").unwrap(), "strict");
/// assert_eq!(options.get("missing"), None);
/// ```
pub fn parse_options(options_str: &str) -> HashMap<String, String> {
    let mut options = HashMap::new();
    for entry in options_str.split(',') {
        if let Some((key, value)) = entry.split_once('=') {
            options.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    options
}

/// Parses a Linux cpuset-style list such as `"4-11,14,16-17"` into a set of [`CpuId`]s. Used by
/// both backends' `availableResources.cpu`/`reservedResources.cpu` configuration keys (spec §6).
pub fn parse_cpuset(spec: &str) -> Result<BTreeSet<CpuId>, ConfigError> {
    let mut cpus = BTreeSet::new();
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(cpus);
    }
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = lo
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidCpuset(spec.to_string()))?;
                let hi: u32 = hi
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidCpuset(spec.to_string()))?;
                if lo > hi {
                    return Err(ConfigError::InvalidCpuset(spec.to_string()));
                }
                for id in lo..=hi {
                    cpus.insert(CpuId(id));
                }
            }
            None => {
                let id: u32 = part
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidCpuset(spec.to_string()))?;
                cpus.insert(CpuId(id));
            }
        }
    }
    Ok(cpus)
}

/// Renders a cpuset back to its canonical Linux-list form, condensing consecutive runs, for the
/// runtime adjustment's `linux.resources.cpu.cpus` field.
pub fn format_cpuset(cpus: &BTreeSet<CpuId>) -> String {
    let ids: Vec<u32> = cpus.iter().map(|c| c.0).collect();
    let mut parts = Vec::new();
    let mut i = 0;
    while i < ids.len() {
        let start = ids[i];
        let mut end = start;
        while i + 1 < ids.len() && ids[i + 1] == end + 1 {
            end = ids[i + 1];
            i += 1;
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
        i += 1;
    }
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cpuset_handles_ranges_and_singletons() {
        let cpus = parse_cpuset("4-6,8,11-12").unwrap();
        let expected: BTreeSet<CpuId> = [4, 5, 6, 8, 11, 12].into_iter().map(CpuId).collect();
        assert_eq!(cpus, expected);
    }

    #[test]
    fn format_cpuset_condenses_runs() {
        let cpus: BTreeSet<CpuId> = [4, 5, 6, 8, 11, 12].into_iter().map(CpuId).collect();
        assert_eq!(format_cpuset(&cpus), "4-6,8,11-12");
    }

    #[test]
    fn parse_cpuset_rejects_garbage() {
        assert!(parse_cpuset("abc").is_err());
    }
}
