//! `IpAddress` rules: client address inside a CIDR range.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::Deserialize;

use crate::{GrayContext, GrayRule, MatchError, RuleMatcher, RuleType};

/// Configuration of an `IpAddress` rule.
///
/// ```json
/// { "ranges": ["10.0.0.0/8", "192.168.1.7", "fd00::/8"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IpRangeConfig {
    #[serde(alias = "cidrs")]
    pub ranges: Vec<String>,
}

/// An address block: network address plus prefix length.
///
/// # Example
///
/// ```
/// use grayroute::matchers::IpRange;
///
/// let range: IpRange = "10.1.0.0/16".parse().unwrap();
/// assert!(range.contains("10.1.200.3".parse().unwrap()));
/// assert!(!range.contains("10.2.0.1".parse().unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix: u8,
}

impl IpRange {
    /// Returns `true` if `addr` lies inside this block.
    ///
    /// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are compared as IPv4.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        let addr = match addr {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(addr, IpAddr::V4),
            v4 @ IpAddr::V4(_) => v4,
        };
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(a)) => {
                let mask = prefix_mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(a) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(a)) => {
                let mask = prefix_mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(a) & mask
            }
            _ => false,
        }
    }
}

fn prefix_mask_u32(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

fn prefix_mask_u128(prefix: u8) -> u128 {
    u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0)
}

impl FromStr for IpRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let network: IpAddr = addr
            .parse()
            .map_err(|_| format!("invalid address in range \"{s}\""))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| format!("invalid prefix length in range \"{s}\""))?,
            None => max,
        };
        Ok(Self { network, prefix })
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Matches when the client address falls into any configured range.
/// A missing or unparseable client address never matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpRangeMatcher;

impl IpRangeMatcher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn ranges(rule: &GrayRule) -> Result<Vec<IpRange>, MatchError> {
        let config: IpRangeConfig = rule.typed_config()?;
        config
            .ranges
            .iter()
            .map(|r| r.parse::<IpRange>())
            .collect::<Result<_, _>>()
            .map_err(|e| MatchError::invalid_config(&rule.id, RuleType::IpAddress, e))
    }
}

impl RuleMatcher for IpRangeMatcher {
    fn rule_type(&self) -> RuleType {
        RuleType::IpAddress
    }

    fn is_match(&self, ctx: &GrayContext, rule: &GrayRule) -> Result<bool, MatchError> {
        let ranges = Self::ranges(rule)?;
        let Some(addr) = ctx.client_addr() else {
            return Ok(false);
        };
        Ok(ranges.iter().any(|r| r.contains(addr)))
    }

    fn check_config(&self, rule: &GrayRule) -> Result<(), MatchError> {
        Self::ranges(rule).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(ranges: &[&str]) -> GrayRule {
        GrayRule::new("ip", "office", RuleType::IpAddress, "v2")
            .with_configuration(json!({ "ranges": ranges }))
    }

    fn ctx(ip: &str) -> GrayContext {
        GrayContext::builder().client_ip(ip).build()
    }

    #[test]
    fn v4_cidr() {
        let m = IpRangeMatcher::new();
        let r = rule(&["10.0.0.0/8"]);
        assert_eq!(m.is_match(&ctx("10.20.30.40"), &r), Ok(true));
        assert_eq!(m.is_match(&ctx("11.0.0.1"), &r), Ok(false));
    }

    #[test]
    fn single_address_is_a_host_range() {
        let m = IpRangeMatcher::new();
        let r = rule(&["192.168.1.7"]);
        assert_eq!(m.is_match(&ctx("192.168.1.7"), &r), Ok(true));
        assert_eq!(m.is_match(&ctx("192.168.1.8"), &r), Ok(false));
    }

    #[test]
    fn zero_prefix_matches_everything_of_that_family() {
        let m = IpRangeMatcher::new();
        let r = rule(&["0.0.0.0/0"]);
        assert_eq!(m.is_match(&ctx("8.8.8.8"), &r), Ok(true));
        assert_eq!(m.is_match(&ctx("2001:db8::1"), &r), Ok(false));
    }

    #[test]
    fn v6_cidr_and_mapped_v4() {
        let m = IpRangeMatcher::new();
        let r = rule(&["fd00::/8", "10.0.0.0/8"]);
        assert_eq!(m.is_match(&ctx("fd12:3456::1"), &r), Ok(true));
        assert_eq!(m.is_match(&ctx("::ffff:10.1.2.3"), &r), Ok(true));
        assert_eq!(m.is_match(&ctx("2001:db8::1"), &r), Ok(false));
    }

    #[test]
    fn socket_addresses_are_accepted() {
        let m = IpRangeMatcher::new();
        let r = rule(&["10.0.0.0/8", "fd00::/8"]);
        assert_eq!(m.is_match(&ctx("10.0.0.1:44321"), &r), Ok(true));
        assert_eq!(m.is_match(&ctx("[fd00::1]:443"), &r), Ok(true));
    }

    #[test]
    fn absent_or_garbage_client_ip_never_matches() {
        let m = IpRangeMatcher::new();
        let r = rule(&["0.0.0.0/0"]);
        assert_eq!(m.is_match(&GrayContext::default(), &r), Ok(false));
        assert_eq!(m.is_match(&ctx("not-an-ip"), &r), Ok(false));
    }

    #[test]
    fn bad_ranges_are_config_errors() {
        let m = IpRangeMatcher::new();
        for bad in ["10.0.0.0/33", "fd00::/129", "10.0.0/8", "10.0.0.0/x"] {
            assert!(m.check_config(&rule(&[bad])).is_err(), "{bad}");
        }
        assert!(m.check_config(&rule(&["10.0.0.0/32", "::/0"])).is_ok());
    }

    #[test]
    fn range_display() {
        let r: IpRange = "10.0.0.1".parse().unwrap();
        assert_eq!(r.to_string(), "10.0.0.1/32");
    }
}
