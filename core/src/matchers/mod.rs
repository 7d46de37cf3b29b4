//! Built-in matchers, one per known [`RuleType`](crate::RuleType).
//!
//! Each matcher decodes the rule's `configuration` payload into its own
//! config struct on every call and reports an undecodable payload as
//! [`MatchError::InvalidConfig`](crate::MatchError::InvalidConfig).

mod header;
mod id_list;
mod ip_range;
mod percentage;

pub use header::{HeaderMatcher, HeaderRuleConfig};
pub use id_list::{IdListConfig, IdListMatcher};
pub use ip_range::{IpRange, IpRangeConfig, IpRangeMatcher};
pub use percentage::{HashSource, PercentageConfig, PercentageMatcher, BUCKETS};
