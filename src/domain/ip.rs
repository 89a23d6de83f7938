//! IP address normalization for equality comparison
//!
//! Rules may be scoped to a client address, and the same host can arrive
//! spelled many ways (`::ffff:10.0.0.1` vs `10.0.0.1`, compressed vs
//! expanded IPv6, mixed case). Normalization is best-effort: anything that
//! is neither IPv4 nor IPv6 comes back trimmed but otherwise untouched.

use regex::Regex;
use std::sync::LazyLock;

static IPV4_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").expect("static regex"));

static IPV4_MAPPED: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        r"(?i)^::ffff:(\d+\.\d+\.\d+\.\d+)$",
        r"(?i)^::ffff:0:(\d+\.\d+\.\d+\.\d+)$",
        r"(?i)^0:0:0:0:0:ffff:(\d+\.\d+\.\d+\.\d+)$",
        r"(?i)^0000:0000:0000:0000:0000:ffff:(\d+\.\d+\.\d+\.\d+)$",
    ]
    .map(|pattern| Regex::new(pattern).expect("static regex"))
});

static IPV4_EMBEDDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+):(\d+\.\d+\.\d+\.\d+)$").expect("static regex"));

static IPV4_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\d+\.\d+\.\d+\.\d+$").expect("static regex"));

static IPV6_GROUPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([0-9a-f]{0,4}:){1,7}[0-9a-f]{0,4}$").expect("static regex"));

const IPV6_GROUP_COUNT: usize = 8;

/// Normalize an address for comparison.
///
/// Returns `None` for missing or blank input. IPv4-mapped IPv6 addresses
/// collapse to their IPv4 form so both spellings of one host compare equal.
pub fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if is_ipv4(trimmed) {
        return Some(normalize_ipv4(trimmed));
    }

    if is_ipv6(trimmed) {
        return Some(normalize_ipv6(trimmed));
    }

    Some(trimmed.to_string())
}

/// Compare two optional addresses after normalization.
///
/// Two absent (or empty) addresses are equal; one absent address never
/// equals a present one. When either side fails to normalize the raw
/// strings are compared instead.
pub fn equal(a: Option<&str>, b: Option<&str>) -> bool {
    let a = a.filter(|s| !s.is_empty());
    let b = b.filter(|s| !s.is_empty());

    match (a, b) {
        (None, None) => true,
        (Some(_), None) | (None, Some(_)) => false,
        (Some(a), Some(b)) => match (normalize(a), normalize(b)) {
            (Some(left), Some(right)) => left == right,
            _ => a == b,
        },
    }
}

fn strip_brackets(ip: &str) -> &str {
    let ip = ip.strip_prefix('[').unwrap_or(ip);
    ip.strip_suffix(']').unwrap_or(ip)
}

fn is_ipv4(ip: &str) -> bool {
    IPV4_SHAPE.is_match(ip)
        && ip
            .split('.')
            .all(|octet| octet.parse::<u16>().is_ok_and(|n| n <= 255))
}

fn normalize_ipv4(ip: &str) -> String {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return ip.to_string();
    }

    parts
        .iter()
        .map(|part| match part.parse::<u64>() {
            Ok(n) => n.to_string(),
            Err(_) => (*part).to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn is_ipv6(ip: &str) -> bool {
    let clean = strip_brackets(ip);

    if IPV4_MAPPED[0].is_match(clean) || IPV4_MAPPED[1].is_match(clean) {
        return true;
    }

    if clean.contains(':') && IPV4_SUFFIX.is_match(clean) {
        return true;
    }

    let colons = clean.matches(':').count();
    if clean.contains("::") {
        (2..=7).contains(&colons) && IPV6_GROUPS.is_match(&clean.replacen("::", ":", 1))
    } else {
        colons == 7 && IPV6_GROUPS.is_match(clean)
    }
}

fn normalize_ipv6(ip: &str) -> String {
    let mut clean = strip_brackets(ip).to_string();

    for pattern in IPV4_MAPPED.iter() {
        if let Some(captures) = pattern.captures(&clean) {
            return normalize_ipv4(&captures[1]);
        }
    }

    if let Some(captures) = IPV4_EMBEDDED.captures(&clean) {
        let (head, tail) = (captures[1].to_string(), captures[2].to_string());
        if is_ipv4(&tail) {
            let octets: Vec<u8> = tail.split('.').filter_map(|o| o.parse().ok()).collect();
            clean = format!(
                "{head}:{:02x}{:02x}:{:02x}{:02x}",
                octets[0], octets[1], octets[2], octets[3]
            );
        }
    }

    let expanded = expand_ipv6(&clean);
    mapped_ipv4(&expanded).unwrap_or(expanded)
}

fn expand_ipv6(clean: &str) -> String {
    let halves: Vec<&str> = clean.split("::").collect();
    match halves.as_slice() {
        [left, right] => {
            let left = groups(left);
            let right = groups(right);
            let Some(missing) = IPV6_GROUP_COUNT.checked_sub(left.len() + right.len()) else {
                return clean.to_lowercase();
            };

            left.iter()
                .map(|g| pad_group(g))
                .chain(std::iter::repeat_n("0000".to_string(), missing))
                .chain(right.iter().map(|g| pad_group(g)))
                .collect::<Vec<_>>()
                .join(":")
                .to_lowercase()
        }
        [whole] => {
            let parts = groups(whole);
            if parts.len() == IPV6_GROUP_COUNT {
                parts
                    .iter()
                    .map(|g| pad_group(g))
                    .collect::<Vec<_>>()
                    .join(":")
                    .to_lowercase()
            } else {
                clean.to_lowercase()
            }
        }
        _ => clean.to_lowercase(),
    }
}

/// Dotted IPv4 for an expanded `::ffff:0:0/96` address, whatever its spelling was.
fn mapped_ipv4(expanded: &str) -> Option<String> {
    let groups = expanded
        .split(':')
        .map(|g| u16::from_str_radix(g, 16).ok())
        .collect::<Option<Vec<u16>>>()?;
    let [0, 0, 0, 0, 0, 0xffff, high, low] = groups[..] else {
        return None;
    };

    let [a, b] = high.to_be_bytes();
    let [c, d] = low.to_be_bytes();
    Some(format!("{a}.{b}.{c}.{d}"))
}

fn groups(half: &str) -> Vec<&str> {
    half.split(':').filter(|g| !g.is_empty()).collect()
}

fn pad_group(group: &str) -> String {
    format!("{group:0>4}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("192.168.1.1", "192.168.1.1")]
    #[case("192.168.001.010", "192.168.1.10")]
    #[case("  10.0.0.1  ", "10.0.0.1")]
    #[case("::ffff:192.168.1.1", "192.168.1.1")]
    #[case("::FFFF:192.168.1.1", "192.168.1.1")]
    #[case("::ffff:0:10.0.0.1", "10.0.0.1")]
    #[case("0:0:0:0:0:ffff:10.0.0.1", "10.0.0.1")]
    #[case("0000:0000:0000:0000:0000:ffff:10.0.0.1", "10.0.0.1")]
    #[case("[::ffff:127.0.0.1]", "127.0.0.1")]
    #[case("0::ffff:10.0.0.1", "10.0.0.1")]
    #[case("::0:ffff:10.0.0.1", "10.0.0.1")]
    #[case("::ffff:a00:1", "10.0.0.1")]
    #[case("::FFFF:0A00:0001", "10.0.0.1")]
    #[case("0:0:0:0:0:ffff:a00:1", "10.0.0.1")]
    fn test_ipv4_forms(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input).as_deref(), Some(expected));
    }

    #[rstest]
    #[case("2001:db8::1", "2001:0db8:0000:0000:0000:0000:0000:0001")]
    #[case("2001:DB8::1", "2001:0db8:0000:0000:0000:0000:0000:0001")]
    #[case("[2001:db8::1]", "2001:0db8:0000:0000:0000:0000:0000:0001")]
    #[case("::1", "0000:0000:0000:0000:0000:0000:0000:0001")]
    #[case("fe80::", "fe80:0000:0000:0000:0000:0000:0000:0000")]
    #[case(
        "2001:0db8:0000:0000:0000:0000:0000:0001",
        "2001:0db8:0000:0000:0000:0000:0000:0001"
    )]
    #[case("1:2:3:4:5:6:7:8", "0001:0002:0003:0004:0005:0006:0007:0008")]
    #[case("2001:db8::192.168.1.1", "2001:0db8:0000:0000:0000:0000:c0a8:0101")]
    fn test_ipv6_forms(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input).as_deref(), Some(expected));
    }

    #[test]
    fn test_blank_input_is_not_normalized() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("   "), None);
    }

    #[test]
    fn test_hostnames_pass_through_trimmed() {
        assert_eq!(normalize(" localhost ").as_deref(), Some("localhost"));
        assert_eq!(normalize("Example.COM").as_deref(), Some("Example.COM"));
    }

    #[test]
    fn test_out_of_range_octets_are_not_ipv4() {
        assert_eq!(normalize("256.1.1.1").as_deref(), Some("256.1.1.1"));
    }

    #[test]
    fn test_multiple_compressions_fall_back_to_lowercase() {
        assert_eq!(normalize("1::2::ABCD").as_deref(), Some("1::2::abcd"));
    }

    #[test]
    fn test_too_many_groups_around_compression_falls_back_to_lowercase() {
        // Six groups on the left and three (after IPv4 expansion) on the right.
        assert_eq!(
            normalize("1:2:3:4:5:6::7:1.2.3.4").as_deref(),
            Some("1:2:3:4:5:6::7:0102:0304")
        );
    }

    #[test]
    fn test_equal_handles_absent_values() {
        assert!(equal(None, None));
        assert!(equal(Some(""), None));
        assert!(!equal(Some("10.0.0.1"), None));
        assert!(!equal(None, Some("10.0.0.1")));
    }

    #[test]
    fn test_equal_across_representations() {
        assert!(equal(Some("10.0.0.1"), Some("::ffff:10.0.0.1")));
        assert!(equal(Some("2001:db8::1"), Some("2001:0DB8:0:0:0:0:0:1")));
        assert!(!equal(Some("10.0.0.1"), Some("10.0.0.2")));
    }

    #[test]
    fn test_equal_falls_back_to_raw_comparison() {
        assert!(equal(Some("  "), Some("  ")));
        assert!(!equal(Some("  "), Some(" ")));
    }
}
