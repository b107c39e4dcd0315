use std::sync::OnceLock;

use regex::Regex;

const HEX_GROUP: &str = "[0-9A-Fa-f]{1,4}";
const DOTTED_OCTET: &str = "(?:25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])";
const CIDR_SUFFIX: &str = "(?:/(?:12[0-8]|1[01][0-9]|[1-9]?[0-9]))?";

fn ipv6_regex() -> &'static Regex {
    static IPV6: OnceLock<Regex> = OnceLock::new();
    IPV6.get_or_init(|| {
        let h = HEX_GROUP;
        let v4 = format!("{DOTTED_OCTET}(?:\\.{DOTTED_OCTET}){{3}}");
        // One branch per count of leading groups before the `::`.
        let branches = [
            format!("(?:{h}:){{7}}(?:{h}|:)"),
            format!("(?:{h}:){{6}}(?::{h}|{v4}|:)"),
            format!("(?:{h}:){{5}}(?:(?::{h}){{1,2}}|:{v4}|:)"),
            format!("(?:{h}:){{4}}(?:(?::{h}){{1,3}}|(?::{h})?:{v4}|:)"),
            format!("(?:{h}:){{3}}(?:(?::{h}){{1,4}}|(?::{h}){{0,2}}:{v4}|:)"),
            format!("(?:{h}:){{2}}(?:(?::{h}){{1,5}}|(?::{h}){{0,3}}:{v4}|:)"),
            format!("(?:{h}:)(?:(?::{h}){{1,6}}|(?::{h}){{0,4}}:{v4}|:)"),
            format!(":(?:(?::{h}){{1,7}}|(?::{h}){{0,5}}:{v4}|:)"),
        ];
        let pattern = format!("^(?:{})(?:%.+)?{CIDR_SUFFIX}$", branches.join("|"));
        Regex::new(&pattern).expect("IPv6 address pattern must compile")
    })
}

/// Normalize an IPv4 or IPv6 address to its canonical display form.
///
/// IPv4 loses leading zeros per octet. IPv6 is uppercased, its `::`
/// abbreviation expanded, and leading zeros removed from every group.
pub fn sanitize_ip(candidate: &str) -> String {
    let ip = trim_blanks(candidate);

    if is_dotted_quad(ip) {
        return ip
            .split('.')
            .map(strip_octet_zeros)
            .collect::<Vec<_>>()
            .join(".");
    }
    if !ipv6_regex().is_match(ip) {
        return ip.to_string();
    }

    let upper = ip.to_ascii_uppercase();
    let address_end = upper.find(['%', '/']).unwrap_or(upper.len());
    let (address, suffix) = upper.split_at(address_end);
    let expanded = format!("{}{suffix}", expand_abbreviation(address));
    expanded
        .split(':')
        .map(strip_group_zeros)
        .collect::<Vec<_>>()
        .join(":")
}

/// Four decimal octets of at most three digits each, no CIDR suffix.
fn is_dotted_quad(ip: &str) -> bool {
    let octets: Vec<&str> = ip.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|octet| {
            (1..=3).contains(&octet.len())
                && octet.bytes().all(|byte| byte.is_ascii_digit())
                && octet.parse::<u16>().is_ok_and(|value| value <= 255)
        })
}

fn strip_octet_zeros(octet: &str) -> &str {
    let stripped = octet.trim_start_matches('0');
    if stripped.is_empty() { "0" } else { stripped }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abbreviation {
    Start,
    End,
    Middle,
}

/// Replace the `::` in a bare address (no zone, no CIDR) with explicit zero groups.
fn expand_abbreviation(address: &str) -> String {
    let Some(position) = address.find("::") else {
        return address.to_string();
    };
    let placement = if position == 0 {
        Abbreviation::Start
    } else if position + 2 == address.len() {
        Abbreviation::End
    } else {
        Abbreviation::Middle
    };
    // `pad` is the colon count of a full address plus the two in `::`.
    let (repeat, pad, extra): (&str, usize, &str) = match placement {
        Abbreviation::Start => ("0:", 9, if address == "::" { "0" } else { "" }),
        Abbreviation::End => (":0", 9, ""),
        Abbreviation::Middle => (":0", 8, ":"),
    };
    let colons = address.matches(':').count();
    let filler = format!("{}{extra}", repeat.repeat(pad.saturating_sub(colons)));
    address.replacen("::", &filler, 1)
}

fn strip_group_zeros(group: &str) -> &str {
    let rest = group.trim_start_matches('0');
    let zeros = group.len() - rest.len();
    if zeros == 0 || rest.starts_with(|ch: char| ch.is_ascii_hexdigit()) {
        return rest;
    }
    // A zero run not followed by another hex digit keeps its final zero.
    &group[zeros - 1..]
}

/// Trim spaces, tabs, line breaks, NUL and vertical tab from both ends.
pub(crate) fn trim_blanks(value: &str) -> &str {
    value.trim_matches(|ch| matches!(ch, ' ' | '\t' | '\n' | '\r' | '\0' | '\x0B'))
}
