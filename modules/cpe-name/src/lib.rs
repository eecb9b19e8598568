//! CPE 2.3 formatted-string decoding.
//!
//! `cpe:2.3:part:vendor:product:version:update:edition:language:sw_edition:target_sw:target_hw:other`
//!
//! Only the escapes the NVD feed actually emits in practice (`%20`, `%2f`,
//! `%5c`) are undone. The full quoting table of CPE 2.3 naming is not
//! implemented, so e.g. `\:` or `%21` pass through untouched.

use serde::{Deserialize, Serialize};

/// Number of colon-separated fields in a CPE 2.3 formatted string.
pub const FIELD_COUNT: usize = 13;

/// Longest decoded component kept.
pub const COMPONENT_MAX: usize = 200;

pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpeComponents {
    pub part: String,
    pub vendor: String,
    pub product: String,
    pub version: String,
    pub update: String,
    pub edition: String,
    pub language: String,
    pub sw_edition: String,
    pub target_sw: String,
    pub target_hw: String,
    pub other: String,
}

/// Decode one component. Empty and `*` both mean "any" and decode to "".
pub fn decode_component(raw: &str) -> String {
    if raw.is_empty() || raw == WILDCARD {
        return String::new();
    }
    let decoded = raw.replace("%20", " ").replace("%2f", "/").replace("%5c", "\\");
    truncate_chars(&decoded, COMPONENT_MAX)
}

/// Split a CPE name into its components. Short names are padded with
/// wildcards, so this never fails.
pub fn parse_cpe_name(name: &str) -> CpeComponents {
    let mut fields: Vec<&str> = if name.is_empty() { Vec::new() } else { name.split(':').collect() };
    while fields.len() < FIELD_COUNT {
        fields.push(WILDCARD);
    }
    CpeComponents {
        part: fields[2].to_string(),
        vendor: decode_component(fields[3]),
        product: decode_component(fields[4]),
        version: decode_component(fields[5]),
        update: decode_component(fields[6]),
        edition: decode_component(fields[7]),
        language: decode_component(fields[8]),
        sw_edition: decode_component(fields[9]),
        target_sw: decode_component(fields[10]),
        target_hw: decode_component(fields[11]),
        other: decode_component(fields[12]),
    }
}

/// Keep at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_escapes() {
        assert_eq!(decode_component("%20test%2fcase"), " test/case");
        assert_eq!(decode_component("1.0%5c2"), "1.0\\2");
    }

    #[test]
    fn wildcard_and_empty_decode_to_empty() {
        assert_eq!(decode_component("*"), "");
        assert_eq!(decode_component(""), "");
    }

    #[test]
    fn unsupported_escapes_pass_through() {
        assert_eq!(decode_component("a%21b"), "a%21b");
        assert_eq!(decode_component("a\\:b"), "a\\:b");
    }

    #[test]
    fn long_component_is_truncated() {
        let raw = "x".repeat(250);
        assert_eq!(decode_component(&raw).chars().count(), COMPONENT_MAX);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }

    #[test]
    fn parses_full_name() {
        let c = parse_cpe_name("cpe:2.3:a:apache:http_server:2.4.41:*:*:*:*:*:*:*");
        assert_eq!(c.part, "a");
        assert_eq!(c.vendor, "apache");
        assert_eq!(c.product, "http_server");
        assert_eq!(c.version, "2.4.41");
        assert_eq!(c.update, "");
        assert_eq!(c.other, "");
    }

    #[test]
    fn parses_special_characters() {
        let c = parse_cpe_name("cpe:2.3:a:test%20vendor:test%2fproduct:1.0%5c2:*:*:*:*:*:*:*");
        assert_eq!(c.vendor, "test vendor");
        assert_eq!(c.product, "test/product");
        assert_eq!(c.version, "1.0\\2");
    }

    #[test]
    fn short_names_are_padded() {
        let c = parse_cpe_name("cpe:2.3:o:microsoft");
        assert_eq!(c.part, "o");
        assert_eq!(c.vendor, "microsoft");
        assert_eq!(c.product, "");
        assert_eq!(c.target_hw, "");

        let c = parse_cpe_name("invalid-cpe-format");
        assert_eq!(c.part, "*");
        assert_eq!(c.vendor, "");

        assert_eq!(parse_cpe_name(""), CpeComponents { part: "*".into(), ..CpeComponents::default() });
    }

    #[test]
    fn positions_map_in_order() {
        let c = parse_cpe_name("cpe:2.3:h:v:p:ver:upd:ed:en:swe:tsw:thw:oth");
        assert_eq!(
            c,
            CpeComponents {
                part: "h".into(),
                vendor: "v".into(),
                product: "p".into(),
                version: "ver".into(),
                update: "upd".into(),
                edition: "ed".into(),
                language: "en".into(),
                sw_edition: "swe".into(),
                target_sw: "tsw".into(),
                target_hw: "thw".into(),
                other: "oth".into(),
            }
        );
    }
}
