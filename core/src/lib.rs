//! Core utilities shared by the CPE ingest crates.

pub mod ratelimiter;

pub use ratelimiter::RateLimiter;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Data source an import attempt pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Cpe,
    Cve,
    Linux,
}

impl Source {
    pub const fn as_str(self) -> &'static str {
        match self {
            Source::Cpe => "CPE",
            Source::Cve => "CVE",
            Source::Linux => "LINUX",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CPE" => Some(Source::Cpe),
            "CVE" => Some(Source::Cve),
            "LINUX" => Some(Source::Linux),
            _ => None,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }

    #[test]
    fn source_names_round_trip() {
        for s in [Source::Cpe, Source::Cve, Source::Linux] {
            assert_eq!(Source::parse(s.as_str()), Some(s));
        }
        assert_eq!(Source::parse("cpe"), None);
    }
}
