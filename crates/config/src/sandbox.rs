//! Host remapping for sandboxed backends.
//!
//! In local and CI stacks the backend issues challenges carrying its
//! in-container hostname (e.g. `host.docker.internal`), which the client
//! cannot resolve. A remap table rewrites those hosts to something reachable,
//! keeping path and query intact.

/// A single host rewrite rule.
///
/// `pattern` matches the host exactly or any subdomain of it.
/// `replacement` is `host`, `host:port`, `[v6]` or `[v6]:port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostRemap {
    /// Host (or parent domain) to match.
    pub pattern: &'static str,

    /// Host, optionally with `:port`, substituted on match.
    pub replacement: &'static str,
}

impl HostRemap {
    /// Returns `true` if `host` equals the pattern or is a subdomain of it.
    pub fn matches(&self, host: &str) -> bool {
        if host.eq_ignore_ascii_case(self.pattern) {
            return true;
        }
        let (host_len, pat_len) = (host.len(), self.pattern.len());
        host_len > pat_len + 1
            && host.as_bytes()[host_len - pat_len - 1] == b'.'
            && host[host_len - pat_len..].eq_ignore_ascii_case(self.pattern)
    }
}

/// Remaps applied when running against the local docker stack.
pub(crate) const LOCAL_STACK_REMAPS: [HostRemap; 2] = [
    HostRemap {
        pattern: "host.docker.internal",
        replacement: "localhost",
    },
    HostRemap {
        pattern: "backend",
        replacement: "localhost:5002",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    const REMAP: HostRemap = HostRemap {
        pattern: "docker.internal",
        replacement: "localhost",
    };

    #[test]
    fn exact_host_matches() {
        assert!(REMAP.matches("docker.internal"));
        assert!(REMAP.matches("DOCKER.internal"));
    }

    #[test]
    fn subdomain_matches() {
        assert!(REMAP.matches("host.docker.internal"));
    }

    #[test]
    fn suffix_without_dot_does_not_match() {
        assert!(!REMAP.matches("notdocker.internal"));
        assert!(!REMAP.matches("internal"));
        assert!(!REMAP.matches("example.com"));
    }
}
