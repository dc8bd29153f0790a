//! Deployment configuration for Lightning key login.
//!
//! This crate provides static, per-deployment configuration:
//!
//! - [`Deployment`] -- API base URL, realtime path and sandbox host remaps
//! - [`HostRemap`] -- a single sandbox host rewrite rule
//! - [`constants`] -- wire-level names (query params, headers, storage keys)
//!
//! All data is compile-time constant (`&'static str`, `&'static [HostRemap]`).
//! Types are `Copy`. The crate has no dependencies, so every other crate in
//! the workspace can use it as a leaf.

pub mod constants;
pub mod sandbox;

pub use sandbox::HostRemap;

use sandbox::LOCAL_STACK_REMAPS;

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// Deployment-specific configuration.
///
/// This is `Copy` -- just pointers to static data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    /// Short name used in logs.
    pub name: &'static str,

    /// Base URL of the marketplace API (scheme decides `ws` vs `wss`).
    pub api_url: &'static str,

    /// Path of the realtime endpoint, relative to the API host.
    pub websocket_path: &'static str,

    /// Host rewrites applied to incoming challenges.
    sandbox_remaps: &'static [HostRemap],
}

impl Deployment {
    /// Returns the sandbox host remap table (empty in production).
    pub const fn sandbox_remaps(&self) -> &'static [HostRemap] {
        self.sandbox_remaps
    }

    /// Returns `true` if the API is served over TLS.
    pub fn is_tls(&self) -> bool {
        self.api_url
            .get(..8)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
    }

    /// Returns a copy pointing at a different API base URL.
    ///
    /// Used by binaries that take the URL from the environment.
    pub const fn with_api_url(self, api_url: &'static str) -> Self {
        Self { api_url, ..self }
    }

    // -----------------------------------------------------------------------
    // Built-in deployments
    // -----------------------------------------------------------------------

    /// Production deployment.
    pub const PRODUCTION: Self = Self {
        name: "production",
        api_url: "https://marketplace.example.com",
        websocket_path: "/websocket",
        sandbox_remaps: &[],
    };

    /// Local docker stack.
    pub const SANDBOX: Self = Self {
        name: "sandbox",
        api_url: "http://localhost:5002",
        websocket_path: "/websocket",
        sandbox_remaps: &LOCAL_STACK_REMAPS,
    };
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_is_tls_without_remaps() {
        let d = Deployment::PRODUCTION;
        assert!(d.is_tls());
        assert!(d.sandbox_remaps().is_empty());
    }

    #[test]
    fn sandbox_is_plaintext_with_remaps() {
        let d = Deployment::SANDBOX;
        assert!(!d.is_tls());
        assert!(
            d.sandbox_remaps()
                .iter()
                .any(|r| r.matches("host.docker.internal"))
        );
    }

    #[test]
    fn with_api_url_keeps_other_fields() {
        let d = Deployment::SANDBOX.with_api_url("https://staging.example.com");
        assert!(d.is_tls());
        assert_eq!(d.websocket_path, "/websocket");
        assert_eq!(d.sandbox_remaps().len(), 2);
    }

    #[test]
    fn configs_are_copy() {
        let a = Deployment::PRODUCTION;
        let b = a;
        assert_eq!(a, b);
    }

    #[test]
    fn const_fn_works_at_compile_time() {
        const REMAPS: &[HostRemap] = Deployment::SANDBOX.sandbox_remaps();
        assert_eq!(REMAPS.len(), 2);
    }
}
