//! Independent limiters scoped to request path prefixes.

use std::sync::Arc;

use tracing::info;

use super::limiter::RateLimiter;
use crate::config::GatekeeperConfig;
use crate::error::Result;

/// A limiter applied to every path under `path_prefix`.
#[derive(Debug, Clone)]
pub struct ScopedLimiter {
    pub path_prefix: String,
    pub limiter: Arc<RateLimiter>,
}

impl ScopedLimiter {
    /// Whether `path` falls under this scope, on a segment boundary.
    fn matches(&self, path: &str) -> bool {
        let prefix = self.path_prefix.as_str();
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
            None => false,
        }
    }
}

/// The set of limiters guarding an application.
///
/// The longest matching path prefix wins; otherwise the global limiter
/// applies. Each member keeps its own counters.
#[derive(Debug, Clone, Default)]
pub struct LimiterSet {
    global: Option<Arc<RateLimiter>>,
    scoped: Vec<ScopedLimiter>,
}

impl LimiterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the limiters described by `config`.
    pub fn from_config(config: &GatekeeperConfig) -> Result<Self> {
        let mut set = Self::new();

        if let Some(ref options) = config.rate_limit {
            set = set.with_global(RateLimiter::new(options.clone())?.named("global"));
        }

        for route in &config.routes {
            let limiter = RateLimiter::new(route.limit.clone())?.named(route.path_prefix.clone());
            set = set.with_scope(route.path_prefix.clone(), limiter);
        }

        info!(
            global = set.global.is_some(),
            scoped = set.scoped.len(),
            "Rate limiters configured"
        );
        Ok(set)
    }

    /// Set the limiter used when no scope matches.
    pub fn with_global(mut self, limiter: RateLimiter) -> Self {
        self.global = Some(Arc::new(limiter));
        self
    }

    /// Add a limiter for paths under `path_prefix`.
    pub fn with_scope(mut self, path_prefix: impl Into<String>, limiter: RateLimiter) -> Self {
        self.scoped.push(ScopedLimiter {
            path_prefix: path_prefix.into(),
            limiter: Arc::new(limiter),
        });
        self.scoped
            .sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));
        self
    }

    /// Pick the limiter responsible for `path`, if any.
    pub fn select(&self, path: &str) -> Option<&Arc<RateLimiter>> {
        self.scoped
            .iter()
            .find(|scope| scope.matches(path))
            .map(|scope| &scope.limiter)
            .or(self.global.as_ref())
    }

    pub fn global(&self) -> Option<&Arc<RateLimiter>> {
        self.global.as_ref()
    }

    pub fn scoped(&self) -> &[ScopedLimiter] {
        &self.scoped
    }

    /// Iterate over every limiter in the set.
    pub fn limiters(&self) -> impl Iterator<Item = &Arc<RateLimiter>> {
        self.global
            .iter()
            .chain(self.scoped.iter().map(|scope| &scope.limiter))
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_none() && self.scoped.is_empty()
    }

    /// Start every limiter's sweep task.
    pub fn start_all(&self) -> Result<()> {
        for limiter in self.limiters() {
            limiter.start()?;
        }
        Ok(())
    }

    /// Stop every limiter's sweep task.
    pub async fn stop_all(&self) {
        for limiter in self.limiters() {
            limiter.stop().await;
        }
    }
}
