//! Keyword/pattern routing of chat messages to extractors.
//!
//! Each route pairs a cheap trigger keyword with a compiled pattern. The
//! table is kept sorted by descending keyword length so that a specific
//! keyword is tried before a shorter one contained in it.

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use crate::Result;
use crate::config::Config;
use crate::extractors::ExtractorSpec;

/// One registered trigger.
#[derive(Debug, Clone)]
struct Route {
    platform: String,
    keyword: String,
    pattern: Regex,
}

/// A successful route lookup, detached from the message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Name of the platform whose extractor owns the route.
    pub platform: String,
    /// Keyword of the route that matched.
    pub keyword: String,
    /// Full text of the pattern match.
    pub matched: String,
    /// Named capture groups that participated in the match.
    pub groups: HashMap<String, String>,
}

impl RouteMatch {
    /// Value of a named capture group.
    pub fn group(&self, name: &str) -> Option<&str> {
        self.groups.get(name).map(String::as_str)
    }
}

/// Routing table from message text to platform extractors.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    routes: Vec<Route>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the routes of every enabled extractor in `specs`.
    pub fn from_extractors(specs: &[ExtractorSpec], config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        for spec in specs.iter().filter(|s| config.site(s.name).enable) {
            for (keyword, pattern) in spec.routes {
                registry.register(spec.name, keyword, pattern)?;
            }
        }
        Ok(registry)
    }

    /// Compiles `pattern` and adds it under `keyword`.
    ///
    /// Routes stay ordered by descending keyword length; among equal lengths
    /// the earlier registration is tried first.
    pub fn register(&mut self, platform: &str, keyword: &str, pattern: &str) -> Result<()> {
        let pattern = Regex::new(pattern)?;
        self.routes.push(Route { platform: platform.to_string(), keyword: keyword.to_string(), pattern });
        self.routes.sort_by_key(|r| std::cmp::Reverse(r.keyword.chars().count()));
        Ok(())
    }

    /// Finds the first route whose keyword occurs in `text` and whose pattern matches it.
    pub fn find(&self, text: &str) -> Option<RouteMatch> {
        for route in &self.routes {
            if !text.contains(&route.keyword) {
                continue;
            }

            let Some(captures) = route.pattern.captures(text) else {
                continue;
            };

            let matched = captures.get(0).map(|m| m.as_str()).unwrap_or_default().to_string();
            let groups = route
                .pattern
                .capture_names()
                .flatten()
                .filter_map(|name| captures.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
                .collect();

            debug!(platform = %route.platform, keyword = %route.keyword, %matched, "route matched");
            return Some(RouteMatch { platform: route.platform.clone(), keyword: route.keyword.clone(), matched, groups });
        }

        None
    }

    /// Keywords in the order they are tried.
    pub fn keywords(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.keyword.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
