//! Site extractors.
//!
//! Each supported site contributes one [`ExtractorSpec`] to the static list
//! returned by [`all`]: its name, the `(keyword, pattern)` routes that select
//! it, and a constructor. The pipeline builds the enabled ones at startup.

pub mod keylol;

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::config::Config;
use crate::download::Downloader;
use crate::model::{ParseResult, Platform};
use crate::registry::RouteMatch;

/// Turns a matched link into a [`ParseResult`].
#[async_trait]
pub trait Extractor: Send + Sync {
    /// The platform this extractor produces results for.
    fn platform(&self) -> &Platform;

    /// Fetches and parses the post behind `route`.
    ///
    /// Media downloads may still be running when this returns.
    async fn parse(&self, route: &RouteMatch) -> Result<ParseResult>;
}

/// Constructor of an extractor.
pub type BuildFn = fn(&Config, Arc<Downloader>) -> Result<Arc<dyn Extractor>>;

/// Static registration entry of one site.
pub struct ExtractorSpec {
    /// Key used in the config `parser` table and in route matches.
    pub name: &'static str,
    /// `(keyword, pattern)` pairs, registered in order.
    pub routes: &'static [(&'static str, &'static str)],
    pub build: BuildFn,
}

static EXTRACTORS: &[ExtractorSpec] =
    &[ExtractorSpec { name: keylol::NAME, routes: keylol::ROUTES, build: keylol::KeylolExtractor::build }];

/// Every known extractor, enabled or not.
pub fn all() -> &'static [ExtractorSpec] {
    EXTRACTORS
}

/// Looks up an extractor entry by name.
pub fn find(name: &str) -> Option<&'static ExtractorSpec> {
    EXTRACTORS.iter().find(|spec| spec.name == name)
}
