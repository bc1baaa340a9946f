//! Message handling entry point.
//!
//! A [`Pipeline`] wires the registry, the extractors, the downloader, the
//! renderer and the sender together. Hosts create one at startup, feed it
//! every incoming chat message and terminate it on shutdown.
//!
//! # Example
//!
//! ```rust,no_run
//! use threadcard_core::{Config, Pipeline};
//!
//! # async fn run() -> threadcard_core::Result<()> {
//! let pipeline = Pipeline::initialize(Config::default())?;
//! if let Some(result) = pipeline.extract("https://keylol.com/t123456-1-1").await {
//!     println!("{:?}", result.title);
//! }
//! pipeline.terminate().await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::Result;
use crate::config::Config;
use crate::download::Downloader;
use crate::extractors::{self, Extractor};
use crate::model::ParseResult;
use crate::registry::PatternRegistry;
use crate::render::Renderer;
use crate::send::{Sender, Transport};

pub struct Pipeline {
    config: Config,
    registry: PatternRegistry,
    extractors: HashMap<String, Arc<dyn Extractor>>,
    downloader: Arc<Downloader>,
    renderer: Arc<Renderer>,
    sender: Sender,
}

impl Pipeline {
    /// Builds every component from `config`.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid, the cache directory cannot be
    /// created, or an extractor cannot be built.
    pub fn initialize(config: Config) -> Result<Self> {
        config.validate()?;

        let downloader = Arc::new(Downloader::new(&config)?);
        let renderer = Arc::new(Renderer::new(&config));
        let sender = Sender::new(&config, Arc::clone(&renderer));

        let mut built = HashMap::new();
        for spec in extractors::all().iter().filter(|s| config.site(s.name).enable) {
            let extractor = (spec.build)(&config, Arc::clone(&downloader))?;
            built.insert(spec.name.to_string(), extractor);
        }
        let registry = PatternRegistry::from_extractors(extractors::all(), &config)?;

        info!(extractors = built.len(), routes = registry.len(), cache_dir = %config.cache_dir.display(), "pipeline ready");
        Ok(Self { config, registry, extractors: built, downloader, renderer, sender })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn is_session_enabled(&self, session: &str) -> bool {
        self.config.is_session_enabled(session)
    }

    /// Finds a supported link in `text` and extracts it.
    ///
    /// Extraction errors are logged and reported as `None`; the first
    /// matching route decides and no other extractor is tried.
    pub async fn extract(&self, text: &str) -> Option<ParseResult> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let route = self.registry.find(text)?;
        let Some(extractor) = self.extractors.get(&route.platform) else {
            warn!(platform = %route.platform, "route matched an extractor that is not loaded");
            return None;
        };

        match extractor.parse(&route).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(platform = %route.platform, link = %route.matched, error = %e, "extraction failed");
                None
            }
        }
    }

    /// Handles one chat message from `session`, replying through `transport`.
    ///
    /// Returns whether a result was delivered. Only transport errors are
    /// returned; everything else is logged.
    pub async fn handle_message(&self, session: &str, text: &str, transport: &dyn Transport) -> Result<bool> {
        if !self.is_session_enabled(session) {
            debug!(session, "session not enabled");
            return Ok(false);
        }

        let Some(result) = self.extract(text).await else {
            return Ok(false);
        };

        let sent = self.sender.deliver(transport, &result).await?;
        Ok(sent > 0)
    }

    /// Closes the shared HTTP session.
    pub async fn terminate(&self) {
        self.downloader.close().await;
        info!("pipeline terminated");
    }
}
