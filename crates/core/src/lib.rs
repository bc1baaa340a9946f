pub mod clean;
pub mod config;
pub mod download;
pub mod error;
pub mod extractors;
pub mod media;
pub mod model;
pub mod parse;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod send;

pub use clean::{CleanRule, TextCleaner};
pub use config::{Config, ConfigBuilder, RenderConfig, SiteConfig};
pub use download::{Downloader, HttpSession};
pub use error::{DownloadError, DownloadResult, ParseError, Result, ThreadcardError};
pub use extractors::{Extractor, ExtractorSpec};
pub use media::MediaRef;
pub use model::{Author, Content, ContentKind, ParseResult, ParseResultBuilder, Platform};
pub use parse::Document;
pub use pipeline::Pipeline;
pub use registry::{PatternRegistry, RouteMatch};
pub use render::Renderer;
pub use send::{ForwardNode, OutboundMessage, SendPlan, Sender, Segment, Transport};
