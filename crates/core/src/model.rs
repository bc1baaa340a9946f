//! Content model shared by extractors, the renderer and the sender.
//!
//! A [`ParseResult`] is produced once per matched link and consumed once by
//! delivery. Its media live in [`Content`] items whose files may still be
//! downloading (see [`MediaRef`]).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use crate::error::DownloadResult;
use crate::media::MediaRef;

/// Identifies a source site.
///
/// Two platforms are equal when their `name` matches; the display name is
/// presentation only.
#[derive(Debug, Clone)]
pub struct Platform {
    pub name: String,
    pub display_name: String,
}

impl Platform {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self { name: name.into(), display_name: display_name.into() }
    }
}

impl PartialEq for Platform {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Platform {}

impl Hash for Platform {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// Post author.
#[derive(Debug, Clone, Default)]
pub struct Author {
    pub name: Option<String>,
    pub avatar: Option<MediaRef>,
    pub description: Option<String>,
}

impl Author {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Default::default() }
    }
}

/// Kind of a [`Content`] item, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Image,
    Video,
    Audio,
    Dynamic,
    File,
    Graphics,
}

/// One media item of a post.
#[derive(Debug, Clone)]
pub enum Content {
    Image { media: MediaRef },
    Video { media: MediaRef, cover: Option<MediaRef>, duration: f64 },
    Audio { media: MediaRef, duration: f64 },
    /// Animated image.
    Dynamic { media: MediaRef },
    File { media: MediaRef, name: Option<String> },
    /// Image with the text that accompanies it in the post.
    Graphics { media: MediaRef, text: Option<String>, alt: Option<String> },
}

impl Content {
    pub fn image(media: MediaRef) -> Self {
        Self::Image { media }
    }

    pub fn graphics(media: MediaRef, text: Option<String>, alt: Option<String>) -> Self {
        Self::Graphics { media, text, alt }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Image { .. } => ContentKind::Image,
            Self::Video { .. } => ContentKind::Video,
            Self::Audio { .. } => ContentKind::Audio,
            Self::Dynamic { .. } => ContentKind::Dynamic,
            Self::File { .. } => ContentKind::File,
            Self::Graphics { .. } => ContentKind::Graphics,
        }
    }

    /// The main media reference of this item.
    pub fn media(&self) -> &MediaRef {
        match self {
            Self::Image { media }
            | Self::Video { media, .. }
            | Self::Audio { media, .. }
            | Self::Dynamic { media }
            | Self::File { media, .. }
            | Self::Graphics { media, .. } => media,
        }
    }

    /// Resolves the main media to a local path, waiting for the download if needed.
    pub async fn path(&self) -> DownloadResult<PathBuf> {
        self.media().resolve().await
    }

    /// Caption text, for Graphics items.
    pub fn caption(&self) -> Option<&str> {
        match self {
            Self::Graphics { text, .. } => text.as_deref(),
            _ => None,
        }
    }
}

/// Structured content extracted from one post.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub platform: Platform,
    pub title: Option<String>,
    pub text: Option<String>,
    pub url: Option<String>,
    pub author: Option<Author>,
    pub contents: Vec<Content>,
    /// Publication time in unix seconds.
    pub timestamp: Option<i64>,
    /// Quoted or shared original post.
    pub repost: Option<Box<ParseResult>>,
}

impl ParseResult {
    /// Creates an empty result for a platform.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            title: None,
            text: None,
            url: None,
            author: None,
            contents: Vec::new(),
            timestamp: None,
            repost: None,
        }
    }

    /// Creates a builder for a platform.
    pub fn builder(platform: Platform) -> ParseResultBuilder {
        ParseResultBuilder { result: Self::new(platform) }
    }

    /// Key used to name cache files for this result.
    ///
    /// The first present attribute wins: url, title, timestamp, content
    /// count. Without any of them the id is random, so such results never
    /// share a cache entry.
    pub fn resource_id(&self) -> String {
        let platform = &self.platform.name;
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return format!("{}:{}", platform, url);
        }
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            return format!("{}:{}", platform, title);
        }
        if let Some(timestamp) = self.timestamp.filter(|t| *t != 0) {
            return format!("{}:{}", platform, timestamp);
        }
        if !self.contents.is_empty() {
            return format!("{}:{}", platform, self.contents.len());
        }
        format!("{}:{}", platform, uuid::Uuid::new_v4().simple())
    }

    /// Body text for display: `text`, or the caption of the first Graphics item.
    pub fn summary_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.contents.iter().find_map(Content::caption).filter(|t| !t.is_empty()))
    }

    pub fn author_name(&self) -> Option<&str> {
        self.author.as_ref().and_then(|a| a.name.as_deref())
    }
}

/// Fluent builder for [`ParseResult`].
pub struct ParseResultBuilder {
    result: ParseResult,
}

impl ParseResultBuilder {
    pub fn title(mut self, title: Option<String>) -> Self {
        self.result.title = title;
        self
    }

    pub fn text(mut self, text: Option<String>) -> Self {
        self.result.text = text;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.result.url = Some(url.into());
        self
    }

    pub fn author(mut self, author: Option<Author>) -> Self {
        self.result.author = author;
        self
    }

    pub fn contents(mut self, contents: Vec<Content>) -> Self {
        self.result.contents = contents;
        self
    }

    pub fn timestamp(mut self, timestamp: Option<i64>) -> Self {
        self.result.timestamp = timestamp;
        self
    }

    pub fn repost(mut self, repost: ParseResult) -> Self {
        self.result.repost = Some(Box::new(repost));
        self
    }

    pub fn build(self) -> ParseResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn platform() -> Platform {
        Platform::new("keylol", "其乐论坛")
    }

    fn image() -> Content {
        Content::image(MediaRef::resolved("/tmp/a.png"))
    }

    #[test]
    fn test_platform_equality_by_name() {
        assert_eq!(Platform::new("keylol", "Keylol"), Platform::new("keylol", "其乐"));
        assert_ne!(Platform::new("keylol", "Keylol"), Platform::new("steam", "Keylol"));
        assert_eq!(platform().to_string(), "其乐论坛");
    }

    #[rstest]
    #[case(Some("https://keylol.com/t1-1-1"), Some("Title"), Some(1700000000), 2, "keylol:https://keylol.com/t1-1-1")]
    #[case(Some("https://keylol.com/t1-1-1"), None, None, 0, "keylol:https://keylol.com/t1-1-1")]
    #[case(None, Some("Title"), Some(1700000000), 2, "keylol:Title")]
    #[case(Some(""), Some("Title"), None, 0, "keylol:Title")]
    #[case(None, None, Some(1700000000), 2, "keylol:1700000000")]
    #[case(None, Some(""), Some(1700000000), 0, "keylol:1700000000")]
    #[case(None, None, None, 3, "keylol:3")]
    #[case(None, None, Some(0), 1, "keylol:1")]
    fn test_resource_id_priority(
        #[case] url: Option<&str>, #[case] title: Option<&str>, #[case] timestamp: Option<i64>, #[case] count: usize,
        #[case] expected: &str,
    ) {
        let mut result = ParseResult::new(platform());
        result.url = url.map(String::from);
        result.title = title.map(String::from);
        result.timestamp = timestamp;
        result.contents = (0..count).map(|_| image()).collect();
        assert_eq!(result.resource_id(), expected);
    }

    #[test]
    fn test_resource_id_random_fallback() {
        let result = ParseResult::new(platform());
        let first = result.resource_id();
        let second = result.resource_id();
        assert!(first.starts_with("keylol:"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_summary_text_falls_back_to_caption() {
        let result = ParseResult::builder(platform())
            .contents(vec![
                Content::graphics(MediaRef::resolved("/tmp/a.png"), Some("body".into()), None),
                Content::graphics(MediaRef::resolved("/tmp/b.png"), None, None),
            ])
            .build();
        assert_eq!(result.summary_text(), Some("body"));

        let with_text = ParseResult::builder(platform()).text(Some("own text".into())).build();
        assert_eq!(with_text.summary_text(), Some("own text"));
    }

    #[tokio::test]
    async fn test_content_path_resolves_media() {
        let content = Content::Video { media: MediaRef::resolved("/tmp/v.mp4"), cover: None, duration: 12.5 };
        assert_eq!(content.kind(), ContentKind::Video);
        assert_eq!(content.path().await.unwrap(), PathBuf::from("/tmp/v.mp4"));
        assert_eq!(content.caption(), None);
    }
}
