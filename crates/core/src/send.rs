//! Delivery of parse results to a chat transport.
//!
//! The [`Sender`] turns one [`ParseResult`] into outbound messages: the
//! rendered card first, then the media. Media go out as plain message chains
//! when there is a single item, or as one forwarded node list otherwise.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::Config;
use crate::error::DownloadError;
use crate::media::MediaRef;
use crate::model::{Content, ContentKind, ParseResult};
use crate::render::Renderer;

/// One element of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    Image { path: PathBuf },
    Video { path: PathBuf, cover: Option<PathBuf> },
    Audio { path: PathBuf },
    File { path: PathBuf, name: Option<String> },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self::Image { path: path.into() }
    }
}

/// One entry of a forwarded node list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardNode {
    pub sender_name: String,
    pub sender_id: String,
    pub content: Vec<Segment>,
}

/// A message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Segments sent together as one ordinary message.
    Chain(Vec<Segment>),
    /// A bundle of nodes shown as a single forwarded message.
    Forward(Vec<ForwardNode>),
}

/// Reply handle of the chat host.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<()>;
}

/// What to send for one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendPlan {
    pub send_card: bool,
    pub send_contents: bool,
    /// Bundle the media into a forwarded node list even if there is only one.
    pub force_merge: bool,
}

pub struct Sender {
    renderer: Arc<Renderer>,
    forward_threshold: usize,
    show_download_fail_tip: bool,
    forward_name: String,
    forward_id: String,
}

impl Sender {
    pub fn new(config: &Config, renderer: Arc<Renderer>) -> Self {
        Self {
            renderer,
            forward_threshold: config.forward_threshold,
            show_download_fail_tip: config.show_download_fail_tip,
            forward_name: config.forward_name.clone(),
            forward_id: config.forward_id.clone(),
        }
    }

    pub fn plan(&self, result: &ParseResult) -> SendPlan {
        SendPlan { send_card: true, send_contents: true, force_merge: result.contents.len() > self.forward_threshold }
    }

    /// Sends the card and media of `result`, returning the number of messages sent.
    ///
    /// A missing card or a failed media download only affects its own part of
    /// the delivery. Transport errors abort and propagate.
    pub async fn deliver(&self, transport: &dyn Transport, result: &ParseResult) -> Result<usize> {
        let plan = self.plan(result);
        let mut sent = 0;

        if plan.send_card {
            match self.renderer.render(result).await {
                Some(card) => {
                    transport.send(OutboundMessage::Chain(vec![Segment::image(card)])).await?;
                    sent += 1;
                }
                None => debug!(platform = %result.platform.name, "no card to send"),
            }
        }

        if plan.send_contents {
            let mut lists = Vec::with_capacity(result.contents.len());
            for content in &result.contents {
                let segments = self.content_segments(content).await;
                if !segments.is_empty() {
                    lists.push(segments);
                }
            }

            for message in self.package(lists, plan.force_merge) {
                transport.send(message).await?;
                sent += 1;
            }
        }

        info!(platform = %result.platform.name, url = ?result.url, messages = sent, "result delivered");
        Ok(sent)
    }

    /// Groups per-content segment lists into outbound messages.
    pub fn package(&self, lists: Vec<Vec<Segment>>, force_merge: bool) -> Vec<OutboundMessage> {
        if lists.is_empty() {
            return Vec::new();
        }
        if !force_merge && lists.len() == 1 {
            return lists.into_iter().map(OutboundMessage::Chain).collect();
        }

        let nodes = lists
            .into_iter()
            .map(|content| ForwardNode {
                sender_name: self.forward_name.clone(),
                sender_id: self.forward_id.clone(),
                content,
            })
            .collect();
        vec![OutboundMessage::Forward(nodes)]
    }

    /// Resolves one content item into its segments.
    async fn content_segments(&self, content: &Content) -> Vec<Segment> {
        let mut segments = Vec::new();
        if let Some(caption) = content.caption().filter(|c| !c.is_empty()) {
            segments.push(Segment::text(caption));
        }

        let path = match content.path().await {
            Ok(path) => path,
            Err(e) => {
                warn!(kind = ?content.kind(), error = %e, "media unavailable");
                if self.show_download_fail_tip {
                    segments.push(Segment::text(failure_tip(content.kind(), &e)));
                }
                return segments;
            }
        };

        let segment = match content {
            Content::Image { .. } | Content::Dynamic { .. } | Content::Graphics { .. } => Segment::Image { path },
            Content::Video { cover, .. } => Segment::Video { path, cover: resolve_cover(cover.as_ref()).await },
            Content::Audio { .. } => Segment::Audio { path },
            Content::File { name, .. } => Segment::File { path, name: name.clone() },
        };
        segments.push(segment);
        segments
    }
}

async fn resolve_cover(cover: Option<&MediaRef>) -> Option<PathBuf> {
    match cover?.resolve().await {
        Ok(path) => Some(path),
        Err(e) => {
            debug!(error = %e, "video cover unavailable");
            None
        }
    }
}

fn failure_tip(kind: ContentKind, error: &DownloadError) -> String {
    let label = match kind {
        ContentKind::Image | ContentKind::Dynamic | ContentKind::Graphics => "图片",
        ContentKind::Video => "视频",
        ContentKind::Audio => "音频",
        ContentKind::File => "文件",
    };
    let reason = match error {
        DownloadError::RateLimited { .. } => "请求过于频繁",
        DownloadError::SizeLimit { .. } => "文件过大",
        DownloadError::ZeroSize { .. } => "文件为空",
        DownloadError::Failed { .. } | DownloadError::Aborted(_) => "下载失败",
    };
    format!("[{}{}]", label, reason)
}
