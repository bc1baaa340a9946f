//! Keylol (其乐论坛) thread extractor.
//!
//! Keylol runs Discuz!, so a thread page carries the subject in
//! `#thread_subject`, the first post body in the first `td.t_f` and its
//! images as attachment-style `<img>` tags whose real URL lives in `zoomfile`
//! or `file`. Only the first post is extracted.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use time::{Date, Month, PrimitiveDateTime, Time, UtcOffset};
use tracing::{debug, info};
use url::Url;

use super::Extractor;
use crate::clean::TextCleaner;
use crate::config::Config;
use crate::download::Downloader;
use crate::error::ParseError;
use crate::media::MediaRef;
use crate::model::{Author, Content, ParseResult, Platform};
use crate::parse::{Document, Element};
use crate::registry::RouteMatch;
use crate::{Result, ThreadcardError};

pub const NAME: &str = "keylol";
pub const DISPLAY_NAME: &str = "其乐论坛";
pub const DEFAULT_BASE_URL: &str = "https://keylol.com";

pub const ROUTES: &[(&str, &str)] = &[
    ("keylol.com", r"(?:https?://)?(?:www\.)?keylol\.com/t(?P<tid>\d+)(?:-\d+-\d+)?"),
    (
        "keylol.com",
        r"(?:https?://)?(?:www\.)?keylol\.com/forum\.php\?(?:[^\s#]*&)?mod=viewthread&(?:[^\s#]*&)?tid=(?P<tid>\d+)",
    ),
];

const BROWSER_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Offset of the forum clock.
const FORUM_UTC_OFFSET_HOURS: i8 = 8;

/// Standard IAB banner sizes.
const AD_DIMENSIONS: &[(u32, u32)] = &[
    (120, 240),
    (120, 600),
    (160, 600),
    (250, 250),
    (300, 250),
    (336, 280),
    (468, 60),
    (728, 90),
    (970, 90),
];

/// Images narrower or shorter than this are treated as icons.
const ICON_LIMIT: u32 = 100;

/// Why an image was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdSignal {
    /// The URL carries an ad token or points at forum chrome.
    UrlKeyword,
    /// The image is wrapped in a link to an ad or affiliate target.
    AdLink,
    /// A non-attachment image with a standard banner size.
    BannerSize,
    /// A non-attachment image too small to be content.
    Icon,
}

/// Attributes of an `<img>` that matter for ad classification.
#[derive(Debug, Clone, Default)]
pub struct ImageAttrs<'a> {
    pub url: &'a str,
    pub link: Option<&'a str>,
    pub aid: bool,
    pub attachment: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// An image kept from the post body.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PostImage {
    url: String,
    alt: Option<String>,
}

/// Fields parsed from a thread page, before any download starts.
#[derive(Debug, Default)]
struct ThreadPage {
    title: Option<String>,
    author: Option<String>,
    timestamp: Option<i64>,
    body: Option<String>,
    images: Vec<PostImage>,
}

pub struct KeylolExtractor {
    platform: Platform,
    downloader: Arc<Downloader>,
    base_url: Url,
    page_headers: HeaderMap,
    image_headers: HeaderMap,
    proxy: Option<String>,
    cleaner: TextCleaner,
    ad_url: Regex,
    ad_link: Regex,
    datetime: Regex,
}

impl KeylolExtractor {
    pub fn new(config: &Config, downloader: Arc<Downloader>) -> Result<Self> {
        let site = config.site(NAME);
        let base = site.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let base_url = Url::parse(base).map_err(|e| ThreadcardError::Config(format!("parser.keylol.base_url: {}", e)))?;

        let mut page_headers = HeaderMap::new();
        page_headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        page_headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
        );
        page_headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.8,en-US;q=0.5,en;q=0.3"));
        if let Some(cookies) = site.cookies.as_deref().filter(|c| !c.is_empty()) {
            let value = HeaderValue::from_str(cookies)
                .map_err(|e| ThreadcardError::Config(format!("parser.keylol.cookies: {}", e)))?;
            page_headers.insert(COOKIE, value);
        }

        let mut image_headers = HeaderMap::new();
        image_headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        let referer = HeaderValue::from_str(base_url.as_str())
            .map_err(|e| ThreadcardError::Config(format!("parser.keylol.base_url: {}", e)))?;
        image_headers.insert(REFERER, referer);

        Ok(Self {
            platform: Platform::new(NAME, DISPLAY_NAME),
            downloader,
            base_url,
            page_headers,
            image_headers,
            proxy: config.proxy_for(NAME),
            cleaner: TextCleaner::discuz(config.text_max_chars)?,
            ad_url: Regex::new(
                r"(?i)(?:^|[/_\-.=?&])(?:ads?|advert\w*|banner\w*|promo\w*)(?:[/_\-.=?&]|$)|static/image/(?:common|smiley)/",
            )?,
            ad_link: Regex::new(r"(?i)/ad/|adclick|utm_source=|s\.click\.taobao|union\.|doubleclick")?,
            datetime: Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})\s+(\d{1,2}):(\d{2})(?::(\d{2}))?")?,
        })
    }

    /// Constructor stored in the extractor list.
    pub fn build(config: &Config, downloader: Arc<Downloader>) -> Result<Arc<dyn Extractor>> {
        Ok(Arc::new(Self::new(config, downloader)?))
    }

    /// Canonical first-page URL of a thread.
    pub fn thread_url(&self, tid: &str) -> String {
        format!("{}/t{}-1-1", self.base_url.as_str().trim_end_matches('/'), tid)
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let client = self.downloader.session().client(self.proxy.as_deref()).map_err(ParseError::from)?;
        let response = client.get(url).headers(self.page_headers.clone()).send().await.map_err(ParseError::from)?;

        let final_url = response.url().clone();
        if self.is_foreign(&final_url) {
            return Err(ParseError::Redirect { from: url.to_string(), to: final_url.to_string() }.into());
        }

        let status = response.status();
        if !status.is_success() {
            return Err(ParseError::Status { url: url.to_string(), status: status.as_u16() }.into());
        }

        Ok(response.text().await.map_err(ParseError::from)?)
    }

    /// Whether a response URL left the thread: another host or the login page.
    fn is_foreign(&self, url: &Url) -> bool {
        if url.host_str() != self.base_url.host_str() {
            return true;
        }
        url.path().ends_with("member.php") && url.query().is_some_and(|q| q.contains("mod=logging"))
    }

    fn parse_page(&self, html: &str, page_url: &str) -> std::result::Result<ThreadPage, ParseError> {
        let base = Url::parse(page_url).unwrap_or_else(|_| self.base_url.clone());
        let doc = Document::parse_with_base(html, base);

        if let Some(message) = doc.select_first("#messagetext")? {
            let text = message
                .select_first("p")?
                .and_then(|p| p.text_trimmed())
                .or_else(|| message.text_trimmed())
                .unwrap_or_default();
            return Err(ParseError::Unavailable(text));
        }

        let title = match doc.select_first("#thread_subject")? {
            Some(el) => el.text_trimmed(),
            None => doc.select_first("h1.ts")?.and_then(|el| el.text_trimmed()),
        };
        let author = doc.select_first(".authi a.xw1")?.and_then(|el| el.text_trimmed());
        let timestamp = self.extract_timestamp(&doc)?;

        let Some(body) = doc.select_first("td.t_f")? else {
            return Ok(ThreadPage { title, author, timestamp, ..Default::default() });
        };

        let text = self.cleaner.clean_lines(&body.text_lines());
        let images = self.extract_images(&doc, &body)?;

        Ok(ThreadPage { title, author, timestamp, body: text, images })
    }

    fn extract_timestamp(&self, doc: &Document) -> std::result::Result<Option<i64>, ParseError> {
        let Some(em) = doc.select_first(r#"em[id^="authorposton"]"#)? else {
            return Ok(None);
        };

        let raw = match em.select_first("span[title]")?.and_then(|span| span.attr("title")) {
            Some(title) => title.to_string(),
            None => {
                let text = em.text();
                text.split_once("发表于").map(|(_, rest)| rest.to_string()).unwrap_or(text)
            }
        };

        Ok(self.parse_datetime(&raw))
    }

    /// Parses `YYYY-M-D HH:MM[:SS]` in forum time to unix seconds.
    pub fn parse_datetime(&self, raw: &str) -> Option<i64> {
        let caps = self.datetime.captures(raw)?;
        let num = |i: usize| caps.get(i).map_or(Some(0), |m| m.as_str().parse::<u32>().ok());

        let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
        let month = Month::try_from(u8::try_from(num(2)?).ok()?).ok()?;
        let day = u8::try_from(num(3)?).ok()?;
        let date = Date::from_calendar_date(year, month, day).ok()?;
        let time = Time::from_hms(
            u8::try_from(num(4)?).ok()?,
            u8::try_from(num(5)?).ok()?,
            u8::try_from(num(6)?).ok()?,
        )
        .ok()?;

        let offset = UtcOffset::from_hms(FORUM_UTC_OFFSET_HOURS, 0, 0).ok()?;
        Some(PrimitiveDateTime::new(date, time).assume_offset(offset).unix_timestamp())
    }

    fn extract_images(&self, doc: &Document, body: &Element<'_>) -> std::result::Result<Vec<PostImage>, ParseError> {
        let mut seen = HashSet::new();
        let mut images = Vec::new();

        for img in body.select("img")? {
            let raw = ["zoomfile", "file", "src"]
                .iter()
                .find_map(|name| img.attr(name).map(str::trim).filter(|v| !v.is_empty()));
            let Some(raw) = raw else { continue };
            if raw.starts_with("data:") {
                continue;
            }
            let Some(url) = doc.resolve_url(raw) else { continue };

            let attrs = ImageAttrs {
                url: &url,
                link: img.ancestor_link(),
                aid: img.attr("aid").is_some(),
                attachment: img.attr("file").is_some() || img.attr("zoomfile").is_some(),
                width: img.attr("width").and_then(parse_dimension),
                height: img.attr("height").and_then(parse_dimension),
            };
            if let Some(signal) = self.classify(&attrs) {
                debug!(url = %url, ?signal, "dropping ad image");
                continue;
            }

            if seen.insert(url.clone()) {
                let alt = img.attr("alt").map(str::trim).filter(|a| !a.is_empty()).map(String::from);
                images.push(PostImage { url, alt });
            }
        }

        Ok(images)
    }

    /// First ad signal that fires for an image, if any.
    ///
    /// Size-based signals never apply to images with an `aid`, which are
    /// always forum attachments.
    pub fn classify(&self, image: &ImageAttrs<'_>) -> Option<AdSignal> {
        let (host, path) = match Url::parse(image.url) {
            Ok(u) => (
                u.host_str().map(String::from),
                format!("{}{}", u.path(), u.query().map(|q| format!("?{}", q)).unwrap_or_default()),
            ),
            Err(_) => (None, image.url.to_string()),
        };
        if host.is_some_and(|h| self.ad_url.is_match(&h)) || self.ad_url.is_match(&path) {
            return Some(AdSignal::UrlKeyword);
        }

        if image.link.is_some_and(|href| self.ad_link.is_match(href)) {
            return Some(AdSignal::AdLink);
        }

        if image.aid || image.attachment {
            return None;
        }
        let (Some(width), Some(height)) = (image.width, image.height) else {
            return None;
        };
        if AD_DIMENSIONS.contains(&(width, height)) {
            return Some(AdSignal::BannerSize);
        }
        if width < ICON_LIMIT || height < ICON_LIMIT {
            return Some(AdSignal::Icon);
        }
        None
    }

    fn into_result(&self, url: String, page: ThreadPage) -> ParseResult {
        let mut body = page.body;
        let mut contents = Vec::with_capacity(page.images.len());

        for image in page.images {
            let downloader = Arc::clone(&self.downloader);
            let headers = self.image_headers.clone();
            let proxy = self.proxy.clone();
            let image_url = image.url;
            let media = MediaRef::spawn(async move {
                downloader.fetch(&image_url, Some(&headers), proxy.as_deref(), None).await
            });
            contents.push(Content::graphics(media, body.take(), image.alt));
        }

        ParseResult::builder(self.platform.clone())
            .title(page.title)
            .text(body)
            .url(url)
            .author(page.author.map(Author::named))
            .timestamp(page.timestamp)
            .contents(contents)
            .build()
    }
}

#[async_trait]
impl Extractor for KeylolExtractor {
    fn platform(&self) -> &Platform {
        &self.platform
    }

    async fn parse(&self, route: &RouteMatch) -> Result<ParseResult> {
        let tid = route.group("tid").ok_or_else(|| ParseError::MissingCapture("tid".into()))?;
        let url = self.thread_url(tid);

        let html = self.fetch_page(&url).await?;
        let page = self.parse_page(&html, &url)?;
        info!(url = %url, title = ?page.title, images = page.images.len(), "keylol thread parsed");

        Ok(self.into_result(url, page))
    }
}

/// Parses an HTML width/height attribute such as `300` or `300px`.
fn parse_dimension(value: &str) -> Option<u32> {
    value.trim().trim_end_matches("px").trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PatternRegistry;
    use rstest::rstest;

    const THREAD_HTML: &str = r#"
        <html>
        <head><title>测试帖 - 其乐论坛</title></head>
        <body>
        <h1 class="ts"><a href="forum.php?mod=forumdisplay">[游戏]</a> <span id="thread_subject"> 新游推荐 </span></h1>
        <div id="post_1">
          <div class="authi"><a href="space-uid-1.html" class="xw1">作者甲</a></div>
          <div class="authi"><em id="authorposton1">发表于 <span title="2024-1-5 12:30:45">3 天前</span></em></div>
          <table><tr><td class="t_f" id="postmessage_1">
            <i class="pstatus"> 本帖最后由 作者甲 于 2024-1-6 08:00 编辑 </i><br>
            第一段正文<br>
            <div class="quote"><blockquote>引用的内容</blockquote></div>
            <ignore_js_op>
              <img id="aimg_1" aid="1" zoomfile="data/attachment/forum/202401/05/a.jpg" file="data/attachment/forum/202401/05/a_small.jpg" src="static/image/common/none.gif" width="120" height="240" alt="截图一">
              <div class="tip">a.jpg (123.45 KB, 下载次数: 3)<br>下载附件<br>2024-1-5 12:30 上传</div>
            </ignore_js_op>
            <img src="https://cdn.example.com/pictures/b.png">
            <img src="https://cdn.example.com/pictures/b.png">
            <a href="https://s.click.taobao.com/xyz"><img src="https://cdn.example.com/pictures/deal.png"></a>
            <img src="https://cdn.example.com/pictures/side.jpg" width="120" height="240">
            <img src="static/image/smiley/default/smile.gif">
            <img src="data:image/png;base64,AAAA">
            <script>var hidden = 1;</script>
            最后一段
          </td></tr></table>
        </div>
        </body>
        </html>
    "#;

    fn extractor() -> (KeylolExtractor, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::builder().cache_dir(dir.path()).build();
        let downloader = Arc::new(Downloader::new(&config).unwrap());
        (KeylolExtractor::new(&config, downloader).unwrap(), dir)
    }

    fn attrs(url: &str) -> ImageAttrs<'_> {
        ImageAttrs { url, ..Default::default() }
    }

    #[test]
    fn test_routes_capture_tid() {
        let config = Config::default();
        let registry = PatternRegistry::from_extractors(crate::extractors::all(), &config).unwrap();

        let short = registry.find("看看这个 https://keylol.com/t987654-1-1 不错").unwrap();
        assert_eq!(short.group("tid"), Some("987654"));

        let long = registry.find("keylol.com/forum.php?mod=viewthread&tid=42&extra=page%3D1").unwrap();
        assert_eq!(long.group("tid"), Some("42"));

        assert!(registry.find("https://keylol.com/f161-1").is_none());
    }

    #[test]
    fn test_thread_url_is_canonical() {
        let (extractor, _dir) = extractor();
        assert_eq!(extractor.thread_url("123"), "https://keylol.com/t123-1-1");
    }

    #[test]
    fn test_parse_page_fields() {
        let (extractor, _dir) = extractor();
        let page = extractor.parse_page(THREAD_HTML, "https://keylol.com/t1-1-1").unwrap();

        assert_eq!(page.title.as_deref(), Some("新游推荐"));
        assert_eq!(page.author.as_deref(), Some("作者甲"));
        assert_eq!(page.timestamp, Some(1_704_429_045));
        assert_eq!(page.body.as_deref(), Some("第一段正文\n「引用的内容」\n最后一段"));

        let urls: Vec<_> = page.images.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://keylol.com/data/attachment/forum/202401/05/a.jpg", "https://cdn.example.com/pictures/b.png"]
        );
        assert_eq!(page.images[0].alt.as_deref(), Some("截图一"));
    }

    #[test]
    fn test_message_page_is_unavailable() {
        let (extractor, _dir) = extractor();
        let html = r#"<div id="messagetext" class="alert_error"><p>抱歉，指定的主题不存在或已被删除或正在被审核</p></div>"#;
        let err = extractor.parse_page(html, "https://keylol.com/t1-1-1").unwrap_err();
        match err {
            ParseError::Unavailable(message) => assert!(message.contains("不存在")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_parts_are_none() {
        let (extractor, _dir) = extractor();
        let page = extractor.parse_page("<html><body><p>nothing</p></body></html>", "https://keylol.com/t1-1-1").unwrap();
        assert!(page.title.is_none());
        assert!(page.author.is_none());
        assert!(page.timestamp.is_none());
        assert!(page.body.is_none());
        assert!(page.images.is_empty());
    }

    #[rstest]
    #[case("2024-1-5 12:30:45", Some(1_704_429_045))]
    #[case("发表于 2024-01-05 12:30", Some(1_704_429_000))]
    #[case("2024-13-05 12:30:45", None)]
    #[case("3 天前", None)]
    fn test_parse_datetime(#[case] raw: &str, #[case] expected: Option<i64>) {
        let (extractor, _dir) = extractor();
        assert_eq!(extractor.parse_datetime(raw), expected);
    }

    #[rstest]
    #[case(attrs("https://keylol.com/data/attachment/forum/a.jpg"), None)]
    #[case(attrs("https://cdn.example.com/ads/1.jpg"), Some(AdSignal::UrlKeyword))]
    #[case(attrs("https://cdn.example.com/img/top_banner.png"), Some(AdSignal::UrlKeyword))]
    #[case(attrs("https://cdn.example.com/img/promotion-2024.gif"), Some(AdSignal::UrlKeyword))]
    #[case(attrs("https://keylol.com/static/image/common/logo.png"), Some(AdSignal::UrlKeyword))]
    #[case(attrs("https://ads.example.com/x.jpg"), Some(AdSignal::UrlKeyword))]
    #[case(attrs("https://ad.doubleclick.net/ddm/x.gif"), Some(AdSignal::UrlKeyword))]
    #[case(attrs("https://adobe.example.com/x.jpg"), None)]
    #[case(attrs("https://cdn.example.com/img/header.png"), None)]
    #[case(attrs("https://cdn.example.com/uploads/download.png"), None)]
    #[case(ImageAttrs { link: Some("https://union.example.com/go"), ..attrs("https://cdn.example.com/x.jpg") }, Some(AdSignal::AdLink))]
    #[case(ImageAttrs { link: Some("https://keylol.com/t1-1-1"), ..attrs("https://cdn.example.com/x.jpg") }, None)]
    #[case(ImageAttrs { width: Some(120), height: Some(240), ..attrs("https://cdn.example.com/x.jpg") }, Some(AdSignal::BannerSize))]
    #[case(ImageAttrs { aid: true, width: Some(120), height: Some(240), ..attrs("https://cdn.example.com/x.jpg") }, None)]
    #[case(ImageAttrs { attachment: true, width: Some(728), height: Some(90), ..attrs("https://cdn.example.com/x.jpg") }, None)]
    #[case(ImageAttrs { width: Some(640), height: Some(480), ..attrs("https://cdn.example.com/x.jpg") }, None)]
    #[case(ImageAttrs { width: Some(16), height: Some(16), ..attrs("https://cdn.example.com/x.jpg") }, Some(AdSignal::Icon))]
    fn test_classify(#[case] image: ImageAttrs<'_>, #[case] expected: Option<AdSignal>) {
        let (extractor, _dir) = extractor();
        assert_eq!(extractor.classify(&image), expected);
    }

    #[rstest]
    #[case("300", Some(300))]
    #[case(" 90px ", Some(90))]
    #[case("auto", None)]
    fn test_parse_dimension(#[case] raw: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_dimension(raw), expected);
    }

    #[tokio::test]
    async fn test_body_moves_to_first_caption() {
        let (extractor, _dir) = extractor();
        let page = ThreadPage {
            body: Some("正文".into()),
            images: vec![
                PostImage { url: "http://127.0.0.1:9/a.jpg".into(), alt: None },
                PostImage { url: "http://127.0.0.1:9/b.jpg".into(), alt: None },
            ],
            ..Default::default()
        };
        let result = extractor.into_result("https://keylol.com/t1-1-1".into(), page);

        assert!(result.text.is_none());
        assert_eq!(result.contents.len(), 2);
        assert_eq!(result.contents[0].caption(), Some("正文"));
        assert_eq!(result.contents[1].caption(), None);
        assert_eq!(result.summary_text(), Some("正文"));
    }

    #[tokio::test]
    async fn test_text_only_post_keeps_body() {
        let (extractor, _dir) = extractor();
        let page = ThreadPage { title: Some("标题".into()), body: Some("正文".into()), ..Default::default() };
        let result = extractor.into_result("https://keylol.com/t1-1-1".into(), page);
        assert_eq!(result.text.as_deref(), Some("正文"));
        assert!(result.contents.is_empty());
        assert_eq!(result.platform.name, NAME);
    }
}
