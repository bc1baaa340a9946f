//! End-to-end pipeline tests against a mock forum.
use std::sync::Mutex;

use async_trait::async_trait;
use threadcard_core::*;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const THREAD_HTML: &str = r#"
<html>
<head><title>周末特惠汇总 - 其乐论坛</title></head>
<body>
<h1 class="ts"><span id="thread_subject">周末特惠汇总</span></h1>
<div class="authi"><a href="space-uid-7.html" class="xw1">小编</a></div>
<div class="authi"><em id="authorposton1">发表于 <span title="2024-3-2 20:15:00">前天 20:15</span></em></div>
<table><tr><td class="t_f" id="postmessage_1">
  本周特惠如下<br>
  <ignore_js_op>
    <img aid="11" zoomfile="data/attachment/forum/202403/02/one.jpg" src="static/image/common/none.gif">
    <div class="tip">one.jpg (88 KB, 下载次数: 10)<br>下载附件</div>
  </ignore_js_op>
  <ignore_js_op>
    <img aid="12" file="data/attachment/forum/202403/02/two.jpg" src="static/image/common/none.gif">
  </ignore_js_op>
  <img src="data/attachment/forum/202403/02/side.jpg" width="120" height="240">
  欢迎补充
</td></tr></table>
</body>
</html>
"#;

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<OutboundMessage>>,
}

#[async_trait]
impl Transport for Recorder {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

fn pipeline(server: &MockServer, cache: &std::path::Path) -> Pipeline {
    let site = SiteConfig { base_url: Some(server.uri()), ..Default::default() };
    let config = Config::builder()
        .cache_dir(cache)
        .font_candidates(Vec::new())
        .download_retry_times(0)
        .retry_backoff_ms(1)
        .site("keylol", site)
        .build();
    Pipeline::initialize(config).expect("pipeline should initialize")
}

async fn mount_forum(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/t123-1-1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(THREAD_HTML, "text/html; charset=utf-8"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/data/attachment/forum/.*\.jpg$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFFu8, 0xD8, 0xFF, 0xE0]))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_extract_thread() {
    let server = MockServer::start().await;
    mount_forum(&server).await;
    let cache = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&server, cache.path());

    let result = pipeline.extract("快看 https://keylol.com/t123-1-1 这个").await.expect("thread should parse");

    assert_eq!(result.platform.name, "keylol");
    assert_eq!(result.title.as_deref(), Some("周末特惠汇总"));
    assert_eq!(result.author_name(), Some("小编"));
    assert_eq!(result.timestamp, Some(1_709_381_700));
    assert_eq!(result.url, Some(format!("{}/t123-1-1", server.uri())));
    assert!(result.text.is_none());
    assert_eq!(result.contents.len(), 2);
    assert_eq!(result.contents[0].caption(), Some("本周特惠如下\n欢迎补充"));

    let first = result.contents[0].path().await.unwrap();
    let second = result.contents[1].path().await.unwrap();
    assert_eq!(first.parent(), Some(cache.path()));
    assert!(first.file_name().unwrap().to_string_lossy().ends_with("_one.jpg"));
    assert!(second.file_name().unwrap().to_string_lossy().ends_with("_two.jpg"));
    assert_eq!(std::fs::read(&first).unwrap(), vec![0xFFu8, 0xD8, 0xFF, 0xE0]);
}

#[tokio::test]
async fn test_message_delivers_card_and_forward() {
    let server = MockServer::start().await;
    mount_forum(&server).await;
    let cache = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&server, cache.path());
    let recorder = Recorder::default();

    let delivered = pipeline.handle_message("group-1", "https://keylol.com/t123-1-1", &recorder).await.unwrap();
    assert!(delivered);

    let sent = recorder.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);

    let OutboundMessage::Chain(card) = &sent[0] else {
        panic!("first message should be the card, got {:?}", sent[0]);
    };
    let [Segment::Image { path: card_path }] = &card[..] else {
        panic!("card should be a single image, got {card:?}");
    };
    assert!(card_path.starts_with(cache.path()));
    assert!(card_path.is_file());

    let OutboundMessage::Forward(nodes) = &sent[1] else {
        panic!("second message should be a forward, got {:?}", sent[1]);
    };
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].content[0], Segment::text("本周特惠如下\n欢迎补充"));
    assert!(matches!(nodes[0].content[1], Segment::Image { .. }));
    assert!(matches!(nodes[1].content[..], [Segment::Image { .. }]));
}

#[tokio::test]
async fn test_login_redirect_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/t5-1-1"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/member.php?mod=logging&action=login"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/member.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>login</body></html>"))
        .mount(&server)
        .await;

    let cache = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&server, cache.path());
    let recorder = Recorder::default();

    let delivered = pipeline.handle_message("group-1", "keylol.com/t5", &recorder).await.unwrap();
    assert!(!delivered);
    assert!(recorder.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_thread_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

    let cache = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&server, cache.path());

    assert!(pipeline.extract("https://keylol.com/t404-1-1").await.is_none());
}

#[tokio::test]
async fn test_failed_image_becomes_tip() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/t9-1-1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<table><tr><td class="t_f">正文<img aid="1" file="data/attachment/forum/gone.jpg"></td></tr></table>"#,
            "text/html",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/attachment/forum/gone.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let cache = tempfile::tempdir().unwrap();
    let pipeline = pipeline(&server, cache.path());
    let recorder = Recorder::default();

    assert!(pipeline.handle_message("group-1", "https://keylol.com/t9-1-1", &recorder).await.unwrap());
    let sent = recorder.sent.lock().unwrap();
    assert_eq!(
        sent.last().unwrap(),
        &OutboundMessage::Chain(vec![Segment::text("正文"), Segment::text("[图片文件为空]")])
    );
}
