//! Regex-based cleanup of flattened post text.
//!
//! A [`TextCleaner`] applies an ordered list of [`CleanRule`]s and then caps
//! the result at a character budget. Running a cleaner on its own output
//! yields the same text.

use regex::Regex;
use tracing::trace;

use crate::Result;

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// One substitution pass.
#[derive(Debug, Clone)]
pub struct CleanRule {
    pub name: &'static str,
    pub pattern: Regex,
    pub replacement: &'static str,
}

impl CleanRule {
    pub fn new(name: &'static str, pattern: &str, replacement: &'static str) -> Result<Self> {
        Ok(Self { name, pattern: Regex::new(pattern)?, replacement })
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern.replace_all(text, self.replacement).into_owned()
    }
}

/// Discuz post cleanup, in application order.
const DISCUZ_RULES: &[(&str, &str, &str)] = &[
    // quote blocks
    ("quote_block", r"(?s)\[quote\]\n?(.*?)\n?\[/quote\]", "「$1」"),
    ("quote_marker", r"\[/?quote\]", ""),
    // attachment and upload boilerplate
    ("download_attachment", r"(?m)^.*下载附件.*(?:\n|$)", ""),
    ("save_to_album", r"(?m)^.*保存到相册.*(?:\n|$)", ""),
    ("upload_time", r"(?m)^.*\d{4}-\d{1,2}-\d{1,2}[ \t]+\d{1,2}:\d{2}[ \t]*上传[ \t]*(?:\n|$)", ""),
    ("upload_suffix", r"(?m)^[ \t]*上传[ \t]*(?:\n|$)", ""),
    (
        "attachment_size",
        r"(?m)^.*\([ \t]*[\d.]+[ \t]*[KMG]?B[ \t]*,[ \t]*下载次数[ \t]*:[ \t]*\d+[ \t]*\)[ \t]*(?:\n|$)",
        "",
    ),
    ("attachment_hint", r"(?m)^.*点击文件名下载附件.*(?:\n|$)", ""),
    ("edit_notice", r"(?m)^.*本帖最后由.*编辑[ \t]*(?:\n|$)", ""),
    // promotion and login prompts
    ("login_prompt", r"(?m)^.*(?:您需要登录才可以下载或查看|没有帐号|没有账号|立即注册|登录/注册后可看大图).*(?:\n|$)", ""),
    ("reward_prompt", r"(?m)^.*(?:查看全部评分|收起理由|积分[ \t]*\+\d+).*(?:\n|$)", ""),
    // bare image file names
    ("image_filename", r"(?mi)^[ \t]*[\w\-.()]+\.(?:jpe?g|png|gif|webp|bmp)[ \t]*(?:\n|$)", ""),
    // whitespace
    ("horizontal_space", r"[ \t\x{3000}\x{A0}]+", " "),
    ("line_edges", r"(?m)^ +| +$", ""),
    ("blank_lines", r"\n{3,}", "\n\n"),
];

/// Ordered cleanup passes plus a length cap.
#[derive(Debug, Clone)]
pub struct TextCleaner {
    rules: Vec<CleanRule>,
    max_chars: usize,
}

impl TextCleaner {
    /// A cleaner with no rules, only trimming and the length cap.
    pub fn new(max_chars: usize) -> Self {
        Self { rules: Vec::new(), max_chars }
    }

    /// The cleanup used for Discuz forum posts.
    pub fn discuz(max_chars: usize) -> Result<Self> {
        let rules = DISCUZ_RULES
            .iter()
            .map(|&(name, pattern, replacement)| CleanRule::new(name, pattern, replacement))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules, max_chars })
    }

    /// Appends a rule after the existing ones.
    pub fn with_rule(mut self, rule: CleanRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[CleanRule] {
        &self.rules
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Runs every rule in order, trims, and truncates.
    pub fn clean(&self, text: &str) -> String {
        let mut result = text.replace("\r\n", "\n");
        for rule in &self.rules {
            let next = rule.apply(&result);
            if next != result {
                trace!(rule = rule.name, "clean rule applied");
            }
            result = next;
        }
        truncate(result.trim(), self.max_chars)
    }

    /// Joins flattened lines and cleans them; `None` when nothing is left.
    pub fn clean_lines(&self, lines: &[String]) -> Option<String> {
        let cleaned = self.clean(&lines.join("\n"));
        if cleaned.is_empty() { None } else { Some(cleaned) }
    }
}

/// Caps `text` at `max_chars` characters, marker included.
///
/// The kept prefix is right-trimmed before the marker is appended, so a
/// truncated string is never longer than the cap and truncating it again
/// leaves it unchanged.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let marker_len = ELLIPSIS.chars().count();
    let keep = max_chars.saturating_sub(marker_len);
    let prefix: String = text.chars().take(keep).collect();
    format!("{}{}", prefix.trim_end(), ELLIPSIS)
}
