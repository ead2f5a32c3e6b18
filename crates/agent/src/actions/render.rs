//! render_page: fetch an HTML page and return its markup or readable text
//!
//! Pages are fetched statically; no JavaScript runs. Text mode therefore
//! keeps the source of inline scripts, since quiz pages often assemble their
//! question client-side.

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use tracing::debug;

use super::{Action, ActionContext, ActionError};

/// Path extensions that name files rather than pages
const FILE_EXTENSIONS: &[&str] = &[
    "csv", "pdf", "zip", "png", "jpg", "jpeg", "gif", "json", "mp3", "wav", "ogg", "opus", "mp4",
    "xlsx", "xls", "parquet", "gz", "tar",
];

pub struct RenderPageAction {
    client: reqwest::Client,
}

impl RenderPageAction {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct RenderArgs {
    url: String,
    #[serde(default)]
    format: Format,
}

#[derive(Deserialize, Default, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
enum Format {
    #[default]
    Html,
    Text,
}

#[async_trait]
impl Action for RenderPageAction {
    fn name(&self) -> &str {
        "render_page"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its HTML (or readable text with format=text). \
         The page is fetched without running JavaScript: content a page builds in the \
         browser is only visible in its <script> source, which both formats include. \
         Only for actual HTML pages: for direct file links (.csv, .pdf, .zip, .png, ...) \
         use download_resource instead."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Page URL (http or https)" },
                "format": {
                    "type": "string",
                    "enum": ["html", "text"],
                    "default": "html",
                    "description": "html returns markup, text returns readable text"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ActionContext) -> Result<String, ActionError> {
        let args: RenderArgs = serde_json::from_value(args)?;
        check_page_url(&args.url)?;
        debug!("◆ RENDERING {} ({:?})", args.url, args.format);

        let response = self.client.get(&args.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::Failed(format!(
                "{} returned HTTP {}",
                args.url, status
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.is_empty()
            && !content_type.contains("text/html")
            && !content_type.contains("application/xhtml")
        {
            return Err(ActionError::Failed(format!(
                "{} is not an HTML page (content type {}); use download_resource",
                args.url, content_type
            )));
        }

        let body = response.text().await?;
        Ok(match args.format {
            Format::Html => normalize_html(&body),
            Format::Text => readable_text(&body),
        })
    }
}

/// Reject non-web schemes and URLs that point at files
fn check_page_url(url: &str) -> Result<(), ActionError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ActionError::Failed(format!("invalid url '{}': {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ActionError::Failed(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }

    let last = parsed
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or("");
    if let Some((_, ext)) = last.rsplit_once('.') {
        let ext = ext.to_ascii_lowercase();
        if FILE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ActionError::Failed(format!(
                "{} points to a .{} file, not a page; use download_resource",
                url, ext
            )));
        }
    }
    Ok(())
}

fn normalize_html(body: &str) -> String {
    Html::parse_document(body).root_element().html()
}

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>")
            .expect("static regex")
    })
}

/// Source of every non-empty inline `<script>`, in document order
fn inline_scripts(body: &str) -> Vec<String> {
    Html::parse_document(body)
        .select(script_selector())
        .filter(|script| script.value().attr("src").is_none())
        .map(|script| script.text().collect::<String>().trim().to_string())
        .filter(|source| !source.is_empty())
        .collect()
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\r\f\v]+").expect("static regex"))
}

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n+").expect("static regex"))
}

/// Visible text of a page, title first, followed by inline script source
fn readable_text(body: &str) -> String {
    let stripped = script_style_re().replace_all(body, "");
    let document = Html::parse_document(&stripped);

    let mut text = String::new();
    if let Some(title) = document
        .select(title_selector())
        .next()
        .map(|t| t.text().collect::<String>())
    {
        let title = title.trim();
        if !title.is_empty() {
            text.push_str(title);
            text.push('\n');
        }
    }

    let root = document
        .select(body_selector())
        .next()
        .unwrap_or_else(|| document.root_element());
    for chunk in root.text() {
        text.push_str(chunk);
        text.push('\n');
    }

    let collapsed = whitespace_re().replace_all(&text, " ");
    let lines: Vec<&str> = collapsed.lines().map(str::trim).collect();
    let mut readable = blank_lines_re()
        .replace_all(lines.join("\n").trim(), "\n")
        .into_owned();

    let scripts = inline_scripts(body);
    if !scripts.is_empty() {
        if !readable.is_empty() {
            readable.push_str("\n\n");
        }
        readable.push_str("Inline scripts:\n");
        readable.push_str(&scripts.join("\n---\n"));
    }
    readable
}

fn title_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("title").expect("static selector"))
}

fn body_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("body").expect("static selector"))
}

fn script_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("script").expect("static selector"))
}
