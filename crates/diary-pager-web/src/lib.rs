//! HTML reader preview for `diary-pager`.
//!
//! Renders built pages into a self-contained reader document: one
//! `<section class="page">` per page on a horizontal track, a `i/n` counter,
//! prev/next buttons with swipe support, and the page manifest embedded as
//! JSON for scripts that want to inspect the pagination.

use diary_pager::{
    BlockContent, Cursor, GestureConfig, Overflow, Page, Reader, RenderBlock, SeparatorStyle,
    SwipeDirection,
};
use serde::Serialize;

/// Current crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Manifest embedded in the preview document.
#[derive(Clone, Debug, Serialize)]
pub struct PreviewPayload {
    pub meta: PreviewMeta,
    pub pages: Vec<PagePayload>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PreviewMeta {
    pub id: String,
    pub title: String,
    pub page_count: usize,
    pub load_error: Option<String>,
    pub profile: String,
    pub gesture: GesturePayload,
}

/// Swipe settings mirrored into the page script.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct GesturePayload {
    pub distance_threshold: f32,
    pub velocity_threshold: f32,
    pub forward_left: bool,
}

impl From<&GestureConfig> for GesturePayload {
    fn from(cfg: &GestureConfig) -> Self {
        Self {
            distance_threshold: cfg.distance_threshold,
            velocity_threshold: cfg.velocity_threshold,
            forward_left: cfg.forward == SwipeDirection::Left,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PagePayload {
    pub id: String,
    pub page_index: usize,
    pub page_number: usize,
    pub start: Cursor,
    pub end: Cursor,
    pub overflow: Option<Overflow>,
    pub block_count: usize,
}

impl PagePayload {
    fn new(page: &Page) -> Self {
        Self {
            id: page_anchor(page.index),
            page_index: page.index,
            page_number: page.index + 1,
            start: page.start,
            end: page.end,
            overflow: page.overflow,
            block_count: page.blocks.len(),
        }
    }
}

/// A rendered preview: the HTML document and the manifest it embeds.
#[derive(Clone, Debug)]
pub struct Preview {
    pub html: String,
    pub payload: PreviewPayload,
}

/// Escape text for HTML element content and quoted attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn page_anchor(index: usize) -> String {
    format!("page-{}", index + 1)
}

/// HTML for one block.
pub fn render_block_html(block: &RenderBlock) -> String {
    match &block.content {
        BlockContent::Metadata(meta) => {
            let pills: String = meta
                .entries()
                .map(|(label, value)| {
                    format!(r#"<span class="pill">{label}: {}</span>"#, escape_html(value))
                })
                .collect();
            format!(r#"<div class="meta">{pills}</div>"#)
        }
        BlockContent::Text(slice) => {
            let lines: Vec<String> = slice
                .as_str()
                .trim()
                .split('\n')
                .map(escape_html)
                .collect();
            format!(r#"<p class="paragraph">{}</p>"#, lines.join("<br>"))
        }
        BlockContent::Separator(SeparatorStyle::Rule) => r#"<hr class="separator">"#.to_string(),
        BlockContent::Separator(SeparatorStyle::Star) => {
            r#"<div class="star-hr"><span class="star">★</span></div>"#.to_string()
        }
        BlockContent::Image(image) => {
            let Some(source) = &image.source else {
                return format!(r#"<div class="pill">Missing {}</div>"#, image.stem());
            };
            let size = match source.dimensions() {
                Some((w, h)) => format!(r#" width="{w}" height="{h}""#),
                None => String::new(),
            };
            format!(
                r#"<figure class="photo"><img src="{}" alt="{}"{size} loading="lazy"><figcaption>Photo {}</figcaption></figure>"#,
                escape_html(&source.location),
                image.stem(),
                escape_html(&image.number),
            )
        }
    }
}

/// HTML for one page section.
pub fn render_page_html(page: &Page) -> String {
    let mut inner = String::new();
    for block in &page.blocks {
        inner.push_str(&render_block_html(block));
        inner.push('\n');
    }
    let flag = match page.overflow {
        Some(Overflow::OversizedAtomic) => r#" data-overflow="oversized""#,
        Some(Overflow::HardSplit) => r#" data-overflow="split""#,
        None => "",
    };
    format!(
        "<section class=\"page\" id=\"{}\" data-index=\"{}\"{flag}><div class=\"page-inner\">\n{inner}</div></section>\n",
        page_anchor(page.index),
        page.index,
    )
}

fn render_placeholder_html(reader: &Reader) -> String {
    let message = reader
        .navigator()
        .current_page()
        .map(Page::plain_text)
        .unwrap_or_else(|| diary_pager::LOAD_ERROR_TEXT.to_string());
    format!(
        "<section class=\"page\" id=\"{}\" data-index=\"0\"><div class=\"page-inner\"><div class=\"pill\">{}</div></div></section>\n",
        page_anchor(0),
        escape_html(&message)
    )
}

/// Build every remaining page of `reader` and render the preview document.
pub fn build_preview(reader: &mut Reader, title: &str) -> Preview {
    let page_count = reader.build_all();
    let session = reader.navigator().session();
    let pages_html: String = if reader.is_placeholder() {
        render_placeholder_html(reader)
    } else {
        session.built_pages().iter().map(render_page_html).collect()
    };
    let payload = PreviewPayload {
        meta: PreviewMeta {
            id: reader.id().to_string(),
            title: title.to_string(),
            page_count,
            load_error: reader.load_error().map(ToString::to_string),
            profile: session.profile().short_hex(),
            gesture: GesturePayload::from(reader.navigator().gesture_config()),
        },
        pages: session.built_pages().iter().map(PagePayload::new).collect(),
    };
    log::info!("rendered preview for {}: {page_count} pages", payload.meta.id);
    let html = build_html(title, &pages_html, &payload);
    Preview { html, payload }
}

/// Assemble the reader document around pre-rendered page sections.
pub fn build_html(title: &str, pages_html: &str, payload: &PreviewPayload) -> String {
    let data_json = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    let safe_json = data_json.replace("</script>", "<\\/script>");
    let counter = format!("1/{}", payload.meta.page_count.max(1));
    TEMPLATE
        .replace("__TITLE__", &escape_html(title))
        .replace("__COUNTER__", &counter)
        .replace("__INITIAL_PAYLOAD__", &safe_json)
        .replace("__PAGES__", pages_html)
}

const TEMPLATE: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>__TITLE__</title>
<style>
  html, body { margin: 0; height: 100%; overflow: hidden; font-family: Georgia, serif; background: #f6f1e7; color: #2b2620; }
  header { display: flex; align-items: center; justify-content: space-between; padding: 8px 16px; }
  #stage { position: relative; overflow: hidden; height: calc(100% - 96px); }
  #track { display: flex; height: 100%; transition: transform 240ms ease; will-change: transform; }
  .page { flex: 0 0 100%; height: 100%; overflow: hidden; box-sizing: border-box; }
  .page-inner { padding: 40px 28px 56px; max-width: 720px; margin: 0 auto; }
  .paragraph { margin: 0 0 12px; line-height: 1.5; font-size: 18px; }
  .meta { display: flex; gap: 8px; margin-bottom: 16px; }
  .pill { display: inline-block; padding: 4px 10px; border-radius: 999px; background: #e8dcc6; font-size: 14px; }
  hr.separator { border: 0; border-top: 1px solid #b9a98c; margin: 18px 0; }
  .star-hr { text-align: center; margin: 12px 0; color: #b9a98c; }
  figure.photo { margin: 12px 0; text-align: center; }
  figure.photo img { max-width: 100%; max-height: 60vh; height: auto; }
  figcaption { font-size: 13px; color: #7a6e5c; margin-top: 6px; }
  nav { display: flex; justify-content: center; gap: 16px; padding: 8px; }
  button { font-size: 16px; padding: 6px 18px; }
</style>
</head>
<body>
<header><strong>__TITLE__</strong><span id="counter">__COUNTER__</span></header>
<main id="stage"><div id="track">
__PAGES__</div></main>
<nav><button id="prev" type="button">Prev</button><button id="next" type="button">Next</button></nav>
<script id="pager-manifest" type="application/json">__INITIAL_PAYLOAD__</script>
<script>
(function () {
  const manifest = JSON.parse(document.getElementById('pager-manifest').textContent);
  const gesture = manifest.meta.gesture;
  const track = document.getElementById('track');
  const counter = document.getElementById('counter');
  const prev = document.getElementById('prev');
  const next = document.getElementById('next');
  const total = Math.max(track.children.length, 1);
  let index = 0;

  function update(offset) {
    counter.textContent = `${index + 1}/${total}`;
    const x = -index * track.clientWidth + (offset || 0);
    track.style.transform = `translate3d(${x}px,0,0)`;
    prev.disabled = index === 0;
    next.disabled = index >= total - 1;
  }

  function go(step) {
    index = Math.min(Math.max(index + step, 0), total - 1);
    update();
  }

  let start = null;
  let last = null;
  let velocity = 0;
  const stage = document.getElementById('stage');
  stage.addEventListener('touchstart', (e) => {
    if (!e.touches[0]) return;
    start = { t: e.timeStamp, x: e.touches[0].clientX };
    last = start;
    velocity = 0;
    track.style.transition = 'none';
  }, { passive: true });
  stage.addEventListener('touchmove', (e) => {
    if (!start || !e.touches[0]) return;
    const sample = { t: e.timeStamp, x: e.touches[0].clientX };
    const dt = sample.t - last.t;
    if (dt > 0) velocity = 0.6 * ((sample.x - last.x) / dt) + 0.4 * velocity;
    last = sample;
    update(sample.x - start.x);
  }, { passive: true });
  stage.addEventListener('touchend', (e) => {
    if (!start) return;
    track.style.transition = '';
    const sign = gesture.forward_left ? -1 : 1;
    const along = (last.x - start.x) * sign;
    const speed = e.timeStamp - last.t > 120 ? 0 : velocity * sign;
    start = null;
    if (along > gesture.distance_threshold) return go(1);
    if (along < -gesture.distance_threshold) return go(-1);
    if (speed > gesture.velocity_threshold) return go(1);
    if (speed < -gesture.velocity_threshold) return go(-1);
    update();
  });

  prev.addEventListener('click', () => go(-1));
  next.addEventListener('click', () => go(1));
  window.addEventListener('resize', () => update());
  update();
})();
</script>
</body>
</html>
"#;
