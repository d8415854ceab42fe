//! Markdown to HTML for assistant answers.
//!
//! Answers are untrusted model output.  Raw HTML in the Markdown source is never passed
//! through: it is emitted as escaped text, so the only markup in the result is what the
//! Markdown syntax itself produces.  Link and image targets that would run script are
//! replaced with `#`.

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};

const SCRIPT_SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "data:"];

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

// Browsers drop whitespace and control characters inside a scheme.
fn is_script_url(url: &str) -> bool {
    let scheme: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .take(16)
        .flat_map(char::to_lowercase)
        .collect();
    SCRIPT_SCHEMES
        .iter()
        .any(|prefix| scheme.starts_with(prefix))
}

fn safe_target(url: CowStr<'_>) -> CowStr<'_> {
    if is_script_url(&url) {
        CowStr::Borrowed("#")
    } else {
        url
    }
}

/// Renders `markdown` to an HTML fragment with raw HTML escaped and script URLs removed.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, options()).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_target(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_target(dest_url),
            title,
            id,
        }),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_markup_characters_are_escaped() {
        let html = markdown_to_html("Tom & Jerry < 3");
        assert!(html.contains("Tom &amp; Jerry &lt; 3"));
        assert!(markdown_to_html("狮子山").contains("狮子山"));
    }

    #[test]
    fn renders_basic_markdown() {
        let html = markdown_to_html("**华农** has a `campus`.\n\n- one\n- two\n");
        assert!(html.contains("<strong>华农</strong>"));
        assert!(html.contains("<code>campus</code>"));
        assert!(html.contains("<li>one</li>"));
    }

    #[test]
    fn inline_html_is_escaped() {
        let html = markdown_to_html("hello <img src=x onerror=alert(1)> world");
        assert!(!html.contains("<img"));
        assert!(html.contains("&lt;img"));
    }

    #[test]
    fn block_html_is_escaped() {
        let html = markdown_to_html("<script>alert('x')</script>\n");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn tables_are_enabled() {
        let html = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
    }

    #[test]
    fn script_links_lose_their_target() {
        let html = markdown_to_html(
            "[click](javascript:alert(document.cookie)) [x](JaVaScRiPt:alert(1)) [v](vbscript:msgbox)",
        );
        assert!(!html.to_lowercase().contains("href=\"javascript"));
        assert!(!html.contains("href=\"vbscript"));
        assert_eq!(html.matches("href=\"#\"").count(), 3);
        assert!(html.contains(">click</a>"));
    }

    #[test]
    fn script_images_lose_their_source() {
        let html =
            markdown_to_html("![i](javascript:alert(1)) ![d](data:text/html;base64,PHNjcmlwdD4=)");
        assert!(!html.contains("src=\"javascript"));
        assert!(!html.contains("src=\"data"));
        assert_eq!(html.matches("src=\"#\"").count(), 2);
    }

    #[test]
    fn script_autolinks_lose_their_target() {
        let html = markdown_to_html("<javascript:alert(2)>");
        assert!(!html.contains("href=\"javascript"));
        assert!(html.contains("href=\"#\""));
    }

    #[test]
    fn web_links_are_kept() {
        let html = markdown_to_html("[华农](https://www.scau.edu.cn/) ![logo](/static/logo.png)");
        assert!(html.contains("href=\"https://www.scau.edu.cn/\""));
        assert!(html.contains("src=\"/static/logo.png\""));
    }

    #[test]
    fn scheme_check_ignores_case_and_whitespace() {
        assert!(is_script_url("  \tJavaScript:void(0)"));
        assert!(is_script_url("java\nscript:alert(1)"));
        assert!(is_script_url("DATA:text/html,hi"));
        assert!(!is_script_url("https://example.com/javascript:"));
        assert!(!is_script_url("mailto:office@scau.edu.cn"));
    }
}
