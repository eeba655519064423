//! HTML to markdown conversion
//!
//! Block structure (headings, paragraphs, lists, code blocks, quotes, tables,
//! rules) is emitted in document order, separated by blank lines. Inline
//! markup (links, emphasis, inline code, images, line breaks) is rendered
//! inside its enclosing block.

use crate::transform::links::{resolve_href, selector};
use scraper::{ElementRef, Node};
use url::Url;

/// Elements whose content is never part of the document body
const SKIPPED_ELEMENTS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "nav", "iframe", "svg",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "center", "dd", "details", "div", "dl",
    "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hr", "html", "li", "main", "ol", "p", "pre", "section", "summary", "table",
    "ul",
];

/// Converts the subtree under `root` to markdown
///
/// Relative link and image targets are resolved against `base`.
pub fn to_markdown(root: ElementRef<'_>, base: &Url) -> String {
    let converter = MarkdownConverter { base };
    let mut blocks = Vec::new();
    converter.blocks(root, &mut blocks);
    blocks.join("\n\n")
}

pub(crate) fn is_skipped(element: ElementRef<'_>) -> bool {
    let el = element.value();
    SKIPPED_ELEMENTS.contains(&el.name())
        || el.attr("role") == Some("navigation")
        || el.attr("hidden").is_some()
}

fn is_block(name: &str) -> bool {
    BLOCK_ELEMENTS.contains(&name)
}

struct MarkdownConverter<'b> {
    base: &'b Url,
}

impl MarkdownConverter<'_> {
    /// Renders the children of `element` as a sequence of blocks
    ///
    /// Loose inline content between block children becomes a paragraph.
    fn blocks(&self, element: ElementRef<'_>, out: &mut Vec<String>) {
        let mut pending = String::new();

        for child in element.children() {
            match child.value() {
                Node::Text(text) => pending.push_str(&collapse_whitespace(text)),
                Node::Element(_) => {
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if is_skipped(child) {
                        continue;
                    }
                    if is_block(child.value().name()) {
                        push_paragraph(&mut pending, out);
                        self.block(child, out);
                    } else {
                        pending.push_str(&self.inline(child));
                    }
                }
                _ => {}
            }
        }

        push_paragraph(&mut pending, out);
    }

    fn block(&self, element: ElementRef<'_>, out: &mut Vec<String>) {
        let name = element.value().name();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                let text = single_line(&self.inline_children(element));
                if !text.is_empty() {
                    out.push(format!("{} {}", "#".repeat(level), text));
                }
            }
            "p" => {
                let text = tidy_inline(&self.inline_children(element));
                if !text.is_empty() {
                    out.push(text);
                }
            }
            "ul" | "ol" => {
                let list = self.list(element, name == "ol", 0);
                if !list.is_empty() {
                    out.push(list);
                }
            }
            "pre" => {
                if let Some(code) = code_block(element) {
                    out.push(code);
                }
            }
            "blockquote" => {
                let mut inner = Vec::new();
                self.blocks(element, &mut inner);
                if !inner.is_empty() {
                    out.push(quote(&inner.join("\n\n")));
                }
            }
            "table" => {
                if let Some(table) = self.table(element) {
                    out.push(table);
                }
            }
            "hr" => out.push("---".to_string()),
            _ => self.blocks(element, out),
        }
    }

    fn inline(&self, element: ElementRef<'_>) -> String {
        let el = element.value();
        match el.name() {
            "br" => "\n".to_string(),
            "a" => {
                let text = single_line(&self.inline_children(element));
                let target = el.attr("href").and_then(|h| resolve_href(h, self.base));
                match target {
                    _ if text.is_empty() => String::new(),
                    Some(url) => format!("[{}]({})", text, url),
                    None => text,
                }
            }
            "strong" | "b" => self.wrapped(element, "**"),
            "em" | "i" => self.wrapped(element, "*"),
            "del" | "s" => self.wrapped(element, "~~"),
            "code" | "kbd" | "samp" => {
                let code = element.text().collect::<String>();
                let code = single_line(&code);
                if code.is_empty() {
                    String::new()
                } else {
                    format!("`{}`", code)
                }
            }
            "img" => {
                let alt = el.attr("alt").map(single_line).unwrap_or_default();
                match el.attr("src").and_then(|s| resolve_href(s, self.base)) {
                    Some(src) => format!("![{}]({})", alt, src),
                    None => String::new(),
                }
            }
            _ if is_block(el.name()) => format!(" {} ", self.inline_children(element)),
            _ => self.inline_children(element),
        }
    }

    fn inline_children(&self, element: ElementRef<'_>) -> String {
        let mut out = String::new();
        for child in element.children() {
            match child.value() {
                Node::Text(text) => out.push_str(&collapse_whitespace(text)),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        if !is_skipped(child) {
                            out.push_str(&self.inline(child));
                        }
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn wrapped(&self, element: ElementRef<'_>, marker: &str) -> String {
        let text = single_line(&self.inline_children(element));
        if text.is_empty() {
            String::new()
        } else {
            format!("{}{}{}", marker, text, marker)
        }
    }

    /// Renders a list; nested lists are indented four spaces per level
    fn list(&self, element: ElementRef<'_>, ordered: bool, depth: usize) -> String {
        let mut lines = Vec::new();
        let mut index: usize = element
            .value()
            .attr("start")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(1);
        let indent = "    ".repeat(depth);

        for item in element.children().filter_map(ElementRef::wrap) {
            if item.value().name() != "li" || is_skipped(item) {
                continue;
            }

            let mut text = String::new();
            let mut nested = Vec::new();
            for child in item.children() {
                match child.value() {
                    Node::Text(t) => text.push_str(&collapse_whitespace(t)),
                    Node::Element(_) => {
                        let Some(child) = ElementRef::wrap(child) else {
                            continue;
                        };
                        match child.value().name() {
                            _ if is_skipped(child) => {}
                            "ul" => nested.push(self.list(child, false, depth + 1)),
                            "ol" => nested.push(self.list(child, true, depth + 1)),
                            _ => text.push_str(&self.inline(child)),
                        }
                    }
                    _ => {}
                }
            }

            let marker = if ordered {
                let marker = format!("{}.", index);
                index += 1;
                marker
            } else {
                "-".to_string()
            };
            let line = format!("{}{} {}", indent, marker, single_line(&text));
            lines.push(line.trim_end().to_string());
            lines.extend(nested.into_iter().filter(|n| !n.is_empty()));
        }

        lines.join("\n")
    }

    fn table(&self, element: ElementRef<'_>) -> Option<String> {
        let row_selector = selector("tr")?;
        let rows: Vec<Vec<String>> = element
            .select(&row_selector)
            .map(|row| {
                row.children()
                    .filter_map(ElementRef::wrap)
                    .filter(|cell| matches!(cell.value().name(), "th" | "td"))
                    .map(|cell| single_line(&self.inline_children(cell)).replace('|', "\\|"))
                    .collect::<Vec<_>>()
            })
            .filter(|row| !row.is_empty())
            .collect();

        let width = rows.iter().map(Vec::len).max()?;
        let render = |row: &[String]| {
            let mut cells: Vec<&str> = row.iter().map(String::as_str).collect();
            cells.resize(width, "");
            format!("| {} |", cells.join(" | "))
        };

        let mut lines = vec![render(rows[0].as_slice())];
        lines.push(format!("|{}", " --- |".repeat(width)));
        lines.extend(rows[1..].iter().map(|row| render(row.as_slice())));
        Some(lines.join("\n"))
    }
}

/// Renders a `<pre>` element as a fenced code block
fn code_block(pre: ElementRef<'_>) -> Option<String> {
    let code = pre.text().collect::<String>();
    let code = code.trim_matches('\n').trim_end();
    if code.trim().is_empty() {
        return None;
    }

    let language = pre
        .children()
        .filter_map(ElementRef::wrap)
        .find(|child| child.value().name() == "code")
        .and_then(language_hint)
        .or_else(|| language_hint(pre))
        .unwrap_or_default();

    let longest_run = code
        .split(|c: char| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run.max(2) + 1);

    Some(format!("{}{}\n{}\n{}", fence, language, code, fence))
}

/// Reads a `language-xxx` (or `lang-xxx`) class
fn language_hint(element: ElementRef<'_>) -> Option<String> {
    element.value().attr("class").and_then(|classes| {
        classes.split_ascii_whitespace().find_map(|class| {
            class
                .strip_prefix("language-")
                .or_else(|| class.strip_prefix("lang-"))
                .map(str::to_string)
        })
    })
}

fn quote(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replaces every run of whitespace with a single space
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out
}

/// Collapses spaces on each line, trims lines and drops empty ones
///
/// Newlines only come from `<br>`, so they are kept.
fn tidy_inline(text: &str) -> String {
    text.split('\n')
        .map(|line| collapse_whitespace(line).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn single_line(text: &str) -> String {
    collapse_whitespace(text).trim().to_string()
}

fn push_paragraph(pending: &mut String, out: &mut Vec<String>) {
    let text = tidy_inline(pending);
    pending.clear();
    if !text.is_empty() {
        out.push(text);
    }
}
