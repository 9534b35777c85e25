//! Pure transformation of scan data into display fragments.
//!
//! Nothing in here performs I/O or keeps state between calls; a fragment is
//! a toolkit-independent description that can be printed to a terminal
//! (`Display`) or turned into HTML for the web UI (`to_html`).
use std::fmt::{self, Write as _};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::checks::{Check, CheckReply};
use crate::types::RecordResult;

pub const PROGRESS_LABEL: &str = "checking...";
pub const NO_INFORMATION: &str = "No information available.";
pub const UNEXPECTED_ERROR: &str = "An unexpected application error occurred.";
pub const CHECKED_SELECTORS_TITLE: &str = "Checked selectors";

const BAR_CELLS: usize = 20;

static IP_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[IP\]([0-9a-fA-F:.]+)").expect("ip marker regex should compile")
});
static WHOIS_NAME_SERVER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Name Server|ネームサーバ").expect("name server regex should compile")
});
static WHOIS_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Creation Date|Updated Date|Expiration Date|Expiry Date|登録年月日|有効期限|最終更新")
        .expect("whois date regex should compile")
});

/// Something a front-end can show in place of the current result area.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayFragment {
    /// Cleared result area.
    Blank,
    Progress {
        percentage: u8,
        completed: u64,
        total: u64,
        label: String,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Results {
        cards: Vec<Card>,
        /// Comma-joined list of the DKIM selectors that were probed.
        #[serde(skip_serializing_if = "Option::is_none")]
        footer: Option<String>,
    },
    Text {
        lines: Vec<Line>,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub header: String,
    pub body: Vec<Paragraph>,
}

/// A record (possibly spanning several lines) or an empty-state status line.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub lines: Vec<Line>,
    pub status: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Line(pub Vec<Span>);

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "span", content = "text", rename_all = "snake_case")]
pub enum Span {
    Text(String),
    NameServer(String),
    Date(String),
    /// Address a front-end may offer a WHOIS lookup for.
    Ip(String),
}

impl Span {
    pub fn as_str(&self) -> &str {
        match self {
            Span::Text(s) | Span::NameServer(s) | Span::Date(s) | Span::Ip(s) => s,
        }
    }
}

impl Line {
    pub fn plain(text: impl Into<String>) -> Self {
        Line(vec![Span::Text(text.into())])
    }

    /// Concatenated text of all spans.
    pub fn text(&self) -> String {
        self.0.iter().map(Span::as_str).collect()
    }
}

impl Paragraph {
    fn status(message: &str) -> Self {
        Self {
            lines: vec![Line::plain(message)],
            status: true,
        }
    }

    fn record(record: &str, ip_markers: bool) -> Self {
        let lines = split_lines(record)
            .map(|l| if ip_markers { ip_line(l) } else { Line::plain(l) })
            .collect();
        Self {
            lines,
            status: false,
        }
    }
}

pub fn render_progress(percentage: u8, completed: u64, total: u64) -> DisplayFragment {
    DisplayFragment::Progress {
        percentage: percentage.min(100),
        completed,
        total,
        label: format!("{PROGRESS_LABEL} ({completed} / {total})"),
    }
}

pub fn render_error(message: impl Into<String>) -> DisplayFragment {
    DisplayFragment::Error {
        message: message.into(),
        detail: None,
    }
}

/// Generic failure at the host boundary, with the raw error kept for diagnosis.
pub fn render_unexpected(detail: impl fmt::Display) -> DisplayFragment {
    DisplayFragment::Error {
        message: UNEXPECTED_ERROR.to_string(),
        detail: Some(detail.to_string()),
    }
}

/// Cards in input order, then the checked-selector footer when any were probed.
pub fn render_results(results: &[RecordResult], checked_selectors: &[String]) -> DisplayFragment {
    let cards = results.iter().map(|r| record_card(r, false)).collect();
    let footer = (!checked_selectors.is_empty()).then(|| checked_selectors.join(", "));
    DisplayFragment::Results { cards, footer }
}

/// DNS lookup cards; `[IP]addr` markers in records become IP spans.
pub fn render_records(results: &[RecordResult]) -> DisplayFragment {
    let cards = results.iter().map(|r| record_card(r, true)).collect();
    DisplayFragment::Results {
        cards,
        footer: None,
    }
}

pub fn render_text(text: &str) -> DisplayFragment {
    DisplayFragment::Text {
        lines: split_lines(text).map(Line::plain).collect(),
    }
}

/// WHOIS/RDAP output with name-server and date lines highlighted.
pub fn render_whois(text: &str) -> DisplayFragment {
    let lines = split_lines(text)
        .map(|l| {
            let span = if WHOIS_NAME_SERVER.is_match(l) {
                Span::NameServer(l.to_string())
            } else if WHOIS_DATE.is_match(l) {
                Span::Date(l.to_string())
            } else {
                Span::Text(l.to_string())
            };
            Line(vec![span])
        })
        .collect();
    DisplayFragment::Text { lines }
}

pub fn render_check(check: &Check, reply: &CheckReply) -> DisplayFragment {
    match (check, reply) {
        (_, CheckReply::Failure(message)) => render_error(message.clone()),
        (_, CheckReply::Records(results)) => render_records(results),
        (Check::Whois { .. }, CheckReply::Text(text)) => render_whois(text),
        (_, CheckReply::Text(text)) => render_text(text),
    }
}

fn record_card(result: &RecordResult, ip_markers: bool) -> Card {
    let mut header = format!("{} record", result.kind);
    if result.kind.is_dkim_like() {
        if let Some(label) = &result.query_label {
            let _ = write!(header, " ({label})");
        }
    }
    let body = if result.records.is_empty() {
        vec![Paragraph::status(
            result.status_message.as_deref().unwrap_or(NO_INFORMATION),
        )]
    } else {
        result
            .records
            .iter()
            .map(|r| Paragraph::record(r, ip_markers))
            .collect()
    };
    Card { header, body }
}

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l))
}

fn ip_line(text: &str) -> Line {
    let mut spans = Vec::new();
    let mut last = 0;
    for caps in IP_MARKER.captures_iter(text) {
        let (Some(whole), Some(ip)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            spans.push(Span::Text(text[last..whole.start()].to_string()));
        }
        spans.push(Span::Ip(ip.as_str().to_string()));
        last = whole.end();
    }
    if last < text.len() || spans.is_empty() {
        spans.push(Span::Text(text[last..].to_string()));
    }
    Line(spans)
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for span in &self.0 {
            f.write_str(span.as_str())?;
        }
        Ok(())
    }
}

impl fmt::Display for DisplayFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayFragment::Blank => Ok(()),
            DisplayFragment::Progress {
                percentage, label, ..
            } => {
                let filled = usize::from(*percentage) * BAR_CELLS / 100;
                write!(
                    f,
                    "[{}{}] {:>3}% {}",
                    "#".repeat(filled),
                    ".".repeat(BAR_CELLS - filled),
                    percentage,
                    label
                )
            }
            DisplayFragment::Error { message, detail } => {
                write!(f, "error: {message}")?;
                if let Some(d) = detail {
                    write!(f, "\n{d}")?;
                }
                Ok(())
            }
            DisplayFragment::Results { cards, footer } => {
                for (i, card) in cards.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    writeln!(f, "== {} ==", card.header)?;
                    for p in &card.body {
                        for line in &p.lines {
                            if p.status {
                                writeln!(f, "  ({line})")?;
                            } else {
                                writeln!(f, "  {line}")?;
                            }
                        }
                    }
                }
                if let Some(footer) = footer {
                    write!(f, "\n{CHECKED_SELECTORS_TITLE}: {footer}")?;
                }
                Ok(())
            }
            DisplayFragment::Text { lines } => {
                for (i, line) in lines.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{line}")?;
                }
                Ok(())
            }
        }
    }
}

impl DisplayFragment {
    /// HTML for the embedded UI. All engine and user text is escaped.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        match self {
            DisplayFragment::Blank => {}
            DisplayFragment::Progress {
                percentage, label, ..
            } => {
                let _ = write!(
                    out,
                    r#"<div class="progress-container"><div class="progress-bar" style="width: {percentage}%"></div><span class="progress-text">{}</span></div>"#,
                    esc(label)
                );
            }
            DisplayFragment::Error { message, detail } => {
                let _ = write!(out, r#"<div class="error-message">{}"#, esc(message));
                if let Some(d) = detail {
                    let _ = write!(out, "<br>{}", esc(d));
                }
                out.push_str("</div>");
            }
            DisplayFragment::Results { cards, footer } => {
                for card in cards {
                    let _ = write!(
                        out,
                        r#"<div class="result-card"><div class="result-header"><span class="result-header-title">{}</span></div><div class="result-body">"#,
                        esc(&card.header)
                    );
                    for p in &card.body {
                        out.push_str(if p.status {
                            r#"<p class="status-message">"#
                        } else {
                            "<p>"
                        });
                        let lines: Vec<String> = p.lines.iter().map(line_html).collect();
                        out.push_str(&lines.join("<br>"));
                        out.push_str("</p>");
                    }
                    out.push_str("</div></div>");
                }
                if let Some(footer) = footer {
                    let _ = write!(
                        out,
                        r#"<div class="checked-selectors"><span class="checked-selectors-title">{CHECKED_SELECTORS_TITLE}:</span> <span class="checked-selectors-list">{}</span></div>"#,
                        esc(footer)
                    );
                }
            }
            DisplayFragment::Text { lines } => {
                let lines: Vec<String> = lines.iter().map(line_html).collect();
                let _ = write!(out, r#"<pre class="text-result">{}</pre>"#, lines.join("\n"));
            }
        }
        out
    }
}

fn esc(s: &str) -> std::borrow::Cow<'_, str> {
    html_escape::encode_text(s)
}

fn line_html(line: &Line) -> String {
    let mut out = String::new();
    for span in &line.0 {
        match span {
            Span::Text(s) => out.push_str(&esc(s)),
            Span::NameServer(s) => {
                let _ = write!(out, r#"<span class="highlight-yellow">{}</span>"#, esc(s));
            }
            Span::Date(s) => {
                let _ = write!(out, r#"<span class="highlight-green">{}</span>"#, esc(s));
            }
            Span::Ip(ip) => {
                let _ = write!(
                    out,
                    r#"{} <button class="ip-lookup-btn" data-ip="{}">Whois</button>"#,
                    esc(ip),
                    html_escape::encode_double_quoted_attribute(ip)
                );
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_label_and_bar() {
        let frag = render_progress(67, 2, 3);
        assert_eq!(frag.to_string(), "[#############.......]  67% checking... (2 / 3)");
        assert!(frag.to_html().contains("width: 67%"));
    }

    #[test]
    fn ip_markers_split_into_spans() {
        let line = ip_line("ns1.example.net -> [IP]192.0.2.1 (A)");
        assert_eq!(
            line.0,
            vec![
                Span::Text("ns1.example.net -> ".into()),
                Span::Ip("192.0.2.1".into()),
                Span::Text(" (A)".into()),
            ]
        );
        assert_eq!(ip_line("").0, vec![Span::Text(String::new())]);
    }

    #[test]
    fn whois_highlighting() {
        let DisplayFragment::Text { lines } =
            render_whois("Domain Name: EXAMPLE.COM\nname server: a.iana-servers.net\nCreation Date: 1995-08-14")
        else {
            panic!("expected text fragment");
        };
        assert!(matches!(lines[0].0[0], Span::Text(_)));
        assert!(matches!(lines[1].0[0], Span::NameServer(_)));
        assert!(matches!(lines[2].0[0], Span::Date(_)));
    }

    #[test]
    fn html_is_escaped() {
        let html = render_error("<script>alert(1)</script> & co").to_html();
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&amp; co"));
        assert!(!html.contains("<script>"));
    }
}
