//! Digest builder - aggregates a run's entries into one message

use crate::model::{Category, Digest, DigestEntry};

const HEADER: &str = "Daily Relationship Update";
const SEPARATOR_WIDTH: usize = 30;
const ACCENT: &str = "#0a66c2";

/// Builds the plain-text and HTML renderings of a digest
#[derive(Debug, Clone, Default)]
pub struct DigestBuilder;

impl DigestBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a digest from a run's entries
    ///
    /// Always produces a message: an empty run yields the "no new posts"
    /// digest naming the monitored profiles.
    pub fn build(&self, entries: Vec<DigestEntry>, monitored_profiles: &[String]) -> Digest {
        let (title, plain_body, rich_body) = if entries.is_empty() {
            let names = monitored_names(monitored_profiles);
            (
                "Daily Update - No new posts today".to_string(),
                format!(
                    "No new posts were found from {}. We'll check again tomorrow!",
                    names
                ),
                render_empty_html(&names),
            )
        } else {
            (
                format!("Daily Update - {} new post(s)", entries.len()),
                render_plain(&entries),
                render_html(&entries),
            )
        };

        Digest {
            title,
            plain_body,
            rich_body,
            entries,
            monitored_profiles: monitored_profiles.to_vec(),
        }
    }
}

fn monitored_names(monitored_profiles: &[String]) -> String {
    if monitored_profiles.is_empty() {
        "your tracked profiles".to_string()
    } else {
        monitored_profiles.join(", ")
    }
}

/// Hex colour of a category badge
pub fn category_color(category: Category) -> &'static str {
    match category {
        Category::Funding => "#2e7d32",
        Category::Hiring => "#e65100",
        Category::Launch => "#1565c0",
        Category::Other => "#616161",
    }
}

fn render_plain(entries: &[DigestEntry]) -> String {
    let rule = "-".repeat(SEPARATOR_WIDTH);
    let mut lines = vec![HEADER.to_string(), "=".repeat(SEPARATOR_WIDTH), String::new()];

    for entry in entries {
        lines.push(format!("Name: {}", entry.profile_name));
        lines.push(format!("Category: {}", entry.category));
        lines.push(format!("Summary: {}", entry.summary));
        lines.push(format!("Suggested Reply: {}", entry.suggested_reply));
        if let Some(url) = &entry.post_url {
            lines.push(format!("Post Link: {}", url));
        }
        lines.push(rule.clone());
        lines.push(String::new());
    }

    lines.join("\n")
}

fn render_html(entries: &[DigestEntry]) -> String {
    let mut rows = String::new();

    for entry in entries {
        let link = match &entry.post_url {
            Some(url) => format!(
                r#"<a href="{}" style="color:{};">View Post</a>"#,
                escape_html(url),
                ACCENT
            ),
            None => "N/A".to_string(),
        };

        rows.push_str(&format!(
            r#"
        <tr>
            <td style="padding:16px; border-bottom:1px solid #eee;">
                <div style="font-weight:600; font-size:15px; margin-bottom:6px;">{name}</div>
                <div style="display:inline-block; background:{color}; color:white; padding:2px 10px; border-radius:12px; font-size:12px; font-weight:600; margin-bottom:8px;">{category}</div>
                <div style="font-size:14px; color:#333; margin-bottom:8px;">{summary}</div>
                <div style="background:#f8f9fa; border-left:3px solid {accent}; padding:8px 12px; font-size:13px; color:#555; margin-bottom:8px;">
                    <strong style="color:{accent}; font-size:11px; text-transform:uppercase;">Suggested Reply</strong><br>{reply}
                </div>
                <div>{link}</div>
            </td>
        </tr>"#,
            name = escape_html(&entry.profile_name),
            color = category_color(entry.category),
            category = entry.category,
            summary = escape_html(&entry.summary),
            reply = escape_html(&entry.suggested_reply),
            accent = ACCENT,
            link = link,
        ));
    }

    let subtitle = format!("{} new post(s) detected", entries.len());
    wrap_html(&subtitle, &format!(
        r#"<table style="width:100%; border-collapse:collapse;">{}
            </table>"#,
        rows
    ))
}

fn render_empty_html(names: &str) -> String {
    wrap_html(
        "No new posts today",
        &format!(
            r#"<div style="padding:32px 24px; text-align:center;">
                <p style="font-size:16px; color:#333; margin:0 0 8px;">No new posts were found from {}.</p>
                <p style="font-size:14px; color:#888; margin:0;">We'll check again tomorrow!</p>
            </div>"#,
            escape_html(names)
        ),
    )
}

fn wrap_html(subtitle: &str, content: &str) -> String {
    format!(
        r#"<html>
    <body style="font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif; background:#f0f2f5; padding:20px;">
        <div style="max-width:600px; margin:0 auto; background:white; border-radius:10px; overflow:hidden; box-shadow:0 2px 8px rgba(0,0,0,0.1);">
            <div style="background:{accent}; color:white; padding:20px 24px;">
                <h1 style="margin:0; font-size:20px;">{header}</h1>
                <p style="margin:4px 0 0; opacity:0.9; font-size:14px;">{subtitle}</p>
            </div>
            {content}
        </div>
    </body>
</html>"#,
        accent = ACCENT,
        header = HEADER,
        subtitle = escape_html(subtitle),
        content = content,
    )
}

/// Escape text for interpolation into HTML element content and attributes
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
