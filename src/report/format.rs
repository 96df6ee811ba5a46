use chrono::{DateTime, Utc};
use colored::Colorize;

/// Format a timestamp like "Mar 1, 2024, 10:15". Absent dates read "Unknown".
pub fn format_date(date: Option<&DateTime<Utc>>) -> String {
    match date {
        Some(date) => date.format("%b %-d, %Y, %H:%M").to_string(),
        None => "Unknown".to_string(),
    }
}

/// Span markers recognised in descriptions and comments, longest first.
const MARKERS: [&str; 3] = ["**", "*", "`"];

/// Render the light markdown used in descriptions (`**bold**`, `*em*`,
/// `` `code` ``) with terminal styling. Unpaired markers are left as text.
pub fn render_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while !rest.is_empty() {
        let next = MARKERS
            .iter()
            .filter_map(|marker| rest.find(marker).map(|at| (at, *marker)))
            .min_by_key(|(at, marker)| (*at, std::cmp::Reverse(marker.len())));

        let Some((start, marker)) = next else {
            out.push_str(rest);
            break;
        };

        let after_open = &rest[start + marker.len()..];
        match after_open.find(marker) {
            Some(len) if len > 0 => {
                out.push_str(&rest[..start]);
                let inner = &after_open[..len];
                let styled = match marker {
                    "**" => inner.bold().to_string(),
                    "*" => inner.italic().to_string(),
                    _ => inner.cyan().to_string(),
                };
                out.push_str(&styled);
                rest = &after_open[len + marker.len()..];
            }
            _ => {
                out.push_str(&rest[..start + marker.len()]);
                rest = after_open;
            }
        }
    }

    out
}
