//! Compliance highlight annotation.
//!
//! Produces an HTML-safe annotated rendering of a section's content with
//! each flag's matched text wrapped in a severity-classed highlight span.
//! The contract: escape the full text first, consider flags longest match
//! first, skip any flag whose span would overlap an already-placed
//! highlight, and shift previously placed spans when an insertion changes
//! the offsets after it. Deterministic for a fixed flag list.

use briefdesk_shared::ComplianceFlag;

/// Escape text for HTML interpolation.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape `content` and wrap each flag's matched text in highlight markup.
///
/// Flags whose matched text cannot be found in the escaped content (stale
/// excerpt, model paraphrase) are skipped silently; flags that would overlap
/// an existing highlight are skipped with a debug log.
pub fn annotate_content(content: &str, flags: &[ComplianceFlag]) -> String {
    let mut escaped = escape_html(content);

    let mut ordered: Vec<&ComplianceFlag> = flags
        .iter()
        .filter(|f| !f.matched_text.is_empty())
        .collect();
    // Longest match first so long spans claim text before short overlapping ones
    ordered.sort_by(|a, b| b.matched_text.len().cmp(&a.matched_text.len()));

    let mut placed: Vec<(usize, usize)> = Vec::new();

    for flag in ordered {
        let escaped_match = escape_html(&flag.matched_text);
        let Some(start) = escaped.find(&escaped_match) else {
            continue;
        };
        let end = start + escaped_match.len();

        if placed.iter().any(|&(s, e)| start < e && end > s) {
            tracing::debug!(flag_id = %flag.id, "highlight skipped, overlaps existing annotation");
            continue;
        }

        let class = flag.severity.css_class();
        let replacement = format!(
            "<span class=\"compliance-highlight compliance-highlight--{class}\" \
data-flag-id=\"{id}\">{escaped_match}\
<span class=\"compliance-indicator compliance-indicator--{class}\" \
data-flag-id=\"{id}\"></span></span>",
            id = flag.id,
        );

        escaped.replace_range(start..end, &replacement);

        // Inserting markup moved everything at or after the original end
        let shift = replacement.len() - (end - start);
        for span in placed.iter_mut() {
            if span.0 >= end {
                span.0 += shift;
                span.1 += shift;
            }
        }
        placed.push((start, start + replacement.len()));
    }

    escaped
}
