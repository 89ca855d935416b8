//! Plain-text rendition of an HTML report body
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref SCRIPT_OR_STYLE: Regex = Regex::new(r"(?is)<(script|style)\b.*?</(script|style)\s*>").unwrap();
    static ref COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
    static ref LINE_BREAK: Regex = Regex::new(r"(?i)<br\s*/?>|</(p|div|tr|li|h[1-6]|table|ul|ol)\s*>").unwrap();
    static ref CELL_END: Regex = Regex::new(r"(?i)</t[dh]\s*>").unwrap();
    static ref TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    static ref ENTITY: Regex = Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap();
    static ref BLANK_LINES: Regex = Regex::new(r"\n[ \t]*\n([ \t]*\n)+").unwrap();
}

/// Strips scripts, styles, comments and tags, then decodes entities.
/// Block ends become line breaks and table cells are tab separated.
pub fn clean_html(html: &str) -> String {
    let text = SCRIPT_OR_STYLE.replace_all(html, "");
    let text = COMMENT.replace_all(&text, "");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = CELL_END.replace_all(&text, "\t");
    let text = TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, |caps: &Captures| decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string()));
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

fn decode_entity(entity: &str) -> Option<String> {
    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        let named = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            "nbsp" => ' ',
            "copy" => '©',
            "reg" => '®',
            "pound" => '£',
            "euro" => '€',
            "ndash" => '–',
            "mdash" => '—',
            _ => return None,
        };
        return Some(named.to_string());
    };
    code.and_then(char::from_u32).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tags_and_entities() {
        let html = "<html><head><style>p {color: red}</style><script>alert('x')</script></head>\
                    <body><h1>Sites &amp; Owners</h1><p onclick=\"go()\">A &lt;b&gt; &#65;&#x42;</p><!-- note --></body></html>";
        assert_eq!(clean_html(html), "Sites & Owners\nA <b> AB");
    }

    #[test]
    fn test_table_cells_and_blank_lines() {
        let html = "<table><tr><td>1</td><td>Acme</td></tr>\n\n\n\n<tr><td>2</td><td>Bolt</td></tr></table>";
        assert_eq!(clean_html(html), "1\tAcme\t\n\n2\tBolt");
    }

    #[test]
    fn test_unknown_entity_is_kept() {
        assert_eq!(clean_html("a &bogus; b"), "a &bogus; b");
    }
}
