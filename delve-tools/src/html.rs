//! HTML-to-text extraction for fetched pages.
//!
//! A single pass over the markup: tags are dropped, the contents of
//! `script`, `style`, `noscript`, `svg` and `head` are skipped, and block-level
//! elements become line breaks. Entities are decoded and whitespace is
//! cleaned up afterwards.

/// Elements whose content is never readable text.
const SKIPPED: [&str; 6] = ["script", "style", "noscript", "svg", "head", "template"];

/// Elements that start a new line.
const BLOCKS: [&str; 24] = [
    "p", "br", "div", "section", "article", "header", "footer", "main", "aside", "nav", "h1",
    "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "tr", "table", "blockquote", "pre", "hr",
];

/// Extract readable text from an HTML document.
pub fn extract_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len() / 2);
    let mut chars = html.char_indices().peekable();
    // name of the element whose content is being skipped
    let mut skipping: Option<&'static str> = None;

    while let Some((i, ch)) = chars.next() {
        if ch != '<' {
            if skipping.is_none() {
                text.push(ch);
            }
            continue;
        }

        // comments
        if html[i..].starts_with("<!--") {
            let end = html[i..].find("-->").map_or(html.len(), |p| i + p + 3);
            while chars.peek().is_some_and(|&(j, _)| j < end) {
                chars.next();
            }
            continue;
        }

        let Some(close) = html[i..].find('>') else {
            break;
        };
        let tag = &html[i + 1..i + close];
        while chars.peek().is_some_and(|&(j, _)| j <= i + close) {
            chars.next();
        }

        let (is_end, name) = tag_name(tag);
        if let Some(skipped) = skipping {
            if is_end && name == skipped {
                skipping = None;
            }
            continue;
        }
        if !is_end
            && !tag.ends_with('/')
            && let Some(skipped) = SKIPPED.iter().find(|s| **s == name)
        {
            skipping = Some(*skipped);
            continue;
        }
        if BLOCKS.contains(&name.as_str()) {
            text.push('\n');
        } else if name == "td" || name == "th" {
            text.push(' ');
        }
    }

    clean_whitespace(&decode_entities(&text))
}

/// Lowercased element name and whether the tag closes it.
fn tag_name(tag: &str) -> (bool, String) {
    let tag = tag.trim_start();
    let (is_end, rest) = match tag.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, tag),
    };
    let name = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    (is_end, name)
}

/// Decode named and numeric character references.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "copy" => '©',
        "deg" => '°',
        _ => return None,
    };
    Some(c)
}

/// Collapse runs of spaces within lines and drop blank lines.
fn clean_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_text_from_html() {
        let html = r#"
        <html>
        <head><title>Test</title><style>.x { color: red; }</style></head>
        <body>
            <h1>Hello World</h1>
            <p>This is a <b>test</b> paragraph.</p>
            <script>var x = 1;</script>
            <!-- a <p>comment</p> -->
            <ul>
                <li>Item 1</li>
                <li>Item 2</li>
            </ul>
        </body>
        </html>"#;

        let text = extract_text(html);
        assert_eq!(text, "Hello World\nThis is a test paragraph.\nItem 1\nItem 2");
    }

    #[test]
    fn test_entities() {
        let html = "<p>A &amp; B &lt; C &gt; D &quot;E&quot; &#39;F&#x27; &bogus; &</p>";
        assert_eq!(extract_text(html), "A & B < C > D \"E\" 'F' &bogus; &");
    }

    #[test]
    fn test_uppercase_and_attributes() {
        let html = "<DIV class=\"a\">one</DIV><SCRIPT type=\"text/javascript\">bad()</SCRIPT><div>two</div>";
        assert_eq!(extract_text(html), "one\ntwo");
    }

    #[test]
    fn test_table_cells_are_separated() {
        let html = "<table><tr><td>COP</td><td>2.1</td></tr></table>";
        assert_eq!(extract_text(html), "COP 2.1");
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(extract_text("just   text\n\n\nmore"), "just text\nmore");
    }

    #[test]
    fn test_unclosed_tag_stops() {
        assert_eq!(extract_text("before <p unclosed"), "before");
    }
}
