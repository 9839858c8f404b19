//! Markdown-aware tokenization for progressive reveal.
//!
//! The typewriter must never pause inside a markdown construct (a lone `**`
//! flashing on screen), so text is split into atomic tokens: complete
//! emphasis spans, code spans, links, URLs, headers, source tags and
//! horizontal rules come out as single tokens, everything else one character
//! at a time. Concatenating the tokens always reproduces the input exactly.

fn find_from(text: &str, pat: &str, from: usize) -> Option<usize> {
    text.get(from..)?.find(pat).map(|p| p + from)
}

fn byte_at(text: &str, i: usize) -> Option<u8> {
    text.as_bytes().get(i).copied()
}

/// Split `text` into reveal-atomic tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];

        // Bold/strong: **text** or __text__
        if rest.starts_with("**") || rest.starts_with("__") {
            let marker = &rest[..2];
            if let Some(end) = find_from(text, marker, i + 2) {
                tokens.push(&text[i..end + 2]);
                i = end + 2;
                continue;
            }
        }

        // Italic: *text* or _text_ (not the bold markers), closing marker not
        // preceded by whitespace
        if (bytes[i] == b'*' || bytes[i] == b'_') && byte_at(text, i + 1) != Some(bytes[i]) {
            let marker = &text[i..=i];
            if let Some(end) = find_from(text, marker, i + 1) {
                let before_close = text[..end].chars().next_back();
                if before_close.is_some_and(|c| !c.is_whitespace()) {
                    tokens.push(&text[i..=end]);
                    i = end + 1;
                    continue;
                }
            }
        }

        // Inline code span, but not a fenced-code opening
        if bytes[i] == b'`' && !rest.starts_with("```") {
            if let Some(end) = find_from(text, "`", i + 1) {
                tokens.push(&text[i..=end]);
                i = end + 1;
                continue;
            }
        }

        // Markdown link: [text](url)
        if bytes[i] == b'[' {
            if let Some(close_bracket) = find_from(text, "]", i) {
                if byte_at(text, close_bracket + 1) == Some(b'(') {
                    if let Some(close_paren) = find_from(text, ")", close_bracket) {
                        tokens.push(&text[i..=close_paren]);
                        i = close_paren + 1;
                        continue;
                    }
                }
            }
        }

        // Bare URL up to the next whitespace or closing bracket
        if rest.starts_with("http://") || rest.starts_with("https://") {
            let mut end = i;
            for c in rest.chars() {
                if c.is_whitespace() || matches!(c, ')' | ']' | '>') {
                    break;
                }
                end += c.len_utf8();
            }
            tokens.push(&text[i..end]);
            i = end;
            continue;
        }

        // ATX header: from # at line start to end of line
        if bytes[i] == b'#' && (i == 0 || bytes[i - 1] == b'\n') {
            match find_from(text, "\n", i) {
                Some(eol) => {
                    tokens.push(&text[i..=eol]);
                    i = eol + 1;
                }
                None => {
                    tokens.push(&text[i..]);
                    i = text.len();
                }
            }
            continue;
        }

        // Source tag block: <SOURCE ...>...</SOURCE>
        if rest.starts_with("<SOURCE ") {
            if let Some(end_tag) = find_from(text, "</SOURCE>", i) {
                tokens.push(&text[i..end_tag + 9]);
                i = end_tag + 9;
                continue;
            }
        }

        // Horizontal rule: 3+ repeated -/*/_ plus a trailing newline
        if matches!(bytes[i], b'-' | b'*' | b'_')
            && byte_at(text, i + 1) == Some(bytes[i])
            && byte_at(text, i + 2) == Some(bytes[i])
        {
            let mut end = i + 3;
            while byte_at(text, end) == Some(bytes[i]) {
                end += 1;
            }
            if byte_at(text, end) == Some(b'\n') {
                end += 1;
            }
            tokens.push(&text[i..end]);
            i = end;
            continue;
        }

        // Regular character, one token each
        let c = rest.chars().next().unwrap_or('\u{FFFD}');
        let len = c.len_utf8();
        tokens.push(&text[i..i + len]);
        i += len;
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_round_trip(input: &str) {
        let joined: String = tokenize(input).concat();
        assert_eq!(joined, input, "token concat must reproduce input");
    }

    #[test]
    fn round_trip_reproduces_input_exactly() {
        let samples = [
            "",
            "plain text only",
            "a **bold** b and __strong__ c",
            "some *italic* and _emphasis_",
            "mixed `code` and [link](https://example.com) here",
            "bare https://example.com/path?q=1 url",
            "# Header\nbody\n## Sub\n",
            "---\nrule then ***\nand ___\n",
            "<SOURCE id=\"S1\"><TITLE>T</TITLE><URL>https://e.com</URL></SOURCE> tail",
            "héllo **bóld** ✓ émphasis *très bien*",
            "unterminated **bold and lone ` tick",
            "```\nfenced code\n```",
        ];
        for sample in samples {
            assert_round_trip(sample);
        }
    }

    #[test]
    fn bold_span_is_atomic() {
        let tokens = tokenize("a **bold** b");
        assert!(tokens.contains(&"**bold**"));
        assert!(!tokens.contains(&"**"));
    }

    #[test]
    fn underscore_strong_is_atomic() {
        let tokens = tokenize("x __strong__ y");
        assert!(tokens.contains(&"__strong__"));
    }

    #[test]
    fn italic_requires_non_whitespace_before_close() {
        let tokens = tokenize("*ok*");
        assert_eq!(tokens, vec!["*ok*"]);

        // closing marker preceded by a space: not an italic span
        let tokens = tokenize("*no *");
        assert_eq!(tokens[0], "*");
    }

    #[test]
    fn code_span_is_atomic_but_fences_are_not() {
        let tokens = tokenize("run `cargo test` now");
        assert!(tokens.contains(&"`cargo test`"));

        let tokens = tokenize("```\nlet x = 1;\n```");
        assert!(!tokens.iter().any(|t| t.len() > 4));
    }

    #[test]
    fn link_is_atomic() {
        let tokens = tokenize("see [docs](https://docs.rs) ok");
        assert!(tokens.contains(&"[docs](https://docs.rs)"));
    }

    #[test]
    fn bare_url_stops_at_whitespace_and_brackets() {
        let tokens = tokenize("go https://a.io/x) rest");
        assert!(tokens.contains(&"https://a.io/x"));
    }

    #[test]
    fn header_is_one_token_per_line() {
        let tokens = tokenize("# Title\nbody");
        assert_eq!(tokens[0], "# Title\n");

        // '#' not at line start is a plain character
        let tokens = tokenize("a # b");
        assert!(tokens.contains(&"#"));
    }

    #[test]
    fn header_at_end_of_text_is_atomic() {
        let tokens = tokenize("intro\n## Closing");
        assert_eq!(*tokens.last().unwrap(), "## Closing");
    }

    #[test]
    fn source_tag_is_atomic() {
        let text = "a <SOURCE id=\"S1\"><TITLE>T</TITLE><URL>u</URL></SOURCE> b";
        let tokens = tokenize(text);
        assert!(
            tokens.contains(&"<SOURCE id=\"S1\"><TITLE>T</TITLE><URL>u</URL></SOURCE>")
        );
    }

    #[test]
    fn horizontal_rule_includes_trailing_newline() {
        let tokens = tokenize("----\nnext");
        assert_eq!(tokens[0], "----\n");

        let tokens = tokenize("text ___\n");
        assert!(tokens.contains(&"___\n"));
    }

    #[test]
    fn multi_byte_characters_are_single_tokens() {
        let tokens = tokenize("é✓");
        assert_eq!(tokens, vec!["é", "✓"]);
    }
}
