//! Relaxed JSON input
//!
//! Config files are hand-edited, so `//` and `/* */` comments and trailing
//! commas are accepted. They are blanked out before the text reaches
//! `serde_json`; line and column numbers in parse errors stay valid.

/// Replace comments and trailing commas with spaces (newlines are kept)
pub fn strip(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out: Vec<char> = Vec::with_capacity(chars.len());
    let mut i = 0;
    let mut in_string = false;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match (c, chars.get(i + 1)) {
            ('"', _) => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    out.push(' ');
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                out.extend([' ', ' ']);
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    out.push(if chars[i] == '\n' { '\n' } else { ' ' });
                    i += 1;
                }
                // Unterminated comments run to the end of the input
                if i < chars.len() {
                    out.extend([' ', ' ']);
                    i += 2;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    blank_trailing_commas(&mut out);
    out.into_iter().collect()
}

/// Blank a `,` whose next non-whitespace character closes an object or array
fn blank_trailing_commas(text: &mut [char]) {
    let mut in_string = false;
    let mut escaped = false;
    let mut pending_comma: Option<usize> = None;

    for i in 0..text.len() {
        let c = text[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                pending_comma = None;
            }
            ',' => pending_comma = Some(i),
            '}' | ']' => {
                if let Some(pos) = pending_comma.take() {
                    text[pos] = ' ';
                }
            }
            c if c.is_whitespace() => {}
            _ => pending_comma = None,
        }
    }
}
