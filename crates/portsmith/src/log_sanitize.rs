// Build tools colorize and redraw their output; strip that before it reaches the console.

const MAX_LINE_CHARS: usize = 4096;

#[derive(Clone, Copy)]
enum Seq {
    // Saw ESC, waiting for the introducer.
    Start,
    // CSI: ends at a final byte in '@'..='~'.
    Csi,
    // OSC / DCS style strings: end at BEL (OSC only) or ESC '\'.
    Str { bel_ends: bool, esc: bool },
}

pub fn sanitize_log_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LINE_CHARS));
    let mut seq: Option<Seq> = None;
    let mut kept = 0usize;

    for c in input.chars() {
        if let Some(state) = seq {
            seq = match (state, c) {
                (Seq::Start, '[') => Some(Seq::Csi),
                (Seq::Start, ']') => Some(Seq::Str {
                    bel_ends: true,
                    esc: false,
                }),
                (Seq::Start, 'P' | 'X' | '^' | '_') => Some(Seq::Str {
                    bel_ends: false,
                    esc: false,
                }),
                (Seq::Start, _) => None,
                (Seq::Csi, '@'..='~') => None,
                (Seq::Csi, _) => Some(Seq::Csi),
                (Seq::Str { bel_ends: true, .. }, '\x07') => None,
                (Seq::Str { esc: true, .. }, '\\') => None,
                (Seq::Str { bel_ends, .. }, '\x1b') => Some(Seq::Str {
                    bel_ends,
                    esc: true,
                }),
                (Seq::Str { bel_ends, .. }, _) => Some(Seq::Str {
                    bel_ends,
                    esc: false,
                }),
            };
            continue;
        }

        match c {
            '\x1b' => seq = Some(Seq::Start),
            '\r' | '\n' => {}
            '\t' => {
                out.push(' ');
                kept += 1;
            }
            c if c.is_control() || is_bidi_control(c) => {}
            c => {
                out.push(c);
                kept += 1;
            }
        }

        if kept >= MAX_LINE_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
    }

    out
}

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}')
}
