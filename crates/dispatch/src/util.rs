//! Text helpers used when enriching render contexts and by the built-in
//! renderer.

/// Contrast ratio against white at or above which white text is readable.
const CONTRAST_THRESHOLD: f64 = 4.5;

const WHITE_HEX: &str = "ffffff";
const BLACK_HEX: &str = "000000";

/// Shortens a commit message to one line of at most `max_len` characters.
///
/// A multi-line message whose first line fits gets a `" […]"` marker; a line
/// that is too long is cut and gets `"…"`.
pub fn cut_message(message: &str, max_len: usize) -> String {
    let mut line = message;
    if let Some((first, _)) = message.split_once('\n') {
        line = first;
        if line.chars().count() <= max_len {
            return format!("{line} […]");
        }
    }
    if line.chars().count() > max_len {
        let cut: String = line.chars().take(max_len).collect();
        return format!("{cut}…");
    }
    line.to_string()
}

/// Kind of git ref: `"branch"`, `"tag"`, or `"ref"` for anything else.
pub fn ref_type(git_ref: &str) -> &'static str {
    if git_ref.starts_with("refs/heads/") {
        "branch"
    } else if git_ref.starts_with("refs/tags/") {
        "tag"
    } else {
        "ref"
    }
}

/// Ref without its `refs/<kind>/` prefix.
pub fn ref_name(git_ref: &str) -> &str {
    git_ref.splitn(3, '/').nth(2).unwrap_or(git_ref)
}

/// Personal branches are namespaced, e.g. `refs/heads/mona/some-fix`.
pub fn ref_is_personal(git_ref: &str) -> bool {
    git_ref
        .splitn(3, '/')
        .nth(2)
        .is_some_and(|name| name.contains('/'))
}

/// Joins items the way prose does: `"a, b and c"`.
pub fn join_human_list<S: AsRef<str>>(items: &[S], joiner: &str, final_joiner: &str) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [init @ .., last] => {
            let head: Vec<&str> = init.iter().map(|item| item.as_ref()).collect();
            format!("{}{final_joiner}{}", head.join(joiner), last.as_ref())
        }
    }
}

/// Foreground colour (hex, no `#`) readable on a label of colour `color`.
///
/// White when the WCAG contrast ratio against white reaches 4.5, black
/// otherwise (and for unparseable colours).
pub fn contrast_fg(color: &str) -> &'static str {
    match hex_to_rgb(color) {
        Some(rgb) if contrast(rgb, (1.0, 1.0, 1.0)) >= CONTRAST_THRESHOLD => WHITE_HEX,
        _ => BLACK_HEX,
    }
}

fn hex_to_rgb(color: &str) -> Option<(f64, f64, f64)> {
    let hex = color.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .ok()
            .map(|v| f64::from(v) / 255.0)
    };
    Some((channel(0)?, channel(2)?, channel(4)?))
}

fn luminance((r, g, b): (f64, f64, f64)) -> f64 {
    let linear = |c: f64| {
        if c <= 0.039_28 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    0.2126 * linear(r) + 0.7152 * linear(g) + 0.0722 * linear(b)
}

fn contrast(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    let (la, lb) = (luminance(a), luminance(b));
    let (hi, lo) = if la > lb { (la, lb) } else { (lb, la) };
    (hi + 0.05) / (lo + 0.05)
}
