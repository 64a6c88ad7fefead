//! Regex scraping of the portal's server-rendered login page.
//!
//! Attribute order inside a tag is not fixed across portals, so hidden inputs are
//! matched in two passes: `name` before `value`, then `value` before `name`. Each
//! quote style is matched on its own so a `'` inside a `"`-quoted value survives.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

static FORM_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r#"(?is)<form\b(?:[^>"']|"[^"]*"|'[^']*')*?\saction\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
    )
});

static INPUT_TAG: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"(?is)<input\b(?:[^>"']|"[^"]*"|'[^']*')*>"#));

static HIDDEN_TYPE: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"(?is)\stype\s*=\s*["']?hidden\b"#));

static NAME_THEN_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r#"(?is)\sname\s*=\s*(?:"([^"]*)"|'([^']*)')(?:[^"']|"[^"]*"|'[^']*')*?\svalue\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
    )
});

static VALUE_THEN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r#"(?is)\svalue\s*=\s*(?:"([^"]*)"|'([^']*)')(?:[^"']|"[^"]*"|'[^']*')*?\sname\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
    )
});

static NAME_ONLY: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"(?is)\sname\s*=\s*(?:"([^"]*)"|'([^']*)')"#));

static SCRIPT_REDIRECT: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r#"(?is)(?:window\.|document\.|top\.|self\.)?location(?:\.href)?\s*=\s*(?:"([^"]+)"|'([^']+)')|location\.(?:replace|assign)\(\s*(?:"([^"]+)"|'([^']+)')\s*\)"#,
    )
});

static META_REFRESH: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r#"(?is)<meta\b[^>]*?http-equiv\s*=\s*["']?refresh["']?[^>]*?content\s*=\s*["']\s*\d*\s*;?\s*url\s*=\s*'?([^"'>]+)"#,
    )
});

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid scraping pattern {pattern}: {err}"))
}

// Quoted values are captured as a `"`/`'` alternation pair starting at `group`.
fn quoted<'h>(caps: &Captures<'h>, group: usize) -> Option<&'h str> {
    caps.get(group)
        .or_else(|| caps.get(group + 1))
        .map(|value| value.as_str())
}

pub fn extract_form_action(html: &str, base: &str) -> Option<String> {
    let caps = FORM_ACTION.captures(html)?;
    let action = decode_entities(quoted(&caps, 1)?.trim());
    resolve(base, &action)
}

pub fn extract_hidden_fields(html: &str) -> Vec<(String, String)> {
    INPUT_TAG
        .find_iter(html)
        .map(|tag| tag.as_str())
        .filter(|tag| HIDDEN_TYPE.is_match(tag))
        .filter_map(hidden_field)
        .collect()
}

fn hidden_field(tag: &str) -> Option<(String, String)> {
    let pair = |name: Option<&str>, value: Option<&str>| {
        Some((decode_entities(name?), decode_entities(value.unwrap_or_default())))
    };
    if let Some(caps) = NAME_THEN_VALUE.captures(tag) {
        return pair(quoted(&caps, 1), quoted(&caps, 3));
    }
    if let Some(caps) = VALUE_THEN_NAME.captures(tag) {
        return pair(quoted(&caps, 3), quoted(&caps, 1));
    }
    let caps = NAME_ONLY.captures(tag)?;
    pair(quoted(&caps, 1), None)
}

/// Target of a `<meta http-equiv="refresh">` or a scripted `location` change.
pub fn extract_script_redirect(html: &str) -> Option<String> {
    let target = META_REFRESH
        .captures(html)
        .and_then(|caps| caps.get(1))
        .or_else(|| {
            SCRIPT_REDIRECT
                .captures(html)
                .and_then(|caps| (1..=4).find_map(|group| caps.get(group)))
        })?;
    let target = target.as_str().trim().replace("\\/", "/");
    Some(decode_entities(&target))
}

/// Loose check for a portal error page; matches "error" or "invalid" anywhere.
pub fn looks_like_error(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("error") || body.contains("invalid")
}

pub(crate) fn resolve(base: &str, target: &str) -> Option<String> {
    match Url::parse(base) {
        Ok(base) => base.join(target).ok().map(String::from),
        Err(_) => Url::parse(target).ok().map(String::from),
    }
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&#x2F;", "/")
        .replace("&#47;", "/")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
