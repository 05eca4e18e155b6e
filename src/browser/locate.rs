//! In-page scripts for locators CSS cannot express.
//!
//! Role and text locators are matched by a script that scores candidates and
//! tags the winner with a one-off `data-drs-locator` token, which is then
//! fetched back with an ordinary CSS query. Nothing is written to the page
//! when no element matches.

use crate::registry::Locator;

pub const MARKER_ATTRIBUTE: &str = "data-drs-locator";

/// Elements that carry an implicit ARIA role.
fn implicit_role_selector(role: &str) -> String {
    let implicit = match role {
        "button" => "button, input[type=\"submit\"], input[type=\"button\"]",
        "link" => "a[href]",
        "textbox" => "textarea, input[type=\"text\"], input[type=\"email\"], input:not([type]), [contenteditable=\"true\"]",
        _ => "",
    };
    if implicit.is_empty() {
        format!("[role=\"{}\"]", role)
    } else {
        format!("{}, [role=\"{}\"]", implicit, role)
    }
}

pub fn marker_selector(token: &str) -> String {
    format!("[{}=\"{}\"]", MARKER_ATTRIBUTE, token)
}

/// Builds the marking script for `locator`, or `None` for plain CSS.
///
/// The script evaluates to `true` when it tagged an element with `token`.
pub fn marking_script(locator: &Locator, token: &str) -> Option<String> {
    let (scope, needle, exact_only) = match locator {
        Locator::Css { .. } => return None,
        Locator::Role { role, name } => (implicit_role_selector(role), name.as_str(), true),
        Locator::Text { text } => (
            "button, a, input, textarea, label, span, div, p, h1, h2, h3, [role], [contenteditable=\"true\"]".to_string(),
            text.as_str(),
            false,
        ),
    };

    // serde_json gives us correctly escaped JS string literals
    let scope = serde_json::to_string(&scope).ok()?;
    let needle = serde_json::to_string(&needle.trim().to_lowercase()).ok()?;
    let attr = serde_json::to_string(MARKER_ATTRIBUTE).ok()?;
    let token = serde_json::to_string(token).ok()?;

    Some(format!(
        r#"(() => {{
    const needle = {needle};
    const exactOnly = {exact_only};
    const visible = (el) => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
    const label = (el) => (
        el.getAttribute('aria-label') ||
        el.getAttribute('placeholder') ||
        (el.tagName === 'INPUT' ? (el.value || el.getAttribute('name') || el.type) : '') ||
        el.innerText ||
        ''
    ).trim().toLowerCase();
    let best = null;
    let bestScore = 0;
    let bestLength = Infinity;
    for (const el of document.querySelectorAll({scope})) {{
        if (!visible(el)) continue;
        const text = label(el);
        if (!text) continue;
        let score = 0;
        if (text === needle) score = 3;
        else if (!exactOnly && text.startsWith(needle)) score = 2;
        else if (!exactOnly && text.includes(needle)) score = 1;
        if (score === 0) continue;
        if (score > bestScore || (score === bestScore && text.length < bestLength)) {{
            best = el;
            bestScore = score;
            bestLength = text.length;
        }}
    }}
    if (!best) return false;
    best.setAttribute({attr}, {token});
    return true;
}})()"#
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_needs_no_script() {
        assert!(marking_script(&Locator::css("textarea"), "t1").is_none());
    }

    #[test]
    fn test_role_script_scopes_to_implicit_elements() {
        let script = marking_script(&Locator::role("button", "Next"), "tok").unwrap();
        assert!(script.contains("input[type=\\\"submit\\\"]"));
        assert!(script.contains("[role=\\\"button\\\"]"));
        assert!(script.contains("\"next\""));
        assert!(script.contains("\"tok\""));
        assert!(script.contains("const exactOnly = true;"));
    }

    #[test]
    fn test_text_script_escapes_needle() {
        let script = marking_script(&Locator::text("Say \"hi\"</script>"), "tok").unwrap();
        assert!(script.contains(r#""say \"hi\"</script>""#));
    }

    #[test]
    fn test_marker_selector() {
        assert_eq!(marker_selector("abc"), "[data-drs-locator=\"abc\"]");
    }
}
