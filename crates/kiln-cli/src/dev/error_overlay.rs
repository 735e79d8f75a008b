//! Error overlay shown in the browser when a rebuild fails.
//!
//! The page loads the HMR client, so it reloads itself as soon as the next
//! build succeeds.

use crate::dev::server::HMR_CLIENT_PATH;

/// Generate an HTML error page for `error`.
///
/// The message is HTML-escaped; nothing from it is ever executed.
pub fn generate_error_overlay(error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Build failed</title>
  <style>
    body {{ margin: 0; background: #1b1b1f; color: #e8e8ea; font: 14px/1.5 ui-monospace, SFMono-Regular, Menlo, monospace; }}
    main {{ max-width: 960px; margin: 48px auto; padding: 0 24px; }}
    h1 {{ color: #ff6b6b; font-size: 18px; }}
    pre {{ white-space: pre-wrap; background: #26262c; padding: 16px; border-radius: 6px; border-left: 4px solid #ff6b6b; }}
    p {{ color: #9a9aa3; }}
  </style>
</head>
<body>
  <main>
    <h1>Build failed</h1>
    <pre id="kiln-error">{}</pre>
    <p>Fix the error and save; this page reloads when the next build succeeds.</p>
  </main>
  <script src="{}"></script>
</body>
</html>
"#,
        html_escape(error),
        HMR_CLIENT_PATH
    )
}

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape_ampersand() {
        assert_eq!(html_escape("a & b"), "a &amp; b");
    }

    #[test]
    fn test_html_escape_script_tag() {
        assert_eq!(
            html_escape("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_overlay_escapes_error_and_loads_client() {
        let html = generate_error_overlay("cannot resolve '<App>' imported from src/main.js");
        assert!(html.contains("cannot resolve &#x27;&lt;App&gt;&#x27;"));
        assert!(!html.contains("<App>"));
        assert!(html.contains(r#"<script src="/__kiln_hmr.js"></script>"#));
    }
}
