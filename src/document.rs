//! # HTML Document Output
//!
//! Wraps a bundled module in a self-contained page for the preview iframe.
//!
//! ## Layout
//!
//! 1. A bootstrap script installs `window.__modelBridge`, a request/response
//!    channel to the host page over `postMessage`.
//! 2. A module script imports the bundle through a Blob URL and renders its
//!    default export into `#root` with `react-dom/client`.
//! 3. A loading state occupies `#root` until the first render; any error
//!    replaces it with an error panel.

use crate::validate::{CompilerError, ERR_DOCUMENT};
use lazy_static::lazy_static;
use regex::Regex;

pub const DEFAULT_COMPONENT_NAME: &str = "App";

lazy_static! {
    static ref COMPONENT_NAME_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"export\s+default\s+function\s+([A-Z][a-zA-Z0-9]*)").unwrap(),
        Regex::new(r"export\s+default\s+([A-Z][a-zA-Z0-9]*)").unwrap(),
        Regex::new(r"const\s+([A-Z][a-zA-Z0-9]*)\s*[:=].*=>").unwrap(),
        Regex::new(r"function\s+([A-Z][a-zA-Z0-9]*)\s*\(").unwrap(),
    ];
}

/// Name of the exported component, for the document title.
pub fn detect_component_name(source: &str) -> String {
    COMPONENT_NAME_PATTERNS
        .iter()
        .find_map(|re| re.captures(source).map(|c| c[1].to_string()))
        .unwrap_or_else(|| DEFAULT_COMPONENT_NAME.to_string())
}

/// Escape `code` for embedding inside a JS template literal in an inline
/// `<script>`. Backslashes go first.
pub fn escape_for_template_literal(code: &str) -> String {
    code.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
        .replace("</script", "<\\/script")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Installed before the component loads. The host answers each request with a
/// `model-bridge:response` message carrying the same id.
pub const BRIDGE_SCRIPT: &str = r#"(function () {
  var pending = new Map();
  var nextId = 0;
  window.addEventListener('message', function (event) {
    var data = event.data;
    if (!data || data.type !== 'model-bridge:response' || !pending.has(data.id)) return;
    var entry = pending.get(data.id);
    pending.delete(data.id);
    if (data.error) entry.reject(new Error(data.error));
    else entry.resolve(data.payload);
  });
  window.__modelBridge = {
    request: function (payload) {
      var id = 'req-' + (++nextId);
      return new Promise(function (resolve, reject) {
        pending.set(id, { resolve: resolve, reject: reject });
        window.parent.postMessage({ type: 'model-bridge:request', id: id, payload: payload }, '*');
      });
    }
  };
})();"#;

const STYLES: &str = r#"body { margin: 0; font-family: system-ui, sans-serif; }
    .loading { display: flex; align-items: center; justify-content: center; min-height: 100vh; background: linear-gradient(135deg, #f3f4f6, #e5e7eb); }
    .error { display: flex; align-items: center; justify-content: center; min-height: 100vh; background: #fef2f2; }
    .error pre { max-width: 80vw; overflow: auto; }"#;

pub fn render_document(
    compiled_js: &str,
    component_name: &str,
    react_version: &str,
) -> Result<String, CompilerError> {
    if compiled_js.trim().is_empty() {
        return Err(CompilerError::unlocated(
            ERR_DOCUMENT,
            "Bundled module is empty",
            component_name,
        ));
    }

    let escaped = escape_for_template_literal(compiled_js);
    let title = escape_html(component_name);

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
  <script src="https://cdn.tailwindcss.com"></script>
  <style>
    {styles}
  </style>
  <script>
{bridge}
  </script>
</head>
<body>
  <div id="root">
    <div class="loading"><p>Loading…</p></div>
  </div>
  <script type="module">
    function showError(error) {{
      const root = document.getElementById('root');
      root.innerHTML = '';
      const panel = document.createElement('div');
      panel.className = 'error';
      const body = document.createElement('div');
      const heading = document.createElement('h1');
      heading.textContent = 'Failed to load component';
      const message = document.createElement('p');
      message.textContent = (error && error.message) || 'Unknown error';
      const details = document.createElement('pre');
      details.textContent = (error && error.stack) || '';
      body.append(heading, message, details);
      panel.append(body);
      root.append(panel);
    }}
    window.addEventListener('error', (e) => showError(e.error));
    window.addEventListener('unhandledrejection', (e) => showError(e.reason));

    async function loadApp() {{
      const moduleCode = `{escaped}`;
      const blob = new Blob([moduleCode], {{ type: 'application/javascript' }});
      const moduleUrl = URL.createObjectURL(blob);
      let module;
      try {{
        module = await import(moduleUrl);
      }} finally {{
        URL.revokeObjectURL(moduleUrl);
      }}
      const Component = module.default;
      if (!Component) {{
        throw new Error('No default export found in {title}');
      }}
      const React = await import('https://esm.sh/react@{react}');
      const {{ createRoot }} = await import('https://esm.sh/react-dom@{react}/client');
      createRoot(document.getElementById('root')).render(React.createElement(Component));
    }}

    loadApp().catch(showError);
  </script>
</body>
</html>
"#,
        title = title,
        styles = STYLES,
        bridge = BRIDGE_SCRIPT,
        escaped = escaped,
        react = react_version,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_component_name() {
        assert_eq!(detect_component_name("export default function Counter() {}"), "Counter");
        assert_eq!(detect_component_name("const Board = () => null;\nexport default Board;"), "Board");
        assert_eq!(detect_component_name("const Card = (p) => <div/>;"), "Card");
        assert_eq!(detect_component_name("function Widget() {}"), "Widget");
        assert_eq!(detect_component_name("export default () => null;"), "App");
    }

    #[test]
    fn test_escape_order() {
        assert_eq!(escape_for_template_literal(r"a\`b"), r"a\\\`b");
        assert_eq!(escape_for_template_literal("x${y}"), "x\\${y}");
        assert_eq!(escape_for_template_literal("'</script>'"), "'<\\/script>'");
    }

    #[test]
    fn test_render_document() {
        let html = render_document("export default function A(){return `${1}`}", "A", "18.2.0").unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>A</title>"));
        assert!(html.contains("window.__modelBridge"));
        assert!(html.contains("model-bridge:request"));
        assert!(html.contains("model-bridge:response"));
        assert!(html.contains("return \\`\\${1}\\`"));
        assert!(html.contains("https://esm.sh/react-dom@18.2.0/client"));
    }

    #[test]
    fn test_render_document_rejects_empty_bundle() {
        let err = render_document("  ", "App", "18.2.0").unwrap_err();
        assert_eq!(err.code, ERR_DOCUMENT);
    }
}
