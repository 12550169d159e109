//! Built-in generators

use super::generator::{GeneratedContent, GeneratorError, GeneratorRequest};

/// Escape text for use in HTML content and attributes
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const LIVE_SCRIPT: &str = r#"<script>
const ws = new WebSocket((location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '/ws');
const cells = new Map();
document.querySelectorAll('td[data-path]').forEach((td) => cells.set(td.dataset.path, td));
ws.onopen = () => ws.send(JSON.stringify({type: 'subscribe', paths: [...cells.keys()]}));
ws.onmessage = (event) => {
  const msg = JSON.parse(event.data);
  if (msg.type === 'change' || msg.type === 'value') {
    const td = cells.get(msg.path);
    if (td) td.textContent = JSON.stringify(msg.value);
  }
};
</script>"#;

/// `index`: table of all watchables, kept current over the WebSocket channel
pub fn index_page(request: &GeneratorRequest) -> Result<GeneratedContent, GeneratorError> {
    let registry = &request.registry;
    let mut rows = String::new();
    for path in registry.paths() {
        let watchable = registry.watchable(&path)?;
        let value = serde_json::to_string(&watchable.get())
            .map_err(|e| GeneratorError::Failed(e.to_string()))?;
        rows.push_str(&format!(
            "<tr><th>{path}</th><td>{kind}</td><td data-path=\"{path}\">{value}</td></tr>\n",
            path = escape_html(&path),
            kind = watchable.kind().name(),
            value = escape_html(&value),
        ));
    }

    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>watchserv</title></head>\n<body>\n\
         <h1>Watchables</h1>\n<table>\n<tr><th>path</th><th>kind</th><th>value</th></tr>\n{rows}</table>\n\
         {script}\n</body>\n</html>\n",
        rows = rows,
        script = LIVE_SCRIPT,
    );
    Ok(GeneratedContent::html(html))
}

/// `values`: JSON snapshot of the tree, or of `?path=` when given
pub fn values_json(request: &GeneratorRequest) -> Result<GeneratedContent, GeneratorError> {
    let path = request.query.get("path").map(String::as_str).unwrap_or("/");
    let snapshot = request.registry.snapshot(path)?;
    GeneratedContent::json(&snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchable::{Kind, Value, WatchRegistry};
    use axum::http::Method;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn request(query: &[(&str, &str)]) -> GeneratorRequest {
        let registry = WatchRegistry::standalone();
        registry
            .register("/app/counter", Kind::int(), Some(Value::Int(3)))
            .unwrap();
        registry
            .register("/app/label", Kind::Text, Some(Value::from("<b>")))
            .unwrap();
        GeneratorRequest {
            path: "/".to_string(),
            method: Method::GET,
            params: HashMap::new(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            registry: Arc::new(registry),
        }
    }

    #[test]
    fn test_index_lists_watchables_escaped() {
        let content = index_page(&request(&[])).unwrap();
        let html = String::from_utf8(content.body).unwrap();
        assert!(html.contains("data-path=\"/app/counter\">3</td>"));
        assert!(html.contains("&quot;&lt;b&gt;&quot;"));
        assert!(!html.contains("\"<b>\""));
    }

    #[test]
    fn test_values_json() {
        let content = values_json(&request(&[])).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&content.body).unwrap();
        assert_eq!(json["app"]["counter"], 3);

        let content = values_json(&request(&[("path", "/app/counter")])).unwrap();
        assert_eq!(content.body, b"3");

        assert!(values_json(&request(&[("path", "/missing")])).is_err());
    }
}
