//! Demo form: a page embedding the challenge and the protected submit handler.

use axum::{
    body::Bytes,
    http::{StatusCode, header},
    response::{Html, IntoResponse},
    Json,
};
use serde_json::{Value, json};

use hoptcha::tags;

/// Form page
pub async fn index() -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Hoptcha demo</title>
  {script}
</head>
<body>
  <form id="demo-form">
    <input id="name" name="name" placeholder="Your name">
    <button type="submit">Submit</button>
  </form>
  <p id="result"></p>
  {placeholder}
  <script>
    document.getElementById("demo-form").addEventListener("submit", function (event) {{
      event.preventDefault();
      var result = document.getElementById("result");
      hoptchaPost("/submit/", {{ name: document.getElementById("name").value }},
        function (data) {{
          document.getElementById("hoptcha-container").replaceChildren();
          result.textContent = data.success;
        }},
        function (error) {{ result.textContent = error; }});
    }});
  </script>
</body>
</html>"#,
        script = tags::client_script(None),
        placeholder = tags::captcha_placeholder(),
    ))
}

/// Bundled browser client
pub async fn client_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        tags::CLIENT_SCRIPT,
    )
}

/// Protected handler: greets `name` from a JSON body
pub async fn submit(body: Bytes) -> (StatusCode, Json<Value>) {
    let data: Value = match serde_json::from_slice(&body) {
        Ok(data) => data,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    let name = data.get("name").and_then(Value::as_str).unwrap_or_default();
    if name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Name is required." })),
        );
    }

    (StatusCode::OK, Json(json!({ "success": format!("Hello, {name}!") })))
}
