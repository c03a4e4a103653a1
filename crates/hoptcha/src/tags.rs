//! HTML snippets for pages that embed the challenge.
//!
//! Plain strings, so they drop into any template engine.

use hoptcha_common::constants::assets::{CLIENT_SCRIPT_PATH, CONTAINER_ID};

use crate::settings::Settings;

/// Browser client: posts JSON, renders the challenge iframe on a
/// `{"captcha": true}` reply and retries with the token the iframe sends back.
pub const CLIENT_SCRIPT: &str = include_str!("../assets/hoptcha.js");

/// Element the client script renders the challenge into
pub fn captcha_placeholder() -> String {
    format!(r#"<div id="{}"></div>"#, CONTAINER_ID)
}

/// Inline challenge iframe for `settings`' client key
pub fn captcha_iframe(settings: &Settings) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("client_key", &settings.client_id)
        .finish();
    let src = format!("{}?{}", settings.captcha_url, query);

    format!(
        r#"<iframe id="captcha-iframe" src="{}" data-public-key="{}" style="width: 100%; height: 250px; border: none; border-radius: 12px;"></iframe>"#,
        escape_attr(&src),
        escape_attr(&settings.client_id),
    )
}

/// Script tag loading the client from `path`, or the default static path
pub fn client_script(path: Option<&str>) -> String {
    format!(
        r#"<script src="{}" defer></script>"#,
        escape_attr(path.unwrap_or(CLIENT_SCRIPT_PATH))
    )
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
