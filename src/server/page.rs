use crate::server::api::ProfileResponse;

const INDEX_TEMPLATE: &str = include_str!("../../assets/index.html");

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// JSON that is safe to embed inside a `<script>` element.
fn script_json(profile: &ProfileResponse) -> String {
    serde_json::to_string(profile)
        .unwrap_or_else(|_| "{}".to_string())
        .replace("</", "<\\/")
}

pub fn render_index(profile: &ProfileResponse) -> String {
    INDEX_TEMPLATE
        .replace("{{TITLE}}", &escape_html(&profile.title))
        .replace("{{PROFILE_JSON}}", &script_json(profile))
}
