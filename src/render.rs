//! WatchRenderer: the server-rendered `/watch/{token}` and `/embed/{token}`
//! pages. Markup/copy is out of scope (the browser client owns that); what's
//! in scope here is the nonce contract — every inline `<script>`/`<style>`
//! in these templates must carry the nonce `SecurityMiddleware` attached to
//! this request, or the CSP header blocks it.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::LazyLock;
use std::sync::Mutex;
use tera::Tera;

static TEMPLATES: LazyLock<Mutex<Tera>> = LazyLock::new(|| {
    let tera = match Tera::new("templates/**/*.html") {
        Ok(t) => t,
        Err(err) => panic!("failed to parse watch page templates: {err}"),
    };
    Mutex::new(tera)
});

#[derive(Debug, Serialize)]
pub struct WatchPageContext {
    pub title: String,
    pub share_token: String,
    pub requires_password: bool,
    pub password_verified: bool,
    pub download_url: String,
}

/// `</script>` inside interpolated JSON would close the tag early; escaping
/// the slash keeps the payload inert without touching the JSON's meaning.
fn json_for_inline_script<T: Serialize>(value: &T) -> Result<String> {
    let raw = serde_json::to_string(value).context("serialize inline script payload")?;
    Ok(raw.replace("</", "<\\/"))
}

pub fn render_watch(nonce: &str, ctx: &WatchPageContext) -> Result<String> {
    let mut tera_ctx = tera::Context::new();
    tera_ctx.insert("nonce", nonce);
    tera_ctx.insert("title", &ctx.title);
    tera_ctx.insert("share_token", &ctx.share_token);
    tera_ctx.insert("requires_password", &ctx.requires_password);
    tera_ctx.insert("password_verified", &ctx.password_verified);
    tera_ctx.insert("download_url", &ctx.download_url);
    tera_ctx.insert("video_json", &json_for_inline_script(ctx)?);

    let templates = TEMPLATES.lock().expect("templates mutex poisoned");
    templates
        .render("watch.html", &tera_ctx)
        .context("render watch.html")
}

pub fn render_embed(nonce: &str, ctx: &WatchPageContext) -> Result<String> {
    let mut tera_ctx = tera::Context::new();
    tera_ctx.insert("nonce", nonce);
    tera_ctx.insert("title", &ctx.title);
    tera_ctx.insert("download_url", &ctx.download_url);
    tera_ctx.insert("video_json", &json_for_inline_script(ctx)?);

    let templates = TEMPLATES.lock().expect("templates mutex poisoned");
    templates
        .render("embed.html", &tera_ctx)
        .context("render embed.html")
}

/// Used by the HTML `/watch` and `/embed` routes so "not found"/"expired"
/// reach the browser as a page, not a JSON error body — §6 calls for
/// "410 expired HTML" distinct from the JSON API's error shape.
pub fn render_watch_error(title: &str, message: &str) -> Result<String> {
    let mut tera_ctx = tera::Context::new();
    tera_ctx.insert("title", title);
    tera_ctx.insert("message", message);

    let templates = TEMPLATES.lock().expect("templates mutex poisoned");
    templates
        .render("watch_error.html", &tera_ctx)
        .context("render watch_error.html")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_script_closing_tag_in_json() {
        #[derive(Serialize)]
        struct Payload {
            title: String,
        }
        let json = json_for_inline_script(&Payload {
            title: "</script><script>alert(1)".to_string(),
        })
        .unwrap();
        assert!(!json.contains("</script>"));
    }
}
