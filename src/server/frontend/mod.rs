pub mod routes;

use axum::http::StatusCode;
use axum::response::Html;
use rust_embed::RustEmbed;
use tera::Tera;

#[derive(RustEmbed)]
#[folder = "static/"]
pub struct StaticAssets;

/// Render an embedded tera template with the given context
pub fn render_template(
    name: &str,
    context: &tera::Context,
) -> Result<Html<String>, (StatusCode, String)> {
    let template_content = StaticAssets::get(name)
        .ok_or_else(|| {
            tracing::error!("{} template not found", name);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Template not found".to_string(),
            )
        })?
        .data;

    let template_str = std::str::from_utf8(&template_content).map_err(|e| {
        tracing::error!("Failed to parse template as UTF-8: {:#}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Template encoding error".to_string(),
        )
    })?;

    let mut tera = Tera::default();
    tera.add_raw_template(name, template_str).map_err(|e| {
        tracing::error!("Failed to parse template: {:#}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Template error".to_string(),
        )
    })?;

    let html = tera.render(name, context).map_err(|e| {
        tracing::error!("Failed to render template: {:#}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Template rendering error".to_string(),
        )
    })?;

    Ok(Html(html))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_assets_embedded() {
        // Verify critical templates are embedded
        assert!(
            StaticAssets::get("index.html.tera").is_some(),
            "index.html.tera should be embedded"
        );
        assert!(
            StaticAssets::get("auth-login.html.tera").is_some(),
            "auth-login.html.tera should be embedded"
        );
        assert!(
            StaticAssets::get("auth-handover.html.tera").is_some(),
            "auth-handover.html.tera should be embedded"
        );
    }

    #[test]
    fn test_render_login_template_shows_error() {
        let mut context = tera::Context::new();
        context.insert("error", &Some("auth_failed".to_string()));
        context.insert("native", &false);
        let html = render_template("auth-login.html.tera", &context).unwrap();
        assert!(html.0.contains("Sign-in was cancelled"));

        // Unrecognized error codes are shown verbatim
        let mut context = tera::Context::new();
        context.insert("error", &Some("mystery_error".to_string()));
        context.insert("native", &true);
        let html = render_template("auth-login.html.tera", &context).unwrap();
        assert!(html.0.contains("mystery_error"));
        assert!(html.0.contains("/auth/login/google?source=app"));
    }
}
