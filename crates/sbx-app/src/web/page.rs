use minijinja::{Environment, context};
use sbx_core::GenerationDefaults;

pub const TITLE: &str = "ComfyUI Image Generator";

const TEMPLATE_NAME: &str = "page.html";
const TEMPLATE: &str = include_str!("page.html");

#[derive(Debug, Default)]
pub struct Page<'a> {
    pub prompt: &'a str,
    /// Public path from the artifact store; emitted unescaped.
    pub image_path: Option<&'a str>,
    pub error: Option<&'a str>,
}

/// Renders the form page. The `.html` template name turns on auto-escaping
/// for everything except `image_path`.
pub fn render(page: &Page<'_>, defaults: &GenerationDefaults) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template(TEMPLATE_NAME, TEMPLATE)?;

    env.get_template(TEMPLATE_NAME)?.render(context! {
        title => TITLE,
        prompt => page.prompt,
        image_path => page.image_path,
        error => page.error,
        defaults => defaults,
    })
}
