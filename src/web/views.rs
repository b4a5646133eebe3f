use askama::Template;
use askama_web::WebTemplate;

/// The upload form page.
#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub(crate) struct IndexTemplate;
