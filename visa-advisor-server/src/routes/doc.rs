use crate::routes::{api, health, root};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "visa-advisor-server",
    description = "米国ビザ選定アドバイザー API",
    version = "0.1.0"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root_doc = ApiDoc::openapi();
    root_doc.merge(root::RootApi::openapi());
    root_doc.merge(health::HealthApi::openapi());
    root_doc.merge(api::api_docs());
    root_doc
}
