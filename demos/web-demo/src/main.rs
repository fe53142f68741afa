//! Kestrel Web 示例
//!
//! 运行：`cargo run -p web-demo`，然后访问 http://127.0.0.1:8080/

mod controllers;
mod middleware;
mod routes;

use kestrel_core::prelude::*;
use kestrel_web::prelude::*;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = Environment::load(Some(Path::new("application.toml")))?;
    LoggingConfig::from_environment(&env).init()?;

    tracing::info!("Starting web demo");

    let components = Arc::new(ComponentRegistry::new());
    let templates =
        TemplateEngine::from_environment(&env).context("Failed to load templates")?;
    components.register_instance(templates);
    components.register_default::<controllers::UserDirectory>(Scope::Singleton);

    let upload = UploadProperties::from_environment(&env);
    let routes = routes::build(&upload).context("Failed to register routes")?;

    let kernel = Kernel::new(routes)
        .with_middleware(MiddlewareRegistry::from_inventory())
        .with_controllers(ControllerRegistry::from_inventory())
        .with_components(components);

    KestrelWebServer::new(kernel, ServerProperties::from_environment(&env))
        .with_upload(upload)
        .run()
        .await?;

    Ok(())
}
