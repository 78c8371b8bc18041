mod controllers;
mod middleware;

use squehub::prelude::*;
use std::path::Path;

fn health(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move { ctx.json(json!({"status": "ok"})) })
}

fn not_found(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let path = ctx.path().to_string();
        ctx.view("errors.404", json!({ "path": path }))?;
        ctx.status(StatusCode::NOT_FOUND);
        Ok(())
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let from_file = Path::new("config.toml").exists();
    let config = if from_file {
        AppConfig::from_file("config.toml")?
    } else {
        AppConfig::from_env()?
    };
    config.validate()?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    if from_file {
        log::info!("Loaded configuration from config.toml");
    } else {
        log::info!("Using defaults and SQUEHUB_* environment variables");
    }

    let app = Squehub::with_config(config);
    let app = app
        .middleware_from(|registry| {
            registry.register_inbound("auth", middleware::AuthMiddleware::new("/login"))
        })
        .controllers(|registry| {
            registry.register(controllers::home::controller());
            registry.register(controllers::users::controller());
        })
        .not_found(not_found)
        .routes(|router| {
            router.add(Route::action(&["GET"], "/", "Home#index").name("home"))?;
            router.add(Route::action(&["GET", "POST"], "/login", "Home#login").name("login"))?;
            router.add(Route::action(&["POST"], "/logout", "Home#logout").name("logout"))?;
            router.add(Route::get("/health", health))?;

            router.group(
                GroupAttributes::new().prefix("/users").middleware("auth"),
                |users| {
                    users.add(Route::action(&["GET"], "/", "Users#index").name("users.index"))?;
                    users.add(Route::action(&["POST"], "/", "Users#store").name("users.store"))?;
                    users.add(Route::action(&["GET"], "/{id}", "Users#show").name("users.show"))
                },
            )
        })?;

    app.serve().await?;
    Ok(())
}
