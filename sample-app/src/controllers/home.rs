use squehub::prelude::*;

pub fn controller() -> Controller {
    Controller::new("Home")
        .action("index", index)
        .action("login", login)
        .action("logout", logout)
}

fn index(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let user: Option<String> = ctx.session_get("user");
        ctx.view(
            "home",
            json!({
                "title": "Welcome",
                "user": user,
                "features": ["Layouts", "Sections", "Named routes", "Middleware"],
            }),
        )
    })
}

fn login(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        if ctx.req.method != "POST" {
            return ctx.view("login", json!({ "title": "Sign in" }));
        }

        let name = ctx.form_value("name").unwrap_or_default();
        let name = name.trim();
        if name.is_empty() {
            ctx.notify("error", "Please enter a name.")?;
            return ctx.redirect("/login");
        }

        ctx.session_set("user", name)?;
        ctx.notify("success", format!("Welcome back, {}!", name))?;
        let target = ctx.url("users.index", &Default::default());
        ctx.redirect(&target)
    })
}

fn logout(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.session_remove("user");
        ctx.notify("info", "You have been signed out.")?;
        ctx.redirect("/")
    })
}
