use serde::{Deserialize, Serialize};
use squehub::prelude::*;

/// Users live in the visitor's session to keep the sample self-contained
const USERS_KEY: &str = "users";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: usize,
    name: String,
    email: String,
}

pub fn controller() -> Controller {
    Controller::new("Users")
        .action("index", index)
        .action("store", store)
        .action("show", show)
}

fn load_users(ctx: &Context) -> Vec<User> {
    ctx.session_get(USERS_KEY).unwrap_or_default()
}

fn index(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let users = load_users(ctx);
        let current: Option<String> = ctx.session_get("user");
        ctx.view(
            "users.index",
            json!({
                "title": "Users",
                "users": users,
                "current": current,
            }),
        )
    })
}

fn store(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let name = ctx.form_value("name").unwrap_or_default().trim().to_string();
        let email = ctx.form_value("email").unwrap_or_default().trim().to_string();

        if name.is_empty() || !email.contains('@') {
            ctx.notify("error", "A name and a valid e-mail address are required.")?;
            return ctx.redirect("/users");
        }

        let mut users = load_users(ctx);
        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        users.push(User { id, name: name.clone(), email });
        ctx.session_set(USERS_KEY, &users)?;

        log::info!("Created user {} ({})", id, name);
        ctx.notify("success", format!("User {} created.", name))?;
        ctx.redirect("/users")
    })
}

fn show(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let id: usize = match ctx.param(0).and_then(|id| id.parse().ok()) {
            Some(id) => id,
            None => return ctx.throw400(Some("Invalid user id")),
        };

        let user = load_users(ctx).into_iter().find(|u| u.id == id);
        match user {
            Some(user) => ctx.view("users.show", json!({ "title": user.name, "user": user })),
            None => ctx.throw404(Some("User not found")),
        }
    })
}
