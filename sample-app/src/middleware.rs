use async_trait::async_trait;
use squehub::prelude::*;

/// Redirects visitors without a signed-in user to the login page
pub struct AuthMiddleware {
    login_path: &'static str,
}

impl AuthMiddleware {
    pub fn new(login_path: &'static str) -> Self {
        Self { login_path }
    }
}

#[async_trait]
impl InboundMiddleware for AuthMiddleware {
    async fn process_request(&self, ctx: &mut Context) -> Result<InboundAction> {
        if ctx.session_get::<String>("user").is_some() {
            return Ok(InboundAction::Continue);
        }

        log::debug!("Anonymous request to {}, redirecting", ctx.path());
        if ctx.has_session() {
            ctx.notify("error", "Please sign in first.")?;
        }
        ctx.redirect(self.login_path)?;
        Ok(InboundAction::Stop)
    }

    fn name(&self) -> &'static str {
        "auth"
    }
}
