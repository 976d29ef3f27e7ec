//! Closure adapters for handler traits.
//!
//! ```rust,ignore
//! bindings.on_url_add(hook_fn(|ctx, event, next| Box::pin(async move {
//!     ctx.info("url added");
//!     next.run(event).await;
//!     Ok(())
//! })));
//! ```

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::api::context::PluginContext;
use crate::cron::CronHandler;
use crate::error::HandlerError;
use crate::hooks::definitions::HookEvent;
use crate::hooks::dispatcher::Next;
use crate::hooks::registry::HookHandler;
use crate::migration::MigrationStep;
use crate::routes::{RouteHandler, RouteRequest, RouteResponse};

/// Hook handler built from a closure.
pub struct HookFn<F>(F);

/// Wraps a closure as a [`HookHandler`].
pub fn hook_fn<F>(f: F) -> HookFn<F>
where
    F: for<'a> Fn(&'a PluginContext, &'a mut HookEvent, Next<'a>) -> BoxFuture<'a, Result<(), HandlerError>>
        + Send
        + Sync
        + 'static,
{
    HookFn(f)
}

#[async_trait]
impl<F> HookHandler for HookFn<F>
where
    F: for<'a> Fn(&'a PluginContext, &'a mut HookEvent, Next<'a>) -> BoxFuture<'a, Result<(), HandlerError>>
        + Send
        + Sync,
{
    async fn handle(
        &self,
        ctx: &PluginContext,
        event: &mut HookEvent,
        next: Next<'_>,
    ) -> Result<(), HandlerError> {
        (self.0)(ctx, event, next).await
    }
}

/// Route handler built from a closure.
pub struct RouteFn<F>(F);

/// Wraps a closure as a [`RouteHandler`].
pub fn route_fn<F>(f: F) -> RouteFn<F>
where
    F: for<'a> Fn(&'a PluginContext, RouteRequest) -> BoxFuture<'a, Result<RouteResponse, HandlerError>>
        + Send
        + Sync
        + 'static,
{
    RouteFn(f)
}

#[async_trait]
impl<F> RouteHandler for RouteFn<F>
where
    F: for<'a> Fn(&'a PluginContext, RouteRequest) -> BoxFuture<'a, Result<RouteResponse, HandlerError>>
        + Send
        + Sync,
{
    async fn handle(
        &self,
        ctx: &PluginContext,
        request: RouteRequest,
    ) -> Result<RouteResponse, HandlerError> {
        (self.0)(ctx, request).await
    }
}

/// Cron job or migration step built from a closure.
pub struct TaskFn<F>(F);

/// Wraps a closure as a [`CronHandler`].
pub fn cron_fn<F>(f: F) -> TaskFn<F>
where
    F: for<'a> Fn(&'a PluginContext) -> BoxFuture<'a, Result<(), HandlerError>>
        + Send
        + Sync
        + 'static,
{
    TaskFn(f)
}

/// Wraps a closure as a [`MigrationStep`].
pub fn migration_fn<F>(f: F) -> TaskFn<F>
where
    F: for<'a> Fn(&'a PluginContext) -> BoxFuture<'a, Result<(), HandlerError>>
        + Send
        + Sync
        + 'static,
{
    TaskFn(f)
}

#[async_trait]
impl<F> CronHandler for TaskFn<F>
where
    F: for<'a> Fn(&'a PluginContext) -> BoxFuture<'a, Result<(), HandlerError>> + Send + Sync,
{
    async fn run(&self, ctx: &PluginContext) -> Result<(), HandlerError> {
        (self.0)(ctx).await
    }
}

#[async_trait]
impl<F> MigrationStep for TaskFn<F>
where
    F: for<'a> Fn(&'a PluginContext) -> BoxFuture<'a, Result<(), HandlerError>> + Send + Sync,
{
    async fn run(&self, ctx: &PluginContext) -> Result<(), HandlerError> {
        (self.0)(ctx).await
    }
}
