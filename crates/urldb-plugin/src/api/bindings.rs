//! Load-time capability bindings.
//!
//! `PluginScript::setup` receives a fresh `PluginBindings` tagged with the
//! plugin's name and declares everything it provides. Nothing touches the
//! live registries here; the manager installs the recorded declarations
//! when the plugin is enabled and can re-install them without re-running
//! `setup`.

use std::sync::Arc;

use super::context::PluginContext;
use crate::cron::{CronHandler, CronJobSpec, CronScheduler};
use crate::error::{LoadError, ScheduleParseError};
use crate::hooks::definitions::HookPoint;
use crate::hooks::registry::HookHandler;
use crate::migration::{Migration, MigrationStep};
use crate::routes::pattern::normalize_method;
use crate::routes::{RouteHandler, RoutePattern};

/// A recorded hook subscription.
#[derive(Clone)]
pub struct HookDecl {
    /// Event type.
    pub hook: HookPoint,
    /// Index among this plugin's subscriptions.
    pub declaration: u32,
    /// Handler.
    pub handler: Arc<dyn HookHandler>,
}

/// A recorded route.
#[derive(Clone)]
pub struct RouteDecl {
    /// Upper-case method.
    pub method: String,
    /// Parsed path.
    pub pattern: RoutePattern,
    /// Handler.
    pub handler: Arc<dyn RouteHandler>,
}

/// Everything one `setup` call declared.
#[derive(Clone, Default)]
pub struct Declarations {
    /// Hook subscriptions in declaration order.
    pub hooks: Vec<HookDecl>,
    /// Routes.
    pub routes: Vec<RouteDecl>,
    /// Cron jobs, unique by name.
    pub cron_jobs: Vec<CronJobSpec>,
    /// Migrations with ids `1..=n`.
    pub migrations: Vec<Migration>,
}

impl std::fmt::Debug for Declarations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Declarations")
            .field("hooks", &self.hooks.len())
            .field("routes", &self.routes.len())
            .field("cron_jobs", &self.cron_jobs.len())
            .field("migrations", &self.migrations.len())
            .finish()
    }
}

/// The binding surface handed to `PluginScript::setup`.
pub struct PluginBindings {
    context: PluginContext,
    declared: Declarations,
    errors: Vec<LoadError>,
}

impl PluginBindings {
    /// Creates empty bindings for the plugin `context` belongs to.
    pub fn new(context: PluginContext) -> Self {
        Self {
            context,
            declared: Declarations::default(),
            errors: Vec::new(),
        }
    }

    /// Name of the plugin being set up.
    pub fn plugin_name(&self) -> &str {
        self.context.plugin_name()
    }

    /// The plugin's runtime context, for reading config or logging in `setup`.
    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    /// Subscribes `handler` to `hook`.
    pub fn on(&mut self, hook: HookPoint, handler: impl HookHandler + 'static) {
        let declaration = self.declared.hooks.len() as u32;
        self.declared.hooks.push(HookDecl {
            hook,
            declaration,
            handler: Arc::new(handler),
        });
    }

    /// `onURLAdd`.
    pub fn on_url_add(&mut self, handler: impl HookHandler + 'static) {
        self.on(HookPoint::UrlAdd, handler);
    }

    /// `onURLAccess`.
    pub fn on_url_access(&mut self, handler: impl HookHandler + 'static) {
        self.on(HookPoint::UrlAccess, handler);
    }

    /// `onURLUpdate`.
    pub fn on_url_update(&mut self, handler: impl HookHandler + 'static) {
        self.on(HookPoint::UrlUpdate, handler);
    }

    /// `onURLDelete`.
    pub fn on_url_delete(&mut self, handler: impl HookHandler + 'static) {
        self.on(HookPoint::UrlDelete, handler);
    }

    /// `onUserLogin`.
    pub fn on_user_login(&mut self, handler: impl HookHandler + 'static) {
        self.on(HookPoint::UserLogin, handler);
    }

    /// `onAPIRequest`.
    pub fn on_api_request(&mut self, handler: impl HookHandler + 'static) {
        self.on(HookPoint::ApiRequest, handler);
    }

    /// `onReadyResourceAdd`.
    pub fn on_ready_resource_add(&mut self, handler: impl HookHandler + 'static) {
        self.on(HookPoint::ReadyResourceAdd, handler);
    }

    /// `routerAdd(method, path, handler)`.
    ///
    /// Declaring the same route twice keeps the later handler. Declaring
    /// two different patterns that can match the same path is an error.
    pub fn router_add(
        &mut self,
        method: &str,
        path: &str,
        handler: impl RouteHandler + 'static,
    ) -> Result<(), LoadError> {
        let route = normalize_method(method)
            .and_then(|m| RoutePattern::parse(path).map(|p| (m, p)))
            .and_then(|(method, pattern)| {
                let clash = self
                    .declared
                    .routes
                    .iter()
                    .position(|r| r.method == method && r.pattern.overlaps(&pattern));
                match clash {
                    Some(idx) if self.declared.routes[idx].pattern.shape() != pattern.shape() => {
                        Err(format!(
                            "overlaps {} declared earlier",
                            self.declared.routes[idx].pattern.as_str()
                        ))
                    }
                    _ => Ok((clash, method, pattern)),
                }
            });

        match route {
            Ok((replace, method, pattern)) => {
                let decl = RouteDecl {
                    method,
                    pattern,
                    handler: Arc::new(handler),
                };
                match replace {
                    Some(idx) => self.declared.routes[idx] = decl,
                    None => self.declared.routes.push(decl),
                }
                Ok(())
            }
            Err(reason) => {
                let error = || LoadError::InvalidRoute {
                    plugin: self.plugin_name().to_string(),
                    method: method.to_string(),
                    path: path.to_string(),
                    reason: reason.clone(),
                };
                let recorded = error();
                let returned = error();
                self.errors.push(recorded);
                Err(returned)
            }
        }
    }

    /// `cronAdd(name, schedule, handler)`.
    ///
    /// The schedule is parsed immediately. A second job with the same name
    /// replaces the first.
    pub fn cron_add(
        &mut self,
        name: &str,
        schedule: &str,
        handler: impl CronHandler + 'static,
    ) -> Result<(), ScheduleParseError> {
        let parsed = match CronScheduler::parse_schedule(self.plugin_name(), name, schedule) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.errors.push(err.clone().into());
                return Err(err);
            }
        };

        let spec = CronJobSpec {
            name: name.to_string(),
            schedule: parsed,
            handler: Arc::new(handler),
        };
        match self.declared.cron_jobs.iter().position(|j| j.name == name) {
            Some(idx) => self.declared.cron_jobs[idx] = spec,
            None => self.declared.cron_jobs.push(spec),
        }
        Ok(())
    }

    /// `migrate(up, down)`. Returns the migration id.
    pub fn migrate(
        &mut self,
        up: impl MigrationStep + 'static,
        down: impl MigrationStep + 'static,
    ) -> u32 {
        let id = self.declared.migrations.len() as u32 + 1;
        self.declared.migrations.push(Migration {
            id,
            up: Arc::new(up),
            down: Arc::new(down),
        });
        id
    }

    /// Consumes the bindings; the first rejected declaration wins.
    pub(crate) fn finish(mut self) -> Result<Declarations, LoadError> {
        if self.errors.is_empty() {
            Ok(self.declared)
        } else {
            Err(self.errors.swap_remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::context::HostServices;
    use crate::routes::RouteResponse;
    use crate::traits::{cron_fn, migration_fn, route_fn};

    fn bindings() -> PluginBindings {
        let host = Arc::new(HostServices::in_memory(std::env::temp_dir()));
        PluginBindings::new(PluginContext::new("links", host))
    }

    fn ok_route() -> impl RouteHandler {
        route_fn(|_ctx, _req| Box::pin(async { Ok(RouteResponse::no_content()) }))
    }

    #[test]
    fn test_same_route_is_replaced() {
        let mut b = bindings();
        b.router_add("get", "/api/links/:id", ok_route()).unwrap();
        b.router_add("GET", "/api/links/:slug", ok_route()).unwrap();
        b.router_add("POST", "/api/links/:id", ok_route()).unwrap();

        let declared = b.finish().unwrap();
        assert_eq!(declared.routes.len(), 2);
        assert_eq!(declared.routes[0].pattern.as_str(), "/api/links/:slug");
    }

    #[test]
    fn test_overlapping_routes_are_rejected() {
        let mut b = bindings();
        b.router_add("GET", "/api/links/:id", ok_route()).unwrap();
        let err = b.router_add("GET", "/api/links/recent", ok_route()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidRoute { .. }));
        assert!(b.finish().is_err());
    }

    #[test]
    fn test_cron_names_replace_and_schedules_are_checked() {
        let mut b = bindings();
        let noop = || cron_fn(|_ctx| Box::pin(async { Ok(()) }));
        b.cron_add("sweep", "*/5 * * * *", noop()).unwrap();
        b.cron_add("sweep", "0 * * * *", noop()).unwrap();
        assert!(b.cron_add("broken", "every tuesday", noop()).is_err());

        assert!(matches!(b.finish(), Err(LoadError::Schedule(_))));
    }

    #[test]
    fn test_migration_ids_follow_declaration_order() {
        let mut b = bindings();
        let step = || migration_fn(|_ctx| Box::pin(async { Ok(()) }));
        assert_eq!(b.migrate(step(), step()), 1);
        assert_eq!(b.migrate(step(), step()), 2);

        let declared = b.finish().unwrap();
        let ids: Vec<u32> = declared.migrations.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
