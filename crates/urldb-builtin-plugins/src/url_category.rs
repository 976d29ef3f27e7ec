//! Assigns a category to new and edited URLs from operator-supplied rules.

use async_trait::async_trait;
use tracing::debug;

use urldb_core::events::UrlRecord;
use urldb_plugin::PluginBindings;
use urldb_plugin::config::PluginConfig;
use urldb_plugin::prelude::*;

/// Header of the built-in `url_category` unit.
pub const HEADER: &str = r#"/**
 * @name url_category
 * @display_name URL Category
 * @description Assigns a category to links as they are added or edited
 * @version 1.2.0
 * @author urldb
 * @category content
 * @license MIT
 * @hooks [onURLAdd, onURLUpdate]
 * @config
 * @field {select} mode Match mode "Match rules against the host or against title and address" [domain, keyword] @default domain
 * @field {boolean} overwrite Overwrite "Replace a category that is already set" @default no
 * @field {text} rules Rules "Comma or newline separated pattern=category pairs" @default "github.com=dev, docs.rs=dev, youtube.com=video"
 * @config
 */"#;

/// Returns the catalogue unit.
pub fn source() -> PluginSource {
    PluginSource::new("builtin/url_category.rs", HEADER, UrlCategoryPlugin)
}

/// Plugin body.
#[derive(Debug, Default)]
pub struct UrlCategoryPlugin;

impl PluginScript for UrlCategoryPlugin {
    fn setup(&self, bindings: &mut PluginBindings) -> Result<(), HandlerError> {
        bindings.on_url_add(CategorizeHook);
        bindings.on_url_update(CategorizeHook);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchMode {
    Domain,
    Keyword,
}

/// A parsed `pattern=category` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    pattern: String,
    category: String,
}

#[derive(Debug)]
struct Settings {
    mode: MatchMode,
    overwrite: bool,
    rules: Vec<Rule>,
}

impl Settings {
    fn from_config(config: &PluginConfig) -> Self {
        let mode = match config.get_str("mode") {
            Some("keyword") => MatchMode::Keyword,
            _ => MatchMode::Domain,
        };
        Self {
            mode,
            overwrite: config.get_bool("overwrite").unwrap_or(false),
            rules: parse_rules(config.get_str("rules").unwrap_or_default()),
        }
    }

    fn categorize(&self, url: &UrlRecord) -> Option<&str> {
        match self.mode {
            MatchMode::Domain => {
                let host = host_of(&url.url)?;
                self.rules
                    .iter()
                    .find(|r| host == r.pattern || host.ends_with(&format!(".{}", r.pattern)))
                    .map(|r| r.category.as_str())
            }
            MatchMode::Keyword => {
                let haystack =
                    format!("{} {} {}", url.title, url.url, url.description).to_lowercase();
                self.rules
                    .iter()
                    .find(|r| haystack.contains(&r.pattern))
                    .map(|r| r.category.as_str())
            }
        }
    }
}

/// Handles `onURLAdd` and `onURLUpdate`.
struct CategorizeHook;

#[async_trait]
impl HookHandler for CategorizeHook {
    async fn handle(
        &self,
        ctx: &PluginContext,
        event: &mut HookEvent,
        next: Next<'_>,
    ) -> Result<(), HandlerError> {
        let config = ctx.config().await?;
        let settings = Settings::from_config(&config);

        if let Some(mut url) = event.url() {
            let already_set = url.category.as_deref().is_some_and(|c| !c.is_empty());
            if !already_set || settings.overwrite {
                if let Some(category) = settings.categorize(&url) {
                    debug!(plugin = %ctx.plugin_name(), key = %url.key, category, "Categorized URL");
                    url.category = Some(category.to_string());
                    event.set_record("url", &url)?;
                }
            }
        }

        next.run(event).await;
        Ok(())
    }
}

fn parse_rules(raw: &str) -> Vec<Rule> {
    raw.split([',', '\n'])
        .filter_map(|pair| {
            let (pattern, category) = pair.split_once('=')?;
            let pattern = pattern.trim().to_lowercase();
            let category = category.trim();
            if pattern.is_empty() || category.is_empty() {
                return None;
            }
            Some(Rule {
                pattern,
                category: category.to_string(),
            })
        })
        .collect()
}

/// Lower-case host of an absolute URL, without a leading `www.`.
fn host_of(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?.split(':').next()?;
    if host.is_empty() {
        return None;
    }
    let host = host.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}
