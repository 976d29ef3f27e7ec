//! Convenience macros for plugin development.

/// Exports a plugin from a `cdylib` crate for the dynamic loader.
///
/// # Example
/// ```rust,ignore
/// const HEADER: &str = "/** @name word_count @version 0.2.0 */";
///
/// #[derive(Default)]
/// struct WordCount;
///
/// impl PluginScript for WordCount { /* ... */ }
///
/// export_plugin!(HEADER, WordCount);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($header:expr, $script:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn urldb_plugin_create() -> *mut $crate::loader::PluginExport {
            let export = $crate::loader::PluginExport::new(
                $header,
                <$script as ::core::default::Default>::default(),
            );
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(export))
        }
    };
}

/// Macro for quickly building a `HookEvent`.
///
/// # Example
/// ```rust,ignore
/// let event = hook_event!(HookPoint::UrlAdd, {
///     "url" => json!({ "id": 1, "url": "https://example.com" }),
///     "source" => json!("import"),
/// });
/// ```
#[macro_export]
macro_rules! hook_event {
    ($hook:expr) => {
        $crate::hooks::definitions::HookEvent::new($hook)
    };
    ($hook:expr, { $($key:expr => $value:expr),* $(,)? }) => {{
        let mut event = $crate::hooks::definitions::HookEvent::new($hook);
        $(
            event.set($key, $value);
        )*
        event
    }};
}
