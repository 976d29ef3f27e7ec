//! Parser for the structured doc-comment header of a plugin unit.
//!
//! ```text
//! /**
//!  * @name url_category
//!  * @display_name URL Category
//!  * @version 1.2.0
//!  * @author urldb
//!  * @category content
//!  * @config
//!  * @field {select} mode Mode "How to categorize" [domain, keyword] @default domain
//!  * @field {string} prefix Prefix "Category prefix" @optional
//!  * @config
//!  */
//! ```

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::{ConfigFieldDescriptor, ConfigSchema, ConfigValue, FieldType};
use crate::error::LoadError;

/// A `cronAdd("name", "expr")` literal found in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledTaskInfo {
    /// Job name.
    pub name: String,
    /// Cron expression as written.
    pub schedule: String,
    /// 1-based line number.
    pub line: usize,
}

/// Everything the header declares.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginMetadata {
    /// Unique slug.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// `x.y` or `x.y.z`.
    pub version: String,
    /// Description.
    pub description: String,
    /// Author.
    pub author: String,
    /// License.
    pub license: String,
    /// Category, `utility` when absent.
    pub category: String,
    /// Declared dependencies.
    pub dependencies: Vec<String>,
    /// Declared permissions.
    pub permissions: Vec<String>,
    /// Declared hooks, informational.
    pub hooks: Vec<String>,
    /// Config schema from `@field` lines.
    pub config_schema: ConfigSchema,
    /// Cron literals found in the text.
    pub scheduled_tasks: Vec<ScheduledTaskInfo>,
}

struct Patterns {
    field: Regex,
    options: Regex,
    quoted_default: Regex,
    bare_default: Regex,
    cron_add: Regex,
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(|| {
    Ok(Patterns {
        field: Regex::new(r#"^@field\s+\{([^}]*)\}\s+(\w+)\s*([^"]*?)\s*"([^"]*)"(.*)$"#)?,
        options: Regex::new(r"\[(.*?)\]")?,
        quoted_default: Regex::new(r#"@default\s+"([^"]*)""#)?,
        bare_default: Regex::new(r"@default\s+(\S+)")?,
        cron_add: Regex::new(
            r#"(?:cronAdd|cron_add)\s*\(\s*["']([^"']+)["']\s*,\s*["']([^"']+)["']"#,
        )?,
    })
});

/// Parses plugin headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataParser;

impl MetadataParser {
    /// Creates a parser.
    pub fn new() -> Self {
        Self
    }

    /// Parses `text`; `location` supplies the fallback name.
    pub fn parse(&self, location: &str, text: &str) -> Result<PluginMetadata, LoadError> {
        let patterns = PATTERNS.as_ref().map_err(|e| LoadError::Setup {
            plugin: location.to_string(),
            reason: format!("metadata patterns failed to compile: {e}"),
        })?;

        let mut header = Header::default();
        let mut fields: Vec<(usize, String)> = Vec::new();
        let mut scheduled_tasks = Vec::new();
        let mut config_opened_at: Option<usize> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;

            for caps in patterns.cron_add.captures_iter(raw) {
                scheduled_tasks.push(ScheduledTaskInfo {
                    name: caps[1].to_string(),
                    schedule: caps[2].to_string(),
                    line: line_no,
                });
            }

            let line = strip_comment(raw);
            let Some(tagged) = line.strip_prefix('@') else {
                continue;
            };
            let (tag, rest) = match tagged.split_once(char::is_whitespace) {
                Some((tag, rest)) => (tag, rest.trim()),
                None => (tagged, ""),
            };

            match tag {
                "config" => {
                    config_opened_at = match config_opened_at {
                        Some(_) => None,
                        None => Some(line_no),
                    };
                }
                "field" => fields.push((line_no, line.to_string())),
                "name" => header.name = first_token(rest),
                "display_name" => header.display_name = non_empty(rest),
                "version" => header.version = first_token(rest),
                "description" => header.description = non_empty(rest),
                "author" => header.author = non_empty(rest),
                "license" => header.license = non_empty(rest),
                "category" => header.category = first_token(rest),
                "dependencies" => header.dependencies = bracket_list(rest),
                "permissions" => header.permissions = bracket_list(rest),
                "hooks" => header.hooks = bracket_list(rest),
                _ => {}
            }
        }

        let name = match header.name {
            Some(name) => name,
            None => name_from_location(location).ok_or_else(|| LoadError::MissingName {
                location: location.to_string(),
            })?,
        };
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(LoadError::InvalidName { name });
        }

        if config_opened_at.is_some() {
            return Err(LoadError::UnterminatedConfig { plugin: name });
        }

        let version = header.version.unwrap_or_else(|| "1.0.0".to_string());
        if !is_valid_version(&version) {
            return Err(LoadError::InvalidVersion {
                plugin: name,
                version,
            });
        }

        let mut seen = HashSet::new();
        let mut descriptors = Vec::with_capacity(fields.len());
        for (line_no, line) in &fields {
            let field = parse_field(patterns, &name, *line_no, line)?;
            if !seen.insert(field.key.clone()) {
                return Err(LoadError::DuplicateField {
                    plugin: name,
                    key: field.key,
                });
            }
            descriptors.push(field);
        }

        Ok(PluginMetadata {
            display_name: header.display_name.unwrap_or_else(|| name.clone()),
            version,
            description: header.description.unwrap_or_default(),
            author: header.author.unwrap_or_default(),
            license: header.license.unwrap_or_default(),
            category: header.category.unwrap_or_else(|| "utility".to_string()),
            dependencies: header.dependencies,
            permissions: header.permissions,
            hooks: header.hooks,
            config_schema: ConfigSchema::new(descriptors),
            scheduled_tasks,
            name,
        })
    }
}

#[derive(Default)]
struct Header {
    name: Option<String>,
    display_name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    author: Option<String>,
    license: Option<String>,
    category: Option<String>,
    dependencies: Vec<String>,
    permissions: Vec<String>,
    hooks: Vec<String>,
}

fn strip_comment(raw: &str) -> &str {
    let mut line = raw.trim();
    for prefix in ["/**", "/*", "//!", "///", "//", "*"] {
        if let Some(rest) = line.strip_prefix(prefix) {
            line = rest;
            break;
        }
    }
    line.trim_end_matches("*/").trim()
}

fn first_token(rest: &str) -> Option<String> {
    rest.split_whitespace().next().map(str::to_string)
}

fn non_empty(rest: &str) -> Option<String> {
    (!rest.is_empty()).then(|| rest.to_string())
}

fn bracket_list(rest: &str) -> Vec<String> {
    let inner = rest
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    split_list(inner)
}

fn split_list(inner: &str) -> Vec<String> {
    inner
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn name_from_location(location: &str) -> Option<String> {
    let file = location.rsplit(['/', '\\']).next()?;
    let stem = match file.find(".plugin.") {
        Some(idx) => &file[..idx],
        None => file.rsplit_once('.').map_or(file, |(stem, _)| stem),
    };
    (!stem.is_empty()).then(|| stem.to_string())
}

fn is_valid_version(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    (2..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn parse_field(
    patterns: &Patterns,
    plugin: &str,
    line_no: usize,
    line: &str,
) -> Result<ConfigFieldDescriptor, LoadError> {
    let malformed = |reason: String| LoadError::MalformedField {
        plugin: plugin.to_string(),
        line: line_no,
        reason,
    };

    let caps = patterns.field.captures(line).ok_or_else(|| {
        malformed(r#"expected `@field {type} key Label "description"`"#.to_string())
    })?;

    let type_name = caps[1].trim();
    let field_type = FieldType::parse(type_name)
        .ok_or_else(|| malformed(format!("unknown field type '{type_name}'")))?;
    let key = caps[2].to_string();
    let label = match caps[3].trim() {
        "" => key.clone(),
        label => label.to_string(),
    };
    let description = caps[4].to_string();
    let remaining = &caps[5];

    let default_raw = patterns
        .quoted_default
        .captures(remaining)
        .or_else(|| patterns.bare_default.captures(remaining))
        .map(|c| c[1].trim().to_string());

    let options = if field_type == FieldType::Select {
        let before_default = remaining.split("@default").next().unwrap_or(remaining);
        let options = patterns
            .options
            .captures(before_default)
            .map(|c| split_list(&c[1]))
            .unwrap_or_default();
        if options.is_empty() {
            return Err(malformed(format!("select field '{key}' declares no [options]")));
        }
        options
    } else {
        Vec::new()
    };

    let default_value = match default_raw {
        Some(raw) => Some(convert_default(field_type, &raw, &options).map_err(malformed)?),
        None if field_type == FieldType::Select => {
            options.first().map(|o| ConfigValue::Enum(o.clone()))
        }
        None => None,
    };

    Ok(ConfigFieldDescriptor {
        key,
        field_type,
        label,
        description,
        default_value,
        optional: remaining.contains("@optional"),
        options,
    })
}

fn convert_default(
    field_type: FieldType,
    raw: &str,
    options: &[String],
) -> Result<ConfigValue, String> {
    match field_type {
        FieldType::String | FieldType::Text => Ok(ConfigValue::String(raw.to_string())),
        FieldType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(ConfigValue::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(ConfigValue::Bool(false)),
            _ => Err(format!("'{raw}' is not a boolean default")),
        },
        FieldType::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(ConfigValue::Number)
            .ok_or_else(|| format!("'{raw}' is not a numeric default")),
        FieldType::Select => {
            if options.iter().any(|o| o == raw) {
                Ok(ConfigValue::Enum(raw.to_string()))
            } else {
                Err(format!("default '{raw}' is not one of the options"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"/**
 * @name url_category
 * @display_name URL Category
 * @version 1.2
 * @author urldb team
 * @category content
 * @license MIT
 * @hooks [onURLAdd, onURLUpdate]
 * @config
 * @field {select} mode Match mode "How categories are chosen" [domain, keyword] @default keyword
 * @field {boolean} overwrite Overwrite "Replace existing categories" @default yes
 * @field {number} max_tags Max tags "Upper bound" @default 5 @optional
 * @field {string} api_key API key "Lookup service key"
 * @config
 */
cronAdd("refresh", "0 */6 * * *")
"#;

    #[test]
    fn test_parses_full_header() {
        let meta = MetadataParser::new()
            .parse("plugins/url_category.plugin.rs", HEADER)
            .unwrap();
        assert_eq!(meta.name, "url_category");
        assert_eq!(meta.display_name, "URL Category");
        assert_eq!(meta.version, "1.2");
        assert_eq!(meta.category, "content");
        assert_eq!(meta.hooks, vec!["onURLAdd", "onURLUpdate"]);

        let fields = meta.config_schema.fields();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].options, vec!["domain", "keyword"]);
        assert_eq!(fields[0].default_value, Some(ConfigValue::Enum("keyword".into())));
        assert_eq!(fields[1].default_value, Some(ConfigValue::Bool(true)));
        assert!(fields[2].optional);
        assert_eq!(fields[2].label, "Max tags");
        assert_eq!(fields[3].default_value, None);
        assert!(!fields[3].optional);

        assert_eq!(
            meta.scheduled_tasks,
            vec![ScheduledTaskInfo {
                name: "refresh".into(),
                schedule: "0 */6 * * *".into(),
                line: 16,
            }]
        );
    }

    #[test]
    fn test_defaults_and_name_fallback() {
        let meta = MetadataParser::new()
            .parse("plugins/hello.plugin.js", "// just code")
            .unwrap();
        assert_eq!(meta.name, "hello");
        assert_eq!(meta.display_name, "hello");
        assert_eq!(meta.version, "1.0.0");
        assert_eq!(meta.category, "utility");
        assert!(meta.config_schema.is_empty());
    }

    #[test]
    fn test_select_without_default_takes_first_option() {
        let text = "// @field {select} level Level \"Verbosity\" [low, high]";
        let meta = MetadataParser::new().parse("x.rs", text).unwrap();
        assert_eq!(
            meta.config_schema.fields()[0].default_value,
            Some(ConfigValue::Enum("low".into()))
        );
    }

    #[test]
    fn test_malformed_field_reports_line() {
        let text = "// @name p\n// @config\n// @field {colour} c C \"d\"\n// @config";
        match MetadataParser::new().parse("p.rs", text) {
            Err(LoadError::MalformedField { line, plugin, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(plugin, "p");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let bad_default = "// @name p\n// @field {number} n N \"d\" @default lots";
        assert!(matches!(
            MetadataParser::new().parse("p.rs", bad_default),
            Err(LoadError::MalformedField { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_version_duplicate_key_and_open_block() {
        let parser = MetadataParser::new();
        assert!(matches!(
            parser.parse("p.rs", "// @name p\n// @version one.two"),
            Err(LoadError::InvalidVersion { .. })
        ));
        assert!(matches!(
            parser.parse(
                "p.rs",
                "// @name p\n// @field {string} a A \"x\"\n// @field {text} a A \"y\""
            ),
            Err(LoadError::DuplicateField { .. })
        ));
        assert!(matches!(
            parser.parse("p.rs", "// @name p\n// @config"),
            Err(LoadError::UnterminatedConfig { .. })
        ));
        assert!(matches!(
            parser.parse("p.rs", "// @name b@d"),
            Err(LoadError::InvalidName { .. })
        ));
    }
}
