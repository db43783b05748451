// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Logging for loraswap processes.
//!
//! - Configuration loaded from:
//!   1. Environment variables (highest priority).
//!   2. Optional TOML file pointed to by the `LORASWAP_LOGGING_CONFIG_PATH` environment variable.
//!   3. `/etc/loraswap/logging.toml`.
//!
//! Logging can take two forms: `READABLE` or `JSONL`. The default is `READABLE`. `JSONL`
//! can be enabled by setting the `LORASWAP_LOGGING_JSONL` environment variable to `1`.
//!
//! To use local timezone for logging timestamps, set the `LORASWAP_LOG_USE_LOCAL_TZ`
//! environment variable to `1`.
//!
//! Filters can be configured using the `LORASWAP_LOG` environment variable or by setting the
//! `filters` key in the TOML configuration file. Filters are comma-separated key-value pairs
//! where the key is the crate or module name and the value is the log level. The default log
//! level is `info`.
//!
//! Example:
//! ```toml
//! log_level = "error"
//!
//! [log_filters]
//! "loraswap_llm" = "info"
//! "loraswap_llm::adapters::cache" = "trace"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Once;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{FmtContext, FormatFields};
use tracing_subscriber::fmt::{FormattedFields, format::Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{filter::Directive, fmt};

use crate::config::environment_names::logging as env_logging;
use crate::config::{disable_ansi_logging, jsonl_logging_enabled};

/// Default log level
const DEFAULT_FILTER_LEVEL: &str = "info";

/// System-wide logging configuration file
const DEFAULT_LOGGING_CONFIG_PATH: &str = "/etc/loraswap/logging.toml";

/// Once instance to ensure the logger is only initialized once
static INIT: Once = Once::new();

#[derive(Serialize, Deserialize, Debug)]
struct LoggingConfig {
    log_level: String,
    log_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: DEFAULT_FILTER_LEVEL.to_string(),
            log_filters: HashMap::from([
                ("h2".to_string(), "error".to_string()),
                ("tower".to_string(), "error".to_string()),
                ("hyper".to_string(), "error".to_string()),
                ("hyper_util".to_string(), "error".to_string()),
                ("axum".to_string(), "error".to_string()),
            ]),
        }
    }
}

/// Initialize the logger
///
/// Safe to call more than once; only the first call installs the subscriber.
pub fn init() {
    INIT.call_once(|| {
        if let Err(e) = setup_logging() {
            eprintln!("Failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    });
}

fn setup_logging() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let filter_layer = filters(config);

    if jsonl_logging_enabled() {
        let l = fmt::layer()
            .with_ansi(false)
            .event_format(CustomJsonFormatter::new())
            .with_writer(std::io::stderr)
            .with_filter(filter_layer);
        tracing_subscriber::registry().with(l).try_init()?;
    } else {
        let l = fmt::layer()
            .with_ansi(!disable_ansi_logging())
            .event_format(fmt::format().compact().with_timer(TimeFormatter::new()))
            .with_writer(std::io::stderr)
            .with_filter(filter_layer);
        tracing_subscriber::registry().with(l).try_init()?;
    }

    Ok(())
}

fn filters(config: LoggingConfig) -> EnvFilter {
    let default_directive = config
        .log_level
        .parse::<Directive>()
        .unwrap_or_else(|e| {
            eprintln!(
                "Invalid log level '{}', using '{DEFAULT_FILTER_LEVEL}': {e}",
                config.log_level
            );
            LevelFilter::INFO.into()
        });

    let mut filter_layer = EnvFilter::builder()
        .with_default_directive(default_directive)
        .with_env_var(env_logging::LORASWAP_LOG)
        .from_env_lossy();

    for (module, level) in config.log_filters {
        match format!("{module}={level}").parse::<Directive>() {
            Ok(d) => {
                filter_layer = filter_layer.add_directive(d);
            }
            Err(e) => {
                eprintln!("Failed parsing filter '{level}' for module '{module}': {e}");
            }
        }
    }
    filter_layer
}

fn load_config() -> Result<LoggingConfig, figment::Error> {
    let config_path = std::env::var(env_logging::LORASWAP_LOGGING_CONFIG_PATH).unwrap_or_default();
    let figment = Figment::new()
        .merge(Serialized::defaults(LoggingConfig::default()))
        .merge(Toml::file(DEFAULT_LOGGING_CONFIG_PATH))
        .merge(Toml::file(config_path));

    figment.extract()
}

#[derive(Serialize)]
struct JsonLog<'a> {
    time: String,
    level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    target: &'a str,
    message: serde_json::Value,
    #[serde(flatten)]
    fields: BTreeMap<String, serde_json::Value>,
}

struct TimeFormatter {
    use_local_tz: bool,
}

impl TimeFormatter {
    fn new() -> Self {
        Self {
            use_local_tz: crate::config::use_local_timezone(),
        }
    }

    fn format_now(&self) -> String {
        if self.use_local_tz {
            chrono::Local::now()
                .format("%Y-%m-%dT%H:%M:%S%.6f%:z")
                .to_string()
        } else {
            chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.6fZ")
                .to_string()
        }
    }
}

impl FormatTime for TimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", self.format_now())
    }
}

struct CustomJsonFormatter {
    time_formatter: TimeFormatter,
}

impl CustomJsonFormatter {
    fn new() -> Self {
        Self {
            time_formatter: TimeFormatter::new(),
        }
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CustomJsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = JsonVisitor::default();
        let time = self.time_formatter.format_now();
        event.record(&mut visitor);
        let message = visitor
            .fields
            .remove("message")
            .unwrap_or(serde_json::Value::String("".to_string()));

        let current_span = event
            .parent()
            .and_then(|id| ctx.span(id))
            .or_else(|| ctx.lookup_current());
        if let Some(span) = current_span {
            let ext = span.extensions();
            if let Some(data) = ext.get::<FormattedFields<N>>() {
                let span_fields: Vec<(&str, &str)> = data
                    .fields
                    .split(' ')
                    .filter_map(|entry| entry.split_once('='))
                    .collect();
                for (name, value) in span_fields {
                    visitor
                        .fields
                        .entry(name.to_string())
                        .or_insert_with(|| Value::String(value.trim_matches('"').to_string()));
                }
            }
            visitor.fields.insert(
                "span_name".to_string(),
                serde_json::Value::String(span.name().to_string()),
            );
            visitor.fields.insert(
                "span_id".to_string(),
                serde_json::Value::String(span.id().into_u64().to_string()),
            );
            if let Some(parent) = span.parent() {
                visitor.fields.insert(
                    "parent_id".to_string(),
                    serde_json::Value::String(parent.id().into_u64().to_string()),
                );
            }
        } else {
            for reserved_field in ["span_id", "parent_id", "span_name"] {
                visitor.fields.remove(reserved_field);
            }
        }

        let metadata = event.metadata();
        let log = JsonLog {
            level: metadata.level().to_string(),
            time,
            file: metadata.file(),
            line: metadata.line(),
            target: metadata.target(),
            message,
            fields: visitor.fields,
        };
        let json = serde_json::to_string(&log).map_err(|_| std::fmt::Error)?;
        writeln!(writer, "{json}")
    }
}

#[derive(Default)]
struct JsonVisitor {
    fields: BTreeMap<String, serde_json::Value>,
}

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::String(format!("{value:?}")),
        );
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() != "message" {
            match serde_json::from_str::<Value>(value) {
                Ok(json_val) => self.fields.insert(field.name().to_string(), json_val),
                Err(_) => self.fields.insert(field.name().to_string(), value.into()),
            };
        } else {
            self.fields.insert(field.name().to_string(), value.into());
        }
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(value.into()),
        );
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(value.into()),
        );
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        use serde_json::value::Number;
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(Number::from_f64(value).unwrap_or(0.into())),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn lines(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    fn capture_jsonl(f: impl FnOnce()) -> Vec<Value> {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .event_format(CustomJsonFormatter::new())
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        buffer.lines()
    }

    #[test]
    fn test_jsonl_event_fields() {
        let lines = capture_jsonl(|| {
            tracing::info!(tenant = "acme", resident = 3u64, hit = true, "adapter acquired");
        });
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["message"], "adapter acquired");
        assert_eq!(line["tenant"], "acme");
        assert_eq!(line["resident"], 3);
        assert_eq!(line["hit"], true);
        assert!(line["time"].as_str().unwrap().ends_with('Z'));
        assert!(line.get("span_name").is_none());
    }

    #[test]
    fn test_jsonl_span_context() {
        let lines = capture_jsonl(|| {
            let span = tracing::info_span!("dispatch", tenant = "acme");
            let _guard = span.enter();
            tracing::debug!("inside");
        });
        let line = lines
            .iter()
            .find(|l| l["message"] == "inside")
            .expect("event logged");
        assert_eq!(line["span_name"], "dispatch");
        assert_eq!(line["tenant"], "acme");
        assert!(line["span_id"].is_string());
    }

    #[test]
    fn test_json_string_fields_are_parsed() {
        let lines = capture_jsonl(|| {
            tracing::warn!(payload = r#"{"a":1}"#, "structured");
        });
        assert_eq!(lines[0]["payload"]["a"], 1);
    }

    #[test]
    fn test_filters_accept_config_and_skip_bad_directives() {
        let config = LoggingConfig {
            log_level: "warn".to_string(),
            log_filters: HashMap::from([
                ("loraswap_llm".to_string(), "debug".to_string()),
                ("bad module".to_string(), "???".to_string()),
            ]),
        };
        temp_env::with_vars(vec![(env_logging::LORASWAP_LOG, None::<&str>)], || {
            let filter = filters(config);
            let rendered = filter.to_string();
            assert!(rendered.contains("loraswap_llm=debug"));
            assert!(rendered.contains("warn"));
        });
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "log_level = \"error\"\n[log_filters]\n\"loraswap_llm\" = \"trace\""
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();
        temp_env::with_vars(
            vec![(env_logging::LORASWAP_LOGGING_CONFIG_PATH, Some(path.as_str()))],
            || {
                let config = load_config().unwrap();
                assert_eq!(config.log_level, "error");
                assert_eq!(config.log_filters["loraswap_llm"], "trace");
                // defaults are merged, not replaced
                assert_eq!(config.log_filters["axum"], "error");
            },
        );
    }

    #[test]
    fn test_local_timezone_format() {
        temp_env::with_vars(
            vec![(env_logging::LORASWAP_LOG_USE_LOCAL_TZ, Some("1"))],
            || {
                let now = TimeFormatter::new().format_now();
                assert!(chrono::DateTime::parse_from_rfc3339(&now).is_ok());
            },
        );
    }
}
