//! Log line formatting for the gateway binary.
//!
//! Every event renders as `[timestamp] [component] [level] message`, with the
//! component taken from an event's `component` field when present.

use std::fmt;
use std::io::IsTerminal;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

/// Column widths keep the message column aligned
const COMPONENT_WIDTH: usize = 20;
const LEVEL_WIDTH: usize = 9;

/// Log an info event tagged with a component name
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(component = $component, $($arg)*)
    };
}

/// Log a warning tagged with a component name
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(component = $component, $($arg)*)
    };
}

/// Log a debug event tagged with a component name
#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(component = $component, $($arg)*)
    };
}

/// Log an error tagged with a component name
#[macro_export]
macro_rules! component_error {
    ($component:expr, $($arg:tt)*) => {
        tracing::error!(component = $component, $($arg)*)
    };
}

/// Event formatter for the gateway's console output
pub struct GatewayLogFormatter {
    service_name: String,
    color_enabled: bool,
}

impl GatewayLogFormatter {
    /// Formatter that colours output only when stdout is a terminal
    pub fn new(service_name: impl Into<String>) -> Self {
        let color_enabled = std::io::stdout().is_terminal()
            && std::env::var("TERM").map_or(false, |term| term != "dumb");
        Self::with_color(service_name, color_enabled)
    }

    /// Formatter with explicit colour choice
    pub fn with_color(service_name: impl Into<String>, color_enabled: bool) -> Self {
        Self {
            service_name: service_name.into(),
            color_enabled,
        }
    }

    fn component_column(&self, component: Option<&str>) -> String {
        let name = match component {
            Some(component) => format!("{}-{}", self.service_name, component),
            None => self.service_name.clone(),
        };

        if name.chars().count() > COMPONENT_WIDTH {
            let truncated: String = name.chars().take(COMPONENT_WIDTH - 1).collect();
            format!("{}…", truncated)
        } else {
            format!("{:<width$}", name, width = COMPONENT_WIDTH)
        }
    }

    fn level_column(level: &Level) -> String {
        let label = match *level {
            Level::ERROR => "✗ ERROR",
            Level::WARN => "⚠ WARN",
            Level::INFO => "ℹ INFO",
            Level::DEBUG => "◦ DEBUG",
            Level::TRACE => "◦ TRACE",
        };
        format!("{:<width$}", label, width = LEVEL_WIDTH)
    }

    fn color(&self, code: &'static str) -> &'static str {
        if self.color_enabled {
            code
        } else {
            ""
        }
    }

    fn level_color(&self, level: &Level) -> &'static str {
        self.color(match *level {
            Level::ERROR => COLOR_BRIGHT_RED,
            Level::WARN => COLOR_BRIGHT_YELLOW,
            Level::INFO => COLOR_GREEN,
            Level::DEBUG | Level::TRACE => COLOR_BRIGHT_GRAY,
        })
    }

    fn render(&self, timestamp: &str, level: &Level, fields: &EventFields) -> String {
        format!(
            "{}[{}] [{}] [{}{}{}] {}{}",
            self.color(COLOR_CYAN),
            timestamp,
            self.component_column(fields.component.as_deref()),
            self.level_color(level),
            Self::level_column(level),
            self.color(COLOR_RESET),
            fields.message,
            self.color(COLOR_RESET),
        )
    }
}

impl<S, N> FormatEvent<S, N> for GatewayLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = chrono::Local::now()
            .format("%Y-%m-%d %H:%M:%S%.3f")
            .to_string();

        let mut fields = EventFields::default();
        event.record(&mut fields);

        writeln!(
            writer,
            "{}",
            self.render(&timestamp, event.metadata().level(), &fields)
        )
    }
}

/// Message and component pulled out of an event
#[derive(Default)]
struct EventFields {
    message: String,
    component: Option<String>,
}

impl tracing::field::Visit for EventFields {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        self.record_str(field, unquote(&rendered));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "component" => self.component = Some(value.to_string()),
            _ => {}
        }
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}
