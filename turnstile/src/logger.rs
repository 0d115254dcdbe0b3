use std::fmt::Write;

use jiff::Timestamp;
use log::{Level, Record};
use logforth::{
    append::Stdout,
    diagnostic::Diagnostic,
    filter::EnvFilter,
    layout::{JsonLayout, Layout},
};

use crate::args::LogStyle;

/// One line per record: timestamp, level, target and message.
#[derive(Debug, Clone, Default)]
struct TextLayout {
    no_color: bool,
}

impl TextLayout {
    fn no_color(mut self) -> Self {
        self.no_color = true;
        self
    }

    fn level(&self, level: Level) -> String {
        if self.no_color {
            return format!("{level:>5}");
        }

        let color = match level {
            Level::Error => 31,
            Level::Warn => 33,
            Level::Info => 32,
            Level::Debug => 34,
            Level::Trace => 35,
        };

        format!("\x1b[{color}m{level:>5}\x1b[0m")
    }
}

impl Layout for TextLayout {
    fn format(&self, record: &Record<'_>, _diagnostics: &[Box<dyn Diagnostic>]) -> anyhow::Result<Vec<u8>> {
        let mut output = String::new();

        write!(output, "{} ", Timestamp::now().strftime("%Y-%m-%dT%H:%M:%S%.6fZ"))?;
        write!(output, "{}  ", self.level(record.level()))?;

        // Debug output names the crate that logged, info and above stay terse.
        if record.level() >= Level::Debug {
            write!(output, "{}: ", record.target())?;
        }

        write!(output, "{}", record.args())?;

        Ok(output.into_bytes())
    }
}

/// Install the global logger. `style` must already be resolved.
pub(super) fn init(filter: EnvFilter, style: LogStyle) {
    logforth::builder()
        .dispatch(|d| {
            let d = d.filter(filter);

            match style {
                LogStyle::Json => d.append(Stdout::default().with_layout(JsonLayout::default())),
                LogStyle::Text => d.append(Stdout::default().with_layout(TextLayout::default().no_color())),
                LogStyle::Color | LogStyle::Auto => d.append(Stdout::default().with_layout(TextLayout::default())),
            }
        })
        .apply();
}
