use std::io::{self, Write};

use nu_ansi_term::Color::{Blue, Cyan, Magenta, Red, Yellow};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{
        self,
        format::{FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields, MakeWriter,
    },
    registry::LookupSpan,
};

use crate::{cli::Args, utils::Colored};

/// Collects the message plus the `repo` field most store events carry.
#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    repo: Option<String>,
}

impl tracing::field::Visit for EventVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "repo" => self.repo = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{value:?}")),
            "repo" => self.repo = Some(format!("{value:?}")),
            _ => {}
        }
    }
}

fn level_prefix(level: Level) -> Option<Colored<&'static str>> {
    match level {
        Level::TRACE => Some(Colored(Magenta, "[TRACE]")),
        Level::DEBUG => Some(Colored(Blue, "[DEBUG]")),
        Level::INFO => None,
        Level::WARN => Some(Colored(Yellow, "[WARN]")),
        Level::ERROR => Some(Colored(Red, "[ERROR]")),
    }
}

/// Plain lines for info, a coloured level tag otherwise. Non-info lines name the repository
/// they concern.
pub struct StoreFormatter;

impl<S, N> FormatEvent<S, N> for StoreFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let level = *event.metadata().level();
        if let Some(prefix) = level_prefix(level) {
            write!(writer, "{prefix} ")?;
        }
        if let (Some(repo), false) = (&visitor.repo, level == Level::INFO) {
            write!(writer, "{} ", Colored(Cyan, format!("{repo}:")))?;
        }
        writeln!(writer, "{}", visitor.message.unwrap_or_default())
    }
}

/// Sends info to stdout and every other level to stderr.
struct SplitWriter;

impl<'a> MakeWriter<'a> for SplitWriter {
    type Writer = Box<dyn Write>;

    fn make_writer(&'a self) -> Self::Writer {
        Box::new(io::stdout())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        if meta.level() == &Level::INFO {
            Box::new(io::stdout())
        } else {
            Box::new(io::stderr())
        }
    }
}

pub fn setup_logging(args: &Args) {
    let filter_level = if args.quiet {
        Level::ERROR
    } else if args.verbose >= 2 {
        Level::TRACE
    } else if args.verbose == 1 {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(format!("hacs={filter_level}"))
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(SplitWriter)
        .compact()
        .without_time();

    let subscriber: Box<dyn Subscriber + Send + Sync> = if args.json {
        Box::new(builder.json().flatten_event(true).finish())
    } else {
        Box::new(builder.event_format(StoreFormatter).finish())
    };

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber was already set");
    }
}
