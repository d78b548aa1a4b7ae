use std::io::Write;
use std::sync::{Arc, Mutex};

/// Event severities, least to most severe. The wire format carries no level
/// tag; the level only drives threshold filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Notice,
    Info,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Notice => "notice",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Critical => "critical",
            Level::Alert => "alert",
            Level::Emergency => "emergency",
        }
    }
}

/// Line-oriented event logger shared by the manager and its workers.
///
/// Every event is a single line, written with one `write` call so that the
/// manager and forked children can share the same fd without interleaving:
///
/// ```text
/// resque-pool-<role>[<app>][<pid>] <message>
/// ```
///
/// `role` defaults per handle (`manager` for the supervisor, `worker` for the
/// handles given to workers) and can be overridden per event through the
/// context; `{key}` placeholders in the message template are substituted from
/// the context. The pid is read at emit time, so a forked child stamps its
/// own pid without a fresh logger.
#[derive(Clone)]
pub struct Logger {
    threshold: Level,
    app: String,
    role: &'static str,
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Logger {
    pub fn new(threshold: Level, app: &str, sink: Box<dyn Write + Send>) -> Self {
        Logger {
            threshold,
            app: app.to_string(),
            role: "worker",
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    pub fn to_stdout(threshold: Level, app: &str) -> Self {
        Self::new(threshold, app, Box::new(std::io::stdout()))
    }

    /// A handle with a different default role, sharing the same sink.
    pub fn for_role(&self, role: &'static str) -> Logger {
        let mut handle = self.clone();
        handle.role = role;
        handle
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn log(&self, level: Level, template: &str, ctx: &[(&str, String)]) {
        if level < self.threshold {
            return;
        }
        let line = self.format_line(template, ctx);
        let mut sink = self.sink.lock().unwrap_or_else(|p| p.into_inner());
        let _ = sink.write_all(line.as_bytes());
        let _ = sink.flush();
    }

    pub fn debug(&self, template: &str, ctx: &[(&str, String)]) {
        self.log(Level::Debug, template, ctx);
    }

    pub fn notice(&self, template: &str, ctx: &[(&str, String)]) {
        self.log(Level::Notice, template, ctx);
    }

    pub fn info(&self, template: &str, ctx: &[(&str, String)]) {
        self.log(Level::Info, template, ctx);
    }

    pub fn error(&self, template: &str, ctx: &[(&str, String)]) {
        self.log(Level::Error, template, ctx);
    }

    fn format_line(&self, template: &str, ctx: &[(&str, String)]) -> String {
        let role = ctx
            .iter()
            .find(|(k, _)| *k == "role")
            .map(|(_, v)| v.as_str())
            .unwrap_or(self.role);
        let mut message = template.to_string();
        for (key, value) in ctx {
            message = message.replace(&format!("{{{key}}}"), value);
        }
        format!(
            "resque-pool-{role}[{app}][{pid}] {message}\n",
            app = self.app,
            pid = std::process::id(),
        )
    }
}
