use codespan_reporting::diagnostic::{Diagnostic, Severity};
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term::termcolor::{BufferedStandardStream, ColorChoice, WriteColor};
use codespan_reporting::term::{self, DisplayStyle};
use std::cell::RefCell;
use std::fmt::Display;
use std::io::Write;
use std::path::Path;

use crate::render::{self, RenderError, Rendered};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Error => 1,
        }
    }
}

type File = SimpleFile<String, String>;

fn auto_color_choice(stream: atty::Stream) -> ColorChoice {
    if atty::is(stream) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

pub struct Driver {
    seen_errors: RefCell<bool>,
    codespan_config: term::Config,
    diagnostic_writer: RefCell<Box<dyn WriteColor>>,
    emit_writer: RefCell<Box<dyn WriteColor>>,
}

impl Driver {
    pub fn new() -> Driver {
        Driver {
            seen_errors: RefCell::new(false),
            codespan_config: term::Config {
                display_style: DisplayStyle::Short,
                ..term::Config::default()
            },
            diagnostic_writer: RefCell::new(Box::new(BufferedStandardStream::stderr(
                auto_color_choice(atty::Stream::Stderr),
            ))),
            emit_writer: RefCell::new(Box::new(BufferedStandardStream::stdout(
                auto_color_choice(atty::Stream::Stdout),
            ))),
        }
    }

    /// Setup a global panic hook
    pub fn install_panic_hook(&self) {
        let term_config = self.codespan_config.clone();
        let default_hook = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |info| {
            let location = info.location();
            let message = if let Some(message) = info.payload().downcast_ref::<String>() {
                message.as_str()
            } else if let Some(message) = info.payload().downcast_ref::<&str>() {
                message
            } else {
                "unknown panic type"
            };

            let diagnostic = Diagnostic::bug()
                .with_message(format!("generator panicked at '{message}'"))
                .with_notes(vec![match location {
                    Some(location) => format!("panicked at: {location}"),
                    None => "panicked at: unknown location".to_owned(),
                }]);

            let mut writer = BufferedStandardStream::stderr(auto_color_choice(atty::Stream::Stderr));
            let dummy_file = SimpleFile::new(String::new(), String::new());

            default_hook(info);
            eprintln!();
            term::emit(&mut writer, &term_config, &dummy_file, &diagnostic).unwrap();
        }));
    }

    /// Use the same colour choice for diagnostics and messages
    pub fn set_color_choice(&mut self, color_choice: ColorChoice) {
        self.set_diagnostic_writer(BufferedStandardStream::stderr(color_choice));
        self.set_emit_writer(BufferedStandardStream::stdout(color_choice));
    }

    /// Set the writer to use when rendering diagnostics
    pub fn set_diagnostic_writer(&mut self, stream: impl 'static + WriteColor) {
        self.diagnostic_writer = RefCell::new(Box::new(stream) as Box<dyn WriteColor>);
    }

    /// Set the writer to use when reporting what was done to the output
    pub fn set_emit_writer(&mut self, stream: impl 'static + WriteColor) {
        self.emit_writer = RefCell::new(Box::new(stream) as Box<dyn WriteColor>);
    }

    /// Whether an error diagnostic has been emitted
    pub fn seen_errors(&self) -> bool {
        *self.seen_errors.borrow()
    }

    /// Render `input` and write it to `output`, unless `output` already
    /// holds the same render.
    pub fn generate(&self, input: &Path, output: &Path) -> Status {
        let _span = tracing::debug_span!("generate", input = %input.display()).entered();

        let rendered = match self.render_input(input) {
            Some(rendered) => rendered,
            None => return Status::Error,
        };

        if output.exists() {
            let existing = match std::fs::read(output) {
                Ok(existing) => existing,
                Err(error) => {
                    self.emit_read_diagnostic(output.display(), error);
                    return Status::Error;
                }
            };

            let existing_digest = std::str::from_utf8(&existing)
                .ok()
                .and_then(render::extract_digest);
            if existing_digest == Some(rendered.digest.as_str())
                || existing == rendered.text.as_bytes()
            {
                tracing::debug!(digest = %rendered.digest, "output digest matches");
                self.emit_message(format_args!("unchanged: {}", output.display()));
                return Status::Ok;
            }
        }

        if let Err(error) = write_output(output, &rendered.text) {
            self.emit_write_diagnostic(output.display(), error);
            return Status::Error;
        }

        self.emit_message(format_args!("generated: {}", output.display()));
        Status::Ok
    }

    /// Check that `output` holds exactly what rendering `input` would
    /// write, without writing anything.
    pub fn check(&self, input: &Path, output: &Path) -> Status {
        let _span = tracing::debug_span!("check", input = %input.display()).entered();

        let rendered = match self.render_input(input) {
            Some(rendered) => rendered,
            None => return Status::Error,
        };

        if !output.exists() {
            self.emit_error(format!("{} is missing (run generator)", output.display()));
            return Status::Error;
        }

        let existing = match std::fs::read(output) {
            Ok(existing) => existing,
            Err(error) => {
                self.emit_read_diagnostic(output.display(), error);
                return Status::Error;
            }
        };

        if existing != rendered.text.as_bytes() {
            self.emit_error(format!("{} is out of date (run generator)", output.display()));
            return Status::Error;
        }

        self.emit_message(format_args!("up-to-date: {}", output.display()));
        Status::Ok
    }

    fn render_input(&self, input: &Path) -> Option<Rendered> {
        if !input.exists() {
            self.emit_error(format!("input file does not exist: {}", input.display()));
            return None;
        }

        let source = match std::fs::read_to_string(input) {
            Ok(source) => source,
            Err(error) => {
                self.emit_read_diagnostic(input.display(), error);
                return None;
            }
        };

        let label = render::source_label(input);
        tracing::debug!(%label, bytes = source.len(), "loaded input");

        match render::render_file(&label, &source) {
            Ok(rendered) => {
                let file = SimpleFile::new(input.display().to_string(), source);
                for warning in &rendered.warnings {
                    self.emit_diagnostic(&file, warning.to_diagnostic());
                }
                Some(rendered)
            }
            Err(RenderError::Parse(message)) => {
                let file = SimpleFile::new(input.display().to_string(), source);
                self.emit_diagnostic(&file, message.to_diagnostic());
                None
            }
            Err(RenderError::Format(error)) => {
                self.emit_diagnostic(
                    &empty_file(),
                    Diagnostic::bug().with_message(format!("couldn't format generated code: {error}")),
                );
                None
            }
        }
    }

    fn emit_message(&self, message: impl Display) {
        let mut emit_writer = self.emit_writer.borrow_mut();
        writeln!(emit_writer, "{message}").unwrap();
        emit_writer.flush().unwrap();
    }

    fn emit_diagnostic(&self, file: &File, diagnostic: Diagnostic<()>) {
        let mut writer = self.diagnostic_writer.borrow_mut();
        let config = &self.codespan_config;

        term::emit(&mut *writer, config, file, &diagnostic).unwrap();
        writer.flush().unwrap();

        if diagnostic.severity >= Severity::Error {
            *self.seen_errors.borrow_mut() = true;
        }
    }

    fn emit_error(&self, message: String) {
        self.emit_diagnostic(&empty_file(), Diagnostic::error().with_message(message));
    }

    fn emit_read_diagnostic(&self, name: impl Display, error: std::io::Error) {
        self.emit_error(format!("couldn't read `{name}`: {error}"));
    }

    fn emit_write_diagnostic(&self, name: impl Display, error: std::io::Error) {
        self.emit_error(format!("couldn't write `{name}`: {error}"));
    }
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new()
    }
}

fn empty_file() -> File {
    SimpleFile::new(String::new(), String::new())
}

fn write_output(output: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output, text)
}
