//! Purpose: `json-facade` CLI entry point.
//! Role: Binary crate root; parses args, fixes the backend, runs commands.
//! Invariants: Commands emit JSON on stdout; diagnostics go to stderr.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: The backend is chosen once, before any command runs.
use std::error::Error as StdError;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod color_json;
mod command_dispatch;

use color_json::colorize_node;
use json_facade::api::{
    Backend, BackendKind, DEFAULT_MAX_NESTING, DecodeOptions, EncodeOptions, Error, ErrorKind,
    Json, NESTING_HARD_LIMIT, Node, Registry, backend, to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Run `json-facade --help` for usage."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    let backend = match cli.backend.kind() {
        Some(kind) => backend::init(Some(kind)),
        None => backend::active(),
    };

    command_dispatch::dispatch_command(cli.command, backend, color_mode)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "json-facade",
    version,
    about = "Decode, validate, and re-encode JSON through the json-facade backends",
    long_about = None,
    after_help = r#"EXAMPLES
  $ json-facade fmt doc.json
  $ cat doc.json | json-facade fmt --pretty
  $ json-facade --backend serde check --max-nesting 64 doc.json
  $ json-facade backend

ENVIRONMENT
  JSON_FACADE_BACKEND   simd|serde|auto, used when --backend is auto
  RUST_LOG              diagnostics filter (default: warn)"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics and pretty JSON output: auto|always|never"
    )]
    color: ColorMode,

    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "JSON backend: auto|simd|serde"
    )]
    backend: BackendChoice,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BackendChoice {
    Auto,
    Simd,
    Serde,
}

impl BackendChoice {
    fn kind(self) -> Option<BackendKind> {
        match self {
            BackendChoice::Auto => None,
            BackendChoice::Simd => Some(BackendKind::Simd),
            BackendChoice::Serde => Some(BackendKind::Serde),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Re-encode a JSON document (compact by default)",
        after_help = r#"EXAMPLES
  $ json-facade fmt doc.json
  $ json-facade fmt --pretty - < doc.json"#
    )]
    Fmt {
        #[arg(help = "Input file; stdin when omitted or `-`", value_hint = ValueHint::FilePath)]
        input: Option<PathBuf>,
        #[arg(long, help = "Indent the output")]
        pretty: bool,
        #[arg(long, help = "Nesting ceiling (default 1000, at most 10000; 0 means 10000)")]
        max_nesting: Option<usize>,
    },
    #[command(about = "Validate a JSON document and report its depth and class tags")]
    Check {
        #[arg(help = "Input file; stdin when omitted or `-`", value_hint = ValueHint::FilePath)]
        input: Option<PathBuf>,
        #[arg(long, help = "Nesting ceiling (default 1000, at most 10000; 0 means 10000)")]
        max_nesting: Option<usize>,
    },
    #[command(about = "Show the active and available JSON backends")]
    Backend,
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn read_input(path: Option<&Path>) -> Result<String, Error> {
    let mut source = String::new();
    let result = match path {
        None => io::stdin().read_to_string(&mut source),
        Some(path) if path == Path::new("-") => io::stdin().read_to_string(&mut source),
        Some(path) => std::fs::File::open(path).and_then(|mut file| file.read_to_string(&mut source)),
    };
    match result {
        Ok(_) => Ok(source),
        Err(err) if err.kind() == io::ErrorKind::InvalidData => Err(Error::new(ErrorKind::Parse)
            .with_message("input is not valid UTF-8")
            .with_hint("parse category: utf8")
            .with_source(err)),
        Err(err) => {
            let label = path.map_or_else(|| "stdin".to_string(), |p| p.display().to_string());
            Err(Error::new(ErrorKind::Io)
                .with_message(format!("failed to read {label}"))
                .with_source(err))
        }
    }
}

fn decode_options(max_nesting: Option<usize>) -> DecodeOptions {
    let options = DecodeOptions::new().create_additions(false);
    match max_nesting {
        Some(max_nesting) => options.max_nesting(max_nesting),
        None => options,
    }
}

fn encode_options(max_nesting: Option<usize>) -> EncodeOptions {
    EncodeOptions {
        max_nesting,
        ..EncodeOptions::new()
    }
}

fn backend_json(active: &dyn Backend) -> Value {
    let available: Vec<&str> = backend::available()
        .into_iter()
        .map(BackendKind::as_str)
        .collect();
    json!({
        "active": active.kind().as_str(),
        "available": available,
        "native_max_nesting": active.native_max_nesting(),
        "default_max_nesting": DEFAULT_MAX_NESTING,
        "hard_max_nesting": NESTING_HARD_LIMIT,
    })
}

fn emit_json(value: Value) {
    let json = serde_json::to_string(&value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Parse => "malformed json".to_string(),
        ErrorKind::NestingLimit => "nesting too deep".to_string(),
        ErrorKind::Lookup => "unknown json_class".to_string(),
        ErrorKind::Encode => "value cannot be encoded".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(class) = err.class() {
        inner.insert("class".to_string(), json!(class));
    }
    if let Some(depth) = err.depth() {
        inner.insert("depth".to_string(), json!(depth));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];

    let details = [
        ("hint:", err.hint().map(str::to_string)),
        ("class:", err.class().map(str::to_string)),
        ("depth:", err.depth().map(|depth| depth.to_string())),
        ("offset:", err.offset().map(|offset| offset.to_string())),
        ("caused by:", error_causes(err).into_iter().next()),
    ];
    for (label, detail) in details {
        if let Some(detail) = detail {
            lines.push(format!(
                "{} {detail}",
                colorize_label(label, use_color, AnsiColor::Yellow)
            ));
        }
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::command_dispatch::render;
    use super::{Error, ErrorKind, decode_options, encode_options, error_json, error_text};
    use json_facade::api::{BackendKind, Json, JsonClass, Node, Registry, backend};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Echo;

    impl JsonClass for Echo {
        fn json_class(&self) -> &str {
            "Demo::Echo"
        }

        fn to_node(&self) -> Node {
            Node::from(vec![Node::from(Arc::new(Echo))])
        }
    }

    fn serde_json_handle() -> Json {
        Json::with_backend(
            backend::get(BackendKind::Serde).expect("serde"),
            Registry::new(),
        )
    }

    #[test]
    fn colored_render_fails_like_plain_render() {
        let json = serde_json_handle();
        let node = Node::from(Arc::new(Echo));
        for use_color in [false, true] {
            let err = render(&json, &node, true, use_color, &encode_options(Some(16))).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Encode, "use_color={use_color}");
        }
    }

    #[test]
    fn colored_render_wraps_tokens_after_encode_succeeds() {
        let json = serde_json_handle();
        let node = Node::from(serde_json::json!({"a": [1]}));
        let plain = render(&json, &node, true, false, &encode_options(None)).expect("plain");
        let colored = render(&json, &node, true, true, &encode_options(None)).expect("colored");
        assert!(colored.contains("\u{1b}["));
        assert_eq!(plain, serde_json::to_string_pretty(&node).expect("pretty"));
        assert_eq!(
            render(&json, &node, false, true, &encode_options(None)).expect("compact"),
            r#"{"a":[1]}"#
        );
    }

    #[test]
    fn error_json_carries_context_fields() {
        let err = Error::new(ErrorKind::Lookup)
            .with_message("cannot resolve `Nope` in the root namespace")
            .with_class("Nope");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Lookup");
        assert_eq!(value["error"]["class"], "Nope");
        assert!(value["error"].get("depth").is_none());
    }

    #[test]
    fn error_text_falls_back_to_kind_message() {
        let err = Error::new(ErrorKind::NestingLimit).with_depth(9);
        let text = error_text(&err, false);
        assert_eq!(text, "error: nesting too deep\ndepth: 9");
    }

    #[test]
    fn cli_decoding_never_promotes_classes() {
        let options = decode_options(Some(3));
        assert!(!options.create_additions);
        assert_eq!(options.max_nesting, Some(3));
    }
}
