//! Purpose: Hold top-level CLI command dispatch for `json-facade`.
//! Exports: `dispatch_command`, `render`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: CLI decoding never promotes `json_class` tags (no classes are registered).
//! Invariants: Decode and re-encode share one nesting ceiling.
//! Invariants: Colorized output passes the same encode checks as plain output.

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    backend: &'static dyn Backend,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    let json = Json::with_backend(backend, Registry::new());
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "json-facade", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Backend => {
            emit_json(backend_json(backend));
            Ok(RunOutcome::ok())
        }
        Command::Fmt {
            input,
            pretty,
            max_nesting,
        } => {
            let source = read_input(input.as_deref())?;
            let node = json.decode(&source, &decode_options(max_nesting))?;
            let use_color = color_mode.use_color(io::stdout().is_terminal());
            let text = render(&json, &node, pretty, use_color, &encode_options(max_nesting))?;
            println!("{text}");
            Ok(RunOutcome::ok())
        }
        Command::Check { input, max_nesting } => {
            let source = read_input(input.as_deref())?;
            let node = json.decode(&source, &decode_options(max_nesting))?;
            emit_json(json!({
                "ok": true,
                "backend": backend.kind().as_str(),
                "depth": node.depth(),
                "classes": node.count_tagged(),
            }));
            Ok(RunOutcome::ok())
        }
    }
}

/// Encode `node` for `fmt`; color is applied only after encode succeeds.
pub(super) fn render(
    json: &Json,
    node: &Node,
    pretty: bool,
    use_color: bool,
    options: &EncodeOptions,
) -> Result<String, Error> {
    if !pretty {
        return json.encode(node, options);
    }
    let text = json.encode_pretty(node, options)?;
    if use_color {
        Ok(colorize_node(node, true))
    } else {
        Ok(text)
    }
}
