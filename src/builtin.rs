//! Built-in commands.
//!
//! Each command is a plain function matching the [`Handler`](crate::Handler) signature and
//! prints through [`Dispatcher::output`].

use crate::command::Params;
use crate::dispatcher::Dispatcher;
use crate::io_adapters::{LineSource, ReaderSource};
use anyhow::{Result, anyhow};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use tracing::error;

/// Register `exit`, `echo`, `help`, `setvar`, `printvar` and `exec`.
pub fn register_defaults(dispatcher: &mut Dispatcher) {
    dispatcher.register_command("exit", exit);
    dispatcher.register_command("echo", echo);
    dispatcher.register_command("help", help);
    dispatcher.register_command("setvar", setvar);
    dispatcher.register_command("printvar", printvar);
    dispatcher.register_command("exec", exec);
}

/// Stop reading input.
pub fn exit(_params: &Params, dispatcher: &mut Dispatcher) -> Result<()> {
    dispatcher.stop();
    Ok(())
}

/// Print the `text` parameter, or an empty line without one.
pub fn echo(params: &Params, dispatcher: &mut Dispatcher) -> Result<()> {
    let text = params.get("text").map(String::as_str).unwrap_or_default();
    writeln!(dispatcher.output(), "{}", text)?;
    Ok(())
}

/// List the registered commands.
pub fn help(_params: &Params, dispatcher: &mut Dispatcher) -> Result<()> {
    let mut listing = String::from("Commands:\n");
    for name in dispatcher.registered_commands() {
        listing.push_str(&format!("\t-{}\n", name));
    }
    listing.push_str(".\n");
    dispatcher.output().write_all(listing.as_bytes())?;
    Ok(())
}

/// Store every `key=value` pair as a variable.
pub fn setvar(params: &Params, dispatcher: &mut Dispatcher) -> Result<()> {
    for (key, value) in params {
        dispatcher.set_variable(key.as_str(), value.as_str());
    }
    Ok(())
}

/// Print the variables named by the parameter keys, or all of them when none are given.
pub fn printvar(params: &Params, dispatcher: &mut Dispatcher) -> Result<()> {
    let names: Vec<String> = if params.is_empty() {
        dispatcher
            .variable_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    } else {
        params.keys().cloned().collect()
    };

    let mut listing = String::from("Variables:\n");
    for name in &names {
        let value = dispatcher.variable(name).unwrap_or("<unset>");
        listing.push_str(&format!("\t{}: {}\n", name, value));
    }
    listing.push_str(".\n");
    dispatcher.output().write_all(listing.as_bytes())?;
    Ok(())
}

/// Run every line of the file named by `filename` as a command.
///
/// `print-lines=true` echoes each line, prefixed with `// `, before running it.
pub fn exec(params: &Params, dispatcher: &mut Dispatcher) -> Result<()> {
    let filename = params
        .get("filename")
        .ok_or_else(|| anyhow!("exec: missing 'filename' parameter"))?;
    let print_lines = params
        .get("print-lines")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    execute_file(dispatcher, Path::new(filename), print_lines)
}

/// Feed the lines of `path` to [`Dispatcher::exec`], one by one.
///
/// A file that can't be opened or read is logged and otherwise ignored; errors from
/// the executed commands are propagated and end the file early.
pub fn execute_file(dispatcher: &mut Dispatcher, path: &Path, print_lines: bool) -> Result<()> {
    writeln!(dispatcher.output(), "Executing file: {}", path.display())?;

    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            error!("can't execute {}: {}", path.display(), err);
            return Ok(());
        }
    };

    let mut lines = ReaderSource::new(BufReader::new(file));
    loop {
        let line = match lines.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!("can't execute {}: {}", path.display(), err);
                break;
            }
        };
        if print_lines {
            writeln!(dispatcher.output(), "// {}", line)?;
        }
        dispatcher.exec(&line)?;
    }
    Ok(())
}
