//! A small interactive command line.
//!
//! Lines of the form `command key=value key="quoted value" flag` are parsed into a
//! command name and a parameter map, then handed to the handler registered under
//! that name. Parameter values written as `[name]` are replaced with the value of
//! the variable `name` before the handler runs.
//!
//! The main entry point is [`Dispatcher`]; [`builtin`] provides the usual
//! `exit`/`echo`/`help`/`setvar`/`printvar`/`exec` commands.

pub mod builtin;
mod command;
pub mod config;
mod dispatcher;
mod env;
mod io_adapters;
mod parser;

pub use command::{Handler, Params};
pub use dispatcher::{Dispatcher, Worker};
pub use env::Variables;
pub use io_adapters::{EditorSource, LineSource, ReaderSource, SharedBuffer};
pub use parser::{ParseError, ParsedCommand};
