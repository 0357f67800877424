use crate::dispatcher::Dispatcher;
use anyhow::Result;
use std::collections::BTreeMap;

/// Parameters of one command invocation, keyed by parameter name.
///
/// A sorted map keeps listings and debug output stable; order carries no meaning.
pub type Params = BTreeMap<String, String>;

/// Object-safe trait for anything that can be registered as a command.
///
/// Handlers receive the (already substituted) parameters and the dispatcher that
/// invoked them, so they can print through [`Dispatcher::output`], read and set
/// variables, register further commands or call [`Dispatcher::stop`].
///
/// A blanket implementation covers plain functions and closures:
///
/// ```
/// use interactive_cli::{Dispatcher, Params};
/// use std::io::Write;
///
/// let mut cli = Dispatcher::new();
/// cli.register_command("hello", |_: &Params, d: &mut Dispatcher| -> anyhow::Result<()> {
///     writeln!(d.output(), "hello")?;
///     Ok(())
/// });
/// assert_eq!(cli.registered_commands(), vec!["hello"]);
/// ```
pub trait Handler: Send + Sync {
    /// Executes the command. Errors are propagated to whoever dispatched the line.
    fn execute(&self, params: &Params, dispatcher: &mut Dispatcher) -> Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&Params, &mut Dispatcher) -> Result<()> + Send + Sync,
{
    fn execute(&self, params: &Params, dispatcher: &mut Dispatcher) -> Result<()> {
        self(params, dispatcher)
    }
}
