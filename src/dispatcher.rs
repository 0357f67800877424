use crate::command::{Handler, Params};
use crate::env::Variables;
use crate::io_adapters::LineSource;
use crate::parser::ParsedCommand;
use anyhow::{Context, Result, anyhow};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

const WORKER_THREAD_NAME: &str = "interactive-cli";

/// Clears the running flag when dropped, also while unwinding from a panicking handler.
struct ResetOnDrop(Arc<AtomicBool>);

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Reads lines, parses them and runs the matching registered command.
///
/// The dispatcher owns its command registry, its variables and the writer commands
/// print to. Handlers get `&mut Dispatcher` so they can change any of those while
/// running. Commands execute strictly one at a time.
///
/// Example
/// ```
/// use interactive_cli::{Dispatcher, ReaderSource, SharedBuffer, builtin};
/// use std::io::Cursor;
///
/// let out = SharedBuffer::new();
/// let mut cli = Dispatcher::new().with_output(out.clone());
/// builtin::register_defaults(&mut cli);
///
/// let mut input = ReaderSource::new(Cursor::new("setvar who=world\necho text=[who]\nexit\necho text=unreached\n"));
/// cli.run(&mut input).unwrap();
/// assert_eq!(out.to_string_lossy(), "world\n");
/// ```
pub struct Dispatcher {
    commands: BTreeMap<String, Arc<dyn Handler>>,
    variables: Variables,
    running: Arc<AtomicBool>,
    output: Box<dyn Write + Send>,
}

impl Dispatcher {
    /// Create a dispatcher with no commands, no variables, printing to stdout.
    pub fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
            variables: Variables::new(),
            running: Arc::new(AtomicBool::new(false)),
            output: Box::new(io::stdout()),
        }
    }

    /// Replace the writer commands print to.
    pub fn with_output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Register `handler` under `name`, replacing any previous handler of that name.
    pub fn register_command(&mut self, name: impl Into<String>, handler: impl Handler + 'static) {
        self.commands.insert(name.into(), Arc::new(handler));
    }

    /// Names of all registered commands, sorted.
    pub fn registered_commands(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.set(key, value);
    }

    pub fn variable(&self, key: &str) -> Option<&str> {
        self.variables.get(key)
    }

    /// Names of all variables, sorted.
    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.names().collect()
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Writer commands should print to.
    pub fn output(&mut self) -> &mut dyn Write {
        self.output.as_mut()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the run loop to finish.
    ///
    /// The flag is checked between lines only: a read that is already waiting for
    /// input is not interrupted.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Parse and run a single line, whether or not the run loop is active.
    ///
    /// Invalid lines are logged and skipped. Errors returned by the command itself
    /// are propagated.
    pub fn exec(&mut self, line: &str) -> Result<()> {
        self.dispatch(ParsedCommand::parse(line))
    }

    /// Run an already parsed command.
    ///
    /// Unknown commands are ignored without an error. Parameter values of the form
    /// `[name]` are replaced with the value of variable `name` when it exists.
    pub fn dispatch(&mut self, parsed: ParsedCommand) -> Result<()> {
        if let Some(err) = parsed.error() {
            warn!("invalid command: {} ({})", parsed, err);
            return Ok(());
        }
        let (Some(name), params) = parsed.into_parts() else {
            return Ok(());
        };
        let Some(handler) = self.commands.get(&name).cloned() else {
            debug!(command = %name, "ignoring unknown command");
            return Ok(());
        };

        let params: Params = self.variables.substitute(params);
        debug!(command = %name, ?params, "executing command");
        handler
            .execute(&params, self)
            .with_context(|| format!("command '{}' failed", name))
    }

    /// Run the read-parse-execute loop on the current thread.
    ///
    /// Returns when [`Dispatcher::stop`] has been called, when `source` is exhausted,
    /// when reading fails or when a command returns an error. The dispatcher is no
    /// longer running afterwards in every case.
    pub fn run(&mut self, source: &mut dyn LineSource) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let _reset = ResetOnDrop(Arc::clone(&self.running));
        self.run_loop(source)
    }

    fn run_loop(&mut self, source: &mut dyn LineSource) -> Result<()> {
        while self.is_running() {
            let Some(line) = source
                .read_line()
                .context("failed to read command input")?
            else {
                debug!("end of input");
                break;
            };
            self.exec(&line)?;
        }
        Ok(())
    }

    /// Run the loop on a dedicated worker thread and return immediately.
    ///
    /// The dispatcher moves to the worker; [`Worker::join`] hands it back once the
    /// loop has finished.
    pub fn start_async(self, source: impl LineSource + Send + 'static) -> Result<Worker> {
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let mut dispatcher = self;
        let mut source = source;
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                // The flag is already set; a stop() issued before this point must stick.
                let _reset = ResetOnDrop(Arc::clone(&dispatcher.running));
                dispatcher.run_loop(&mut source).map(|()| dispatcher)
            });

        match spawned {
            Ok(thread) => Ok(Worker { running, thread }),
            Err(err) => {
                running.store(false, Ordering::SeqCst);
                Err(err).context("failed to spawn command loop thread")
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a run loop started with [`Dispatcher::start_async`].
///
/// Dropping the handle detaches the worker thread; it keeps running until its loop ends.
pub struct Worker {
    running: Arc<AtomicBool>,
    thread: JoinHandle<Result<Dispatcher>>,
}

impl Worker {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Same as [`Dispatcher::stop`]: takes effect once the pending read returns.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// True once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the loop to end and get the dispatcher back.
    pub fn join(self) -> Result<Dispatcher> {
        self.thread
            .join()
            .map_err(|_| anyhow!("command loop thread panicked"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::{ReaderSource, SharedBuffer};
    use std::io::Cursor;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Mutex;
    use std::time::Duration;
    use std::sync::mpsc::{self, Receiver, Sender};

    fn source(script: &str) -> ReaderSource<Cursor<String>> {
        ReaderSource::new(Cursor::new(script.to_string()))
    }

    /// Records the parameters of every call.
    fn recorder(dispatcher: &mut Dispatcher, name: &str) -> Arc<Mutex<Vec<Params>>> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        dispatcher.register_command(name, move |p: &Params, _: &mut Dispatcher| -> Result<()> {
            sink.lock().unwrap().push(p.clone());
            Ok(())
        });
        calls
    }

    fn panicking_command(_: &Params, _: &mut Dispatcher) -> Result<()> {
        panic!("boom");
    }

    fn stop_command(_: &Params, d: &mut Dispatcher) -> Result<()> {
        d.stop();
        Ok(())
    }

    struct FailingSource;

    impl LineSource for FailingSource {
        fn read_line(&mut self) -> io::Result<Option<String>> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    struct ChannelSource(Receiver<String>);

    impl LineSource for ChannelSource {
        fn read_line(&mut self) -> io::Result<Option<String>> {
            Ok(self.0.recv().ok())
        }
    }

    #[test]
    fn test_register_and_list_commands() {
        let mut d = Dispatcher::new();
        assert!(d.registered_commands().is_empty());

        d.register_command("zeta", stop_command);
        d.register_command("alpha", stop_command);
        d.register_command("alpha", stop_command);

        assert_eq!(d.registered_commands(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_register_overwrites_handler() {
        let mut d = Dispatcher::new();
        let first = recorder(&mut d, "cmd");
        let second = recorder(&mut d, "cmd");

        d.exec("cmd").unwrap();

        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_exec_passes_params() {
        let mut d = Dispatcher::new();
        let calls = recorder(&mut d, "cmd");

        d.exec("cmd k1=v1 k2=\"a b\" k3").unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].get("k1").map(String::as_str), Some("v1"));
        assert_eq!(calls[0].get("k2").map(String::as_str), Some("a b"));
        assert_eq!(calls[0].get("k3").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_exec_substitutes_variables() {
        let mut d = Dispatcher::new();
        let calls = recorder(&mut d, "greet");
        d.set_variable("name", "Alice");

        d.exec("greet name=[name]").unwrap();
        d.exec("greet name=[missing]").unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].get("name").map(String::as_str), Some("Alice"));
        assert_eq!(calls[1].get("name").map(String::as_str), Some("[missing]"));
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        let mut d = Dispatcher::new();
        let calls = recorder(&mut d, "known");

        assert!(d.exec("foobar x=1").is_ok());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_line_is_not_dispatched() {
        let mut d = Dispatcher::new();
        let calls = recorder(&mut d, "cmd");

        assert!(d.exec("cmd k=\"open").is_ok());
        assert!(d.exec("").is_ok());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handler_error_propagates() {
        let mut d = Dispatcher::new();
        d.register_command("fail", |_: &Params, _: &mut Dispatcher| -> Result<()> {
            Err(anyhow!("boom"))
        });

        let err = d.exec("fail").unwrap_err();
        assert!(format!("{:#}", err).contains("boom"));
        assert!(err.to_string().contains("fail"));
    }

    #[test]
    fn test_handler_can_mutate_dispatcher() {
        let mut d = Dispatcher::new();
        d.register_command("setup", |_: &Params, d: &mut Dispatcher| -> Result<()> {
            d.set_variable("ready", "yes");
            d.register_command("later", stop_command);
            Ok(())
        });

        d.exec("setup").unwrap();

        assert_eq!(d.variable("ready"), Some("yes"));
        assert_eq!(d.variables().get("ready"), Some("yes"));
        assert_eq!(d.variable_names(), vec!["ready"]);
        assert_eq!(d.registered_commands(), vec!["later", "setup"]);
    }

    #[test]
    fn test_output_is_redirected() {
        let out = SharedBuffer::new();
        let mut d = Dispatcher::new().with_output(out.clone());
        d.register_command("say", |p: &Params, d: &mut Dispatcher| -> Result<()> {
            let text = p.get("text").map(String::as_str).unwrap_or_default();
            writeln!(d.output(), "{}", text)?;
            Ok(())
        });

        d.exec("say text=hi").unwrap();
        d.exec("say").unwrap();

        assert_eq!(out.to_string_lossy(), "hi\n\n");
    }

    #[test]
    fn test_run_until_end_of_input() {
        let mut d = Dispatcher::new();
        let calls = recorder(&mut d, "cmd");

        d.run(&mut source("cmd a=1\n\nnot valid\"\ncmd a=2\n")).unwrap();

        assert!(!d.is_running());
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].get("a").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_run_stops_after_stop_command() {
        let mut d = Dispatcher::new();
        let calls = recorder(&mut d, "cmd");
        d.register_command("exit", stop_command);

        d.run(&mut source("cmd\nexit\ncmd\ncmd\n")).unwrap();

        assert!(!d.is_running());
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_run_reports_read_failure() {
        let mut d = Dispatcher::new();

        let err = d.run(&mut FailingSource).unwrap_err();

        assert!(err.to_string().contains("failed to read command input"));
        assert!(!d.is_running());
    }

    #[test]
    fn test_run_ends_on_handler_error() {
        let mut d = Dispatcher::new();
        let calls = recorder(&mut d, "cmd");
        d.register_command("fail", |_: &Params, _: &mut Dispatcher| -> Result<()> {
            Err(anyhow!("boom"))
        });

        assert!(d.run(&mut source("cmd\nfail\ncmd\n")).is_err());
        assert!(!d.is_running());
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_start_async_runs_on_worker_thread() {
        let mut d = Dispatcher::new();
        let names = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&names);
        d.register_command("whereami", move |_: &Params, _: &mut Dispatcher| -> Result<()> {
            let name = thread::current().name().map(str::to_string);
            sink.lock().unwrap().push(name);
            Ok(())
        });
        d.register_command("exit", stop_command);

        let worker = d.start_async(source("whereami\nexit\nwhereami\n")).unwrap();
        let d = worker.join().unwrap();

        assert!(!d.is_running());
        assert_eq!(
            *names.lock().unwrap(),
            vec![Some(WORKER_THREAD_NAME.to_string())]
        );
    }

    #[test]
    fn test_worker_stop_takes_effect_after_pending_read() {
        let (tx, rx): (Sender<String>, Receiver<String>) = mpsc::channel();
        let (ack_tx, ack_rx) = mpsc::channel::<()>();

        let mut d = Dispatcher::new();
        d.register_command("ack", move |_: &Params, _: &mut Dispatcher| -> Result<()> {
            ack_tx.send(()).ok();
            Ok(())
        });

        let worker = d.start_async(ChannelSource(rx)).unwrap();
        assert!(worker.is_running());

        tx.send("ack".to_string()).unwrap();
        ack_rx.recv().unwrap();

        worker.stop();
        assert!(!worker.is_running());

        // Unblocks the pending read, if any.
        drop(tx);
        let d = worker.join().unwrap();
        assert!(!d.is_running());
    }

    #[test]
    fn test_worker_returns_loop_error() {
        let worker = Dispatcher::new().start_async(FailingSource).unwrap();
        assert!(worker.join().is_err());
    }

    #[test]
    fn test_run_clears_running_flag_when_handler_panics() {
        let mut d = Dispatcher::new();
        d.register_command("boom", panicking_command);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| d.run(&mut source("boom\n"))));

        assert!(outcome.is_err());
        assert!(!d.is_running());
    }

    #[test]
    fn test_worker_clears_running_flag_when_handler_panics() {
        let mut d = Dispatcher::new();
        d.register_command("boom", panicking_command);

        let worker = d.start_async(source("boom\n")).unwrap();
        while !worker.is_finished() {
            thread::sleep(Duration::from_millis(1));
        }

        assert!(!worker.is_running());
        let err = worker.join().err().unwrap();
        assert!(err.to_string().contains("panicked"));
    }
}
