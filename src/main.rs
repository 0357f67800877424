use anyhow::Result;
use interactive_cli::config::{CliArgs, init_logging};
use interactive_cli::{Dispatcher, EditorSource, Params, ReaderSource, builtin};
use std::io::{self, IsTerminal, Write};

fn greet(params: &Params, dispatcher: &mut Dispatcher) -> Result<()> {
    let name = params.get("name").map(String::as_str).unwrap_or("World");
    writeln!(dispatcher.output(), "Hello {}!", name)?;
    Ok(())
}

fn main() -> Result<()> {
    let args: CliArgs = argh::from_env();
    init_logging(&args.log_filter)?;

    let mut cli = Dispatcher::new();
    builtin::register_defaults(&mut cli);
    cli.register_command("greet", greet);

    if let Some(script) = &args.script {
        builtin::execute_file(&mut cli, script, args.print_lines)?;
    }

    if args.run_async {
        let worker = cli.start_async(ReaderSource::stdin())?;
        worker.join()?;
    } else if io::stdin().is_terminal() {
        let mut editor = EditorSource::new(args.prompt.as_str())?;
        cli.run(&mut editor)?;
    } else {
        cli.run(&mut ReaderSource::stdin())?;
    }
    Ok(())
}
