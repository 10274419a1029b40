use std::io::{self, Write};
use std::path::Path;

use jshell::config::Config;
use jshell::history::History;
use jshell::status::FAILURE;
use jshell::{Shell, logging};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if matches!(args.first().map(String::as_str), Some("--version" | "-V")) {
        println!("jshell {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config = Config::load();
    logging::init(&config);

    // The shell survives Ctrl-C; the foreground program receives it.
    if let Err(e) = ctrlc::set_handler(|| {
        println!();
        let _ = io::stdout().flush();
    }) {
        eprintln!("jshell: cannot install Ctrl-C handler: {e}");
    }

    let mut shell = Shell::new(config);

    let code = match args.first() {
        Some(script) => match shell.source(Path::new(script)) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("jshell: cannot read '{script}': {e}");
                FAILURE
            }
        },
        None => {
            if shell.config.save_history {
                shell.history = History::open(shell.config.history_path(), shell.config.max_history);
            }
            shell.source_rc();
            let code = if shell.running {
                shell.run_interactive(io::stdin().lock())
            } else {
                shell.last_exit_code
            };
            if let Err(e) = shell.history.save() {
                log::warn!("cannot save history: {e}");
            }
            code
        }
    };

    log::info!("exiting with {code}");
    std::process::exit(code);
}
