use clap::{Arg, ArgAction, ArgMatches, Command};
use nuwa_terminal::backends::ModelRegistry;
use nuwa_terminal::config::Config;
use nuwa_terminal::dispatcher::Dispatcher;
use nuwa_terminal::mode::{Mode, ModeManager};
use nuwa_terminal::providers::SystemDirProvider;
use nuwa_terminal::repl;
use nuwa_terminal::script::ScriptMaterializer;
use nuwa_terminal::shell::ShellExecutor;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Mode flags in precedence order.
const MODE_FLAGS: [(&str, Mode); 5] = [
    ("chat", Mode::Chat),
    ("cmd", Mode::Command),
    ("task", Mode::Task),
    ("agent", Mode::Agent),
    ("bash", Mode::Bash),
];

fn cli() -> Command {
    Command::new("nuwa")
        .about("NUWA terminal - chat with an LLM, run the commands and scripts it writes")
        .long_about(
            "nuwa routes each line you type through the current mode: chat with the model, \
             have it pick a shell command (cmdmode), write and run a script (taskmode), \
             troubleshoot step by step (agentmode), or run input directly (bashmode).",
        )
        .arg(Arg::new("interactive")
            .short('i')
            .help("Start the interactive terminal (default)")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("chat")
            .short('c')
            .help("Start in chat mode")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("cmd")
            .short('m')
            .help("Start in command mode")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("task")
            .short('t')
            .help("Start in task mode")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("agent")
            .short('a')
            .help("Start in agent mode")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("bash")
            .short('b')
            .help("Start in bash mode")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("query")
            .short('q')
            .help("Run one input and exit")
            .value_name("TEXT")
            .num_args(1))
        .arg(Arg::new("config")
            .long("config")
            .help("Show configuration information")
            .action(ArgAction::SetTrue))
}

fn initial_mode(matches: &ArgMatches) -> Mode {
    MODE_FLAGS
        .iter()
        .find(|(flag, _)| matches.get_flag(flag))
        .map(|(_, mode)| *mode)
        .unwrap_or_default()
}

/// The REPL starts unless a lone `-q` asks for a single turn. A mode flag on
/// its own starts the REPL in that mode.
fn wants_repl(matches: &ArgMatches) -> bool {
    !matches.contains_id("query") || matches.get_flag("interactive")
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    if matches.get_flag("config") {
        Config::show_config_info()?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load()?;
    let model = ModelRegistry::with_defaults().build(&config)?;

    let modes = ModeManager::new(Arc::new(SystemDirProvider), initial_mode(&matches))?;
    let shell = ShellExecutor::system();
    let scripts = ScriptMaterializer::new(config.home.as_deref(), shell.clone())?;

    let query = matches.get_one::<String>("query");
    let interactive = wants_repl(&matches);

    let stdout = std::io::stdout();
    let color = interactive && stdout.is_terminal();
    let mut dispatcher = Dispatcher::new(modes, model.clone(), shell, scripts, stdout)
        .with_home(config.home.clone())
        .with_color(color);

    let mut status = ExitCode::SUCCESS;
    if let Some(query) = query {
        info!("Running single query in {}", dispatcher.modes().current_mode());
        if dispatcher.try_handle(query).await.is_err() {
            status = ExitCode::FAILURE;
        }
    }

    if interactive {
        repl::run(&mut dispatcher).await?;
    }

    if let Err(e) = model.close().await {
        warn!("Failed to close {} backend: {}", model.name(), e);
    }
    Ok(status)
}
