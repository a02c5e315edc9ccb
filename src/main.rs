mod cli;
mod menu;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use macroflow_core::history::History;
use macroflow_core::settings::Settings;
use macroflow_core::{logger, runner};

#[derive(Parser)]
#[command(name = "macroflow", version)]
#[command(about = "Record click macros, replay them, and run templated shell actions")]
struct Cli {
    /// Use the in-memory window list instead of the desktop
    #[arg(long, global = true)]
    stub: bool,

    #[arg(long, global = true, default_value = "settings.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive recorder menu
    Record,
    /// Turn a saved point set into a Lua macro
    Generate {
        store: String,
        #[arg(long)]
        output: Option<String>,
        /// Focus the window whose title contains this before replaying
        #[arg(long)]
        window: Option<String>,
        #[arg(long)]
        repetitions: Option<u32>,
        #[arg(long)]
        pause: Option<f64>,
    },
    /// Replay a generated macro
    Play {
        script: PathBuf,
        #[arg(long)]
        repetitions: Option<u32>,
        #[arg(long)]
        pause: Option<f64>,
    },
    /// Templated shell commands
    Action {
        #[command(subcommand)]
        command: cli::ActionCommand,
    },
    /// Templated text prompts
    Prompt {
        #[command(subcommand)]
        command: cli::PromptCommand,
    },
    /// Past executions, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Windows {
        #[command(subcommand)]
        command: cli::WindowCommand,
    },
    /// Paste text into a window in clipboard-sized chunks
    Paste(cli::PasteArgs),
    /// Browse and run actions and prompts
    Tui,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config);

    let logs_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("logs");
    logger::init(&logs_dir, true)?;
    logger::info(&format!("macroflow started ({})", cli.config.display()));

    match cli.command {
        Commands::Record => menu::run(&settings),
        Commands::Generate { store, output, window, repetitions, pause } => {
            cli::generate(&settings, &store, output.as_deref(), window, repetitions, pause)
        }
        Commands::Play { script, repetitions, pause } => cli::play(&settings, &script, repetitions, pause, cli.stub),
        Commands::Action { command } => cli::action(&settings, command),
        Commands::Prompt { command } => cli::prompt(&settings, command, cli.stub),
        Commands::History { limit } => cli::history(&settings, limit),
        Commands::Windows { command } => cli::windows(command, cli.stub),
        Commands::Paste(args) => cli::paste(&settings, args, cli.stub),
        Commands::Tui => run_tui(&settings),
    }
}

fn run_tui(settings: &Settings) -> Result<()> {
    let (log_tx, log_rx) = std::sync::mpsc::channel::<String>();
    logger::set_tui_sender(log_tx);

    // not joined; it may still be inside an action at exit
    let (job_tx, outcome_rx, _worker) = runner::spawn(settings);
    let mut app = macroflow_tui::App::new(settings.actions_dir(), settings.prompts_dir(), log_rx, job_tx, outcome_rx);
    if settings.record_history {
        app = app.with_history(History::new(settings.history_dir()));
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = macroflow_tui::event::run(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    result
}
