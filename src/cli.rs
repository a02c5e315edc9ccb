use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use macroflow_core::executor::{ActionExecutor, ActionRun, ExecutionResult};
use macroflow_core::generator::{MacroGenerator, MacroOptions};
use macroflow_core::history::History;
use macroflow_core::input::{Clipboard, EnigoDriver, SystemClipboard};
use macroflow_core::locate::{Locator, XcapScreen};
use macroflow_core::logger;
use macroflow_core::macro_rt::{MacroHost, MacroRuntime};
use macroflow_core::paste::Paster;
use macroflow_core::platform::{create_window_manager, WindowQuery};
use macroflow_core::points::PointRepository;
use macroflow_core::settings::Settings;
use macroflow_core::sleep::sleep_secs;
use macroflow_core::store::JsonStore;
use macroflow_core::template::{Template, TemplateEdit, Variable};
use macroflow_core::types::EntityKind;

fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))
}

fn to_map(pairs: Vec<(String, String)>) -> BTreeMap<String, String> {
    pairs.into_iter().collect()
}

#[derive(Subcommand)]
pub enum TemplateCommand {
    List,
    Show {
        name: String,
    },
    /// Create or replace. Variables as `name:type:default:opt1|opt2`
    Add {
        name: String,
        content: String,
        #[arg(long = "var")]
        vars: Vec<String>,
    },
    /// Change a saved one in place
    Edit {
        name: String,
        #[arg(long)]
        rename: Option<String>,
        #[arg(long)]
        content: Option<String>,
        /// Add or replace a variable, `name:type:default:opt1|opt2`
        #[arg(long = "var")]
        vars: Vec<String>,
        #[arg(long = "remove-var")]
        remove_vars: Vec<String>,
    },
    Delete {
        name: String,
    },
}

#[derive(Subcommand)]
pub enum ActionCommand {
    #[command(flatten)]
    Common(TemplateCommand),
    /// Fill variables and execute
    Run {
        name: String,
        #[arg(long = "set", value_parser = parse_pair)]
        values: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
pub enum PromptCommand {
    #[command(flatten)]
    Common(TemplateCommand),
    /// Fill variables and print the text
    Run {
        name: String,
        #[arg(long = "set", value_parser = parse_pair)]
        values: Vec<(String, String)>,
        /// Also put the text on the clipboard
        #[arg(long)]
        copy: bool,
        /// Paste into the window whose title contains all of these
        #[arg(long = "send")]
        send: Vec<String>,
        /// Press Enter after sending
        #[arg(long)]
        submit: bool,
    },
    /// Render a prompt into a variable of an action, then run the action
    Use {
        prompt: String,
        action: String,
        #[arg(long)]
        target: String,
        #[arg(long = "set", value_parser = parse_pair)]
        values: Vec<(String, String)>,
        #[arg(long = "action-set", value_parser = parse_pair)]
        action_values: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
pub enum WindowCommand {
    List,
    /// Focus the first window whose title contains every part
    Activate {
        parts: Vec<String>,
        /// Match this title substring alone
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        case_sensitive: bool,
    },
}

#[derive(Args)]
pub struct PasteArgs {
    /// Text to paste; read from --file or stdin when absent
    text: Option<String>,
    #[arg(long)]
    file: Option<PathBuf>,
    /// Target window title parts; the focused window when empty
    #[arg(long = "window")]
    window: Vec<String>,
    #[arg(long)]
    submit: bool,
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Seconds to wait before pasting into the focused window
    #[arg(long, default_value_t = 0.0)]
    delay: f64,
}

pub fn generate(
    settings: &Settings,
    store: &str,
    output: Option<&str>,
    window: Option<String>,
    repetitions: Option<u32>,
    pause: Option<f64>,
) -> Result<()> {
    let points = PointRepository::new(settings.points_dir()).load_named(store)?;
    let mut options = MacroOptions::from_settings(settings);
    options.target_window = window;
    if let Some(n) = repetitions {
        options.repetitions = n;
    }
    if let Some(p) = pause {
        options.pause_secs = p;
    }
    let path = MacroGenerator::from_settings(settings)?.write_script(&points, &options, output)?;
    println!("wrote {}", path.display());
    Ok(())
}

pub fn play(settings: &Settings, script: &Path, repetitions: Option<u32>, pause: Option<f64>, stub: bool) -> Result<()> {
    let host = MacroHost {
        input: Box::new(EnigoDriver::new()?),
        windows: create_window_manager(stub)?,
        locator: Some(Locator::new(Box::new(XcapScreen), settings.macros.match_tolerance)),
    };
    let runtime = MacroRuntime::load(script, host)?;
    println!("playing {} ({} points)", script.display(), runtime.point_count()?);
    runtime.run(repetitions, pause)?;
    Ok(())
}

fn store_for(settings: &Settings, kind: EntityKind) -> JsonStore<Template> {
    match kind {
        EntityKind::Action => JsonStore::new(settings.actions_dir()),
        EntityKind::Prompt => JsonStore::new(settings.prompts_dir()),
    }
}

fn print_lint(template: &Template) {
    for warning in template.lint() {
        println!("warning: {}", warning);
    }
}

fn common(store: &JsonStore<Template>, kind: EntityKind, command: TemplateCommand) -> Result<()> {
    match command {
        TemplateCommand::List => {
            let list = store.list()?;
            if list.is_empty() {
                println!("no {}s saved in {}", kind.label(), store.dir().display());
            }
            for t in list {
                println!("{:<24} {}", t.name, t.content.lines().next().unwrap_or(""));
            }
        }
        TemplateCommand::Show { name } => {
            let t = store.get(&name)?;
            println!("{} {}\n\n{}\n", kind.label(), t.name, t.content);
            for v in &t.variables {
                let mut line = format!("  <{}> {} default '{}'", v.name, v.kind.label(), v.default);
                if !v.options.is_empty() {
                    line.push_str(&format!(" options {}", v.options.join("|")));
                }
                println!("{}", line);
            }
            println!("\npreview: {}", t.preview());
            print_lint(&t);
        }
        TemplateCommand::Add { name, content, vars } => {
            let mut t = Template::new(name, content);
            for spec in &vars {
                t.add_variable(Variable::parse_spec(spec)?)?;
            }
            print_lint(&t);
            let path = store.save(&t, None)?;
            println!("saved {}", path.display());
        }
        TemplateCommand::Edit { name, rename, content, vars, remove_vars } => {
            let edit = TemplateEdit {
                rename,
                content,
                remove: remove_vars,
                add: vars.iter().map(|s| Variable::parse_spec(s)).collect::<macroflow_core::Result<_>>()?,
            };
            if edit.is_empty() {
                bail!("nothing to change; give --rename, --content, --var or --remove-var");
            }
            let (t, path) = store.edit(&name, edit)?;
            print_lint(&t);
            println!("saved {}", path.display());
        }
        TemplateCommand::Delete { name } => {
            store.delete(&name)?;
            println!("deleted {} '{}'", kind.label(), name);
        }
    }
    Ok(())
}

fn finish_run(settings: &Settings, result: ExecutionResult, command: &str) -> Result<()> {
    if settings.record_history {
        if let Err(e) = History::new(settings.history_dir()).record(&result, EntityKind::Action, command) {
            logger::warn(&format!("history not written: {}", e));
        }
    }
    print!("{}", result.stdout);
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }
    if !result.succeeded() {
        bail!("'{}' exited with code {}", result.target_name, result.return_code);
    }
    Ok(())
}

fn execute(settings: &Settings, mut run: ActionRun, values: &BTreeMap<String, String>) -> Result<()> {
    let command = run.fill(values)?;
    let result = run.execute(&ActionExecutor::new(&settings.executor))?;
    finish_run(settings, result, &command)
}

pub fn action(settings: &Settings, command: ActionCommand) -> Result<()> {
    let store = store_for(settings, EntityKind::Action);
    match command {
        ActionCommand::Common(c) => common(&store, EntityKind::Action, c),
        ActionCommand::Run { name, values } => execute(settings, ActionRun::new(store.get(&name)?), &to_map(values)),
    }
}

pub fn prompt(settings: &Settings, command: PromptCommand, stub: bool) -> Result<()> {
    let store = store_for(settings, EntityKind::Prompt);
    match command {
        PromptCommand::Common(c) => common(&store, EntityKind::Prompt, c),
        PromptCommand::Run { name, values, copy, send, submit } => {
            let text = store.get(&name)?.render(&to_map(values))?;
            if settings.record_history {
                if let Err(e) = History::new(settings.history_dir()).record_prompt(&name, &text) {
                    logger::warn(&format!("history not written: {}", e));
                }
            }
            println!("{}", text);
            if copy {
                SystemClipboard::new()?.set_text(&text)?;
            }
            if !send.is_empty() {
                let windows = create_window_manager(stub)?;
                let (mut input, mut clipboard) = (EnigoDriver::new()?, SystemClipboard::new()?);
                Paster::new(&mut input, &mut clipboard, &settings.paste).send_to_window(
                    windows.as_ref(),
                    &WindowQuery::containing(send),
                    &text,
                    submit,
                )?;
            }
            Ok(())
        }
        PromptCommand::Use { prompt, action, target, values, action_values } => {
            let prompt = store.get(&prompt)?;
            let action = store_for(settings, EntityKind::Action).get(&action)?;
            let run = ActionRun::with_input(&prompt, &to_map(values), action, &target)?;
            execute(settings, run, &to_map(action_values))
        }
    }
}

pub fn history(settings: &Settings, limit: usize) -> Result<()> {
    let records = History::new(settings.history_dir()).load()?;
    if records.is_empty() {
        println!("no history yet");
    }
    for r in records.iter().take(limit) {
        println!("{} [{}] {} (exit {})", r.timestamp, r.kind.label(), r.target_name, r.return_code);
        println!("    {}", r.content.replace('\n', "\n    "));
    }
    Ok(())
}

pub fn windows(command: WindowCommand, stub: bool) -> Result<()> {
    let manager = create_window_manager(stub)?;
    match command {
        WindowCommand::List => {
            for (i, title) in manager.list_windows()?.iter().enumerate() {
                println!("{:>3}. {}", i + 1, title);
            }
        }
        WindowCommand::Activate { parts, name, case_sensitive } => {
            if parts.is_empty() && name.is_none() {
                bail!("give title parts or --name");
            }
            let mut query = WindowQuery::containing(parts);
            query.title_name = name;
            if case_sensitive {
                query = query.case_sensitive();
            }
            match manager.activate_window(&query)? {
                Some(w) => println!("activated \"{}\"", w.title),
                None => bail!("no window matches"),
            }
        }
    }
    Ok(())
}

pub fn paste(settings: &Settings, args: PasteArgs, stub: bool) -> Result<()> {
    let text = match (args.text, &args.file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };

    let mut paste_settings = settings.paste.clone();
    if let Some(n) = args.chunk_size {
        paste_settings.chunk_size = n;
    }
    let (mut input, mut clipboard) = (EnigoDriver::new()?, SystemClipboard::new()?);
    let mut paster = Paster::new(&mut input, &mut clipboard, &paste_settings);

    let delivered = if args.window.is_empty() {
        sleep_secs(args.delay);
        paster.paste(&text, paste_settings.chunk_size)?
    } else {
        let windows = create_window_manager(stub)?;
        paster.send_to_window(windows.as_ref(), &WindowQuery::containing(args.window), &text, args.submit)?
    };
    println!("pasted {} characters", delivered);
    Ok(())
}
