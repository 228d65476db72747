use anyhow::{Context, Result, bail};
use argh::FromArgs;
use colored::Colorize;
use regex::RegexBuilder;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use script_launcher::error::ProbeError;
use script_launcher::probe::{self, TEST_TIMEOUT};
use script_launcher::session::{OutputLine, SessionState, StreamKind};
use script_launcher::{
    Catalog, DefaultsUpdate, EnvironmentDescriptor, LaunchRequest, Launcher, OutputPump,
    OutputSink, ProcessSession, ScriptDescriptor, ScriptKind, logging,
};
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::mpsc::{RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};

#[derive(FromArgs)]
/// Keep a catalog of scripts and launch them.
struct Cli {
    #[argh(option)]
    /// catalog file; defaults to $SCRIPT_LAUNCHER_CONFIG or ~/script_launcher_config.yaml
    config: Option<PathBuf>,

    #[argh(switch, short = 'v')]
    /// log debug details to stderr
    verbose: bool,

    #[argh(subcommand)]
    command: Subcommand,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Subcommand {
    List(ListCmd),
    Run(RunCmd),
    Add(AddCmd),
    Edit(EditCmd),
    Remove(RemoveCmd),
    Categories(CategoriesCmd),
    Envs(EnvsCmd),
    AddEnv(AddEnvCmd),
    EditEnv(EditEnvCmd),
    RemoveEnv(RemoveEnvCmd),
    Probe(ProbeCmd),
    TestEnv(TestEnvCmd),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "list")]
/// List scripts by category.
struct ListCmd {
    #[argh(option)]
    /// case-insensitive pattern matched against names and descriptions
    filter: Option<String>,

    #[argh(option)]
    /// only scripts of this type (python, batch, powershell, executable)
    kind: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
/// Run a script. Flags not given fall back to the script's saved defaults.
struct RunCmd {
    #[argh(positional)]
    /// script name
    name: String,

    #[argh(option)]
    /// category holding the script; needed when the name is not unique
    category: Option<String>,

    #[argh(option)]
    /// argument string passed to the script, quoted like a shell command line
    args: Option<String>,

    #[argh(option)]
    /// working directory; defaults to the script's directory
    cwd: Option<PathBuf>,

    #[argh(option)]
    /// interpreter environment to use for this run
    env: Option<String>,

    #[argh(switch)]
    /// show the script's output here
    output: bool,

    #[argh(switch)]
    /// do not show the script's output
    no_output: bool,

    #[argh(switch)]
    /// forward typed lines to the script (implies --output)
    interactive: bool,

    #[argh(switch)]
    /// store this run's settings as the script's defaults
    save_defaults: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "add")]
/// Add a script to the catalog.
struct AddCmd {
    #[argh(positional)]
    /// path to the script
    path: PathBuf,

    #[argh(option)]
    /// display name; defaults to the file name without extension
    name: Option<String>,

    #[argh(option)]
    /// category; defaults to the catalog's default category
    category: Option<String>,

    #[argh(option)]
    /// script type; guessed from the extension when omitted
    kind: Option<String>,

    #[argh(option)]
    /// interpreter environment for python scripts
    env: Option<String>,

    #[argh(option, default = "String::new()")]
    /// free-form description
    description: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "edit")]
/// Change a catalogued script. Only the given fields change.
struct EditCmd {
    #[argh(positional)]
    /// script name
    name: String,

    #[argh(option)]
    /// category holding the script
    category: Option<String>,

    #[argh(option)]
    /// new display name
    rename: Option<String>,

    #[argh(option)]
    /// move the script to this category
    move_to: Option<String>,

    #[argh(option)]
    /// new path to the script
    path: Option<PathBuf>,

    #[argh(option)]
    /// new script type
    kind: Option<String>,

    #[argh(option)]
    /// interpreter environment; an empty value clears it
    env: Option<String>,

    #[argh(option)]
    /// new description
    description: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "remove")]
/// Remove a script from the catalog.
struct RemoveCmd {
    #[argh(positional)]
    /// script name
    name: String,

    #[argh(option)]
    /// category holding the script
    category: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "categories")]
/// List, add, rename, remove or reorder categories.
struct CategoriesCmd {
    #[argh(subcommand)]
    action: CategoryAction,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum CategoryAction {
    List(CategoryListCmd),
    Add(CategoryAddCmd),
    Rename(CategoryRenameCmd),
    Remove(CategoryRemoveCmd),
    Order(CategoryOrderCmd),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "list")]
/// List categories in display order.
struct CategoryListCmd {}

#[derive(FromArgs)]
#[argh(subcommand, name = "add")]
/// Add an empty category.
struct CategoryAddCmd {
    #[argh(positional)]
    /// category name
    name: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "rename")]
/// Rename a category and the scripts' references to it.
struct CategoryRenameCmd {
    #[argh(positional)]
    /// current name
    from: String,

    #[argh(positional)]
    /// new name
    to: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "remove")]
/// Remove a category; its scripts move to the default category.
struct CategoryRemoveCmd {
    #[argh(positional)]
    /// category name
    name: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "order")]
/// Set the display order. Categories left out follow by name.
struct CategoryOrderCmd {
    #[argh(positional)]
    /// category names, first shown first
    names: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "envs")]
/// List interpreter environments.
struct EnvsCmd {}

#[derive(FromArgs)]
#[argh(subcommand, name = "add-env")]
/// Register an interpreter environment.
struct AddEnvCmd {
    #[argh(positional)]
    /// environment name
    name: String,

    #[argh(positional)]
    /// path to the interpreter executable
    path: PathBuf,

    #[argh(option, default = "String::new()")]
    /// free-form description
    description: String,

    #[argh(switch)]
    /// make this the environment new scripts use
    default: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "edit-env")]
/// Change a registered environment. Only the given fields change.
struct EditEnvCmd {
    #[argh(positional)]
    /// environment name
    name: String,

    #[argh(option)]
    /// new name; scripts using the environment follow the rename
    rename: Option<String>,

    #[argh(option)]
    /// new path to the interpreter executable
    path: Option<PathBuf>,

    #[argh(option)]
    /// new description
    description: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "remove-env")]
/// Remove an interpreter environment.
struct RemoveEnvCmd {
    #[argh(positional)]
    /// environment name
    name: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "probe")]
/// Show the version and installed packages of an environment.
struct ProbeCmd {
    #[argh(positional)]
    /// environment name
    name: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "test-env")]
/// Check that an environment's interpreter starts.
struct TestEnvCmd {
    #[argh(positional)]
    /// environment name
    name: String,
}

fn main() -> std::process::ExitCode {
    let cli: Cli = argh::from_env();
    logging::init(cli.verbose);

    match run(cli) {
        Ok(code) => std::process::ExitCode::from(code),
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let path = cli.config.unwrap_or_else(Catalog::default_path);
    let mut catalog = Catalog::load_or_default(&path)
        .with_context(|| format!("cannot load catalog {}", path.display()))?;

    match cli.command {
        Subcommand::List(cmd) => list(&catalog, cmd),
        Subcommand::Run(cmd) => run_script(&mut catalog, cmd),
        Subcommand::Add(cmd) => add(&mut catalog, cmd),
        Subcommand::Edit(cmd) => edit(&mut catalog, cmd),
        Subcommand::Remove(cmd) => {
            let removed = catalog.remove_script(&cmd.name, cmd.category.as_deref())?;
            catalog.save()?;
            println!("removed '{}' from {}", removed.name, removed.category);
            Ok(0)
        }
        Subcommand::Categories(cmd) => categories(&mut catalog, cmd.action),
        Subcommand::Envs(_) => {
            list_envs(&catalog);
            Ok(0)
        }
        Subcommand::AddEnv(cmd) => {
            let path = std::path::absolute(&cmd.path)
                .with_context(|| format!("cannot resolve {}", cmd.path.display()))?;
            let mut env = EnvironmentDescriptor::new(cmd.name.clone(), path);
            env.description = cmd.description;
            catalog.add_environment(env)?;
            if cmd.default || catalog.settings.default_environment.is_empty() {
                catalog.settings.default_environment = cmd.name.clone();
            }
            catalog.save()?;
            println!("added environment '{}'", cmd.name);
            Ok(0)
        }
        Subcommand::EditEnv(cmd) => {
            let path = cmd
                .path
                .as_deref()
                .map(std::path::absolute)
                .transpose()
                .context("cannot resolve the interpreter path")?;
            let name = cmd.rename.clone().unwrap_or_else(|| cmd.name.clone());
            catalog.update_environment(&cmd.name, |env| {
                if let Some(new_name) = cmd.rename {
                    env.name = new_name;
                }
                if let Some(path) = path {
                    env.path = path;
                }
                if let Some(description) = cmd.description {
                    env.description = description;
                }
            })?;
            catalog.save()?;
            println!("updated environment '{name}'");
            Ok(0)
        }
        Subcommand::RemoveEnv(cmd) => {
            catalog.remove_environment(&cmd.name)?;
            catalog.save()?;
            println!("removed environment '{}'", cmd.name);
            Ok(0)
        }
        Subcommand::Probe(cmd) => {
            let env = environment(&catalog, &cmd.name)?;
            let info = probe::get_python_info(&env.path);
            println!("{} {}", "version:".bold(), info.version);
            println!("{}\n{}", "packages:".bold(), info.packages);
            Ok(0)
        }
        Subcommand::TestEnv(cmd) => {
            let env = environment(&catalog, &cmd.name)?;
            match probe::test_environment(&env.path, TEST_TIMEOUT) {
                Ok(version) => {
                    println!("{} {version}", "environment OK:".green());
                    Ok(0)
                }
                Err(ProbeError::Timeout { timeout }) => {
                    bail!("environment '{}' did not answer within {timeout:?}", cmd.name)
                }
                Err(err) => {
                    Err(err).with_context(|| format!("environment '{}' is broken", cmd.name))
                }
            }
        }
    }
}

fn environment<'a>(catalog: &'a Catalog, name: &str) -> Result<&'a EnvironmentDescriptor> {
    catalog
        .environments()
        .get(name)
        .with_context(|| format!("no environment named '{name}'"))
}

fn list(catalog: &Catalog, cmd: ListCmd) -> Result<u8> {
    let pattern = cmd
        .filter
        .as_deref()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid filter pattern: {p}"))
        })
        .transpose()?;
    let kind = cmd.kind.as_deref().map(ScriptKind::from_tag);

    let wanted = |script: &ScriptDescriptor| {
        kind.as_ref().is_none_or(|k| *k == script.kind)
            && pattern
                .as_ref()
                .is_none_or(|re| re.is_match(&script.name) || re.is_match(&script.description))
    };

    for (category, scripts) in catalog.categories() {
        let shown: Vec<&ScriptDescriptor> = scripts.iter().filter(|s| wanted(s)).collect();
        if shown.is_empty() {
            continue;
        }
        println!("{}", category.bold());
        for script in shown {
            let mut line = format!("  {} [{}]", script.name, script.kind);
            if let Some(env) = &script.env {
                line.push_str(&format!(" env={env}"));
            }
            if !script.description.is_empty() {
                line.push_str(&format!(" - {}", script.description));
            }
            println!("{line}");
        }
    }
    Ok(0)
}

fn list_envs(catalog: &Catalog) {
    if catalog.environments().is_empty() {
        println!("no environments registered");
        return;
    }
    for env in catalog.environments().iter() {
        let marker = if env.name == catalog.settings.default_environment {
            "*"
        } else {
            " "
        };
        print!("{marker} {} {}", env.name.bold(), env.path.display());
        if !env.description.is_empty() {
            print!(" - {}", env.description);
        }
        println!();
    }
}

fn add(catalog: &mut Catalog, cmd: AddCmd) -> Result<u8> {
    let path = std::path::absolute(&cmd.path)
        .with_context(|| format!("cannot resolve {}", cmd.path.display()))?;
    if !path.is_file() {
        bail!("no such file: {}", path.display());
    }
    let name = match cmd.name {
        Some(name) => name,
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .with_context(|| format!("cannot derive a name from {}", path.display()))?,
    };
    let kind = match cmd.kind.as_deref() {
        Some(tag) => ScriptKind::from_tag(tag),
        None => ScriptKind::detect(&path),
    };

    let mut script = ScriptDescriptor::new(name, path, kind);
    script.category = cmd.category.unwrap_or_default();
    script.description = cmd.description;
    if script.capabilities().needs_environment {
        script.env = cmd.env.or_else(|| {
            Some(catalog.settings.default_environment.clone()).filter(|e| !e.is_empty())
        });
    }
    if let Some(dir) = script.script_dir() {
        catalog.settings.last_directory = dir.to_path_buf();
    }

    let summary = format!("added '{}' [{}]", script.name, script.kind);
    catalog.add_script(script)?;
    catalog.save()?;
    println!("{summary}");
    Ok(0)
}

fn edit(catalog: &mut Catalog, cmd: EditCmd) -> Result<u8> {
    let path = match &cmd.path {
        Some(path) => {
            let path = std::path::absolute(path)
                .with_context(|| format!("cannot resolve {}", path.display()))?;
            if !path.is_file() {
                bail!("no such file: {}", path.display());
            }
            Some(path)
        }
        None => None,
    };
    let name = cmd.rename.clone().unwrap_or_else(|| cmd.name.clone());

    catalog.update_script(&cmd.name, cmd.category.as_deref(), |script| {
        if let Some(new_name) = cmd.rename {
            script.name = new_name;
        }
        if let Some(category) = cmd.move_to {
            script.category = category;
        }
        if let Some(path) = path {
            script.path = path;
        }
        if let Some(tag) = cmd.kind.as_deref() {
            script.kind = ScriptKind::from_tag(tag);
        }
        if let Some(env) = cmd.env {
            script.env = Some(env).filter(|e| !e.trim().is_empty());
        }
        if let Some(description) = cmd.description {
            script.description = description;
        }
    })?;
    catalog.save()?;
    println!("updated '{name}'");
    Ok(0)
}

fn categories(catalog: &mut Catalog, action: CategoryAction) -> Result<u8> {
    match action {
        CategoryAction::List(_) => {
            let default = catalog.settings.default_category.as_str();
            for (name, scripts) in catalog.categories() {
                let marker = if name == default { "*" } else { " " };
                println!("{marker} {} ({})", name.bold(), scripts.len());
            }
            return Ok(0);
        }
        CategoryAction::Add(cmd) => {
            catalog.add_category(&cmd.name)?;
            println!("added category '{}'", cmd.name.trim());
        }
        CategoryAction::Rename(cmd) => {
            catalog.rename_category(&cmd.from, &cmd.to)?;
            println!("renamed category '{}' to '{}'", cmd.from, cmd.to.trim());
        }
        CategoryAction::Remove(cmd) => {
            let moved = catalog.remove_category(&cmd.name)?;
            println!(
                "removed category '{}'; {moved} script(s) moved to '{}'",
                cmd.name, catalog.settings.default_category
            );
        }
        CategoryAction::Order(cmd) => {
            catalog.set_category_order(cmd.names)?;
            println!("order: {}", catalog.category_order().join(", "));
        }
    }
    catalog.save()?;
    Ok(0)
}

fn run_script(catalog: &mut Catalog, cmd: RunCmd) -> Result<u8> {
    if cmd.output && cmd.no_output {
        bail!("--output and --no-output are mutually exclusive");
    }
    let script = catalog
        .find_script(&cmd.name, cmd.category.as_deref())?
        .clone();

    let mut request = LaunchRequest::from_defaults(&script);
    if let Some(args) = cmd.args {
        request.arguments = args;
    }
    if let Some(dir) = cmd.cwd {
        request.working_dir = Some(dir);
    }
    if cmd.output {
        request.show_output = true;
    }
    if cmd.no_output {
        request.show_output = false;
        request.interactive = false;
    }
    if cmd.interactive {
        request.interactive = true;
    }
    request.environment_override = cmd.env;
    let request = request.normalized(script.capabilities());

    let session = Launcher::default()
        .run(&script, catalog.environments(), &request)
        .with_context(|| format!("cannot run '{}'", script.name))?;

    if cmd.save_defaults {
        let update = DefaultsUpdate::from_request(&script, &request);
        if catalog.apply_defaults(&script.name, Some(&script.category), update)? {
            catalog.save()?;
        }
    }

    if !session.is_captured() {
        println!("started '{}' (pid {})", script.name, session.id());
        return Ok(0);
    }
    Ok(watch(session))
}

/// Terminal side of a captured session.
#[derive(Default)]
struct Console {
    exit: Option<SessionState>,
}

impl OutputSink for Console {
    fn line(&mut self, line: &OutputLine) {
        match line.stream {
            StreamKind::Stdout => println!("{}", line.text),
            StreamKind::Stderr => println!("{}", line.text.red()),
        }
    }

    fn input_echo(&mut self, text: &str) {
        println!("{}", format!("> {text}").dimmed());
    }

    fn finished(&mut self, state: SessionState) {
        let text = match state {
            SessionState::Finished(Some(code)) => format!("[process exited with code {code}]"),
            _ => "[process exited]".to_string(),
        };
        println!("{}", text.dimmed());
        self.exit = Some(state);
    }
}

enum Input {
    Line(String),
    Close { confirmed: bool },
}

fn watch(session: ProcessSession) -> u8 {
    let interactive = session.is_interactive();
    let terminal = std::io::stdin().is_terminal();
    let (sender, receiver) = channel();
    let reader = if terminal {
        Some(spawn_line_editor(sender))
    } else if interactive {
        spawn_stdin_reader(sender);
        None
    } else {
        None
    };
    let mut inputs = (terminal || interactive).then_some(receiver);

    let mut pump = OutputPump::new(session);
    let mut console = Console::default();
    let mut exit = 0;
    while pump.tick(&mut console) {
        let Some(rx) = &inputs else {
            thread::sleep(pump.interval());
            continue;
        };
        match rx.recv_timeout(pump.interval()) {
            Ok(Input::Line(text)) => {
                if !pump.send_input(&text, &mut console) {
                    eprintln!("{}", "[script does not accept input]".yellow());
                }
            }
            Ok(Input::Close { confirmed }) => {
                if pump.request_close(|| confirmed) {
                    println!("{}", "[terminated]".yellow());
                    exit = 130;
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => inputs = None,
        }
    }

    if let Some(SessionState::Finished(Some(code))) = console.exit {
        exit = u8::try_from(code).unwrap_or(1);
    }
    if let Some(handle) = reader {
        drop(inputs);
        println!("{}", "press Enter to close".dimmed());
        let _ = handle.join();
    }
    exit
}

fn spawn_line_editor(sender: Sender<Input>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(err) => {
                tracing::warn!(error = %err, "line editor unavailable");
                return;
            }
        };
        loop {
            let input = match rl.readline("") {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    Input::Line(line)
                }
                Err(ReadlineError::Interrupted) => {
                    let answer = rl.readline("terminate the running script? [y/N] ");
                    let confirmed = matches!(answer, Ok(a) if a.trim().eq_ignore_ascii_case("y"));
                    Input::Close { confirmed }
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "cannot read input");
                    break;
                }
            };
            let done = matches!(input, Input::Close { confirmed: true });
            if sender.send(input).is_err() || done {
                break;
            }
        }
    })
}

fn spawn_stdin_reader(sender: Sender<Input>) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if sender.send(Input::Line(line)).is_err() {
                break;
            }
        }
    });
}
