pub mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand, ValueEnum};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs,
    io::{self, stdin},
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use typebook::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    engine::Engine,
    metrics::WpmModel,
    runtime::{AppEvent, CrosstermEventSource, FixedTicker, Runner},
    session::Lifecycle,
    store::SqliteStore,
    writer::BackgroundWriter,
};

/// type whole books in the terminal, with live speed and accuracy and resumable progress
#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// database file (defaults to the state directory)
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// whose progress to load and save
    #[clap(long, global = true)]
    owner: Option<String>,

    /// how words per minute is measured
    #[clap(long, value_enum, global = true)]
    wpm_model: Option<WpmModelArg>,

    /// characters typed between automatic saves
    #[clap(long, global = true)]
    checkpoint_interval: Option<usize>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// import a text file as a book
    Add {
        file: PathBuf,
        /// defaults to the file name
        #[clap(short, long)]
        title: Option<String>,
        #[clap(short, long, default_value = "Unknown")]
        author: String,
    },
    /// list books with your progress
    List,
    /// type a book, resuming where you left off
    Type { book_id: String },
    /// show the settings in effect
    Config {
        /// keep this run's flags as the new defaults
        #[clap(long)]
        save: bool,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum, strum_macros::Display)]
pub enum WpmModelArg {
    /// last 10 seconds of keystrokes, updated as you type
    Window,
    /// whole-session average, updated every second
    Average,
}

impl From<WpmModelArg> for WpmModel {
    fn from(arg: WpmModelArg) -> Self {
        match arg {
            WpmModelArg::Window => WpmModel::SlidingWindow,
            WpmModelArg::Average => WpmModel::SessionAverage,
        }
    }
}

impl Cli {
    /// Stored configuration with this run's flags applied
    fn config(&self, mut cfg: Config) -> Config {
        if let Some(db) = &self.db {
            cfg.db_path = Some(db.clone());
        }
        if let Some(owner) = &self.owner {
            cfg.owner_id = owner.clone();
        }
        if let Some(model) = self.wpm_model {
            cfg.wpm_model = model.into();
        }
        if let Some(interval) = self.checkpoint_interval {
            cfg.checkpoint_interval = interval;
        }
        cfg
    }
}

fn db_path(cfg: &Config) -> PathBuf {
    cfg.db_path
        .clone()
        .or_else(AppDirs::db_path)
        .unwrap_or_else(|| PathBuf::from("typebook.db"))
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = AppDirs::log_dir().unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).ok()?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "typebook.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("typebook=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(nb_writer)
        .with_ansi(false)
        .try_init()
        .ok()
        .map(|_| guard)
}

pub struct App {
    pub engine: Engine<BackgroundWriter>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let _log_guard = configure_logging();

    let config_store = FileConfigStore::new();
    let cfg = cli.config(config_store.load());
    let path = db_path(&cfg);

    match &cli.command {
        Command::Add {
            file,
            title,
            author,
        } => add_book(&path, file, title.as_deref(), author),
        Command::List => list_books(&path, &cfg),
        Command::Type { book_id } => type_book(&path, &cfg, book_id),
        Command::Config { save } => show_config(&config_store, &cfg, *save),
    }
}

fn show_config(store: &FileConfigStore, cfg: &Config, save: bool) -> Result<(), Box<dyn Error>> {
    if save {
        store.save(cfg)?;
        info!(path = %store.path().display(), "configuration saved");
        println!("saved to {}", store.path().display());
    }
    println!("{}", serde_json::to_string_pretty(cfg)?);
    Ok(())
}

fn add_book(
    db: &Path,
    file: &Path,
    title: Option<&str>,
    author: &str,
) -> Result<(), Box<dyn Error>> {
    let content = fs::read_to_string(file)?;
    if content.trim().is_empty() {
        return Err(format!("{} is empty", file.display()).into());
    }

    let title = match title {
        Some(title) => title.to_string(),
        None => file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string()),
    };

    let store = SqliteStore::open(db)?;
    let book = store.add_book(&title, author, &content)?;
    println!(
        "added book {}: {} ({} chars)",
        book.id,
        book.title,
        book.content.chars().count()
    );
    Ok(())
}

fn list_books(db: &Path, cfg: &Config) -> Result<(), Box<dyn Error>> {
    let store = SqliteStore::open(db)?;
    let library = store.library(&cfg.owner_id)?;

    if library.is_empty() {
        println!("no books yet, add one with `typebook add <file>`");
        return Ok(());
    }

    for book in library {
        let status = match &book.progress {
            Some(p) if p.completed => "completed".to_string(),
            Some(p) => format!(
                "{:.0}%",
                typebook::metrics::progress_percent(p.chars_typed, book.total_chars)
            ),
            None => "not started".to_string(),
        };
        println!(
            "{:>4}  {} by {}  [{}]",
            book.id, book.title, book.author, status
        );
    }
    Ok(())
}

fn type_book(db: &Path, cfg: &Config, book_id: &str) -> Result<(), Box<dyn Error>> {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let store = SqliteStore::open(db)?;
    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::new(cfg.tick_rate()));

    let events = runner.sender();
    let writer = BackgroundWriter::spawn(SqliteStore::open(db)?, move |outcome| {
        let _ = events.send(AppEvent::Checkpoint(outcome));
    });

    let engine = Engine::start_or_resume(
        &store,
        book_id,
        &cfg.owner_id,
        cfg.engine_settings(),
        writer,
    )
    .inspect_err(|err| error!(book_id, error = %err, "could not open session"))?;
    let mut app = App { engine };

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app.engine.teardown().shutdown();
    info!(book_id, "typing closed");

    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<CrosstermEventSource, FixedTicker>,
) -> Result<(), Box<dyn Error>> {
    terminal.draw(|f| f.render_widget(&*app, f.area()))?;

    loop {
        let redraw = match runner.step() {
            AppEvent::Tick => app.engine.on_tick(SystemTime::now()),
            AppEvent::Resize => true,
            AppEvent::Checkpoint(outcome) => {
                // failures show up in the save status
                let _ = app.engine.on_checkpoint_outcome(outcome);
                true
            }
            AppEvent::Key(key) => {
                if !handle_key(app, key) {
                    break;
                }
                true
            }
        };

        if redraw {
            terminal.draw(|f| f.render_widget(&*app, f.area()))?;
        }
    }

    Ok(())
}

/// Returns false when the user wants to leave
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    let completed = app.engine.session().lifecycle() == Lifecycle::Completed;

    match key.code {
        KeyCode::Esc => return false,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return false,
        KeyCode::Char('r') if completed => {
            app.engine.retry();
        }
        KeyCode::Backspace if !completed => {
            app.engine.backspace();
        }
        KeyCode::Enter if !completed => {
            app.engine.type_char('\n');
        }
        KeyCode::Tab if !completed => {
            app.engine.type_char('\t');
        }
        KeyCode::Char(c) if !completed => {
            app.engine.type_char(c);
        }
        _ => {}
    }

    true
}
