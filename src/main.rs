use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};

use fittrack::export::{export_history, DateRange, ExportFormat};
use fittrack::logging::{init_logging, log_error};
use fittrack::{
    AiRoutineStrategy, AppConfig, ClockTime, ExerciseEdit, ExerciseEntry, ExerciseField, FatigueLevel, FavoriteToggle,
    FitTrack, FitTrackError, GeminiOracle, InProgressSession, LogLevel, ManualAssembly, RetryPolicy, SessionField,
    SessionKind, StartOutcome, Weekday,
};

/// FitTrack - weekly training planner and workout log
///
/// Plan the week, start today's session from the AI coach or from your
/// favorite exercises, tick exercises off, and keep a history of finished
/// workouts.
#[derive(Parser)]
#[command(name = "fittrack")]
#[command(version)]
#[command(about = "Weekly training planner and workout log", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Weekly schedule
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// The in-progress workout
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Favorite exercises
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },

    /// Finished workouts
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Configure application settings
    Config {
        /// List all configuration options
        #[arg(short, long)]
        list: bool,

        /// Set a configuration value (key=value)
        #[arg(short, long)]
        set: Option<String>,

        /// Get a configuration value
        #[arg(short, long)]
        get: Option<String>,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Show the whole week
    Show,

    /// Show the plan for today or a given date
    Today {
        /// Date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Add a session to a day
    Add {
        day: String,

        /// Session type (defaults to the first known type)
        #[arg(short = 't', long = "type")]
        session_type: Option<String>,

        /// Start time (HH:MM)
        #[arg(long)]
        time: Option<ClockTime>,
    },

    /// Change a session's time or type
    Set {
        day: String,

        /// Session number as shown by `schedule show`
        number: usize,

        #[arg(long)]
        time: Option<ClockTime>,

        #[arg(short = 't', long = "type")]
        session_type: Option<String>,
    },

    /// Remove a session from a day
    Remove { day: String, number: usize },

    /// List session types, or add a new one
    Types {
        #[arg(long)]
        add: Option<String>,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show the active session
    Show {
        /// Include tutorial links
        #[arg(long)]
        links: bool,
    },

    /// Ask the AI coach for today's routine and start it
    Generate {
        /// Free-text notes; they take precedence over the scheduled session
        #[arg(short, long)]
        notes: Option<String>,

        /// Fatigue level (low, normal, high)
        #[arg(short, long, default_value = "normal")]
        fatigue: FatigueLevel,
    },

    /// Start a session from favorite exercises
    Manual {
        /// Favorite exercise names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Log an already finished workout from favorite exercises
    Log {
        #[arg(required = true)]
        names: Vec<String>,

        /// Date of the workout (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Mark an exercise done or not done
    Toggle { number: usize },

    /// Change one field of an exercise
    Edit { number: usize, field: ExerciseField, value: String },

    /// Remove an exercise
    Remove { number: usize },

    /// Re-estimate an exercise's calories with the AI coach
    Calories { number: usize },

    /// Archive the session into history
    Finish,

    /// Discard the session without archiving
    Abandon,
}

#[derive(Subcommand)]
enum FavoritesAction {
    /// List favorites
    List {
        #[arg(short, long)]
        muscle_group: Option<String>,
    },

    /// Pin or unpin an exercise of the active session
    Toggle { number: usize },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Recent workouts
    List {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Training focus per day and overall distribution
    Calendar,

    /// Export history to CSV or JSON
    Export {
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (csv, json); guessed from the extension if omitted
        #[arg(short = 'f', long)]
        format: Option<String>,

        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

#[derive(Tabled)]
struct ExerciseRow {
    #[tabled(rename = "#")]
    number: usize,
    #[tabled(rename = "Done")]
    done: String,
    #[tabled(rename = "Exercise")]
    name: String,
    #[tabled(rename = "Sets")]
    sets: String,
    #[tabled(rename = "Reps")]
    reps: String,
    #[tabled(rename = "Weight")]
    weight: String,
    #[tabled(rename = "Equipment")]
    equipment: String,
    #[tabled(rename = "Muscle group")]
    muscle_group: String,
    #[tabled(rename = "kcal")]
    calories: String,
}

impl ExerciseRow {
    fn new(number: usize, entry: &ExerciseEntry) -> Self {
        Self {
            number,
            done: if entry.completed { "✓".to_string() } else { String::new() },
            name: entry.name.clone(),
            sets: entry.sets.to_string(),
            reps: entry.reps.to_string(),
            weight: entry.weight.to_string(),
            equipment: entry.equipment.to_string(),
            muscle_group: entry.muscle_group.clone(),
            calories: entry.calories_burned.clone(),
        }
    }
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Focus")]
    focus: String,
    #[tabled(rename = "Exercises")]
    exercises: usize,
    #[tabled(rename = "kcal (est.)")]
    calories: String,
    #[tabled(rename = "Id")]
    id: String,
}

/// Command arguments are 1-based
fn index_of(number: usize) -> Result<usize> {
    number.checked_sub(1).ok_or_else(|| anyhow!("Numbers start at 1"))
}

fn parse_day(day: &str) -> Result<Weekday> {
    Weekday::from_name(day).ok_or_else(|| anyhow!("Unknown weekday: {}", day))
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_session(session: &InProgressSession, links: bool) {
    println!(
        "{} {} ({}/{} done, ~{} kcal)",
        "Active session:".green().bold(),
        session.kind,
        session.completed_count(),
        session.exercises.len(),
        session.estimated_calories()
    );
    let rows: Vec<ExerciseRow> =
        session.exercises.iter().enumerate().map(|(i, e)| ExerciseRow::new(i + 1, e)).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    if links {
        for (i, entry) in session.exercises.iter().enumerate() {
            println!("  {}. {}", i + 1, entry.video_url().dimmed());
        }
    }
    if session.all_completed() {
        println!("{}", "All exercises done. Run `fittrack session finish` to save it.".green());
    }
}

fn oracle_strategy(config: &AppConfig) -> Result<AiRoutineStrategy> {
    let oracle = GeminiOracle::from_config(&config.oracle).map_err(FitTrackError::from)?;
    Ok(AiRoutineStrategy::new(Arc::new(oracle), RetryPolicy::from_config(&config.oracle)))
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) if path.exists() => AppConfig::load_from_file(path),
        Some(_) => Ok(AppConfig::default()),
        None => Ok(AppConfig::load_or_default()),
    }
}

async fn run_schedule(app: &FitTrack, action: ScheduleAction) -> Result<()> {
    match action {
        ScheduleAction::Show => {
            let schedule = app.profile.load().await?.workout_schedule;
            println!("{}", "Weekly schedule".cyan().bold());
            for (day, sessions) in schedule.iter() {
                let name = app.config.settings.locale.display_name(day);
                if sessions.is_empty() {
                    println!("  {:<10} {}", name, "Descanso".dimmed());
                }
                for (i, session) in sessions.iter().enumerate() {
                    let label = if i == 0 { name } else { "" };
                    println!("  {:<10} {}. {} {}", label, i + 1, session.time, session.name);
                }
            }
        }

        ScheduleAction::Today { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let plan = app.plan_for(date).await?;
            println!("{} {}", date.format("%Y-%m-%d").to_string().cyan().bold(), plan.weekday_key);
            if plan.is_rest() {
                println!("  {}", "Descanso".dimmed());
            }
            for session in &plan.sessions {
                println!("  {} {}", session.time, session.name);
            }
        }

        ScheduleAction::Add { day, session_type, time } => {
            let day = parse_day(&day)?;
            let profile = app.profile.load().await?;
            let mut editor = app.profile.schedule_editor().await?;
            let index = editor.add_session(day, &profile.custom_workout_types);
            if let Some(name) = session_type {
                editor.update_session(day, index, SessionField::Name(name))?;
            }
            if let Some(time) = time {
                editor.update_session(day, index, SessionField::Time(time))?;
            }
            app.profile.save_schedule(&mut editor).await?;
            println!("{}", format!("✓ Session added to {}", day).green());
        }

        ScheduleAction::Set { day, number, time, session_type } => {
            let day = parse_day(&day)?;
            let index = index_of(number)?;
            if time.is_none() && session_type.is_none() {
                return Err(anyhow!("Nothing to change: pass --time and/or --type"));
            }
            let mut editor = app.profile.schedule_editor().await?;
            if let Some(time) = time {
                editor.update_session(day, index, SessionField::Time(time))?;
            }
            if let Some(name) = session_type {
                editor.update_session(day, index, SessionField::Name(name))?;
            }
            app.profile.save_schedule(&mut editor).await?;
            println!("{}", "✓ Schedule updated".green());
        }

        ScheduleAction::Remove { day, number } => {
            let day = parse_day(&day)?;
            let mut editor = app.profile.schedule_editor().await?;
            let removed = editor.remove_session(day, index_of(number)?)?;
            app.profile.save_schedule(&mut editor).await?;
            println!("{}", format!("✓ Removed {} {} from {}", removed.time, removed.name, day).green());
        }

        ScheduleAction::Types { add } => {
            if let Some(label) = add {
                if app.profile.add_session_type(&label).await? {
                    println!("{}", format!("✓ Added session type {}", label).green());
                } else {
                    println!("{}", format!("Session type {} already exists or is not allowed", label).yellow());
                }
            }
            for label in app.profile.load().await?.custom_workout_types.labels() {
                println!("  {}", label);
            }
        }
    }
    Ok(())
}

fn report_start(outcome: &StartOutcome) {
    match outcome {
        StartOutcome::Started(session) => {
            println!("{}", "✓ Session started".green());
            print_session(session, false);
        }
        StartOutcome::AlreadyActive(session) => {
            println!("{}", "A session is already in progress; continuing it.".yellow());
            print_session(session, false);
        }
    }
}

async fn run_session(app: &mut FitTrack, action: SessionAction) -> Result<()> {
    match action {
        SessionAction::Show { links } => match app.sessions.current() {
            Some(session) => print_session(session, links),
            None => println!("{}", "No active session".dimmed()),
        },

        SessionAction::Generate { notes, fatigue } => {
            if let Some(session) = app.sessions.current() {
                println!("{}", "A session is already in progress; continuing it.".yellow());
                print_session(session, false);
                return Ok(());
            }
            let strategy = oracle_strategy(&app.config)?;
            let context = app.routine_context(Local::now().date_naive(), fatigue, notes).await?;

            let pb = spinner("Asking the AI coach for today's routine...");
            let routine = strategy.generate(&context).await;
            pb.finish_and_clear();

            let outcome = app.sessions.start(SessionKind::Ai, routine?).await?;
            report_start(&outcome);
        }

        SessionAction::Manual { names } => {
            let favorites = app.profile.favorites().await?;
            let selected: HashSet<String> = names.into_iter().collect();
            let routine = ManualAssembly::assemble(&selected, favorites.as_slice());
            if routine.len() < selected.len() {
                println!("{}", "Some names are not favorites and were skipped.".yellow());
            }
            let outcome = app.sessions.start(SessionKind::Manual, routine).await?;
            report_start(&outcome);
        }

        SessionAction::Log { names, date } => {
            let favorites = app.profile.favorites().await?;
            let selected: HashSet<String> = names.into_iter().collect();
            let mut exercises = ManualAssembly::assemble(&selected, favorites.as_slice());
            for entry in &mut exercises {
                entry.completed = true;
            }
            let when = match date {
                Some(date) => {
                    let noon = date.and_hms_opt(12, 0, 0).ok_or_else(|| anyhow!("Invalid date"))?;
                    Local
                        .from_local_datetime(&noon)
                        .single()
                        .map(|t| t.with_timezone(&Utc))
                        .ok_or_else(|| anyhow!("Ambiguous local time for {}", date))?
                }
                None => Utc::now(),
            };
            let record = app.sessions.history().log_workout(when, &exercises).await?;
            println!("{}", format!("✓ Logged workout {} with {} exercises", record.id, exercises.len()).green());
        }

        SessionAction::Toggle { number } => {
            let session = app.sessions.update(ExerciseEdit::ToggleComplete { index: index_of(number)? }).await?;
            print_session(session, false);
        }

        SessionAction::Edit { number, field, value } => {
            let edit = ExerciseEdit::SetField { index: index_of(number)?, field, value };
            let session = app.sessions.update(edit).await?;
            print_session(session, false);
        }

        SessionAction::Remove { number } => {
            let session = app.sessions.update(ExerciseEdit::Remove { index: index_of(number)? }).await?;
            print_session(session, false);
        }

        SessionAction::Calories { number } => {
            let strategy = oracle_strategy(&app.config)?;
            let pb = spinner("Estimating calories...");
            let calories = app.sessions.recalculate_calories(index_of(number)?, &strategy).await;
            pb.finish_and_clear();
            println!("{}", format!("✓ Estimated {} kcal", calories?).green());
        }

        SessionAction::Finish => {
            let record = app.sessions.finish().await?;
            println!(
                "{}",
                format!(
                    "✓ Workout saved: {} exercises, ~{} kcal ({})",
                    record.exercises.len(),
                    record.estimated_calories(),
                    app.classifier.classify(&record.exercises)
                )
                .green()
                .bold()
            );
        }

        SessionAction::Abandon => {
            if app.sessions.abandon().await? {
                println!("{}", "Session discarded".yellow());
            } else {
                println!("{}", "No active session".dimmed());
            }
        }
    }
    Ok(())
}

async fn run_favorites(app: &FitTrack, action: FavoritesAction) -> Result<()> {
    match action {
        FavoritesAction::List { muscle_group } => {
            let favorites = app.profile.favorites().await?;
            let selected: Vec<&fittrack::FavoriteExercise> = match &muscle_group {
                Some(group) => favorites.by_muscle_group(group),
                None => favorites.iter().collect(),
            };
            if selected.is_empty() {
                println!("{}", "No favorites yet".dimmed());
            }
            for favorite in selected {
                println!(
                    "  {} {} x {} @ {} [{}]",
                    favorite.name.bold(),
                    favorite.sets,
                    favorite.reps,
                    favorite.weight,
                    favorite.muscle_group
                );
            }
            if muscle_group.is_none() && !favorites.is_empty() {
                println!("{} {}", "Muscle groups:".dimmed(), favorites.muscle_groups().join(", "));
            }
        }

        FavoritesAction::Toggle { number } => {
            let session = app
                .sessions
                .current()
                .ok_or_else(|| anyhow!("No active session to pick an exercise from"))?;
            let entry = session
                .exercises
                .get(index_of(number)?)
                .ok_or_else(|| anyhow!("No exercise number {}", number))?;
            match app.profile.toggle_favorite(entry).await? {
                FavoriteToggle::Added => println!("{}", format!("★ {} added to favorites", entry.name).green()),
                FavoriteToggle::Removed => println!("{}", format!("☆ {} removed from favorites", entry.name).yellow()),
            }
        }
    }
    Ok(())
}

async fn run_history(app: &FitTrack, action: HistoryAction) -> Result<()> {
    let records = app.sessions.history().list().await?;
    match action {
        HistoryAction::List { limit } => {
            let rows: Vec<HistoryRow> = records
                .iter()
                .take(limit)
                .map(|r| HistoryRow {
                    date: r.date.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
                    focus: app.classifier.classify(&r.exercises).to_string(),
                    exercises: r.exercises.len(),
                    calories: r.estimated_calories().to_string(),
                    id: r.id.clone(),
                })
                .collect();
            if rows.is_empty() {
                println!("{}", "No workouts yet".dimmed());
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }

        HistoryAction::Calendar => {
            for (day, focus) in app.classifier.focus_calendar(&records) {
                println!("  {} {}", day.format("%Y-%m-%d %a"), focus);
            }
            println!("{}", "Distribution".cyan().bold());
            for (focus, count) in app.classifier.focus_distribution(&records) {
                println!("  {:<14} {}", focus.to_string(), count);
            }
        }

        HistoryAction::Export { output, format, from, to } => {
            let format = match format {
                Some(f) => f.parse::<ExportFormat>()?,
                None => ExportFormat::from_path(&output).unwrap_or(ExportFormat::Csv),
            };
            let count = export_history(&records, &app.classifier, DateRange::new(from, to), format, &output)
                .with_context(|| format!("Failed to export to {}", output.display()))?;
            println!("{}", format!("✓ Exported {} workouts to {}", count, output.display()).green());
        }
    }
    Ok(())
}

fn run_config(config_path: PathBuf, list: bool, set: Option<String>, get: Option<String>) -> Result<()> {
    let mut config = if config_path.exists() { AppConfig::load_from_file(&config_path)? } else { AppConfig::default() };

    if let Some(key_value) = set {
        let (key, value) = key_value
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected key=value, got '{}'", key_value))?;
        config.set_value(key.trim(), value.trim())?;
        config.save_to_file(&config_path)?;
        println!("{}", format!("✓ {} = {}", key.trim(), value.trim()).green());
    } else if let Some(key) = get {
        println!("{}", config.get_value(&key)?);
    } else if list {
        println!("{} {}", "Config file:".dimmed(), config_path.display());
        for (key, value) in config.list_values() {
            println!("  {:<28} {}", key, value);
        }
    } else {
        return Err(anyhow!("Pass --list, --get <key> or --set <key=value>"));
    }
    Ok(())
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    let command = match cli.command {
        Commands::Config { list, set, get } => {
            let path = cli.config.unwrap_or_else(AppConfig::default_config_path);
            return run_config(path, list, set, get);
        }
        other => other,
    };

    let mut app = FitTrack::open(config).await?;
    match command {
        Commands::Schedule { action } => run_schedule(&app, action).await,
        Commands::Session { action } => run_session(&mut app, action).await,
        Commands::Favorites { action } => run_favorites(&app, action).await,
        Commands::History { action } => run_history(&app, action).await,
        Commands::Config { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(2);
        }
    };

    if let Some(level) = LogLevel::from_verbosity(cli.verbose) {
        config.logging.level = level;
    }
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{} {:#}", "Warning: logging disabled:".yellow(), e);
    }

    if let Err(e) = run(cli, config).await {
        match e.downcast_ref::<FitTrackError>() {
            Some(err) => {
                log_error("command", err);
                eprintln!("{} {}", "Error:".red().bold(), err.user_message());
            }
            None => eprintln!("{} {:#}", "Error:".red().bold(), e),
        }
        std::process::exit(1);
    }
}
