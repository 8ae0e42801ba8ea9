use anyhow::{anyhow, Error, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use gitupdater::{
    ApplyEvent, ChannelChooser, CycleReport, PollReport, SelectionRequest, TrackedRepository,
    UpdateCandidate, Updater, UpdaterBuilder,
};
use log::{debug, error};
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};

#[derive(Debug, Error)]
enum GitUpdaterError {
    #[error("{0:}")]
    InvalidArgsError(String),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cmd = cmd();
    let matches = cmd.get_matches();
    let res = init_logger_from_matches(&matches);
    if let Err(e) = res {
        eprintln!("Error creating logger: {e}");
        std::process::exit(126);
    }

    let status = match make_updater(&matches).await {
        Ok(updater) => match run(&updater, &matches).await {
            Ok(status) => status,
            Err(e) => {
                print_err(&e);
                1
            }
        },
        Err(e) => {
            print_err(&e);
            127
        }
    };
    std::process::exit(status);
}

const MAX_TERM_WIDTH: usize = 100;

#[allow(clippy::too_many_lines)]
fn cmd() -> Command {
    Command::new("gitupdater")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Keeps local copies of GitHub release assets up to date")
        .arg(
            Arg::new("headless")
                .long("headless")
                .action(ArgAction::SetTrue)
                .help(concat!(
                    "Check every repository with auto update turned on, apply every update found,",
                    " and exit. Nothing is asked interactively, so repositories where the right",
                    " asset can't be picked automatically are reported as failures. The exit code",
                    " is 0 if everything succeeded and 1 otherwise.",
                )),
        )
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help(concat!(
                    "The directory holding repos.json and config.json. Defaults to",
                    " $XDG_CONFIG_HOME/gitupdater, or ~/.config/gitupdater if that is not set.",
                )),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .global(true)
                .value_parser(value_parser!(usize))
                .help("How many repositories to check at the same time. Defaults to 5."),
        )
        .arg(
            Arg::new("api-base-url")
                .long("api-base-url")
                .global(true)
                .help(concat!(
                    "The base URL for the GitHub API. This is useful for testing or if you want to",
                    " operate against GitHub Enterprise. This should be something like",
                    " `https://github.my-corp.example.com/api/v3`.",
                )),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable verbose output."),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debugging output."),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Suppresses most output."),
        )
        .subcommand(Command::new("list").about("List the tracked repositories."))
        .subcommand(
            Command::new("add")
                .about("Start tracking a repository.")
                .arg(
                    Arg::new("url")
                        .required(true)
                        .help("The repository URL, like https://github.com/owner/repo."),
                )
                .arg(
                    Arg::new("path")
                        .long("path")
                        .short('p')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("The directory that release assets are put in."),
                )
                .arg(
                    Arg::new("auto-update")
                        .long("auto-update")
                        .action(ArgAction::SetTrue)
                        .help("Apply updates for this repository without asking."),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Stop tracking a repository.")
                .arg(Arg::new("name").required(true)),
        )
        .subcommand(
            Command::new("rename")
                .about("Change the name a repository is tracked under.")
                .arg(Arg::new("old").required(true))
                .arg(Arg::new("new").required(true)),
        )
        .subcommand(
            Command::new("set-path")
                .about("Change the directory that a repository's release assets are put in.")
                .arg(Arg::new("name").required(true))
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("set-url")
                .about("Change the URL of a tracked repository.")
                .arg(Arg::new("name").required(true))
                .arg(Arg::new("url").required(true)),
        )
        .subcommand(
            Command::new("auto-update")
                .about("Turn auto update on or off for a repository.")
                .arg(Arg::new("name").required(true))
                .arg(
                    Arg::new("state")
                        .required(true)
                        .value_parser(["on", "off"]),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Check every tracked repository for a newer release and list the updates."),
        )
        .subcommand(
            Command::new("update")
                .about(concat!(
                    "Check every tracked repository and apply the updates found. Updates for",
                    " repositories with auto update turned on are applied directly, you are asked",
                    " about the rest.",
                ))
                .arg(
                    Arg::new("yes")
                        .long("yes")
                        .short('y')
                        .action(ArgAction::SetTrue)
                        .help("Apply every update found without asking."),
                ),
        )
        .max_term_width(MAX_TERM_WIDTH)
}

// When more than one of these is passed, the most verbose one wins.
pub(crate) fn init_logger_from_matches(matches: &ArgMatches) -> Result<(), log::SetLoggerError> {
    let level = if matches.get_flag("debug") {
        log::LevelFilter::Debug
    } else if matches.get_flag("verbose") {
        log::LevelFilter::Info
    } else if matches.get_flag("quiet") {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Warn
    };

    gitupdater::init_logger(level)
}

async fn make_updater(matches: &ArgMatches) -> Result<Updater> {
    validate_args(matches)?;

    let mut builder = UpdaterBuilder::new();
    if let Some(dir) = matches.get_one::<PathBuf>("config-dir") {
        builder = builder.config_dir(dir);
    }
    if let Some(workers) = matches.get_one::<usize>("workers") {
        builder = builder.workers(*workers);
    }
    if let Some(url) = matches.get_one::<String>("api-base-url") {
        builder = builder.api_base_url(url);
    }

    builder.build().await
}

fn validate_args(matches: &ArgMatches) -> Result<()> {
    if matches.get_flag("headless") {
        if let Some(name) = matches.subcommand_name() {
            return Err(GitUpdaterError::InvalidArgsError(format!(
                "You cannot combine --headless with the {name} command"
            ))
            .into());
        }
    } else if matches.subcommand_name().is_none() {
        return Err(GitUpdaterError::InvalidArgsError(
            "You must pass a command or --headless.".to_string(),
        )
        .into());
    }

    if matches.get_one::<usize>("workers") == Some(&0) {
        return Err(
            GitUpdaterError::InvalidArgsError("--workers must be at least 1.".to_string()).into(),
        );
    }

    Ok(())
}

async fn run(updater: &Updater, matches: &ArgMatches) -> Result<i32> {
    if matches.get_flag("headless") {
        let report = updater.run_headless().await;
        print_cycle_report(&report);
        return Ok(report.exit_code());
    }

    let store = updater.store();
    match matches.subcommand() {
        Some(("list", _)) => print_repositories(&store.list().await),
        Some(("add", m)) => {
            let repo = store
                .add(
                    required::<String>(m, "url")?,
                    required::<PathBuf>(m, "path")?.clone(),
                    m.get_flag("auto-update"),
                )
                .await?;
            println!("Added {}", repo.name);
        }
        Some(("remove", m)) => {
            let repo = store.remove(required::<String>(m, "name")?).await?;
            println!("Removed {}", repo.name);
        }
        Some(("rename", m)) => {
            store
                .rename(required::<String>(m, "old")?, required::<String>(m, "new")?)
                .await?;
        }
        Some(("set-path", m)) => {
            store
                .set_path(
                    required::<String>(m, "name")?,
                    required::<PathBuf>(m, "path")?.clone(),
                )
                .await?;
        }
        Some(("set-url", m)) => {
            store
                .set_url(required::<String>(m, "name")?, required::<String>(m, "url")?)
                .await?;
        }
        Some(("auto-update", m)) => {
            let on = required::<String>(m, "state")? == "on";
            store.set_auto_update(required::<String>(m, "name")?, on).await?;
        }
        Some(("check", _)) => {
            let report = check_interactively(updater).await;
            print_poll_report(&report);
            return Ok(i32::from(!report.errors.is_empty()));
        }
        Some(("update", m)) => {
            let quiet = matches.get_flag("quiet");
            return update(updater, m.get_flag("yes"), quiet).await;
        }
        Some((name, _)) => return Err(anyhow!("unknown command {name}")),
        None => unreachable!("validate_args requires a command when --headless is not set"),
    }

    Ok(0)
}

fn required<'a, T>(matches: &'a ArgMatches, id: &str) -> Result<&'a T>
where
    T: Clone + Send + Sync + 'static,
{
    matches
        .get_one::<T>(id)
        .ok_or_else(|| GitUpdaterError::InvalidArgsError(format!("You must pass <{id}>.")).into())
}

async fn check_interactively(updater: &Updater) -> PollReport {
    let (chooser, requests) = ChannelChooser::new(updater.config().chooser_timeout());
    let answerer = spawn_terminal_chooser(requests);
    let report = updater.check_with(Some(&chooser)).await;
    // Every selection has been answered or has timed out by now. A prompt that is still open
    // belongs to a request nobody is waiting for.
    drop(chooser);
    answerer.abort();
    report
}

// Answers selection requests one at a time until every chooser is dropped. Requests that time out
// before or while they are shown are skipped.
fn spawn_terminal_chooser(mut requests: mpsc::Receiver<SelectionRequest>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(mut req) = requests.recv().await {
            if req.is_cancelled() {
                debug!("skipping the timed out asset selection for {}", req.title);
                continue;
            }

            let title = req.title.clone();
            let candidates = req.candidates.clone();
            let prompt =
                tokio::task::spawn_blocking(move || prompt_for_selection(&title, &candidates));
            let selection = tokio::select! {
                res = prompt => Some(res.unwrap_or_else(|e| {
                    debug!("could not read the asset selection: {e}");
                    None
                })),
                () = req.cancelled() => None,
            };
            match selection {
                Some(selection) => req.respond(selection),
                None => eprintln!("\nNo asset was picked for {} in time, skipping it.", req.title),
            }
        }
    })
}

fn prompt_for_selection(title: &str, candidates: &[String]) -> Option<String> {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "More than one release asset could be the right one for {title}:");
    for (i, c) in candidates.iter().enumerate() {
        let _ = writeln!(stderr, "  {}) {c}", i + 1);
    }
    let _ = write!(stderr, "Pick a number, or press enter to skip: ");
    let _ = stderr.flush();

    let line = read_line()?;
    let n = line.trim().parse::<usize>().ok()?;
    candidates.get(n.checked_sub(1)?).cloned()
}

async fn confirm(question: String) -> bool {
    tokio::task::spawn_blocking(move || {
        let mut stderr = io::stderr().lock();
        let _ = write!(stderr, "{question} [y/N] ");
        let _ = stderr.flush();
        read_line().is_some_and(|l| matches!(l.trim(), "y" | "Y" | "yes"))
    })
    .await
    .unwrap_or(false)
}

fn read_line() -> Option<String> {
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

async fn update(updater: &Updater, yes: bool, quiet: bool) -> Result<i32> {
    let report = check_interactively(updater).await;
    print_poll_report(&report);
    let mut failed = !report.errors.is_empty();

    for candidate in &report.candidates {
        if !(yes || candidate.auto_update)
            && !confirm(format!(
                "Update {} from {} to {}?",
                candidate.name, candidate.old_version, candidate.new_version
            ))
            .await
        {
            println!("Skipped {}", candidate.name);
            continue;
        }

        match apply_with_progress(updater, candidate, quiet).await {
            Ok(()) => println!("Updated {} to {}", candidate.name, candidate.new_version),
            Err(e) => {
                error!("{e:#}");
                failed = true;
            }
        }
    }

    Ok(i32::from(failed))
}

async fn apply_with_progress(
    updater: &Updater,
    candidate: &UpdateCandidate,
    quiet: bool,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(32);
    let name = candidate.name.clone();
    let printer = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            if quiet {
                continue;
            }
            match ev {
                ApplyEvent::State(state) => eprintln!("{name}: {state}"),
                ApplyEvent::Progress(percent) => eprint!("\r{name}: {percent}%"),
            }
        }
    });

    let res = updater.apply_update(candidate, Some(&tx)).await;
    drop(tx);
    let _ = printer.await;
    res?;
    Ok(())
}

fn print_repositories(repos: &[TrackedRepository]) {
    if repos.is_empty() {
        println!("No repositories are tracked.");
        return;
    }
    for r in repos {
        println!(
            "{}  version: {}  auto update: {}  path: {}  url: {}",
            r.name,
            r.display_version(),
            if r.auto_update { "on" } else { "off" },
            r.local_path.display(),
            r.url,
        );
    }
}

fn print_poll_report(report: &PollReport) {
    if report.candidates.is_empty() && report.errors.is_empty() {
        println!("Everything is up to date.");
    }
    for c in &report.candidates {
        println!(
            "{}: {} -> {} ({})",
            c.name, c.old_version, c.new_version, c.asset_display_name
        );
    }
    for e in &report.errors {
        println!("{}: {e}", e.repository());
    }
}

fn print_cycle_report(report: &CycleReport) {
    println!("Checked {} repositories.", report.checked);
    for (name, version) in &report.applied {
        println!("Updated {name} to {version}");
    }
    for e in &report.poll_errors {
        println!("{}: {e}", e.repository());
    }
    for (name, e) in &report.apply_errors {
        println!("{name}: {e}");
    }
}

fn print_err(e: &Error) {
    error!("{e}");
    if let Some(ue) = e.downcast_ref::<GitUpdaterError>() {
        match ue {
            GitUpdaterError::InvalidArgsError(_) => {
                println!();
                let _ = cmd().print_help();
            }
        }
    }
}
