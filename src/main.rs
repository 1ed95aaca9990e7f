use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sleeptimer::clock::{Clock, SystemClock};
use sleeptimer::collaborators::{ContentAdvanceSink, PlaybackController, TracingEventSink};
use sleeptimer::store::{FileLock, JsonFileStore};
use sleeptimer::timer::countdown;
use sleeptimer::timer::model::{PRESET_MODES, preset};
use sleeptimer::timer::recovery::RecoveryOutcome;
use sleeptimer::timer::trigger::FireOutcome;
use sleeptimer::wake::{FileWakeScheduler, WakeScheduler};
use sleeptimer::{ArmError, Collaborators, ServiceConfig, SleepTimerService, TimerMode, Token};

const STORE_FILE: &str = "store.json";
const WAKE_FILE: &str = "wake.json";
const LOCK_FILE: &str = "sleeptimer.lock";

#[derive(Parser, Debug)]
#[command(
    name = "sleeptimer",
    version,
    about = "Single-slot sleep timer that survives restarts"
)]
struct Cli {
    /// Directory holding the timer store and wake registrations.
    #[arg(long, global = true, default_value = "sleeptimer-state")]
    state_dir: PathBuf,

    /// Behave as if exact wake scheduling permission was not granted.
    #[arg(long, global = true)]
    deny_permission: bool,

    /// Behave as if nothing is currently playing.
    #[arg(long, global = true)]
    no_playback: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Arm the sleep timer, replacing any armed one.
    Arm(ArmArgs),
    /// Cancel the armed timer.
    Cancel,
    /// Show the armed timer and the remaining time.
    Status,
    /// Deliver a wake event for a token.
    Fire { token: String },
    /// Deliver every wake registration that is due now.
    Tick,
    /// Report that the current content item finished playing.
    ContentFinished,
    /// Report what startup recovery did.
    Recover,
    /// Drop all wake registrations, as an OS reboot would, then recover.
    Reboot,
    /// List the selectable presets.
    Presets,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct ArmArgs {
    #[arg(long)]
    minutes: Option<u32>,

    #[arg(long)]
    end_of_content: bool,

    /// Index into the preset list (see `presets`).
    #[arg(long)]
    preset: Option<usize>,
}

impl ArmArgs {
    fn mode(&self) -> Result<TimerMode> {
        if let Some(minutes) = self.minutes {
            return Ok(TimerMode::fixed(minutes));
        }
        if self.end_of_content {
            return Ok(TimerMode::EndOfContent);
        }
        let index = self
            .preset
            .ok_or_else(|| anyhow!("one of --minutes, --end-of-content or --preset is required"))?;
        preset(index).ok_or_else(|| {
            anyhow!(
                "preset {index} does not exist; expected 0..{}",
                PRESET_MODES.len()
            )
        })
    }
}

struct ConsolePlayback {
    active: bool,
}

impl PlaybackController for ConsolePlayback {
    fn has_active_session(&self) -> bool {
        self.active
    }

    fn pause(&self) {
        println!("Playback paused");
    }
}

struct ConsoleAdvance;

impl ContentAdvanceSink for ConsoleAdvance {
    fn signal_advance(&self) {
        println!("Advancing to next item");
    }
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sleeptimer=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    if let Command::Presets = cli.command {
        print_presets();
        return Ok(());
    }

    fs::create_dir_all(&cli.state_dir)
        .with_context(|| format!("unable to create state dir {}", cli.state_dir.display()))?;
    let _state_lock = FileLock::acquire(&cli.state_dir.join(LOCK_FILE))
        .context("failed to lock sleep timer state")?;
    let wake = Arc::new(FileWakeScheduler::open(
        cli.state_dir.join(WAKE_FILE),
        !cli.deny_permission,
    ));
    if let Command::Reboot = cli.command {
        wake.clear_all().context("failed to drop wake registrations")?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let deliveries = match &cli.command {
        Command::Fire { token } => {
            let token = Token::from(token.as_str());
            wake.disarm(&token);
            vec![token]
        }
        Command::Tick => wake
            .take_due(clock.now_epoch_ms())
            .context("failed to read wake registrations")?,
        _ => Vec::new(),
    };
    let (service, outcomes) =
        start_service(&cli, Arc::clone(&wake), Arc::clone(&clock), &deliveries)?;
    if let RecoveryOutcome::OrphanCleared(token) = service.recovery()
        && !matches!(cli.command, Command::Recover | Command::Reboot)
    {
        println!("Cleared sleep timer {token} whose wake registration was lost");
    }

    match &cli.command {
        Command::Arm(args) => {
            let mode = args.mode()?;
            match service.scheduler().arm(mode) {
                Ok(timer) => {
                    println!("Armed sleep timer: {}", timer.mode);
                    println!("Token: {}", timer.token);
                    print_remaining(timer.fire_at_epoch_ms, clock.now_epoch_ms());
                }
                Err(ArmError::PermissionDenied) => {
                    service.scheduler().request_permission();
                    return Err(ArmError::PermissionDenied.into());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Command::Cancel => {
            if service.scheduler().cancel()? {
                println!("Sleep timer cancelled");
            } else {
                println!("No sleep timer was armed");
            }
        }
        Command::Status => print_status(&service, clock.as_ref()),
        Command::Fire { .. } => {
            for outcome in outcomes {
                println!("Fire outcome: {}", describe(outcome));
            }
        }
        Command::Tick => {
            if deliveries.is_empty() {
                println!("Nothing due");
            }
            for (token, outcome) in deliveries.iter().zip(outcomes) {
                println!("Fire outcome for {token}: {}", describe(outcome));
            }
        }
        Command::ContentFinished => {
            let outcome = service.trigger().on_content_finished();
            println!("Content finished: {}", describe(outcome));
        }
        Command::Recover | Command::Reboot => print_recovery(service.recovery()),
        Command::Presets => print_presets(),
    }
    Ok(())
}

fn start_service(
    cli: &Cli,
    wake: Arc<FileWakeScheduler>,
    clock: Arc<dyn Clock>,
    deliveries: &[Token],
) -> Result<(SleepTimerService, Vec<FireOutcome>)> {
    let store_path = cli.state_dir.join(STORE_FILE);
    let collaborators = Collaborators {
        store: Arc::new(JsonFileStore::open(&store_path)),
        wake,
        playback: Arc::new(ConsolePlayback {
            active: !cli.no_playback,
        }),
        advance: Arc::new(ConsoleAdvance),
        events: Arc::new(TracingEventSink),
        clock,
    };
    SleepTimerService::start_for_wake(collaborators, ServiceConfig::default(), deliveries)
        .with_context(|| format!("failed to recover sleep timer from {}", store_path.display()))
}

fn print_status(service: &SleepTimerService, clock: &dyn Clock) {
    match service.scheduler().current() {
        Some(timer) => {
            println!("Armed sleep timer: {}", timer.mode);
            println!("Token: {}", timer.token);
            print_remaining(timer.fire_at_epoch_ms, clock.now_epoch_ms());
        }
        None => println!("No sleep timer armed"),
    }
    if let Some(mode) = service.scheduler().last_selection().last_mode {
        println!("Last selection: {mode}");
    }
}

fn print_remaining(fire_at_epoch_ms: i64, now_epoch_ms: i64) {
    let remaining = countdown::remaining(fire_at_epoch_ms, now_epoch_ms);
    println!("Remaining: {}", countdown::format_remaining(remaining));
}

fn print_recovery(outcome: &RecoveryOutcome) {
    match outcome {
        RecoveryOutcome::Idle => println!("Recovery: no sleep timer armed"),
        RecoveryOutcome::Consistent(token) => {
            println!("Recovery: sleep timer {token} is still scheduled")
        }
        RecoveryOutcome::OrphanCleared(token) => {
            println!("Recovery: cleared orphaned sleep timer {token}")
        }
        RecoveryOutcome::CorruptCleared => {
            println!("Recovery: cleared unreadable sleep timer record")
        }
    }
}

fn print_presets() {
    for (index, mode) in PRESET_MODES.iter().enumerate() {
        println!("{index}: {mode}");
    }
}

fn describe(outcome: FireOutcome) -> &'static str {
    match outcome {
        FireOutcome::PlaybackPaused => "playback paused",
        FireOutcome::NoActiveSession => "nothing playing",
        FireOutcome::AdvanceSignalled => "advanced to next item",
        FireOutcome::Ignored => "ignored",
        FireOutcome::StoreUnavailable => "timer store unavailable",
    }
}
