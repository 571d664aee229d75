use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, Time};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::format::{
    format_entries, format_entry, format_letters, format_opened_letter, format_snapshots,
    format_stats, format_timestamp,
};
use crate::config::{AppConfig, Backend, ConfigPaths};
use crate::gateway::{MemoryGateway, SharedGateway};
use crate::journaling::{
    AutoSaveEvent, AutoSaveScheduler, EndSession, RecoveryJournal, SaveOutcome, SchedulerOptions,
    SkipReason,
};
use crate::model::{
    is_blank, EntryPatch, JournalEntry, Letter, LetterKind, Mood, Record, RecordId,
};
use crate::search::{parse_filter, FilterParams};
use crate::stats::EntryStats;
use crate::storage;
use crate::store::CollectionStore;

const SAVE_COMMAND: &str = ":w";
const DISCARD_COMMAND: &str = ":q!";
const DEFAULT_LETTER_DAYS: i64 = 30;

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Optional title
    #[arg(long)]
    pub title: Option<String>,
    /// Provide the entry body inline. If omitted, reads from stdin.
    #[arg(long)]
    pub body: Option<String>,
    /// Mood key or legacy code (defaults to editor.default_mood)
    #[arg(long)]
    pub mood: Option<String>,
    /// Attach a tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Mark the new entry as a favorite
    #[arg(long)]
    pub favorite: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Query terms (supports mood:, tag:, fav, created: ranges)
    #[arg()]
    pub query: Vec<String>,
    /// Limit the number of results printed (defaults to search.default_limit)
    #[arg(long)]
    pub limit: Option<usize>,
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Entry identifier
    pub id: String,
    #[arg(long, conflicts_with = "clear_title")]
    pub title: Option<String>,
    /// Remove the title
    #[arg(long)]
    pub clear_title: bool,
    #[arg(long)]
    pub body: Option<String>,
    #[arg(long)]
    pub mood: Option<String>,
    /// Replace the tags (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    /// Record identifier
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct WriteArgs {
    /// Continue an existing entry instead of starting a new one
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub mood: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LetterCommand {
    /// Show ready, sealed and opened letters
    List(LetterListArgs),
    /// Seal a new letter
    Write(LetterWriteArgs),
    /// Open a letter whose date has arrived
    Open(IdArgs),
    /// Delete a letter
    Delete(IdArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LetterArgs {
    #[command(subcommand)]
    pub command: LetterCommand,
}

#[derive(Args, Debug, Clone)]
pub struct LetterListArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LetterWriteArgs {
    /// future or past
    #[arg(long, default_value = "future")]
    pub kind: LetterKind,
    /// Target date (YYYY-MM-DD)
    #[arg(long, conflicts_with = "in_days")]
    pub on: Option<String>,
    /// Target date as days from now
    #[arg(long)]
    pub in_days: Option<i64>,
    /// Provide the letter body inline. If omitted, reads from stdin.
    #[arg(long)]
    pub body: Option<String>,
    #[arg(long)]
    pub mood: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RecoverArgs {
    /// Delete the recovery snapshot with this id
    #[arg(long, conflicts_with = "restore")]
    pub discard: Option<String>,
    /// Save the recovery snapshot with this id
    #[arg(long)]
    pub restore: Option<String>,
}

/// Gateways and journal shared by every command.
pub struct Services {
    pub config: Arc<AppConfig>,
    pub entries: SharedGateway<JournalEntry>,
    pub letters: SharedGateway<Letter>,
    pub journal: Option<RecoveryJournal>,
}

impl Services {
    pub fn open(config: Arc<AppConfig>, paths: &ConfigPaths) -> Result<Self> {
        let (entries, letters): (SharedGateway<JournalEntry>, SharedGateway<Letter>) =
            match config.gateway.backend {
                Backend::Sqlite => {
                    let gateway = storage::init(paths, &config.storage)?;
                    (Arc::new(gateway.clone()), Arc::new(gateway))
                }
                Backend::Memory => {
                    tracing::warn!("memory backend selected, nothing will persist");
                    (Arc::new(MemoryGateway::new()), Arc::new(MemoryGateway::new()))
                }
            };
        let journal = RecoveryJournal::from_config(paths, &config.auto_save)?;
        Ok(Self {
            config,
            entries,
            letters,
            journal,
        })
    }

    pub fn entry_store(&self) -> CollectionStore<JournalEntry> {
        CollectionStore::new(self.entries.clone(), self.config.gateway.request_timeout())
    }

    pub fn letter_store(&self) -> CollectionStore<Letter> {
        CollectionStore::new(self.letters.clone(), self.config.gateway.request_timeout())
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions::from_config(&self.config, self.journal.clone())
    }

    fn mood_or_default(&self, raw: Option<&str>) -> Result<Mood> {
        match raw {
            None => Ok(self.config.editor.default_mood()),
            Some(raw) => Mood::resolve(raw).with_context(|| format!("unknown mood '{raw}'")),
        }
    }

    fn journal(&self) -> Result<&RecoveryJournal> {
        match &self.journal {
            Some(journal) => Ok(journal),
            None => bail!("crash recovery is disabled (auto_save.crash_recovery = false)"),
        }
    }
}

pub async fn new_entry(services: &Services, args: NewArgs) -> Result<()> {
    let body = match args.body {
        Some(body) => body,
        None => read_stdin()?.unwrap_or_default(),
    };
    if is_blank(&body) {
        bail!("entry body cannot be empty");
    }

    let mut entry = JournalEntry::blank(services.mood_or_default(args.mood.as_deref())?);
    entry.apply_patch(
        &EntryPatch::body(body)
            .with_title(args.title)
            .with_tags(args.tags)
            .with_favorite(args.favorite),
    );

    let store = services.entry_store();
    let created = store.create(entry).await.context("creating entry")?;
    println!("Created entry {}", created.id);
    print!("{}", format_entry(&created));
    Ok(())
}

pub async fn list_entries(services: &Services, args: ListArgs) -> Result<()> {
    let filter = build_filter(&services.config, &args);
    let store = services.entry_store();
    store.refetch(&filter).await.context("loading entries")?;
    let entries = store.records();
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("encoding entries")?
        );
        return Ok(());
    }
    print!(
        "{}",
        format_entries(
            &entries,
            filter.highlight_regex().as_ref(),
            services.config.editor.excerpt_graphemes
        )
    );
    Ok(())
}

fn build_filter(config: &AppConfig, args: &ListArgs) -> FilterParams {
    let mut filter = parse_filter(&args.query.join(" "));
    filter.limit = Some(args.limit.unwrap_or(config.search.default_limit));
    filter.sort = config.search.default_sort;
    filter
}

pub async fn edit_entry(services: &Services, args: EditArgs) -> Result<()> {
    let mut patch = EntryPatch::default();
    if args.clear_title {
        patch.title = Some(None);
    } else if let Some(title) = args.title {
        patch.title = Some(Some(title));
    }
    patch.body = args.body;
    if let Some(mood) = args.mood.as_deref() {
        patch.mood = Some(services.mood_or_default(Some(mood))?);
    }
    if !args.tags.is_empty() {
        patch.tags = Some(args.tags);
    }
    if patch.is_empty() {
        bail!("nothing to change; pass --title, --clear-title, --body, --mood or --tag");
    }

    let store = loaded_entries(services).await?;
    let id = RecordId::from(args.id);
    let updated = store
        .update_fields(&id, &patch)
        .await
        .with_context(|| format!("updating entry {id}"))?;
    println!("Updated entry {id}");
    print!("{}", format_entry(&updated));
    Ok(())
}

pub async fn toggle_favorite(services: &Services, args: IdArgs) -> Result<()> {
    let store = loaded_entries(services).await?;
    let id = RecordId::from(args.id);
    let entry = store
        .toggle_favorite(&id)
        .await
        .with_context(|| format!("toggling favorite on {id}"))?;
    if entry.favorite {
        println!("★ {} is now a favorite", entry.display_title());
    } else {
        println!("{} is no longer a favorite", entry.display_title());
    }
    Ok(())
}

pub async fn delete_entry(services: &Services, args: IdArgs) -> Result<()> {
    let store = loaded_entries(services).await?;
    let id = RecordId::from(args.id);
    store
        .remove(&id)
        .await
        .with_context(|| format!("deleting entry {id}"))?;
    println!("Deleted entry {id}");
    Ok(())
}

async fn loaded_entries(services: &Services) -> Result<CollectionStore<JournalEntry>> {
    let store = services.entry_store();
    store
        .refetch(&FilterParams::default())
        .await
        .context("loading entries")?;
    Ok(store)
}

/// Line-by-line writing session. Every line restarts the debounce window;
/// `:w` saves immediately, `:q!` discards, end of input flushes.
pub async fn write_session(services: &Services, args: WriteArgs) -> Result<()> {
    let options = services.scheduler_options();
    let scheduler = match &args.id {
        Some(id) => {
            let store = loaded_entries(services).await?;
            let id = RecordId::from(id.as_str());
            let Some(entry) = store.get(&id) else {
                bail!("entry {id} not found");
            };
            AutoSaveScheduler::edit(services.entries.clone(), entry, options)
        }
        None => {
            let mood = services.mood_or_default(args.mood.as_deref())?;
            AutoSaveScheduler::compose(services.entries.clone(), JournalEntry::blank(mood), options)
        }
    };
    if args.id.is_some() {
        let mut patch = EntryPatch::default();
        patch.title = args.title.clone().map(Some);
        if let Some(mood) = args.mood.as_deref() {
            patch.mood = Some(services.mood_or_default(Some(mood))?);
        }
        if !patch.is_empty() {
            scheduler.update(&patch);
        }
    } else if let Some(title) = args.title.clone() {
        scheduler.update(&EntryPatch::default().with_title(Some(title)));
    }

    tracing::info!(id = %scheduler.record_id(), "writing session started");
    if atty::is(atty::Stream::Stdin) {
        eprintln!("Writing {}. `{SAVE_COMMAND}` saves, `{DISCARD_COMMAND}` discards, Ctrl-D finishes.", scheduler.record_id());
    }

    let mut events = scheduler.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AutoSaveEvent::Saved { at, .. }) => {
                    eprintln!("saved at {}", format_timestamp(at));
                }
                Ok(AutoSaveEvent::Failed { message, .. }) => {
                    eprintln!("save failed: {message}");
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = drive_session(&scheduler, BufReader::new(tokio::io::stdin())).await;
    printer.abort();
    result
}

async fn drive_session<I>(scheduler: &AutoSaveScheduler<JournalEntry>, input: I) -> Result<()>
where
    I: tokio::io::AsyncBufRead + Unpin,
{
    let mut body = scheduler.content().body;
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        match line.trim() {
            SAVE_COMMAND => match scheduler.save_now().await {
                Ok(outcome) => report_outcome(&outcome),
                Err(err) => eprintln!("save failed: {err}"),
            },
            DISCARD_COMMAND => {
                scheduler.end(EndSession::Discard).await?;
                println!("Discarded unsaved changes to {}", scheduler.record_id());
                return Ok(());
            }
            _ => {
                if !body.is_empty() && !body.ends_with('\n') {
                    body.push('\n');
                }
                body.push_str(&line);
                body.push('\n');
                scheduler.update(&EntryPatch::body(body.clone()));
            }
        }
    }

    let outcome = scheduler
        .end(EndSession::Flush)
        .await
        .context("saving entry")?;
    if scheduler.status().dirty {
        bail!("entry {} still has unsaved changes", scheduler.record_id());
    }
    match outcome {
        Some(SaveOutcome::Skipped(SkipReason::BlankBody)) => println!("Nothing written; no entry saved."),
        Some(SaveOutcome::Queued) => bail!("entry {} is still saving", scheduler.record_id()),
        _ => {
            let entry = scheduler.content();
            println!(
                "Saved entry {} ({} words)",
                entry.id, entry.word_count
            );
        }
    }
    Ok(())
}

fn report_outcome(outcome: &SaveOutcome) {
    match outcome {
        SaveOutcome::Saved { at, .. } => eprintln!("saved at {}", format_timestamp(*at)),
        SaveOutcome::Queued => eprintln!("save queued behind the one in flight"),
        SaveOutcome::Skipped(SkipReason::BlankBody) => eprintln!("nothing to save yet"),
        SaveOutcome::Skipped(_) => eprintln!("already saved"),
    }
}

pub async fn show_stats(services: &Services, args: StatsArgs) -> Result<()> {
    let store = loaded_entries(services).await?;
    let stats = EntryStats::compute(&store.records(), OffsetDateTime::now_utc().date());
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("encoding stats")?
        );
    } else {
        print!("{}", format_stats(&stats));
    }
    Ok(())
}

pub async fn handle_letters(services: &Services, args: LetterArgs) -> Result<()> {
    match args.command {
        LetterCommand::List(args) => list_letters(services, args).await,
        LetterCommand::Write(args) => write_letter(services, args).await,
        LetterCommand::Open(args) => open_letter(services, args).await,
        LetterCommand::Delete(args) => delete_letter(services, args).await,
    }
}

async fn loaded_letters(services: &Services) -> Result<CollectionStore<Letter>> {
    let store = services.letter_store();
    store
        .refetch(&FilterParams::default())
        .await
        .context("loading letters")?;
    Ok(store)
}

async fn list_letters(services: &Services, args: LetterListArgs) -> Result<()> {
    let store = loaded_letters(services).await?;
    let letters = store.records();
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&letters).context("encoding letters")?
        );
        return Ok(());
    }
    let now = OffsetDateTime::now_utc();
    print!("{}", format_letters(&letters, now));
    let ready = store.ready_letters(now).len();
    if ready > 0 {
        println!(
            "\n{ready} letter{} ready. Open with `booknook letters open <id>`.",
            if ready == 1 { " is" } else { "s are" }
        );
    }
    Ok(())
}

async fn write_letter(services: &Services, args: LetterWriteArgs) -> Result<()> {
    let body = match args.body {
        Some(body) => body,
        None => read_stdin()?.unwrap_or_default(),
    };
    if is_blank(&body) {
        bail!("letter body cannot be empty");
    }
    let now = OffsetDateTime::now_utc();
    let target_date = match (&args.on, args.in_days) {
        (Some(on), _) => parse_target_date(on)?,
        (None, Some(days)) => now + Duration::days(days),
        (None, None) if args.kind == LetterKind::Future => now + Duration::days(DEFAULT_LETTER_DAYS),
        (None, None) => now,
    };

    let mood = services.mood_or_default(args.mood.as_deref())?;
    let mut letter = Letter::blank(mood, args.kind, target_date);
    letter.body = body.trim().to_string();
    letter.word_count = crate::model::word_count(&letter.body);

    let store = services.letter_store();
    let created = store.create(letter).await.context("sealing letter")?;
    println!(
        "Sealed letter {} until {}",
        created.id,
        format_timestamp(created.target_date)
    );
    Ok(())
}

fn parse_target_date(raw: &str) -> Result<OffsetDateTime> {
    let date = Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))?;
    Ok(date.with_time(Time::MIDNIGHT).assume_utc())
}

async fn open_letter(services: &Services, args: IdArgs) -> Result<()> {
    let store = loaded_letters(services).await?;
    let id = RecordId::from(args.id);
    let letter = store
        .mark_opened(&id, OffsetDateTime::now_utc())
        .await
        .with_context(|| format!("opening letter {id}"))?;
    print!("{}", format_opened_letter(&letter));
    Ok(())
}

async fn delete_letter(services: &Services, args: IdArgs) -> Result<()> {
    let store = loaded_letters(services).await?;
    let id = RecordId::from(args.id);
    store
        .remove(&id)
        .await
        .with_context(|| format!("deleting letter {id}"))?;
    println!("Deleted letter {id}");
    Ok(())
}

pub async fn recover(services: &Services, args: RecoverArgs) -> Result<()> {
    let journal = services.journal()?;
    if let Some(id) = args.discard {
        let id = RecordId::from(id);
        journal.remove::<JournalEntry>(&id)?;
        journal.remove::<Letter>(&id)?;
        println!("Discarded draft {id}");
        return Ok(());
    }
    if let Some(id) = args.restore {
        let id = RecordId::from(id);
        if restore_draft::<JournalEntry>(journal, services.entries.clone(), services, &id).await? {
            return Ok(());
        }
        if restore_draft::<Letter>(journal, services.letters.clone(), services, &id).await? {
            return Ok(());
        }
        bail!("no recovery snapshot for {id}");
    }

    let entries = journal.list::<JournalEntry>()?;
    let letters = journal.list::<Letter>()?;
    if entries.is_empty() && letters.is_empty() {
        println!("No unsaved drafts.");
        return Ok(());
    }
    let excerpt_len = services.config.editor.excerpt_graphemes;
    print!("{}", format_snapshots(&entries, excerpt_len));
    print!("{}", format_snapshots(&letters, excerpt_len));
    Ok(())
}

async fn restore_draft<R: Record>(
    journal: &RecoveryJournal,
    gateway: SharedGateway<R>,
    services: &Services,
    id: &RecordId,
) -> Result<bool> {
    let Some(snapshot) = journal.read::<R>(id)? else {
        return Ok(false);
    };
    let scheduler = AutoSaveScheduler::resume(gateway, snapshot, services.scheduler_options());
    match scheduler.end(EndSession::Flush).await? {
        Some(SaveOutcome::Skipped(SkipReason::BlankBody)) => {
            journal.remove::<R>(id)?;
            println!("Draft {id} was blank; discarded");
        }
        _ => println!("Restored {} {id}", R::NOUN),
    }
    Ok(true)
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use tempfile::TempDir;

    use super::*;
    use crate::config::ConfigLoader;
    use crate::gateway::{CallKind, Gateway};

    fn memory_services() -> Services {
        let config = AppConfig {
            gateway: crate::config::GatewayConfig {
                backend: Backend::Memory,
                ..Default::default()
            },
            ..AppConfig::default()
        };
        Services {
            config: Arc::new(config),
            entries: Arc::new(MemoryGateway::<JournalEntry>::new()),
            letters: Arc::new(MemoryGateway::<Letter>::new()),
            journal: None,
        }
    }

    #[test]
    fn list_filter_applies_configured_defaults() {
        let config = AppConfig::default();
        let args = ListArgs {
            query: vec!["mood:joyful".into(), "rain".into()],
            limit: None,
            json: false,
        };
        let filter = build_filter(&config, &args);
        assert_eq!(filter.mood, Some(Mood::Joyful));
        assert_eq!(filter.search.as_deref(), Some("rain"));
        assert_eq!(filter.limit, Some(50));
        assert_eq!(filter.sort, config.search.default_sort);
    }

    #[tokio::test(start_paused = true)]
    async fn writing_session_flushes_at_end_of_input() -> Result<()> {
        let gateway = Arc::new(MemoryGateway::<JournalEntry>::new());
        let scheduler = AutoSaveScheduler::compose(
            gateway.clone(),
            JournalEntry::blank(Mood::Healing),
            SchedulerOptions {
                debounce: StdDuration::from_secs(30),
                ..SchedulerOptions::default()
            },
        );

        let input: &[u8] = b"Hello world\nsecond line here\n";
        drive_session(&scheduler, input).await?;

        let creates = gateway.calls_of(CallKind::Create);
        assert_eq!(creates.len(), 1);
        let saved = gateway.records();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].body, "Hello world\nsecond line here\n");
        assert_eq!(saved[0].word_count, 5);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_input_during_timer_save_still_saves_last_line() -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let gateway = Arc::new(
            MemoryGateway::<JournalEntry>::new().with_latency(StdDuration::from_secs(5)),
        );
        let scheduler = AutoSaveScheduler::compose(
            gateway.clone(),
            JournalEntry::blank(Mood::Healing),
            SchedulerOptions {
                debounce: StdDuration::from_secs(30),
                ..SchedulerOptions::default()
            },
        );
        let (mut writer, reader) = tokio::io::duplex(256);
        let session = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { drive_session(&scheduler, BufReader::new(reader)).await }
        });

        writer.write_all(b"first line\n").await?;
        tokio::time::sleep(StdDuration::from_secs(31)).await;
        gateway.wait_for_calls(1).await;
        writer.write_all(b"last line\n").await?;
        drop(writer);
        session.await??;

        assert_eq!(gateway.calls().len(), 2);
        assert_eq!(gateway.records()[0].body, "first line\nlast line\n");
        assert!(!scheduler.status().dirty);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn discard_command_never_reaches_the_gateway() -> Result<()> {
        let gateway = Arc::new(MemoryGateway::<JournalEntry>::new());
        let scheduler = AutoSaveScheduler::compose(
            gateway.clone(),
            JournalEntry::blank(Mood::Healing),
            SchedulerOptions::default(),
        );

        let input: &[u8] = b"a thought I regret\n:q!\nnever read\n";
        drive_session(&scheduler, input).await?;

        assert!(gateway.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn new_entry_and_toggle_through_memory_backend() -> Result<()> {
        let services = memory_services();
        new_entry(
            &services,
            NewArgs {
                title: Some("Dune, again".into()),
                body: Some("Fear is the mind-killer.".into()),
                mood: Some("empowered".into()),
                tags: vec!["scifi".into()],
                favorite: false,
            },
        )
        .await?;

        let stored = services
            .entries
            .fetch_collection(&FilterParams::default())
            .await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].mood, Mood::Empowered);
        assert_eq!(stored[0].word_count, 4);

        toggle_favorite(
            &services,
            IdArgs {
                id: stored[0].id.to_string(),
            },
        )
        .await?;
        let stored = services
            .entries
            .fetch_collection(&FilterParams::default())
            .await?;
        assert!(stored[0].favorite);
        Ok(())
    }

    #[tokio::test]
    async fn sqlite_services_open_from_config() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        let config = ConfigLoader::with_paths(paths.clone()).load_or_init()?;
        let services = Services::open(Arc::new(config), &paths)?;
        assert!(services.journal.is_some());

        let seeded = services
            .entries
            .fetch_collection(&FilterParams::default())
            .await?;
        assert_eq!(seeded.len(), 1);
        Ok(())
    }

    #[test]
    fn target_dates_parse_as_utc_midnight() -> Result<()> {
        let parsed = parse_target_date("2025-01-31")?;
        assert_eq!(parsed.unix_timestamp(), 1_738_281_600);
        assert!(parse_target_date("31/01/2025").is_err());
        Ok(())
    }
}
