use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nexjob_adapters::{JobSource, MemorySource, WordPressSource};
use nexjob_core::{AdminSettings, FacetKind, Job, SiteConfig, SortOrder, DEFAULT_PAGE_SIZE};
use nexjob_search::{
    FilterTarget, ListingQuery, PageSnapshot, RouteLock, SearchCommand, SearchEdit, SearchEvent,
    SearchSession, SearchStateSync, SessionConfig, TracingAnalytics,
};
use nexjob_storage::{AdminCredentials, BookmarkStore, HttpClientConfig, LocalStore, SettingsStore};
use nexjob_web::AppState;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "nexjob")]
#[command(about = "Nexjob job board command-line interface")]
struct Cli {
    /// Serve the built-in sample data instead of the CMS.
    #[arg(long, global = true)]
    offline: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Serve,
    /// One page of listings.
    Jobs {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        per_page: u32,
        #[arg(long)]
        json: bool,
    },
    Job {
        slug: String,
    },
    Filters,
    Articles {
        #[arg(long)]
        limit: Option<u32>,
    },
    Bookmarks {
        /// Visitor id, as in `nexjob_bookmarks_<id>.json` under the data directory. Omitted, the shared CLI set is used.
        #[arg(long)]
        client: Option<String>,
        #[command(subcommand)]
        action: Option<BookmarkAction>,
    },
    /// Interactive search with debounced edits and paging.
    Search {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Validates configuration and probes both CMS endpoints.
    Check,
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Debug, clap::Args)]
struct QueryArgs {
    #[arg(long)]
    search: Option<String>,
    /// Province name.
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    category: Option<String>,
}

impl QueryArgs {
    fn into_listing(self) -> ListingQuery {
        ListingQuery {
            search: self.search,
            location: self.location,
            category: self.category,
        }
    }
}

#[derive(Debug, Subcommand)]
enum BookmarkAction {
    List,
    Add { job_id: String },
    Remove { job_id: String },
    Toggle { job_id: String },
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    Show,
    Reset,
}

#[derive(Debug, Subcommand)]
enum AdminAction {
    /// Prints the value for NEXJOB_ADMIN_PASSWORD_SHA256.
    HashPassword { password: String },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nexjob=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn settings_store(config: &SiteConfig) -> SettingsStore {
    SettingsStore::new(
        LocalStore::new(&config.data_dir),
        AdminSettings::defaults_for(config),
    )
}

async fn build_source(config: &SiteConfig, offline: bool) -> Result<Arc<dyn JobSource>> {
    if offline {
        return Ok(Arc::new(MemorySource::builtin()));
    }
    config.validate().context("invalid site configuration")?;
    let settings = settings_store(config).get().await?;
    let source = WordPressSource::from_settings(&settings, HttpClientConfig::from_site(config))?;
    Ok(Arc::new(source))
}

fn job_line(job: &Job) -> String {
    let location = [job.city.as_str(), job.province.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{}\t{} | {} | {}", job.id, job.title, job.company_name, location)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = SiteConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let state = if cli.offline {
                info!("serving built-in sample data");
                AppState::new(config, Arc::new(MemorySource::builtin()))
            } else {
                AppState::from_config(config).await?
            };
            nexjob_web::serve(state).await?;
        }
        Commands::Jobs {
            query,
            page,
            per_page,
            json,
        } => {
            let source = build_source(&config, cli.offline).await?;
            let sync = SearchStateSync::hydrate(RouteLock::none(), &query.into_listing());
            let result = source.fetch_jobs(sync.effective(), page.max(1), per_page).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for job in &result.jobs {
                    println!("{}", job_line(job));
                }
                println!(
                    "page {}/{} total_jobs={} has_more={}",
                    result.current_page, result.total_pages, result.total_jobs, result.has_more
                );
            }
        }
        Commands::Job { slug } => {
            let source = build_source(&config, cli.offline).await?;
            let Some(job) = source.fetch_job_by_slug(&slug).await else {
                bail!("job not found: {slug}");
            };
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        Commands::Filters => {
            let data = build_source(&config, cli.offline).await?.fetch_filter_data().await;
            for (province, cities) in &data.provinces {
                println!("{province}: {}", cities.join(", "));
            }
            for kind in FacetKind::ALL {
                println!("{} [{}]: {}", kind.label(), kind.key(), data.options(kind).join(", "));
            }
        }
        Commands::Articles { limit } => {
            let source = build_source(&config, cli.offline).await?;
            for article in source.fetch_articles(limit).await {
                println!("{}\t{}", article.slug, article.title);
            }
        }
        Commands::Bookmarks { client, action } => {
            let local = LocalStore::new(&config.data_dir);
            let store = match client {
                Some(client) => BookmarkStore::for_client(local, &client)
                    .with_context(|| format!("invalid visitor id {client}"))?,
                None => BookmarkStore::new(local),
            };
            match action.unwrap_or(BookmarkAction::List) {
                BookmarkAction::List => {
                    for id in store.list().await? {
                        println!("{id}");
                    }
                }
                BookmarkAction::Add { job_id } => {
                    store.add(&job_id).await?;
                    println!("saved {job_id} ({} total)", store.count().await?);
                }
                BookmarkAction::Remove { job_id } => {
                    store.remove(&job_id).await?;
                    println!("removed {job_id} ({} total)", store.count().await?);
                }
                BookmarkAction::Toggle { job_id } => {
                    let added = store.toggle(&job_id).await?;
                    println!("{job_id} bookmarked={added}");
                }
            }
        }
        Commands::Search { query } => {
            let source = build_source(&config, cli.offline).await?;
            run_search(source, query.into_listing()).await?;
        }
        Commands::Check => {
            config.validate().context("invalid site configuration")?;
            let source = build_source(&config, cli.offline).await?;
            let (api, filters) =
                tokio::join!(source.test_connection(), source.test_filters_connection());
            println!("api: ok={} {}", api.ok, api.detail);
            println!("filters: ok={} {}", filters.ok, filters.detail);
            if !(api.ok && filters.ok) {
                bail!("CMS connection check failed");
            }
        }
        Commands::Settings { action } => {
            let store = settings_store(&config);
            let settings = match action.unwrap_or(SettingsAction::Show) {
                SettingsAction::Show => store.get().await?,
                SettingsAction::Reset => store.reset().await?,
            };
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Commands::Admin {
            action: AdminAction::HashPassword { password },
        } => {
            println!("{}", AdminCredentials::hash_password(&password));
        }
    }

    Ok(())
}

#[derive(Debug, PartialEq)]
enum Input {
    Send(SearchCommand),
    Help,
    Quit,
}

const SEARCH_HELP: &str = "\
type a keyword to search, empty line to search now
:more                 load the next page
:retry                retry a failed page
:province <name>      set the province ('-' clears it)
:facet <key> <value>  select a facet value (keys: cities, jobTypes, experiences, educations, industries, workPolicies, categories)
:unfacet <key> <value>
:sort newest|relevant
:clear                remove every filter
:quit";

fn parse_input(line: &str) -> Result<Input, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(Input::Send(if line.is_empty() {
            SearchCommand::SubmitNow
        } else {
            SearchCommand::Edit(SearchEdit::SetKeyword(line.to_string()))
        }));
    };
    let (verb, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    let arg = arg.trim();
    let edit = |change| Ok(Input::Send(SearchCommand::Edit(change)));
    match verb {
        "q" | "quit" => Ok(Input::Quit),
        "h" | "help" => Ok(Input::Help),
        "more" => Ok(Input::Send(SearchCommand::SentinelVisible)),
        "retry" => Ok(Input::Send(SearchCommand::Retry)),
        "clear" => edit(SearchEdit::ClearAll),
        "province" if arg == "-" || arg.is_empty() => {
            edit(SearchEdit::RemoveFilter(FilterTarget::Province))
        }
        "province" => edit(SearchEdit::SetProvince(arg.to_string())),
        "sort" => match arg {
            "newest" => edit(SearchEdit::SetSort(SortOrder::Newest)),
            "relevant" => edit(SearchEdit::SetSort(SortOrder::Relevant)),
            other => Err(format!("unknown sort order: {other}")),
        },
        "facet" | "unfacet" => {
            let (key, value) = arg
                .split_once(' ')
                .ok_or_else(|| format!("usage: :{verb} <key> <value>"))?;
            let kind = FacetKind::from_key(key).ok_or_else(|| format!("unknown facet: {key}"))?;
            edit(SearchEdit::ToggleFacet {
                kind,
                value: value.trim().to_string(),
                selected: verb == "facet",
            })
        }
        other => Err(format!("unknown command :{other} (try :help)")),
    }
}

/// Prints the jobs a snapshot adds on top of what was already shown.
fn print_snapshot(snapshot: &PageSnapshot, shown: &mut (u64, usize)) {
    if shown.0 != snapshot.generation || snapshot.jobs.len() < shown.1 {
        *shown = (snapshot.generation, 0);
        println!(
            "-- {} lowongan, {} filter aktif{}",
            snapshot.total_jobs,
            snapshot.active_filter_count,
            if snapshot.fallback { " (data contoh)" } else { "" }
        );
    }
    for job in &snapshot.jobs[shown.1..] {
        println!("{}", job_line(job));
    }
    shown.1 = snapshot.jobs.len();
    println!(
        "-- page {} status={:?}{}",
        snapshot.current_page,
        snapshot.status,
        if snapshot.has_more { ", :more for next page" } else { "" }
    );
}

async fn run_search(source: Arc<dyn JobSource>, query: ListingQuery) -> Result<()> {
    let sync = SearchStateSync::hydrate(RouteLock::none(), &query);
    let mut handle = SearchSession::new(source, sync, &SessionConfig::from_env())
        .with_analytics(Arc::new(TracingAnalytics))
        .spawn();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = (0, 0);
    println!("{SEARCH_HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line) {
                    Ok(Input::Send(command)) => {
                        if !handle.send(command).await {
                            break;
                        }
                    }
                    Ok(Input::Help) => println!("{SEARCH_HELP}"),
                    Ok(Input::Quit) => break,
                    Err(message) => eprintln!("{message}"),
                }
            }
            event = handle.next_event() => {
                match event {
                    Some(SearchEvent::Results(snapshot)) => print_snapshot(&snapshot, &mut shown),
                    Some(SearchEvent::UrlReplaced(url)) => println!("-- url {url}"),
                    Some(SearchEvent::FetchFailed { page, message }) => {
                        eprintln!("page {page}: {message} (:retry)");
                    }
                    None => break,
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
