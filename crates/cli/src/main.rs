use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use compass_client::{
    AccessGate, Auth, Collection, GateDecision, MemoryStore, StaticAuth, StoreError,
};
use compass_core::{
    Entity, Listing, ListingDraft, Mentor, MentorshipRequest, Post, PostDraft, Record,
    RequestDraft,
};
use compass_views::{listings_view, mentors_view, posts_view, Dashboard, ListView};

#[derive(Parser, Debug)]
#[command(name = "compassctl", version, about = "Campus Compass CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Directory with seed data (listings.json, posts.json, mentors.json,
    /// mentorship_requests.json); created records are written back here
    #[arg(long = "data", global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Browse marketplace listings
    Listings {
        /// Free-text search over title, description and subject
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        condition: Option<String>,
        /// Price band, e.g. "100-200" or "200-"
        #[arg(long)]
        price: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Browse forum posts
    Posts {
        /// Free-text search over title, content and subject
        #[arg(long)]
        search: Option<String>,
        #[arg(long = "type")]
        kind: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        /// "resolved" or "unresolved"
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Browse mentor profiles
    Mentors {
        /// Free-text search over name, major, bio and skills
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        major: Option<String>,
        #[arg(long = "skill")]
        skill: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Campus overview: stats, recent activity, trending, featured
    Dashboard,
    /// Create a forum post
    NewPost {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        /// question | discussion | announcement | study_group
        #[arg(long = "type")]
        kind: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long = "course-code")]
        course_code: Option<String>,
        /// May be given multiple times
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Create a marketplace listing
    NewListing {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// textbook | lab_equipment | notes | electronics | supplies | other
        #[arg(long)]
        category: String,
        /// sell | rent | exchange | donate
        #[arg(long, default_value = "sell")]
        kind: String,
        /// new | like_new | good | fair | poor
        #[arg(long, default_value = "good")]
        condition: String,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Request mentorship from a mentor
    RequestMentor {
        #[arg(long = "mentor-id")]
        mentor_id: Uuid,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        message: String,
        /// e.g. "in_person", "virtual"
        #[arg(long = "meeting")]
        meeting: Option<String>,
    },
    /// Check the campus email gate for an account
    Whoami {
        #[arg(long, env = "COMPASS_EMAIL")]
        email: Option<String>,
        #[arg(long, env = "COMPASS_DOMAIN", default_value = "srmist.edu.in")]
        domain: String,
    },
}

fn init_tracing() {
    let env = std::env::var("COMPASS_LOG").unwrap_or_else(|_| "warn".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn seed_path<T: Entity>(dir: &Path) -> PathBuf {
    dir.join(format!("{}s.json", T::KIND))
}

fn load_store<T>(data: &Option<PathBuf>) -> Result<MemoryStore<T>>
where
    T: Entity + Record + DeserializeOwned,
{
    let Some(dir) = data else {
        return Ok(MemoryStore::new());
    };
    let path = seed_path::<T>(dir);
    if !path.exists() {
        info!(kind = T::KIND, path = %path.display(), "no seed file; starting empty");
        return Ok(MemoryStore::new());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    MemoryStore::from_json(&raw).with_context(|| format!("parsing {}", path.display()))
}

async fn save_store<T>(data: &Option<PathBuf>, store: &MemoryStore<T>) -> Result<()>
where
    T: Entity + Record + Serialize,
{
    let Some(dir) = data else {
        return Ok(());
    };
    let path = seed_path::<T>(dir);
    let records = store
        .list("", None)
        .await
        .map_err(|e| anyhow::anyhow!("listing records for save: {e}"))?;
    let raw = serde_json::to_string_pretty(&records)?;
    std::fs::write(&path, raw).with_context(|| format!("writing {}", path.display()))?;
    info!(kind = T::KIND, count = records.len(), path = %path.display(), "seed file updated");
    Ok(())
}

/// Apply CLI filter flags to a view: each present flag constrains one facet.
fn apply_facets<T: Entity + Record>(view: &mut ListView<T>, flags: &[(&str, &Option<String>)]) {
    for (facet, value) in flags {
        if let Some(v) = value {
            view.set_facet(*facet, v.clone());
        }
    }
}

fn render_age(created: chrono::DateTime<chrono::Utc>) -> String {
    let mut secs = (chrono::Utc::now() - created).num_seconds().max(0) as u64;
    let days = secs / 86_400;
    secs %= 86_400;
    let hours = secs / 3600;
    secs %= 3600;
    let mins = secs / 60;
    secs %= 60;
    if days > 0 {
        format!("{}d{}h", days, hours)
    } else if hours > 0 {
        format!("{}h{}m", hours, mins)
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        format!("{}s", secs)
    }
}

fn print_field_errors(errors: &compass_core::FieldErrors) {
    for (field, message) in errors {
        eprintln!("  {}: {}", field, message);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Listings { search, category, kind, condition, price, limit } => {
            let store: MemoryStore<Listing> = load_store(&cli.data)?;
            let mut view = listings_view();
            view.load(&store).await;
            if let Some(term) = search {
                view.set_search(term);
            }
            apply_facets(
                &mut view,
                &[
                    ("category", &category),
                    ("kind", &kind),
                    ("condition", &condition),
                    ("price_range", &price),
                ],
            );
            let mut rows = view.visible();
            if let Some(cap) = limit {
                rows.truncate(cap);
            }
            match cli.output {
                Output::Human => {
                    println!(
                        "{} of {} listings",
                        rows.len(),
                        view.records().len()
                    );
                    println!("{:<32} {:<14} {:<9} {:>8}  AGE", "TITLE", "CATEGORY", "COND", "PRICE");
                    for l in &rows {
                        println!(
                            "{:<32} {:<14} {:<9} {:>8.0}  {}",
                            l.title,
                            l.category.as_str(),
                            l.condition.as_str(),
                            l.price,
                            render_age(l.created_date)
                        );
                    }
                }
                Output::Json => print_json(&rows)?,
            }
        }
        Commands::Posts { search, kind, subject, status, limit } => {
            let store: MemoryStore<Post> = load_store(&cli.data)?;
            let mut view = posts_view();
            view.load(&store).await;
            if let Some(term) = search {
                view.set_search(term);
            }
            apply_facets(
                &mut view,
                &[("kind", &kind), ("subject", &subject), ("status", &status)],
            );
            let mut rows = view.visible();
            if let Some(cap) = limit {
                rows.truncate(cap);
            }
            match cli.output {
                Output::Human => {
                    println!("{} of {} posts", rows.len(), view.records().len());
                    println!(
                        "{:<36} {:<12} {:<12} {:<10} {:>3}  AGE",
                        "TITLE", "TYPE", "SUBJECT", "STATUS", "UP"
                    );
                    for p in &rows {
                        println!(
                            "{:<36} {:<12} {:<12} {:<10} {:>3}  {}",
                            p.title,
                            p.kind.as_str(),
                            p.subject.as_deref().unwrap_or("-"),
                            p.status(),
                            p.upvotes,
                            render_age(p.created_date)
                        );
                    }
                }
                Output::Json => print_json(&rows)?,
            }
        }
        Commands::Mentors { search, year, major, skill, limit } => {
            let store: MemoryStore<Mentor> = load_store(&cli.data)?;
            let mut view = mentors_view();
            view.load(&store).await;
            if let Some(term) = search {
                view.set_search(term);
            }
            apply_facets(&mut view, &[("year", &year), ("major", &major), ("skills", &skill)]);
            let mut rows = view.visible();
            if let Some(cap) = limit {
                rows.truncate(cap);
            }
            match cli.output {
                Output::Human => {
                    println!("{} of {} mentors", rows.len(), view.records().len());
                    println!("{:<22} {:<10} {:<28} SKILLS", "NAME", "YEAR", "MAJOR");
                    for m in &rows {
                        println!(
                            "{:<22} {:<10} {:<28} {}",
                            m.full_name,
                            m.year,
                            m.major,
                            m.skills.join(", ")
                        );
                    }
                }
                Output::Json => print_json(&rows)?,
            }
        }
        Commands::Dashboard => {
            let listings: MemoryStore<Listing> = load_store(&cli.data)?;
            let posts: MemoryStore<Post> = load_store(&cli.data)?;
            let requests: MemoryStore<MentorshipRequest> = load_store(&cli.data)?;
            let dash = match Dashboard::load(&listings, &posts, &requests).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "dashboard load failed");
                    eprintln!("dashboard error: {}", e);
                    return Ok(());
                }
            };
            match cli.output {
                Output::Human => {
                    println!(
                        "listings: {} • posts: {} • mentorship requests: {}",
                        dash.stats.listings, dash.stats.posts, dash.stats.mentorship_requests
                    );
                    println!("\nRECENT ACTIVITY");
                    for a in dash.recent_activity() {
                        let tag = match a.source {
                            compass_views::ActivitySource::Listing => "listing",
                            compass_views::ActivitySource::Post => "post",
                        };
                        println!("  [{:<7}] {:<36} {}", tag, a.title, render_age(a.time));
                    }
                    println!("\nTRENDING");
                    for p in dash.trending() {
                        println!(
                            "  {:<36} {:<12} +{}",
                            p.title,
                            p.kind.as_str(),
                            p.upvotes
                        );
                    }
                    println!("\nFEATURED");
                    for l in dash.featured() {
                        println!("  {:<36} {:>8.0}", l.title, l.price);
                    }
                }
                Output::Json => {
                    #[derive(Serialize)]
                    struct DashboardOut<'a> {
                        stats: &'a compass_views::QuickStats,
                        recent_activity: Vec<compass_views::Activity>,
                        trending: &'a [Post],
                        featured: &'a [Listing],
                    }
                    print_json(&DashboardOut {
                        stats: &dash.stats,
                        recent_activity: dash.recent_activity(),
                        trending: dash.trending(),
                        featured: dash.featured(),
                    })?;
                }
            }
        }
        Commands::NewPost { title, content, kind, subject, course_code, tags } => {
            let store: MemoryStore<Post> = load_store(&cli.data)?;
            let mut draft = PostDraft {
                title,
                content,
                kind: Some(kind.parse()?),
                subject,
                course_code,
                ..Default::default()
            };
            for tag in &tags {
                draft.add_tag(tag);
            }
            match store.create(draft).await {
                Ok(post) => {
                    save_store(&cli.data, &store).await?;
                    match cli.output {
                        Output::Human => println!("created post {}", post.id),
                        Output::Json => print_json(&post)?,
                    }
                }
                Err(StoreError::Validation(errors)) => {
                    eprintln!("post rejected:");
                    print_field_errors(&errors);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::NewListing { title, description, category, kind, condition, price, subject } => {
            let store: MemoryStore<Listing> = load_store(&cli.data)?;
            let draft = ListingDraft {
                title,
                description,
                category: category.parse()?,
                kind: kind.parse()?,
                condition: condition.parse()?,
                price,
                subject,
            };
            match store.create(draft).await {
                Ok(listing) => {
                    save_store(&cli.data, &store).await?;
                    match cli.output {
                        Output::Human => println!("created listing {}", listing.id),
                        Output::Json => print_json(&listing)?,
                    }
                }
                Err(StoreError::Validation(errors)) => {
                    eprintln!("listing rejected:");
                    print_field_errors(&errors);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::RequestMentor { mentor_id, subject, message, meeting } => {
            let store: MemoryStore<MentorshipRequest> = load_store(&cli.data)?;
            let draft = RequestDraft { mentor_id, subject, message, meeting_preference: meeting };
            match store.create(draft).await {
                Ok(request) => {
                    save_store(&cli.data, &store).await?;
                    match cli.output {
                        Output::Human => println!("created mentorship request {}", request.id),
                        Output::Json => print_json(&request)?,
                    }
                }
                Err(StoreError::Validation(errors)) => {
                    eprintln!("request rejected:");
                    print_field_errors(&errors);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Whoami { email, domain } => {
            let auth = match email {
                Some(e) => StaticAuth::signed_in(e),
                None => StaticAuth::signed_out(),
            };
            let gate = AccessGate::new(&domain);
            match gate.check(&auth).await {
                GateDecision::Granted(user) => println!("granted: {}", user.email),
                GateDecision::Denied(user) => {
                    let _ = auth.logout().await;
                    eprintln!("denied: {} is outside @{}", user.email, domain);
                    std::process::exit(2);
                }
                GateDecision::Unauthenticated => {
                    println!("no signed-in user; sign-in is handled by the campus service");
                }
            }
        }
    }

    Ok(())
}
