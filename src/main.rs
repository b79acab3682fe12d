use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use restodir::app::{self, App};
use restodir::backend::{RestBackend, SqliteBackend};
use restodir::config::{self, BackendKind};
use restodir::detail::DetailState;
use restodir::form::{RestaurantForm, ReviewForm};
use restodir::geocode::GeocodeStatus;
use restodir::observable::Observable;

#[derive(Debug, Parser)]
#[command(author, version, about = "Browse and manage the restaurant directory")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Page through the public feed
    Feed {
        #[arg(long, default_value = "")]
        search: String,
        /// How many pages to load at most
        #[arg(long, default_value = "1")]
        pages: usize,
    },
    /// Resolve an address the way the restaurant form does
    Geocode { address: String },
    /// List restaurants on the map, optionally filtered by name
    Map {
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Show one restaurant and its reviews
    Show { id: Uuid },
    /// Review a restaurant as the signed-in user
    Review {
        id: Uuid,
        #[arg(long)]
        rating: u8,
        #[arg(long)]
        comment: String,
    },
    /// Show the current session and profile
    Whoami,
    /// Sign in (local backend: --user; remote backend: --email/--password)
    SignIn {
        #[arg(long)]
        user: Option<Uuid>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    SignOut,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let backend = app::connect_backend(&cfg).await?;
    let geocoder = app::build_geocoder(&cfg)?;
    let app = App::start(cfg.app.clone(), backend, geocoder).await;

    match args.command {
        Command::Feed { search, pages } => {
            let feed = app.feed();
            feed.set_search_term(&search).await;
            for _ in 1..pages {
                match feed.load_next_page() {
                    Some(next) => next.await,
                    None => break,
                }
            }
            let state = feed.state();
            for r in &state.items {
                println!("{}  {}", r.id, r.name);
            }
            if state.reached_end() {
                println!("-- end of list --");
            } else if state.is_empty_result() {
                println!("no restaurants found");
            }
        }
        Command::Geocode { address } => {
            let form = Observable::new(RestaurantForm::default());
            let geocoding = app.geocoder_for(&form);
            let mut updates = geocoding.subscribe();
            geocoding.address_changed(address.clone());
            let settled = updates
                .wait_for(|s| s.address == address && s.status != GeocodeStatus::Loading)
                .await
                .ok_or_else(|| anyhow!("geocoding stopped unexpectedly"))?;
            println!("{}", settled.status.hint());
            if let Some(c) = form.get().coordinates() {
                println!("{:.6}, {:.6}", c.latitude, c.longitude);
            }
        }
        Command::Map { search } => {
            let map = app.map();
            map.load().await;
            let mut updates = map.subscribe();
            map.search_changed(search.clone());
            let state = if search.trim().is_empty() {
                map.state()
            } else {
                updates
                    .wait_for(|s| s.search == search)
                    .await
                    .ok_or_else(|| anyhow!("map filter stopped unexpectedly"))?
            };
            for pin in &state.visible {
                println!("{:.5}, {:.5}  {}", pin.latitude, pin.longitude, pin.name);
            }
        }
        Command::Show { id } => {
            let page = app.restaurant_page(id);
            page.load().await;
            let DetailState::Found(restaurant) = page.state() else {
                return Err(anyhow!("restaurant {id} not found"));
            };
            println!("{}", restaurant.name);
            if let Some(address) = &restaurant.address {
                println!("{address}");
            }
            if let Some(description) = &restaurant.description {
                println!("{description}");
            }
            let reviews = app.reviews(id);
            reviews.refresh().await;
            let state = reviews.state();
            if state.items.is_empty() {
                println!("no reviews yet");
            }
            for r in &state.items {
                println!(
                    "{}/5  {}  {}",
                    r.rating,
                    r.reviewer_name(),
                    r.comment.as_deref().unwrap_or_default()
                );
            }
        }
        Command::Review {
            id,
            rating,
            comment,
        } => {
            let review = app
                .reviews(id)
                .submit(&ReviewForm { rating, comment })
                .await?;
            info!(id = %review.id, "review saved");
        }
        Command::Whoami => {
            let mut profiles = app.profiles().subscribe();
            let state = profiles
                .wait_for(|s| !s.loading)
                .await
                .ok_or_else(|| anyhow!("profile store stopped unexpectedly"))?;
            match (app.sessions().current(), state.profile) {
                (None, _) => println!("signed out"),
                (Some(s), Some(p)) => println!("{} ({}) {}", p.display_name(), p.role.as_str(), s.user_id),
                (Some(s), None) => println!("{} (profile unavailable)", s.user_id),
            }
        }
        Command::SignOut => {
            app.sessions().sign_out().await?;
            info!("signed out");
        }
        Command::SignIn {
            user,
            email,
            password,
        } => sign_in(&cfg, user, email.as_deref(), password.as_deref()).await?,
    }

    Ok(())
}

async fn sign_in(
    cfg: &config::Config,
    user: Option<Uuid>,
    email: Option<&str>,
    password: Option<&str>,
) -> Result<()> {
    let session = match cfg.backend.kind {
        BackendKind::Sqlite => {
            let user = user.ok_or_else(|| anyhow!("--user is required for the local backend"))?;
            let backend = SqliteBackend::connect(&cfg.backend.resolved_database_url()).await?;
            backend.sign_in(user).await?
        }
        BackendKind::Rest => {
            let (Some(email), Some(password)) = (email, password) else {
                return Err(anyhow!("--email and --password are required"));
            };
            let base = reqwest::Url::parse(cfg.backend.rest_url.trim())?;
            let backend = RestBackend::new(
                base,
                cfg.backend.anon_key.clone(),
                cfg.backend.credentials_path(),
            )?;
            backend.sign_in_with_password(email, password).await?
        }
    };
    println!("signed in as {}", session.user_id);
    Ok(())
}
