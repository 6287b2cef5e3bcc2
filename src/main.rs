mod claims;
mod cli;
mod config;
mod error;
mod geo;
mod listings;
mod notify;
mod points;
mod reaper;
mod storage;
mod utils;

use std::sync::Arc;

use clap::Parser;
use colored::*;
use tracing::{error, info};

use crate::claims::ClaimEngine;
use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::geo::GeoIndex;
use crate::listings::ListingIntake;
use crate::notify::dispatcher::{drain_pending, run_dispatch_loop};
use crate::notify::{Outbox, TracingDispatcher};
use crate::points::{FeedbackService, PointsLedger};
use crate::reaper::ExpiryReaper;
use crate::storage::db::Database;
use crate::storage::models::{GeoPoint, IntakeSuggestion, NewListing};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("mealbridge=debug,info")
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Init => initialize(&config),

        Commands::Post {
            donor,
            title,
            description,
            category,
            quantity,
            unit,
            lat,
            lng,
            address,
            expires_in_hours,
            images,
            suggestion,
        } => {
            post_listing(
                &config,
                donor,
                title,
                description,
                category,
                quantity,
                unit,
                lat,
                lng,
                address,
                expires_in_hours,
                images,
                suggestion,
            )
            .await
        }

        Commands::Nearby {
            lat,
            lng,
            radius,
            format,
        } => show_nearby(&config, lat, lng, radius, &format).await,

        Commands::Claim {
            listing_id,
            claimant,
        } => claim_listing(&config, &listing_id, &claimant).await,

        Commands::Advance { claim_id, from, to } => {
            advance_claim(&config, &claim_id, &from, &to).await
        }

        Commands::Verify { claim_id, token } => verify_pickup(&config, &claim_id, &token).await,

        Commands::Cancel {
            claim_id,
            actor,
            yes,
        } => cancel_claim(&config, &claim_id, &actor, yes).await,

        Commands::Feedback {
            claim_id,
            rating,
            comment,
        } => record_feedback(&config, &claim_id, rating, comment),

        Commands::Reap => run_sweep(&config).await,

        Commands::Auto { interval } => {
            let interval = interval.unwrap_or(config.reaper.interval_secs);
            info!("Starting reaper service (interval: {}s)", interval);
            run_auto_service(&config, interval).await
        }

        Commands::Points { user, format } => show_points(&config, &user, &format),

        Commands::Stats { format } => show_stats(&config, &format),
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn open_database(config: &Config) -> error::Result<Arc<Database>> {
    Ok(Arc::new(Database::new(
        &config.database.path,
        config.database.busy_timeout_ms,
    )?))
}

fn initialize(config: &Config) -> error::Result<()> {
    println!("{}", "Initializing mealbridge...".green());
    let _db = open_database(config)?;
    println!("{}", "✓ Database initialized".green());
    println!("{}", "✓ Configuration loaded".green());
    println!("\n{}", "Configuration:".cyan());
    println!("  Database:       {}", config.database.path);
    println!("  Busy timeout:   {} ms", config.database.busy_timeout_ms);
    println!("  Default radius: {} m", config.discovery.default_radius_m);
    println!("  Default expiry: {} h", config.intake.default_expiry_hours);
    println!("  Sweep interval: {} s", config.reaper.interval_secs);
    println!(
        "  Awards:         {} donor / {} claimant",
        config.points.donation_award, config.points.pickup_award
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn post_listing(
    config: &Config,
    donor: String,
    title: String,
    description: Option<String>,
    category: Option<String>,
    quantity: u32,
    unit: String,
    lat: f64,
    lng: f64,
    address: String,
    expires_in_hours: Option<i64>,
    images: Vec<String>,
    suggestion: Option<String>,
) -> error::Result<()> {
    let db = open_database(config)?;
    let outbox = Outbox::new();
    let mut rx = outbox.subscribe();

    let category = category.as_deref().map(str::parse).transpose()?;
    let suggestion: Option<IntakeSuggestion> = suggestion
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    let input = NewListing {
        donor_id: donor,
        title,
        description,
        category,
        quantity,
        unit,
        images,
        location: GeoPoint::new(lat, lng)?,
        address,
        expires_in_hours,
    };

    let intake = ListingIntake::new(config.intake.clone());
    let listing = intake.create(&db, &outbox, input, suggestion)?;

    println!("{}", "✓ Listing posted".green());
    println!("  Id:       {}", listing.id.to_string().cyan());
    println!("  Category: {}", listing.category);
    println!("  Expires:  {}", utils::format_timestamp(&listing.expires_at));

    drain_pending(&mut rx, &TracingDispatcher);
    Ok(())
}

async fn show_nearby(
    config: &Config,
    lat: f64,
    lng: f64,
    radius: Option<f64>,
    format: &str,
) -> error::Result<()> {
    let db = open_database(config)?;
    let geo = GeoIndex::new(config.discovery.cell_size_deg);
    geo.rebuild_from(&db)?;

    let center = GeoPoint::new(lat, lng)?;
    let radius = radius.unwrap_or(config.discovery.default_radius_m);
    let hits = listings::nearby(&db, &geo, &center, radius, config.discovery.max_results)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!(
            "No available listings within {}",
            utils::format_distance(radius)
        );
        return Ok(());
    }

    println!(
        "{}",
        format!("{} listings within {}", hits.len(), utils::format_distance(radius)).cyan()
    );
    utils::print_table_border(96);
    utils::print_table_row(
        &["Id", "Title", "Category", "Qty", "Distance", "Expires"],
        &[16, 24, 8, 10, 10, 20],
    );
    utils::print_table_border(96);
    for hit in &hits {
        utils::print_table_row(
            &[
                &utils::format_id(&hit.listing.id),
                &hit.listing.title,
                &hit.listing.category.to_string(),
                &format!("{} {}", hit.listing.quantity, hit.listing.unit),
                &utils::format_distance(hit.distance_m),
                &utils::format_timestamp(&hit.listing.expires_at),
            ],
            &[16, 24, 8, 10, 10, 20],
        );
    }
    utils::print_table_border(96);
    Ok(())
}

async fn claim_listing(config: &Config, listing_id: &str, claimant: &str) -> error::Result<()> {
    let db = open_database(config)?;
    let outbox = Outbox::new();
    let mut rx = outbox.subscribe();
    let engine = ClaimEngine::new(db, outbox.clone(), config.points.clone());

    let claim = engine.claim(listing_id, claimant).await?;

    println!("{}", "✓ Listing claimed".green());
    println!("  Claim id: {}", claim.id.to_string().cyan());
    println!(
        "  Token:    {}",
        claim.pickup_token.to_string().yellow().bold()
    );
    println!(
        "{}",
        "Present the token at pickup; it is shown only once.".yellow()
    );

    drain_pending(&mut rx, &TracingDispatcher);
    Ok(())
}

async fn advance_claim(
    config: &Config,
    claim_id: &str,
    from: &str,
    to: &str,
) -> error::Result<()> {
    let db = open_database(config)?;
    let outbox = Outbox::new();
    let mut rx = outbox.subscribe();
    let engine = ClaimEngine::new(db, outbox.clone(), config.points.clone());

    let claim = engine.advance(claim_id, from.parse()?, to.parse()?).await?;
    println!("{} {} -> {}", "✓ Claim advanced:".green(), from, claim.status);

    drain_pending(&mut rx, &TracingDispatcher);
    Ok(())
}

async fn verify_pickup(config: &Config, claim_id: &str, token: &str) -> error::Result<()> {
    let db = open_database(config)?;
    let outbox = Outbox::new();
    let mut rx = outbox.subscribe();
    let engine = ClaimEngine::new(db, outbox.clone(), config.points.clone());

    let claim = engine.verify(claim_id, token).await?;

    println!("{}", "✓ Handoff verified".green().bold());
    if let Some(at) = claim.verified_at {
        println!("  Verified at: {}", utils::format_timestamp(&at));
    }
    println!(
        "  Awards:      donor {}, claimant {}",
        utils::format_points(config.points.donation_award),
        utils::format_points(config.points.pickup_award)
    );

    drain_pending(&mut rx, &TracingDispatcher);
    Ok(())
}

async fn cancel_claim(
    config: &Config,
    claim_id: &str,
    actor: &str,
    yes: bool,
) -> error::Result<()> {
    if !yes && !utils::confirm_action("Cancel this claim?") {
        println!("Aborted");
        return Ok(());
    }

    let db = open_database(config)?;
    let outbox = Outbox::new();
    let mut rx = outbox.subscribe();
    let engine = ClaimEngine::new(db, outbox.clone(), config.points.clone());

    engine.cancel(claim_id, actor).await?;
    println!("{}", "✓ Claim cancelled".green());

    drain_pending(&mut rx, &TracingDispatcher);
    Ok(())
}

fn record_feedback(
    config: &Config,
    claim_id: &str,
    rating: u8,
    comment: Option<String>,
) -> error::Result<()> {
    let db = open_database(config)?;
    let service = FeedbackService::new(db, config.points.feedback_bonus);

    let feedback = service.record(claim_id, rating, comment)?;
    println!("{}", "✓ Feedback recorded".green());
    println!("  Rating: {}/5", feedback.rating);
    Ok(())
}

async fn run_sweep(config: &Config) -> error::Result<()> {
    let db = open_database(config)?;
    let outbox = Outbox::new();
    let mut rx = outbox.subscribe();
    let engine = Arc::new(ClaimEngine::new(
        db.clone(),
        outbox.clone(),
        config.points.clone(),
    ));
    let reaper = ExpiryReaper::new(db, engine, outbox.clone(), config.reaper.interval_secs);

    let summary = reaper.sweep_once()?;
    summary.print_summary();

    drain_pending(&mut rx, &TracingDispatcher);
    Ok(())
}

async fn run_auto_service(config: &Config, interval: u64) -> error::Result<()> {
    println!("{}", "Starting expiry reaper service...".green());
    println!("Interval: {} seconds", interval);

    let db = open_database(config)?;
    let outbox = Outbox::new();
    let engine = Arc::new(ClaimEngine::new(
        db.clone(),
        outbox.clone(),
        config.points.clone(),
    ));

    // Notification fan-out runs beside the sweep loop for the life of the
    // service.
    tokio::spawn(run_dispatch_loop(outbox.subscribe(), TracingDispatcher));

    let reaper = ExpiryReaper::new(db, engine, outbox, interval);
    reaper.run().await;
    Ok(())
}

fn show_points(config: &Config, user: &str, format: &str) -> error::Result<()> {
    let db = open_database(config)?;
    let ledger = PointsLedger::new(db);

    let balance = ledger.balance(user)?;
    let history = ledger.history(user, 20)?;

    if format == "json" {
        let payload = serde_json::json!({
            "user": user,
            "balance": balance,
            "history": history,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("{}", format!("=== Points for {} ===", user).cyan().bold());
    println!("Balance: {}", utils::format_points(balance));

    if !history.is_empty() {
        println!("\n{}", "Recent awards:".yellow());
        utils::print_table_border(78);
        utils::print_table_row(&["When", "Reason", "Amount", "Claim"], &[22, 20, 10, 16]);
        utils::print_table_border(78);
        for entry in &history {
            utils::print_table_row(
                &[
                    &utils::format_timestamp(&entry.created_at),
                    &entry.reason.to_string(),
                    &format!("{:+}", entry.amount),
                    &entry
                        .claim_id
                        .as_deref()
                        .map(utils::format_id)
                        .unwrap_or_else(|| "-".to_string()),
                ],
                &[22, 20, 10, 16],
            );
        }
        utils::print_table_border(78);
    }
    Ok(())
}

fn show_stats(config: &Config, format: &str) -> error::Result<()> {
    let db = open_database(config)?;
    let stats = db.get_stats()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "=== Mealbridge Statistics ===".cyan().bold());
    println!("\nListings:");
    println!("  Total:      {}", stats.total_listings);
    println!("  Available:  {}", stats.available.to_string().green());
    println!("  Claimed:    {}", stats.claimed.to_string().yellow());
    println!("  Completed:  {}", stats.completed.to_string().cyan());
    println!("  Expired:    {}", stats.expired);
    println!("  Cancelled:  {}", stats.cancelled);

    println!("\nClaims:");
    println!("  Total:      {}", stats.total_claims);
    println!("  Verified:   {}", stats.verified_claims.to_string().green());

    println!("\nPoints:");
    println!("  Entries:    {}", stats.points_entries);
    println!("  Awarded:    {}", stats.points_awarded);
    Ok(())
}
