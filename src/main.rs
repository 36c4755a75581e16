//! `ride-along`: command-line client for the ride-sharing backend.
//!
//! Usage:
//!   ride-along rides [--near LAT,LNG] [--to LAT,LNG] [--home]
//!   ride-along ride <RIDE_ID>
//!   ride-along request <RIDE_ID>
//!   ride-along requests [--watch] [--force]
//!   ride-along cancel <REQUEST_ID> [--yes]
//!   ride-along rate <RIDE_ID> <DRIVER_ID> <SCORE> [--comment TEXT]
//!   ride-along report <USER_ID> <REASON> [--details TEXT] [--ride RIDE_ID]

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use prettytable::{Table, row};
use tracing::{info, warn};

use ride_along::api::{HttpRideApi, RideApi};
use ride_along::config::Config;
use ride_along::geocoding::HttpGeocoder;
use ride_along::ids::EntityId;
use ride_along::models::{Coordinates, MatchQuery, RideRequest};
use ride_along::views::{
    CancelOutcome, FeedbackActions, NotificationLevel, NotificationReceiver, Notifier, RideListing,
    RequestsView, RidesView,
};

#[derive(Parser)]
#[command(name = "ride-along")]
#[command(about = "Browse rides and track your ride requests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List rides, or best matches near a pickup point
    Rides {
        /// Pickup coordinates as LAT,LNG
        #[arg(long)]
        near: Option<String>,
        /// Dropoff coordinates as LAT,LNG
        #[arg(long)]
        to: Option<String>,
        /// Use the configured home location as pickup
        #[arg(long)]
        home: bool,
    },
    /// Show one ride
    Ride { id: String },
    /// Ask to join a ride
    Request { ride_id: String },
    /// Show your ride requests
    Requests {
        /// Keep polling and print status changes until Ctrl-C
        #[arg(long)]
        watch: bool,
        /// Re-check every request against its ride before printing
        #[arg(long)]
        force: bool,
    },
    /// Cancel a pending ride request
    Cancel {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Rate the driver of a ride (1-5)
    Rate {
        ride_id: String,
        driver_id: String,
        score: u8,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Report a user
    Report {
        user_id: String,
        reason: String,
        #[arg(long)]
        details: Option<String>,
        #[arg(long)]
        ride: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    ride_along::init_tracing(&config.runtime);

    let user = config.session_user();
    if !user.is_known() {
        warn!("RIDE_USER_ID not set; request statuses cannot be matched to you");
    }
    let api: Arc<dyn RideApi> = Arc::new(HttpRideApi::from_config(&config)?);
    let (notifier, mut notifications) = Notifier::channel();

    let outcome = match cli.command {
        Commands::Rides { near, to, home } => {
            let rides = RidesView::new(api, user, notifier)
                .with_geocoder(HttpGeocoder::from_config(&config)?);
            let pickup = match (near, home) {
                (Some(raw), _) => Some(parse_coords(&raw)?),
                (None, true) => Some(config.home().context("home location is not configured")?),
                (None, false) => None,
            };
            let dropoff = to.as_deref().map(parse_coords).transpose()?;
            let loaded = match pickup {
                Some(pickup) => rides.search(MatchQuery { pickup, dropoff }).await,
                None => rides.load_all().await,
            };
            match loaded {
                Ok(()) => {
                    print_rides(&rides.snapshot().await.listings);
                    Ok(())
                }
                Err(e) => Err(anyhow!(e.user_message("Failed to load rides"))),
            }
        }
        Commands::Ride { id } => {
            let rides = RidesView::new(api, user, notifier)
                .with_geocoder(HttpGeocoder::from_config(&config)?);
            match rides.details(&EntityId::new(id)).await {
                Ok(listing) => {
                    print_rides(std::slice::from_ref(&listing));
                    print_passengers(&listing);
                    Ok(())
                }
                Err(_) => Ok(()),
            }
        }
        Commands::Request { ride_id } => {
            let rides = RidesView::new(api, user, notifier);
            let _ = rides.request_ride(&EntityId::new(ride_id), None, None).await;
            Ok(())
        }
        Commands::Requests { watch, force } => {
            let view = RequestsView::new(api, user, config.polling.clone(), notifier);
            show_requests(&view, watch, force, &mut notifications).await
        }
        Commands::Cancel { id, yes } => {
            let view = RequestsView::new(api, user, config.polling.clone(), notifier);
            view.retry()
                .await
                .map_err(|e| anyhow!(e.user_message("Failed to load your ride requests")))?;
            let confirm = move |prompt: &str| yes || ask(prompt);
            let outcome = view.cancel_request(&EntityId::new(id), &confirm).await;
            if outcome == CancelOutcome::Unknown {
                println!("No such request in your list.");
            }
            view.teardown();
            Ok(())
        }
        Commands::Rate {
            ride_id,
            driver_id,
            score,
            comment,
        } => {
            let feedback = FeedbackActions::new(api, notifier);
            let _ = feedback
                .rate_driver(&EntityId::new(ride_id), &EntityId::new(driver_id), score, comment)
                .await;
            Ok(())
        }
        Commands::Report {
            user_id,
            reason,
            details,
            ride,
        } => {
            let feedback = FeedbackActions::new(api, notifier);
            let _ = feedback
                .report_user(&EntityId::new(user_id), &reason, details, ride.map(EntityId::new))
                .await;
            Ok(())
        }
    };

    drain_notifications(&mut notifications);
    outcome
}

async fn show_requests(
    view: &RequestsView,
    watch: bool,
    force: bool,
    notifications: &mut NotificationReceiver,
) -> Result<()> {
    if !watch {
        view.retry()
            .await
            .map_err(|e| anyhow!(e.user_message("Failed to load your ride requests")))?;
        if force {
            view.force_update().await;
        }
        print_requests(&view.snapshot().await.requests);
        return Ok(());
    }

    if let Err(e) = view.mount().await {
        eprintln!("{}", e.user_message("Failed to load your ride requests"));
    }
    if force {
        view.force_update().await;
    }
    print_requests(&view.snapshot().await.requests);
    info!("watching ride requests, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(note) = notifications.recv() => {
                print_notification(note.level, &note.message);
                if note.level == NotificationLevel::Success {
                    print_requests(&view.snapshot().await.requests);
                }
            }
        }
    }
    view.teardown();
    Ok(())
}

fn parse_coords(raw: &str) -> Result<Coordinates> {
    Coordinates::parse_pair(raw).with_context(|| format!("invalid coordinates '{}', expected LAT,LNG", raw))
}

fn ask(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn drain_notifications(notifications: &mut NotificationReceiver) {
    while let Ok(note) = notifications.try_recv() {
        print_notification(note.level, &note.message);
    }
}

fn print_notification(level: NotificationLevel, message: &str) {
    match level {
        NotificationLevel::Info => println!("ℹ️  {}", message),
        NotificationLevel::Success => println!("✅ {}", message),
        NotificationLevel::Error => eprintln!("❌ {}", message),
        NotificationLevel::LoginRequired => {
            eprintln!("🔒 {}: set RIDE_API_TOKEN or ~/.ride_token", message)
        }
    }
}

fn when(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "–".to_string())
}

fn print_rides(listings: &[RideListing]) {
    if listings.is_empty() {
        println!("No rides found.");
        return;
    }
    let mut table = Table::new();
    table.add_row(row!["Ride", "From", "To", "Departs", "Seats", "Price", "Driver", "You"]);
    for l in listings {
        let ride = &l.ride;
        let you = if l.is_own {
            "driver".to_string()
        } else {
            l.my_status.map(|s| s.to_string()).unwrap_or_default()
        };
        table.add_row(row![
            ride.id.as_ref().map(|id| id.to_string()).unwrap_or_default(),
            ride.pickup.as_ref().map(|p| p.label()).unwrap_or_default(),
            ride.dropoff.as_ref().map(|p| p.label()).unwrap_or_default(),
            when(ride.departure_time),
            ride.available_seats.map(|s| s.to_string()).unwrap_or_default(),
            ride.price.map(|p| format!("${:.2}", p)).unwrap_or_default(),
            ride.creator.as_ref().map(|c| c.display_name().to_string()).unwrap_or_default(),
            you,
        ]);
    }
    table.printstd();
}

fn print_passengers(listing: &RideListing) {
    if listing.ride.passengers.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.add_row(row!["Passenger", "Status"]);
    for p in &listing.ride.passengers {
        table.add_row(row![
            p.user.as_ref().map(|u| u.display_name().to_string()).unwrap_or_default(),
            p.status.map(|s| s.to_string()).unwrap_or_default(),
        ]);
    }
    table.printstd();
}

fn print_requests(requests: &[RideRequest]) {
    if requests.is_empty() {
        println!("You have no ride requests.");
        return;
    }
    let mut table = Table::new();
    table.add_row(row!["Request", "Ride", "From", "To", "Departs", "Status"]);
    for r in requests {
        let ride = r.embedded_ride();
        table.add_row(row![
            r.id,
            r.resolved_ride_id().map(|id| id.to_string()).unwrap_or_default(),
            ride.and_then(|x| x.pickup.as_ref()).map(|p| p.label()).unwrap_or_default(),
            ride.and_then(|x| x.dropoff.as_ref()).map(|p| p.label()).unwrap_or_default(),
            when(r.departure_time.or_else(|| ride.and_then(|x| x.departure_time))),
            r.display_status(),
        ]);
    }
    table.printstd();
}
