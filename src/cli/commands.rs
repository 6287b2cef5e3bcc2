use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mealbridge")]
#[command(about = "Listing and claim lifecycle engine for surplus food handoffs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/default")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize database and configuration
    Init,

    /// Post a new food listing
    Post {
        /// Donor identity (already authenticated upstream)
        #[arg(long)]
        donor: String,

        #[arg(long)]
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// raw or cooked; omit to fall back to the AI suggestion
        #[arg(long)]
        category: Option<String>,

        #[arg(long, default_value = "1")]
        quantity: u32,

        #[arg(long, default_value = "portions")]
        unit: String,

        #[arg(long)]
        lat: f64,

        #[arg(long)]
        lng: f64,

        #[arg(long)]
        address: String,

        /// Hours until expiry; omit to use the suggestion or config default
        #[arg(long)]
        expires_in_hours: Option<i64>,

        /// Media store URL (repeatable)
        #[arg(long = "image")]
        images: Vec<String>,

        /// AI classification payload as JSON
        #[arg(long)]
        suggestion: Option<String>,
    },

    /// List available listings near a point, nearest first
    Nearby {
        #[arg(long)]
        lat: f64,

        #[arg(long)]
        lng: f64,

        /// Search radius in meters
        #[arg(short, long)]
        radius: Option<f64>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Claim an available listing and receive the pickup token
    Claim {
        listing_id: String,

        /// Recipient identity
        #[arg(long)]
        claimant: String,
    },

    /// Advance a claim one pickup step
    Advance {
        claim_id: String,

        /// Status the caller last observed
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },

    /// Verify a pickup with its token, completing the handoff
    Verify {
        claim_id: String,

        token: String,
    },

    /// Cancel a claim; the listing reopens unless it expired
    Cancel {
        claim_id: String,

        /// Identity of whoever is cancelling (claimant or donor)
        #[arg(long)]
        actor: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Record feedback for a verified handoff
    Feedback {
        claim_id: String,

        #[arg(long)]
        rating: u8,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Run a single expiry sweep
    Reap,

    /// Run the background reaper service
    Auto {
        /// Sweep interval in seconds
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show a user's points balance and history
    Points {
        user: String,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show statistics and reports
    Stats {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}
