use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;

use crate::daemon::{
    storage::time_store::{FileTimeStore, TimeStore},
    tracking::{
        listing::{order_sites, SiteEntry},
        session::{SessionState, TrackerState},
    },
};

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(
        long,
        help = "Application directory. By default tries to read from $XDG_STATE_HOME or $HOME/.local/state"
    )]
    pub dir: Option<PathBuf>,
    #[arg(long, help = "Only show sites visited today")]
    pub today: bool,
}

/// Prints the stored statistics, most recently used sites first. Works while the tracker is
/// running, the store lock makes sure a consistent document is read.
pub async fn process_report_command(
    app_dir: PathBuf,
    ReportCommand { today, .. }: ReportCommand,
) -> Result<()> {
    let store = FileTimeStore::new(app_dir)?;

    let now = Utc::now();
    let sites = order_sites(store.list_records().await?, &offline_state(now));
    for line in report_lines(&sites, today) {
        println!("{line}");
    }

    let details = store.storage_details().await?;
    println!();
    println!("{} sites, {}", details.sites, format_bytes(details.bytes));
    Ok(())
}

/// State used when no tracker is consulted: nothing attended, no tabs known.
fn offline_state(now: DateTime<Utc>) -> TrackerState {
    TrackerState {
        session: SessionState {
            active_domain: None,
            attended_since: None,
            now,
        },
        active_tab_domains: vec![],
    }
}

fn report_lines(sites: &[SiteEntry], today: bool) -> Vec<String> {
    sites
        .iter()
        .filter(|site| !today || site.today_time > 0 || site.today_visits > 0)
        .map(|site| {
            format!(
                "{}\t{}\t{}\t{}",
                format_duration(site.today_time),
                format_duration(site.total_time),
                site.today_visits,
                site.domain
            )
        })
        .collect()
}

fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = seconds / 60 % 60;
    let seconds = seconds % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let mut value = bytes as f64 / 1024.;
    let mut unit = 0;
    while value >= 1024. && unit + 1 < UNITS.len() {
        value /= 1024.;
        unit += 1;
    }
    format!("{value:.1}{}", UNITS[unit])
}
