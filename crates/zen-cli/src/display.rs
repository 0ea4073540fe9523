//! Display formatting for CLI output
//!
//! Text output is a styled table or summary for people; `json` and `yaml`
//! print the library types as-is for scripts.

use clap::ValueEnum;
use console::style;
use serde::Serialize;
use zen_assets::{AssetList, CacheInfo, CleanupReport, ClientStatus, SyncResult, SyncStatus};

use crate::error::{CliError, Result};
use crate::util::{format_size, format_time};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

/// Serialize `value` for a machine format
///
/// Returns `None` for [`OutputFormat::Text`], which each command renders itself.
pub fn serialize<T: Serialize>(value: &T, format: OutputFormat) -> Result<Option<String>> {
    match format {
        OutputFormat::Text => Ok(None),
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map(|s| Some(s + "\n"))
            .map_err(CliError::output),
        OutputFormat::Yaml => serde_yaml::to_string(value)
            .map(Some)
            .map_err(CliError::output),
    }
}

pub fn asset_table(list: &AssetList) -> String {
    if list.assets.is_empty() {
        return "No assets match the filter\n".to_string();
    }

    let mut out = format!(
        "{:<24} {:<10} {:<10} {:<14} {}\n",
        style("NAME").bold(),
        style("TYPE").bold(),
        style("FORMAT").bold(),
        style("CATEGORY").bold(),
        style("DESCRIPTION").bold()
    );
    for record in &list.assets {
        out.push_str(&format!(
            "{:<24} {:<10} {:<10} {:<14} {}\n",
            record.name, record.asset_type.as_str(), record.format, record.category, record.description
        ));
    }

    let shown = list.assets.len();
    out.push_str(&format!(
        "\n{} of {} asset(s)",
        list.offset + shown,
        list.total
    ));
    if list.has_more {
        out.push_str(&format!(
            " {}",
            style(format!("(next: --offset {})", list.offset + shown)).dim()
        ));
    }
    out.push('\n');
    out
}

pub fn cache_summary(info: &CacheInfo) -> String {
    format!(
        "{}\n  Entries:   {}\n  Size:      {} / {}\n  Hit ratio: {:.1}% ({} hits, {} misses)\n  Oldest:    {}\n",
        style("Asset cache").bold(),
        info.entry_count,
        format_size(info.total_size),
        format_size(info.size_limit),
        info.hit_ratio * 100.0,
        info.hits,
        info.misses,
        format_time(info.oldest_entry)
    )
}

pub fn cleanup_summary(report: &CleanupReport) -> String {
    format!(
        "{} Removed {} expired, {} orphaned and {} evicted entr{}\n",
        style("✓").green().bold(),
        report.expired,
        report.orphans,
        report.evicted,
        if report.expired + report.orphans + report.evicted == 1 {
            "y"
        } else {
            "ies"
        }
    )
}

pub fn sync_summary(result: &SyncResult) -> String {
    let mut out = match result.status {
        SyncStatus::Success => format!("{} Catalog synced", style("✓").green().bold()),
        SyncStatus::Partial => format!("{} Catalog partially synced", style("!").yellow().bold()),
    };
    if let Some(version) = &result.manifest_version {
        out.push_str(&format!(" (manifest {})", version));
    }
    out.push_str(&format!(
        "\n  {} asset(s): +{} -{} ~{} in {}ms\n",
        result.total_assets, result.added, result.removed, result.updated, result.duration_ms
    ));
    if let Some(error) = &result.error {
        out.push_str(&format!("  {} {}\n", style("warning:").yellow(), error));
    }
    out
}

pub fn status_summary(status: &ClientStatus) -> String {
    let version = if status.catalog_version.is_empty() {
        "-"
    } else {
        status.catalog_version.as_str()
    };
    format!(
        "{}\n  Repository: {} ({}, {})\n  Manifest:   {}\n  Catalog:    {} asset(s), version {}\n  Last sync:  {}\n\n{}",
        style("Asset catalog").bold(),
        status.repository_url,
        status.branch,
        status.backend,
        status.manifest_path.display(),
        status.catalog_size,
        version,
        format_time(status.last_sync),
        cache_summary(&status.cache)
    )
}
