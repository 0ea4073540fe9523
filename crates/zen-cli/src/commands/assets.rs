//! `zen assets` - catalog queries, fetches, sync and cache maintenance

use console::style;
use serde::Serialize;
use std::io::Write;
use zen_assets::{Filter, GetOptions, SyncRequest};
use zen_core::{AssetRecord, AssetType};

use super::{Context, spinner};
use crate::display::{self, OutputFormat};
use crate::error::{CliError, Result};
use crate::util::{format_age, short_checksum};

/// Filter flags of `assets list`
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub asset_type: Option<AssetType>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ListArgs {
    fn filter(&self) -> Filter {
        Filter {
            asset_type: self.asset_type,
            category: self.category.clone(),
            tags: self.tags.clone(),
            limit: self.limit.unwrap_or(0),
            offset: self.offset,
        }
    }
}

pub async fn list(ctx: &Context, args: &ListArgs, format: OutputFormat) -> Result<()> {
    let client = ctx.client()?;
    let list = client.list_assets(&args.filter(), &ctx.token).await?;

    match display::serialize(&list, format)? {
        Some(text) => print!("{}", text),
        None => print!("{}", display::asset_table(&list)),
    }
    Ok(())
}

/// Machine-readable view of a fetched asset
#[derive(Debug, Serialize)]
struct FetchedAsset<'a> {
    name: &'a str,
    checksum: &'a str,
    cached: bool,
    cache_age_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a AssetRecord>,
    content: String,
}

pub async fn get(
    ctx: &Context,
    name: &str,
    no_cache: bool,
    no_verify: bool,
    format: OutputFormat,
) -> Result<()> {
    let client = ctx.client()?;
    let options = GetOptions {
        use_cache: !no_cache,
        verify_integrity: !no_verify,
        include_metadata: true,
    };
    let asset = client.get_asset(name, options, &ctx.token).await?;

    let view = FetchedAsset {
        name,
        checksum: &asset.checksum,
        cached: asset.cached,
        cache_age_seconds: asset.cache_age_seconds,
        metadata: asset.metadata.as_ref(),
        content: String::from_utf8_lossy(&asset.content).into_owned(),
    };
    if let Some(text) = display::serialize(&view, format)? {
        print!("{}", text);
        return Ok(());
    }

    // Raw bytes on stdout so output can be piped; provenance on stderr
    std::io::stdout().write_all(&asset.content)?;
    let source = if asset.cached {
        format!("cache, {} old", format_age(asset.cache_age_seconds))
    } else {
        "repository".to_string()
    };
    eprintln!(
        "{} {} {} ({})",
        style("✓").green().bold(),
        name,
        style(short_checksum(&asset.checksum)).dim(),
        source
    );
    Ok(())
}

pub async fn sync(ctx: &Context, force: bool, format: OutputFormat) -> Result<()> {
    let client = ctx.client()?;
    let bar = spinner(format!("Syncing {}", ctx.config.assets.repository_url));
    let result = client
        .sync_repository(
            SyncRequest {
                force,
                provider: None,
            },
            &ctx.token,
        )
        .await;
    bar.finish_and_clear();
    let result = result?;

    match display::serialize(&result, format)? {
        Some(text) => print!("{}", text),
        None => print!("{}", display::sync_summary(&result)),
    }
    Ok(())
}

pub fn status(ctx: &Context, format: OutputFormat) -> Result<()> {
    let client = ctx.client()?;
    let status = client.status();
    match display::serialize(&status, format)? {
        Some(text) => print!("{}", text),
        None => print!("{}", display::status_summary(&status)),
    }
    Ok(())
}

pub fn cache_info(ctx: &Context, format: OutputFormat) -> Result<()> {
    let info = ctx.client()?.cache_info();
    match display::serialize(&info, format)? {
        Some(text) => print!("{}", text),
        None => print!("{}", display::cache_summary(&info)),
    }
    Ok(())
}

pub fn cache_clear(ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let entries = client.cache_info().entry_count;
    client.clear_cache()?;
    println!(
        "{} Cleared {} cache entr{}",
        style("✓").green().bold(),
        entries,
        if entries == 1 { "y" } else { "ies" }
    );
    Ok(())
}

pub fn cache_cleanup(ctx: &Context, format: OutputFormat) -> Result<()> {
    let report = ctx.client()?.cleanup_cache()?;
    match display::serialize(&report, format)? {
        Some(text) => print!("{}", text),
        None => print!("{}", display::cleanup_summary(&report)),
    }
    Ok(())
}

/// `--type` value parser with the accepted names as help
pub fn parse_asset_type(value: &str) -> Result<AssetType> {
    value.parse().map_err(|e: zen_core::CoreError| {
        CliError::input_with_help(e.to_string(), "expected one of: template, prompt, mcp, schema")
    })
}
