//! CLI command implementations

pub mod assets;
pub mod template;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zen_assets::AssetClient;

use crate::config::ZenConfig;
use crate::error::Result;

/// Everything a command needs from the global flags
pub struct Context {
    pub workspace: PathBuf,
    pub config: ZenConfig,
    pub token: CancellationToken,
}

impl Context {
    pub fn client(&self) -> Result<Arc<AssetClient>> {
        let client = AssetClient::builder(self.config.assets.clone())
            .workspace(self.workspace.clone())
            .build()?;
        Ok(Arc::new(client))
    }
}

/// Stderr spinner, drawn only on a terminal
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
