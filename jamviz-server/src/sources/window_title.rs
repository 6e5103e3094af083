//! Browser window title scraping
//!
//! Only tabs of known streaming services count: each title must end in a
//! service suffix once the browser's own suffix is removed.

use super::PollTrackSource;
use crate::error::Result;
use crate::process::{run_command, split_command};
use crate::reconcile::parse_tab_title;
use async_trait::async_trait;
use jamviz_common::{SourceKind, TrackCandidate};
use std::time::Duration;

/// Polls a command that prints one window title per line
pub struct WindowTitleSource {
    command: Vec<String>,
    browser_suffix: String,
    timeout: Duration,
}

impl WindowTitleSource {
    pub fn new(command: Vec<String>, browser_suffix: String, timeout: Duration) -> Self {
        Self {
            command,
            browser_suffix,
            timeout,
        }
    }

    /// Remove the browser suffix; titles of other windows yield `None`
    pub fn strip_browser_suffix<'a>(&self, title: &'a str) -> Option<&'a str> {
        let title = title.trim();
        if self.browser_suffix.is_empty() {
            return Some(title).filter(|t| !t.is_empty());
        }
        let (tab, _) = title.rsplit_once(self.browser_suffix.as_str())?;
        Some(tab.trim()).filter(|t| !t.is_empty())
    }

    /// First line that parses as a streaming tab
    pub fn detect(&self, listing: &str) -> Option<TrackCandidate> {
        listing
            .lines()
            .filter_map(|line| self.strip_browser_suffix(line))
            .find_map(|tab| parse_tab_title(tab, true))
            .map(|parsed| TrackCandidate::new(parsed.artist, parsed.title, SourceKind::WindowTitle))
    }
}

#[async_trait]
impl PollTrackSource for WindowTitleSource {
    fn kind(&self) -> SourceKind {
        SourceKind::WindowTitle
    }

    async fn poll(&self) -> Result<Option<TrackCandidate>> {
        let (program, args) = split_command(&self.command)?;
        let listing = run_command(program, args, self.timeout).await?;
        Ok(listing.and_then(|listing| self.detect(&listing)))
    }
}
