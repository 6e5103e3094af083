//! Catalog-backed artist enrichment: stored profiles, artist imagery,
//! MusicBrainz genres and image palettes

use super::artist_images::ArtistImageClient;
use super::color_extractor::ColorExtractor;
use super::musicbrainz_client::MusicBrainzClient;
use crate::db::ProfileStore;
use crate::enrichment::ArtistEnricher;
use crate::error::Result;
use async_trait::async_trait;
use jamviz_common::models::{ArtistProfile, Rgb};
use std::time::Duration;

pub struct CatalogEnricher {
    profiles: ProfileStore,
    images: ArtistImageClient,
    musicbrainz: MusicBrainzClient,
    colors: ColorExtractor,
}

impl CatalogEnricher {
    pub fn new(profiles: ProfileStore, timeout: Duration) -> Result<Self> {
        Ok(Self {
            profiles,
            images: ArtistImageClient::new(timeout)?,
            musicbrainz: MusicBrainzClient::new(timeout)?,
            colors: ColorExtractor::new(timeout)?,
        })
    }
}

#[async_trait]
impl ArtistEnricher for CatalogEnricher {
    async fn load_profile(&self, artist: &str) -> Result<ArtistProfile> {
        self.profiles.get_or_create(artist).await
    }

    async fn fetch_images(&self, artist: &str) -> Result<Vec<String>> {
        Ok(self.images.fetch(artist).await)
    }

    async fn fetch_genres(&self, artist: &str) -> Result<Vec<String>> {
        self.musicbrainz.artist_genres(artist).await
    }

    async fn extract_colors(&self, image_url: &str) -> Result<Vec<Rgb>> {
        self.colors.extract(image_url).await
    }

    async fn save_profile(&self, profile: &mut ArtistProfile) -> Result<()> {
        self.profiles.save(profile).await
    }
}
