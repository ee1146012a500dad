//! Best-effort enrichment: a song for the mood and a short story.
//!
//! Neither sub-operation fails the run. Missing credentials, errors and
//! empty results all resolve to fallback values.

pub mod music;
pub mod story;

use std::sync::Arc;

use mood_models::{genre_for_emotion, RecommendedSong};
use tracing::{debug, info, warn};

use crate::config::StorySettings;
use crate::metrics;

pub use music::{MusicSearch, SpotifyClient, SpotifyConfig};
pub use story::{build_prompt, OpenAiClient, OpenAiConfig, TextGenerator};

/// Music lookup and story generation over the aggregated results.
pub struct EnrichmentStage {
    music: Option<Arc<dyn MusicSearch>>,
    text: Option<Arc<dyn TextGenerator>>,
    story: StorySettings,
}

impl EnrichmentStage {
    /// `None` capabilities stand for missing credentials.
    pub fn new(
        music: Option<Arc<dyn MusicSearch>>,
        text: Option<Arc<dyn TextGenerator>>,
        story: StorySettings,
    ) -> Self {
        Self { music, text, story }
    }

    /// Recommend a track for `emotion`, or the Unknown sentinel.
    pub async fn recommend_song(&self, emotion: &str) -> RecommendedSong {
        let genre = genre_for_emotion(emotion);

        let Some(music) = self.music.as_ref() else {
            debug!(genre, "No music search credentials, using fallback song");
            metrics::record_enrichment_fallback("music_unconfigured");
            return RecommendedSong::unknown();
        };

        match music.search_track(genre).await {
            Ok(Some(song)) => {
                info!(
                    provider = music.name(),
                    genre,
                    track = %song.track_name,
                    artist = %song.artist,
                    "Recommended song"
                );
                song
            }
            Ok(None) => {
                info!(provider = music.name(), genre, "No track found for genre");
                metrics::record_enrichment_fallback("music_empty");
                RecommendedSong::unknown()
            }
            Err(e) => {
                warn!(provider = music.name(), genre, error = %e, "Music search failed");
                metrics::record_enrichment_fallback("music_error");
                RecommendedSong::unknown()
            }
        }
    }

    /// Generate the story, or a diagnostic string naming the failure.
    ///
    /// `labels` are deduplicated in order before they enter the prompt.
    pub async fn generate_story(
        &self,
        labels: &[String],
        emotion: &str,
        keyword: Option<&str>,
    ) -> String {
        let mut distinct: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            if !distinct.contains(label) {
                distinct.push(label.clone());
            }
        }
        let prompt = build_prompt(emotion, &distinct, keyword, self.story.max_words);

        let Some(text) = self.text.as_ref() else {
            metrics::record_enrichment_fallback("story_unconfigured");
            return story_failure("no text generation API key configured");
        };

        match text
            .generate(&prompt, self.story.max_tokens, self.story.temperature)
            .await
        {
            Ok(story) => {
                let story = story.trim().to_string();
                info!(provider = text.name(), chars = story.len(), "Generated story");
                story
            }
            Err(e) => {
                warn!(provider = text.name(), error = %e, "Story generation failed");
                metrics::record_enrichment_fallback("story_error");
                story_failure(e)
            }
        }
    }
}

fn story_failure(reason: impl std::fmt::Display) -> String {
    format!("(Story generation failed: {})", reason)
}
