//! Emotion labels and the emotion to genre table.

/// Dominant emotion reported when no face vote passed the threshold.
pub const NEUTRAL_EMOTION: &str = "neutral";

/// Genre used for emotions missing from [`EMOTION_GENRES`].
pub const DEFAULT_GENRE: &str = "pop";

/// Fixed mapping from facial emotion label to music genre.
pub const EMOTION_GENRES: [(&str, &str); 7] = [
    ("happy", "pop"),
    ("sad", "acoustic"),
    ("angry", "rock"),
    ("surprise", "dance"),
    ("fear", "ambient"),
    ("disgust", "metal"),
    ("neutral", "chill"),
];

/// Map an emotion to a music genre, defaulting to `pop`.
pub fn genre_for_emotion(emotion: &str) -> &'static str {
    EMOTION_GENRES
        .iter()
        .find(|(label, _)| *label == emotion)
        .map(|(_, genre)| *genre)
        .unwrap_or(DEFAULT_GENRE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_emotions() {
        assert_eq!(genre_for_emotion("happy"), "pop");
        assert_eq!(genre_for_emotion("sad"), "acoustic");
        assert_eq!(genre_for_emotion("angry"), "rock");
        assert_eq!(genre_for_emotion("surprise"), "dance");
        assert_eq!(genre_for_emotion("fear"), "ambient");
        assert_eq!(genre_for_emotion("disgust"), "metal");
        assert_eq!(genre_for_emotion("neutral"), "chill");
    }

    #[test]
    fn test_unmapped_emotion_defaults_to_pop() {
        assert_eq!(genre_for_emotion("contempt"), "pop");
        assert_eq!(genre_for_emotion(""), "pop");
    }
}
