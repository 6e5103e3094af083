//! Genre to mood and visualizer mapping
//!
//! Each genre is matched exactly first, then by substring in either direction
//! against the table order.

/// Visualizer used when no genre matches
pub const DEFAULT_VISUALIZER: &str = "bars";

const GENRE_MOODS: &[(&str, [&str; 2])] = &[
    ("rock", ["energetic", "powerful"]),
    ("alternative rock", ["energetic", "moody"]),
    ("indie rock", ["energetic", "raw"]),
    ("metal", ["intense", "aggressive"]),
    ("heavy metal", ["intense", "aggressive"]),
    ("death metal", ["intense", "dark"]),
    ("pop", ["upbeat", "bright"]),
    ("synth-pop", ["upbeat", "synthetic"]),
    ("electronic", ["pulsing", "synthetic"]),
    ("edm", ["pulsing", "energetic"]),
    ("house", ["pulsing", "groovy"]),
    ("techno", ["pulsing", "hypnotic"]),
    ("drum and bass", ["pulsing", "intense"]),
    ("ambient", ["dreamy", "atmospheric"]),
    ("jazz", ["smooth", "sophisticated"]),
    ("classical", ["elegant", "flowing"]),
    ("hip hop", ["rhythmic", "bold"]),
    ("rap", ["rhythmic", "bold"]),
    ("r&b", ["smooth", "soulful"]),
    ("soul", ["smooth", "soulful"]),
    ("country", ["warm", "earthy"]),
    ("folk", ["organic", "gentle"]),
    ("punk", ["raw", "energetic"]),
    ("punk rock", ["raw", "energetic"]),
    ("blues", ["soulful", "deep"]),
    ("reggae", ["relaxed", "groovy"]),
    ("latin", ["rhythmic", "warm"]),
    ("funk", ["groovy", "bold"]),
];

const GENRE_VISUALIZERS: &[(&str, &str)] = &[
    ("electronic", "tunnel"),
    ("edm", "tunnel"),
    ("house", "tunnel"),
    ("techno", "tunnel"),
    ("drum and bass", "tunnel"),
    ("ambient", "starfield"),
    ("classical", "starfield"),
    ("metal", "terrain"),
    ("heavy metal", "terrain"),
    ("death metal", "terrain"),
    ("rock", "bars"),
    ("alternative rock", "bars"),
    ("punk", "bars"),
    ("pop", "radial"),
    ("synth-pop", "radial"),
    ("jazz", "galaxy"),
    ("soul", "galaxy"),
    ("r&b", "galaxy"),
    ("hip hop", "bars"),
    ("rap", "bars"),
    ("folk", "waveform"),
    ("blues", "waveform"),
    ("country", "waveform"),
    ("reggae", "radial"),
    ("funk", "radial"),
    ("latin", "radial"),
];

fn lookup<'a, V>(table: &'a [(&'static str, V)], genre: &str) -> Option<&'a V> {
    let genre = genre.trim().to_lowercase();
    if genre.is_empty() {
        return None;
    }
    table
        .iter()
        .find(|(key, _)| *key == genre)
        .or_else(|| {
            table
                .iter()
                .find(|(key, _)| genre.contains(key) || key.contains(genre.as_str()))
        })
        .map(|(_, value)| value)
}

/// Mood descriptors for all genres, first occurrence order, no repeats
pub fn derive_mood_tags(genres: &[String]) -> Vec<String> {
    let mut moods: Vec<String> = Vec::new();
    for genre in genres {
        if let Some(values) = lookup(GENRE_MOODS, genre) {
            for mood in values {
                if !moods.iter().any(|m| m.as_str() == *mood) {
                    moods.push(mood.to_string());
                }
            }
        }
    }
    moods
}

/// Visualizer of the first genre that maps to one
pub fn derive_preferred_visualizer(genres: &[String]) -> String {
    genres
        .iter()
        .find_map(|genre| lookup(GENRE_VISUALIZERS, genre))
        .copied()
        .unwrap_or(DEFAULT_VISUALIZER)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genres(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match_preferred_over_substring() {
        // "heavy metal" contains "metal" but has its own entry
        assert_eq!(
            derive_mood_tags(&genres(&["death metal"])),
            vec!["intense".to_string(), "dark".to_string()]
        );
    }

    #[test]
    fn test_substring_match() {
        // "glam rock" is not listed; it contains "rock"
        assert_eq!(derive_preferred_visualizer(&genres(&["glam rock"])), "bars");
        assert_eq!(
            derive_mood_tags(&genres(&["progressive house"])),
            vec!["pulsing".to_string(), "groovy".to_string()]
        );
    }

    #[test]
    fn test_moods_deduplicated_in_order() {
        let moods = derive_mood_tags(&genres(&["Rock", "punk", "unknownthing"]));
        assert_eq!(moods, vec!["energetic", "powerful", "raw"]);
    }

    #[test]
    fn test_visualizer_first_match_wins() {
        assert_eq!(derive_preferred_visualizer(&genres(&["vaporwave", "techno", "jazz"])), "tunnel");
        assert_eq!(derive_preferred_visualizer(&genres(&["zzz"])), DEFAULT_VISUALIZER);
        assert_eq!(derive_preferred_visualizer(&[]), DEFAULT_VISUALIZER);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(derive_preferred_visualizer(&genres(&["AMBIENT"])), "starfield");
    }
}
