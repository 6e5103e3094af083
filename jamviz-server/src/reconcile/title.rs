//! Combined title string heuristic
//!
//! Browser tabs and some media players only expose one string such as
//! `"Bohemian Rhapsody - Queen - YouTube Music"`. Streaming catalogs mostly
//! render "Title - Artist", so a two-way split takes the second part as the
//! artist. Tabs rendered "Artist - Title" come out reversed; that bias is kept.

/// Trailing service markers, stripped longest first
pub const SERVICE_SUFFIXES: &[&str] = &[
    " - Pandora",
    " | Pandora",
    " – Pandora",
    " — Pandora",
    " - YouTube Music",
    " - YouTube",
    " - SoundCloud",
    " - Spotify",
    " | Spotify",
    " - Tidal",
    " - Deezer",
    " - Amazon Music",
    " - Apple Music",
    " - Qobuz",
];

/// Separators tried in order; the first one present with two non-empty sides wins
pub const TITLE_SEPARATORS: &[&str] = &[" - ", " – ", " — ", " | ", " · "];

/// Navigation pages that are never songs, matched as whole words
pub const NAVIGATION_VOCABULARY: &[&str] = &[
    "my collection",
    "stations",
    "browse",
    "search",
    "settings",
    "home",
    "library",
    "queue",
    "playlist",
];

/// Artist/title pair recovered from a combined string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    pub artist: String,
    pub title: String,
}

/// Parse a tab or player title
///
/// Returns `None` when the string is empty, is a navigation page, or (with
/// `require_service`) carries no known service suffix.
pub fn parse_tab_title(raw: &str, require_service: bool) -> Option<ParsedTitle> {
    let (clean, found_service) = strip_service_suffix(raw.trim());
    if require_service && !found_service {
        return None;
    }
    if clean.is_empty() || is_navigation_page(clean) {
        return None;
    }

    match split_track_parts(clean) {
        Some((first, second)) => Some(ParsedTitle {
            artist: second.to_string(),
            title: first.to_string(),
        }),
        None => Some(ParsedTitle {
            artist: String::new(),
            title: clean.to_string(),
        }),
    }
}

/// Remove the longest matching service suffix
pub fn strip_service_suffix(title: &str) -> (&str, bool) {
    let longest = SERVICE_SUFFIXES
        .iter()
        .filter(|suffix| title.ends_with(*suffix))
        .max_by_key(|suffix| suffix.len());

    match longest {
        Some(suffix) => (title[..title.len() - suffix.len()].trim(), true),
        None => (title, false),
    }
}

/// Split once on the first separator (in list order) giving two non-empty parts
pub fn split_track_parts(text: &str) -> Option<(&str, &str)> {
    TITLE_SEPARATORS.iter().find_map(|sep| {
        let (first, second) = text.split_once(sep)?;
        let (first, second) = (first.trim(), second.trim());
        (!first.is_empty() && !second.is_empty()).then_some((first, second))
    })
}

/// True when any navigation term appears as a whole word sequence
///
/// Deliberately stricter than a substring test: "Homecoming" or "Queuebreaker"
/// are song titles, not the home or queue page.
pub fn is_navigation_page(text: &str) -> bool {
    let words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    NAVIGATION_VOCABULARY.iter().any(|term| {
        let needle: Vec<&str> = term.split(' ').collect();
        words
            .windows(needle.len())
            .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(artist: &str, title: &str) -> Option<ParsedTitle> {
        Some(ParsedTitle {
            artist: artist.to_string(),
            title: title.to_string(),
        })
    }

    #[test]
    fn test_title_then_artist_with_service() {
        assert_eq!(
            parse_tab_title("Bohemian Rhapsody - Queen - YouTube Music", false),
            parsed("Queen", "Bohemian Rhapsody")
        );
    }

    #[test]
    fn test_strip_service_suffix() {
        let (clean, found) = strip_service_suffix("Song - Artist - YouTube Music");
        assert!(found);
        assert_eq!(clean, "Song - Artist");

        let (clean, found) = strip_service_suffix("Song - Artist - YouTube");
        assert!(found);
        assert_eq!(clean, "Song - Artist");

        assert_eq!(strip_service_suffix("Song - Artist"), ("Song - Artist", false));
    }

    #[test]
    fn test_navigation_page_discarded() {
        assert_eq!(parse_tab_title("My Collection - Pandora", false), None);
        assert_eq!(parse_tab_title("Settings | Spotify", true), None);
    }

    #[test]
    fn test_navigation_words_are_whole_words() {
        assert!(!is_navigation_page("Homeward Bound"));
        assert!(!is_navigation_page("Researching"));
        assert!(!is_navigation_page("Homecoming"));
        assert!(is_navigation_page("Your Library"));
        assert_eq!(
            parse_tab_title("Homeward Bound - Simon & Garfunkel", false),
            parsed("Simon & Garfunkel", "Homeward Bound")
        );
    }

    #[test]
    fn test_no_delimiter_is_title_only() {
        assert_eq!(parse_tab_title("Some Song", false), parsed("", "Some Song"));
    }

    #[test]
    fn test_require_service() {
        assert_eq!(parse_tab_title("Inbox - Gmail", true), None);
        assert_eq!(
            parse_tab_title("Hey Jude – The Beatles – Pandora", true),
            parsed("The Beatles", "Hey Jude")
        );
    }

    #[test]
    fn test_separator_order() {
        // Hyphen is tried before pipe even though pipe appears first
        assert_eq!(split_track_parts("A | B - C"), Some(("A | B", "C")));
        assert_eq!(split_track_parts("Song · Artist"), Some(("Song", "Artist")));
        assert_eq!(split_track_parts(" - Artist"), None);
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(parse_tab_title("", false), None);
        assert_eq!(parse_tab_title(" - Spotify", true), None);
    }
}
