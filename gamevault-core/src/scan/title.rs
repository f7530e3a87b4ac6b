//! Folder-name heuristics: display titles and stable slugs.

use once_cell::sync::Lazy;
use regex::Regex;

static BRACKETED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").expect("bracketed group regex should compile")
});

static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:v\d+(?:[.\-]\d+)*[a-z]?|\d+(?:\.\d+){1,3}",
        r"|build[ .\-]?\d+|update[ .\-]?\d+)\b",
    ))
    .expect("version regex should compile")
});

static EDITION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:goty|game of the year|deluxe|complete|definitive|remastered|gold",
        r"|ultimate|enhanced|collector'?s|director'?s cut|anniversary|edition)\b",
    ))
    .expect("edition regex should compile")
});

static PLATFORM_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:win(?:32|64)|x64|x86|linux|mac ?os|osx|windows|gog",
        r"|steam(?:rip)?|repack|portable|multi\d+)\b",
    ))
    .expect("platform regex should compile")
});

static COLLAPSE_WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex should compile"));

/// Human-readable title for a content folder.
///
/// Drops bracketed groups, version strings, edition markers, and platform
/// suffixes, then normalises separators. Falls back to the separator-normalised
/// folder name when nothing is left.
pub fn parse_title(folder_name: &str) -> String {
    let spaced = folder_name.replace('_', " ");

    let mut title = BRACKETED_REGEX.replace_all(&spaced, " ").into_owned();
    for pattern in [&*VERSION_REGEX, &*EDITION_REGEX, &*PLATFORM_REGEX] {
        title = pattern.replace_all(&title, " ").into_owned();
    }
    let title = tidy(&title.replace('.', " "));

    if title.is_empty() {
        tidy(&spaced.replace('.', " "))
    } else {
        title
    }
}

fn tidy(text: &str) -> String {
    COLLAPSE_WHITESPACE_REGEX
        .replace_all(text, " ")
        .trim_matches(|c: char| c.is_whitespace() || c == '-' || c == ':' || c == ',')
        .to_string()
}

/// Stable catalog slug for a folder name: lowercase alphanumerics joined by `-`.
pub fn slugify(folder_name: &str) -> String {
    let mut slug = String::with_capacity(folder_name.len());
    let mut pending_dash = false;
    for c in folder_name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_version_and_edition() {
        assert_eq!(parse_title("MyGame_v1.2_GOTY"), "MyGame");
        assert_eq!(
            parse_title("The Witcher 3 - Game of the Year Edition"),
            "The Witcher 3"
        );
        assert_eq!(parse_title("Hades.v1.38290.Win64"), "Hades");
    }

    #[test]
    fn strips_bracketed_prefixes_and_platforms() {
        assert_eq!(
            parse_title("[GOG] Disco Elysium (2019) Final Cut"),
            "Disco Elysium Final Cut"
        );
        assert_eq!(parse_title("Celeste_Linux_x64"), "Celeste");
        assert_eq!(
            parse_title("Stardew Valley Build 1234 Portable"),
            "Stardew Valley"
        );
    }

    #[test]
    fn keeps_meaningful_numbers_and_hyphens() {
        assert_eq!(parse_title("Half-Life 2"), "Half-Life 2");
        assert_eq!(parse_title("Portal"), "Portal");
    }

    #[test]
    fn falls_back_when_everything_is_noise() {
        assert_eq!(parse_title("GOTY_Edition"), "GOTY Edition");
    }

    #[test]
    fn slugs_are_lowercase_and_dash_joined() {
        assert_eq!(slugify("MyGame_v1.2_GOTY"), "mygame-v1-2-goty");
        assert_eq!(slugify("  Half-Life 2 "), "half-life-2");
        assert_eq!(slugify("Ōkami HD"), "ōkami-hd");
    }
}
