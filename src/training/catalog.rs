//! MovieLens `u.item` catalog parsing.
//!
//! Each line is pipe separated: id, title, release date, video release date,
//! IMDb URL, then one 0/1 column per genre. The file is Latin-1 encoded.

use std::path::Path;

use crate::{
    error::{AppError, AppResult},
    models::{GenreFlags, GENRE_COUNT},
};

/// Name of the movie catalog inside a MovieLens data directory
pub const MOVIES_FILE: &str = "u.item";

const LEADING_FIELDS: usize = 5;

/// Raw catalog record, before feature engineering
#[derive(Debug, Clone, PartialEq)]
pub struct RawMovie {
    pub id: u32,
    pub title: String,
    pub genres: GenreFlags,
    pub imdb_url: Option<String>,
}

/// Reads and parses `u.item` from a MovieLens data directory
pub async fn load_movies(data_dir: &Path) -> AppResult<Vec<RawMovie>> {
    let path = data_dir.join(MOVIES_FILE);
    tracing::info!(path = %path.display(), "Loading movie catalog");

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        AppError::StorageUnavailable(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let movies = parse_movies(&decode_latin1(&bytes))?;

    let without_genres = movies.iter().filter(|m| m.genres.is_empty()).count();
    if without_genres > 0 {
        tracing::warn!(count = without_genres, "Movies without any genre assigned");
    }
    tracing::info!(count = movies.len(), "Loaded movie catalog");

    Ok(movies)
}

/// Latin-1 maps every byte to the code point of the same value
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

pub fn parse_movies(content: &str) -> AppResult<Vec<RawMovie>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| parse_line(line).map_err(|e| with_line(e, line_no + 1)))
        .collect()
}

fn with_line(err: AppError, line_no: usize) -> AppError {
    match err {
        AppError::InvalidInput(msg) => AppError::InvalidInput(format!("line {}: {}", line_no, msg)),
        other => other,
    }
}

fn parse_line(line: &str) -> AppResult<RawMovie> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() != LEADING_FIELDS + GENRE_COUNT {
        return Err(AppError::InvalidInput(format!(
            "expected {} fields, found {}",
            LEADING_FIELDS + GENRE_COUNT,
            fields.len()
        )));
    }

    let id = fields[0]
        .trim()
        .parse::<u32>()
        .map_err(|_| AppError::InvalidInput(format!("invalid movie id '{}'", fields[0])))?;

    let mut flags = [false; GENRE_COUNT];
    for (slot, raw) in flags.iter_mut().zip(&fields[LEADING_FIELDS..]) {
        *slot = match raw.trim() {
            "1" => true,
            "0" => false,
            other => {
                return Err(AppError::InvalidInput(format!(
                    "invalid genre flag '{}' for movie {}",
                    other, id
                )))
            }
        };
    }

    let imdb_url = Some(fields[4].trim())
        .filter(|s| !s.is_empty())
        .map(String::from);

    Ok(RawMovie {
        id,
        title: fields[1].trim().to_string(),
        genres: GenreFlags(flags),
        imdb_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
1|Toy Story (1995)|01-Jan-1995||http://us.imdb.com/M/title-exact?Toy%20Story%20(1995)|0|0|0|1|1|1|0|0|0|0|0|0|0|0|0|0|0|0|0
267|unknown||||1|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0|0
";

    #[test]
    fn test_parse_sample_lines() {
        let movies = parse_movies(SAMPLE).unwrap();
        assert_eq!(movies.len(), 2);

        let toy_story = &movies[0];
        assert_eq!(toy_story.id, 1);
        assert_eq!(toy_story.title, "Toy Story (1995)");
        assert_eq!(toy_story.genres.names(), vec!["Animation", "Children", "Comedy"]);
        assert!(toy_story.imdb_url.is_some());

        let unknown = &movies[1];
        assert_eq!(unknown.id, 267);
        assert_eq!(unknown.imdb_url, None);
        assert_eq!(unknown.genres.names(), vec!["unknown"]);
    }

    #[test]
    fn test_parse_rejects_short_line() {
        let err = parse_movies("1|Toy Story (1995)|0|1").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(msg) if msg.starts_with("line 1:")));
    }

    #[test]
    fn test_parse_rejects_bad_flag() {
        let line = "5|Copycat (1995)|01-Jan-1995||url|0|0|0|0|0|0|1|0|2|0|0|0|0|0|0|0|1|0|0";
        assert!(matches!(parse_movies(line), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_decode_latin1() {
        assert_eq!(decode_latin1(&[0x43, 0x61, 0x66, 0xe9]), "Café");
    }

    #[tokio::test]
    async fn test_load_movies_from_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        tokio::fs::write(dir.path().join(MOVIES_FILE), SAMPLE.as_bytes())
            .await
            .unwrap();

        let movies = load_movies(dir.path()).await.unwrap();

        assert_eq!(movies.len(), 2);
        assert_eq!(movies[1].id, 267);
    }

    #[tokio::test]
    async fn test_load_movies_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_movies(dir.path()).await.unwrap_err();
        assert!(matches!(err, AppError::StorageUnavailable(_)));
    }
}
