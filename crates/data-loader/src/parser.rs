//! Parser for MovieLens rating and movie files.
//!
//! Two layouts are accepted:
//! - CSV (`ratings.csv`, `movies.csv`): read with the `csv` crate, a header
//!   row names the columns, quoted titles may hold commas and line breaks
//! - DAT (`ratings.dat`, `movies.dat`): `::` separated, no header, Latin-1
//!
//! Formats:
//! - ratings: userId, movieId, rating[, timestamp]
//! - movies: movieId, title, genres (pipe-separated)

use crate::error::{DataLoadError, Result};
use crate::types::*;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// File layout, chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Dat,
}

impl Format {
    pub fn from_path(path: &Path) -> Format {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("dat") => Format::Dat,
            _ => Format::Csv,
        }
    }
}

/// One row of `ratings.csv`
#[derive(Debug, Deserialize)]
struct RatingRow {
    #[serde(rename = "userId")]
    user_id: UserId,
    #[serde(rename = "movieId")]
    movie_id: MovieId,
    rating: f32,
    #[serde(default)]
    timestamp: Option<i64>,
}

/// One row of `movies.csv`
#[derive(Debug, Deserialize)]
struct MovieRow {
    #[serde(rename = "movieId")]
    movie_id: MovieId,
    title: String,
    #[serde(default)]
    genres: String,
}

/// Read a file as text, falling back to Latin-1 when it isn't valid UTF-8.
///
/// The 1M `.dat` files are ISO-8859-1; every byte maps straight to a code
/// point there.
fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    })
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Deserialize every CSV record into `T`, keyed by the header row
fn read_csv<T, U>(path: &Path, mut convert: impl FnMut(T) -> U) -> Result<Vec<U>>
where
    T: for<'de> Deserialize<'de>,
{
    let file = file_label(path);
    let text = read_text(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.deserialize::<T>() {
        let row = record.map_err(|e| DataLoadError::ParseError {
            file: file.clone(),
            line: e.position().map_or(0, |p| p.line() as usize),
            reason: e.to_string(),
        })?;
        rows.push(convert(row));
    }
    Ok(rows)
}

/// Line-level context for `.dat` error messages
struct LineCtx<'a> {
    file: &'a str,
    line: usize,
}

impl LineCtx<'_> {
    fn error(&self, reason: impl Into<String>) -> DataLoadError {
        DataLoadError::ParseError {
            file: self.file.to_string(),
            line: self.line,
            reason: reason.into(),
        }
    }

    fn field<'f>(&self, fields: &[&'f str], idx: usize, name: &str) -> Result<&'f str> {
        fields
            .get(idx)
            .map(|s| s.trim())
            .ok_or_else(|| self.error(format!("Missing {}", name)))
    }

    fn number<T>(&self, fields: &[&str], idx: usize, name: &str) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.field(fields, idx, name)?
            .parse()
            .map_err(|e| self.error(format!("Invalid {}: {}", name, e)))
    }
}

/// Run `parse_line` over every non-blank `::` line of a `.dat` file
fn read_dat<T>(
    path: &Path,
    mut parse_line: impl FnMut(&LineCtx<'_>, &[&str]) -> Result<T>,
) -> Result<Vec<T>> {
    let file = file_label(path);
    let text = read_text(path)?;
    let mut rows = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let ctx = LineCtx {
            file: &file,
            line: idx + 1,
        };
        let fields: Vec<&str> = line.split("::").collect();
        rows.push(parse_line(&ctx, &fields)?);
    }
    Ok(rows)
}

/// Parse a ratings file
pub fn parse_ratings(path: &Path) -> Result<Vec<Rating>> {
    match Format::from_path(path) {
        Format::Csv => read_csv(path, |row: RatingRow| Rating {
            user_id: row.user_id,
            movie_id: row.movie_id,
            rating: row.rating,
            timestamp: row.timestamp.unwrap_or(0),
        }),
        Format::Dat => read_dat(path, |ctx, fields| {
            let timestamp = match fields.get(3).map(|s| s.trim()) {
                Some(ts) if !ts.is_empty() => ctx.number(fields, 3, "timestamp")?,
                _ => 0,
            };
            Ok(Rating {
                user_id: ctx.number(fields, 0, "userId")?,
                movie_id: ctx.number(fields, 1, "movieId")?,
                rating: ctx.number(fields, 2, "rating")?,
                timestamp,
            })
        }),
    }
}

/// Parse a movies file
///
/// The title often includes year in parentheses: "Toy Story (1995)"
/// Genres are pipe-separated: "Animation|Children|Comedy"
pub fn parse_movies(path: &Path) -> Result<Vec<Movie>> {
    match Format::from_path(path) {
        Format::Csv => read_csv(path, |row: MovieRow| Movie {
            id: row.movie_id,
            year: extract_year_from_title(&row.title),
            genres: parse_genres(&row.genres),
            title: row.title,
        }),
        Format::Dat => read_dat(path, |ctx, fields| {
            let title = ctx.field(fields, 1, "title")?;
            Ok(Movie {
                id: ctx.number(fields, 0, "movieId")?,
                title: title.to_string(),
                year: extract_year_from_title(title),
                genres: parse_genres(ctx.field(fields, 2, "genres")?),
            })
        }),
    }
}

/// Extract year from movie title
///
/// Example: "Toy Story (1995)" -> Some(1995)
///          "Movie Title" -> None
fn extract_year_from_title(title: &str) -> Option<u16> {
    let start = title.rfind('(')?;
    let end = title.rfind(')')?;
    if start < end {
        return title[start + 1..end].trim().parse::<u16>().ok();
    }
    None
}

/// Parse pipe-separated genres
///
/// "(no genres listed)" yields an empty list; unlisted labels are kept.
fn parse_genres(s: &str) -> Vec<Genre> {
    if s.eq_ignore_ascii_case("(no genres listed)") {
        return Vec::new();
    }
    s.split('|')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(Genre::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &[u8]) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("data-loader-parser-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year_from_title("Toy Story (1995)"), Some(1995));
        assert_eq!(extract_year_from_title("Movie Title"), None);
    }

    #[test]
    fn test_parse_movies_csv_quoted_titles() {
        let path = write_temp(
            "quoted_movies.csv",
            b"movieId,title,genres\n\
              11,\"American President, The (1995)\",Comedy|Drama|Romance\n\
              12,\"He said \"\"hi\"\" (2001)\",Drama\n\
              13,\"Line one\nline two (1999)\",Drama\n\
              14,Heat (1995),Action\n",
        );
        let movies = parse_movies(&path).unwrap();
        assert_eq!(movies.len(), 4);
        assert_eq!(movies[0].title, "American President, The (1995)");
        assert_eq!(movies[1].title, r#"He said "hi" (2001)"#);
        assert_eq!(movies[2].title, "Line one\nline two (1999)");
        assert_eq!(movies[2].year, Some(1999));
        assert_eq!(movies[3].genres, vec![Genre::Action]);
    }

    #[test]
    fn test_parse_genres() {
        assert_eq!(
            parse_genres("Action|Sci-Fi|Children's"),
            vec![Genre::Action, Genre::SciFi, Genre::Children]
        );
        assert!(parse_genres("(no genres listed)").is_empty());
        assert!(parse_genres("").is_empty());
        assert_eq!(parse_genres("Cooking"), vec![Genre::Other("Cooking".into())]);
    }

    #[test]
    fn test_parse_movies_keeps_unlisted_genres() {
        let path = write_temp(
            "other_genres.csv",
            b"movieId,title,genres\n1,Toy Story (1995),Animation\n2,Some Doc (2020),Biography|Documentary\n",
        );
        let movies = parse_movies(&path).unwrap();
        assert_eq!(
            movies[1].genres,
            vec![Genre::Other("Biography".into()), Genre::Documentary]
        );
    }

    #[test]
    fn test_parse_ratings_csv_skips_header() {
        let path = write_temp(
            "ratings.csv",
            b"userId,movieId,rating,timestamp\n1,31,2.5,1260759144\n1,1029,3.0\n\n",
        );
        let ratings = parse_ratings(&path).unwrap();
        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[0].movie_id, 31);
        assert_eq!(ratings[0].rating, 2.5);
        assert_eq!(ratings[1].timestamp, 0);
    }

    #[test]
    fn test_parse_ratings_reports_line() {
        let path = write_temp("bad_ratings.csv", b"userId,movieId,rating\n1,2,abc\n");
        match parse_ratings(&path) {
            Err(DataLoadError::ParseError { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_movies_dat_latin1() {
        // 0xE9 is 'é' in ISO-8859-1 and invalid as standalone UTF-8
        let path = write_temp("movies.dat", b"1::Am\xe9lie (2001)::Comedy|Romance\n");
        let movies = parse_movies(&path).unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Amélie (2001)");
        assert_eq!(movies[0].year, Some(2001));
        assert_eq!(movies[0].genres, vec![Genre::Comedy, Genre::Romance]);
    }
}
