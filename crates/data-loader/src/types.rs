//! Core domain types for the rating data.
//!
//! The coordinator works on a sparse rating matrix (`user -> movie -> rating`)
//! and keeps a small movie catalog next to it for titles and genre lookups.
//! Everything in here is built once at startup and then only read.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DataLoadError;

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user
pub type UserId = u32;

/// Unique identifier for a movie
pub type MovieId = u32;

/// One user's ratings, keyed by movie
pub type UserRatings = HashMap<MovieId, f32>;

/// Sparse rating matrix: `user -> (movie -> rating)`
pub type RatingMatrix = HashMap<UserId, UserRatings>;

/// Lowest rating on the MovieLens scale
pub const MIN_RATING: f32 = 0.5;

/// Highest rating on the MovieLens scale
pub const MAX_RATING: f32 = 5.0;

// =============================================================================
// Movie-related Types
// =============================================================================

/// Represents a movie in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    /// Year extracted from title (e.g., "Toy Story (1995)")
    pub year: Option<u16>,
    pub genres: Vec<Genre>,
}

/// Movie genres used by the MovieLens datasets.
///
/// Serialized with the dataset's own labels so JSON output matches the
/// source files. Labels outside the MovieLens set are kept verbatim in
/// [`Genre::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Genre {
    Action,
    Adventure,
    Animation,
    Children,
    Comedy,
    Crime,
    Documentary,
    Drama,
    Fantasy,
    #[serde(rename = "Film-Noir")]
    FilmNoir,
    Horror,
    #[serde(rename = "IMAX")]
    Imax,
    Musical,
    Mystery,
    Romance,
    #[serde(rename = "Sci-Fi")]
    SciFi,
    Thriller,
    War,
    Western,
    Other(String),
}

impl Genre {
    pub const ALL: [Genre; 19] = [
        Genre::Action,
        Genre::Adventure,
        Genre::Animation,
        Genre::Children,
        Genre::Comedy,
        Genre::Crime,
        Genre::Documentary,
        Genre::Drama,
        Genre::Fantasy,
        Genre::FilmNoir,
        Genre::Horror,
        Genre::Imax,
        Genre::Musical,
        Genre::Mystery,
        Genre::Romance,
        Genre::SciFi,
        Genre::Thriller,
        Genre::War,
        Genre::Western,
    ];

    /// The label used in the dataset files
    pub fn label(&self) -> &str {
        match self {
            Genre::Action => "Action",
            Genre::Adventure => "Adventure",
            Genre::Animation => "Animation",
            Genre::Children => "Children",
            Genre::Comedy => "Comedy",
            Genre::Crime => "Crime",
            Genre::Documentary => "Documentary",
            Genre::Drama => "Drama",
            Genre::Fantasy => "Fantasy",
            Genre::FilmNoir => "Film-Noir",
            Genre::Horror => "Horror",
            Genre::Imax => "IMAX",
            Genre::Musical => "Musical",
            Genre::Mystery => "Mystery",
            Genre::Romance => "Romance",
            Genre::SciFi => "Sci-Fi",
            Genre::Thriller => "Thriller",
            Genre::War => "War",
            Genre::Western => "Western",
            Genre::Other(label) => label,
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<&str> for Genre {
    /// Known labels match case-insensitively, including the 1M dataset's
    /// "Children's" spelling. Anything else becomes `Other` as written.
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("Children's") {
            return Genre::Children;
        }
        Genre::ALL
            .iter()
            .find(|g| g.label().eq_ignore_ascii_case(s))
            .cloned()
            .unwrap_or_else(|| Genre::Other(s.to_string()))
    }
}

impl From<String> for Genre {
    fn from(s: String) -> Self {
        Genre::from(s.as_str())
    }
}

impl From<Genre> for String {
    fn from(genre: Genre) -> Self {
        match genre {
            Genre::Other(label) => label,
            known => known.label().to_string(),
        }
    }
}

impl FromStr for Genre {
    type Err = DataLoadError;

    /// Only a blank label is rejected
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(DataLoadError::InvalidValue {
                field: "genre".to_string(),
                value: s.to_string(),
            });
        }
        Ok(Genre::from(s))
    }
}

// =============================================================================
// Rating Type
// =============================================================================

/// A single rating from a user for a movie
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    /// Rating value from 0.5 to 5.0
    pub rating: f32,
    /// Unix timestamp when rating was made (0 when the source omits it)
    pub timestamp: i64,
}

// =============================================================================
// DataIndex - The In-Memory Rating Store
// =============================================================================

/// Holds the rating matrix, the movie catalog and their lookup indices.
///
/// Built once at startup and shared behind an `Arc`; no method mutates it
/// after loading finishes.
#[derive(Debug)]
pub struct DataIndex {
    /// `user -> (movie -> rating)`, the substrate for similarity search
    pub(crate) matrix: RatingMatrix,
    pub(crate) movies: HashMap<MovieId, Movie>,

    /// Rating history per user, in file order
    pub(crate) user_ratings: HashMap<UserId, Vec<Rating>>,
    /// Movies grouped by genre (one movie can appear in multiple genre lists)
    pub(crate) genre_index: HashMap<Genre, Vec<MovieId>>,
}

impl DataIndex {
    /// Creates a new, empty DataIndex
    pub fn new() -> Self {
        Self {
            matrix: HashMap::new(),
            movies: HashMap::new(),
            user_ratings: HashMap::new(),
            genre_index: HashMap::new(),
        }
    }

    /// The full rating matrix
    pub fn matrix(&self) -> &RatingMatrix {
        &self.matrix
    }

    /// Whether the user has at least one rating
    pub fn contains_user(&self, id: UserId) -> bool {
        self.matrix.contains_key(&id)
    }

    /// A user's rating vector (`movie -> rating`)
    pub fn user_vector(&self, id: UserId) -> Option<&UserRatings> {
        self.matrix.get(&id)
    }

    /// Get a movie by ID
    pub fn get_movie(&self, id: MovieId) -> Option<&Movie> {
        self.movies.get(&id)
    }

    /// Title of a movie, if the catalog knows it
    pub fn title(&self, id: MovieId) -> Option<&str> {
        self.movies.get(&id).map(|m| m.title.as_str())
    }

    /// Get all ratings made by a user
    ///
    /// Returns an empty slice if user has no ratings
    pub fn get_user_ratings(&self, user_id: UserId) -> &[Rating] {
        self.user_ratings
            .get(&user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get all movies in a specific genre, sorted by id
    pub fn get_movies_by_genre(&self, genre: &Genre) -> &[MovieId] {
        self.genre_index
            .get(genre)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Every movie in the catalog, sorted by id
    pub fn all_movies(&self) -> Vec<&Movie> {
        let mut movies: Vec<&Movie> = self.movies.values().collect();
        movies.sort_unstable_by_key(|m| m.id);
        movies
    }

    /// Insert a movie into the catalog
    pub fn insert_movie(&mut self, movie: Movie) {
        self.movies.insert(movie.id, movie);
    }

    /// Insert a rating into the matrix and the per-user history.
    ///
    /// A second rating for the same `(user, movie)` pair replaces the first
    /// in the matrix.
    pub fn insert_rating(&mut self, rating: Rating) {
        self.matrix
            .entry(rating.user_id)
            .or_default()
            .insert(rating.movie_id, rating.rating);

        self.user_ratings
            .entry(rating.user_id)
            .or_default()
            .push(rating);
    }

    /// (users, movies, ratings) for debugging/validation
    pub fn counts(&self) -> (usize, usize, usize) {
        let total_ratings = self.matrix.values().map(|v| v.len()).sum();
        (self.matrix.len(), self.movies.len(), total_ratings)
    }
}

impl Default for DataIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl From<RatingMatrix> for DataIndex {
    /// Wrap a bare matrix (no catalog). Handy for tests and benchmarks.
    fn from(matrix: RatingMatrix) -> Self {
        let mut index = DataIndex::new();
        for (user_id, ratings) in matrix {
            for (movie_id, rating) in ratings {
                index.insert_rating(Rating {
                    user_id,
                    movie_id,
                    rating,
                    timestamp: 0,
                });
            }
        }
        index
    }
}
